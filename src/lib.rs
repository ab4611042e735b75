pub mod cloudbuild;
pub mod config;
pub mod error;
pub mod git;
pub mod init;
pub mod manifest;
pub mod package;
pub mod publish;
pub mod server;
pub mod ui;
pub mod version;

pub use error::{CliError, Result};
