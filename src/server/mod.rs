//! Git-hosting provider abstraction.
//!
//! Two providers share one method-call contract; the active one is selected
//! by the server string cached in the config directory. Repository lookups
//! treat 404 as "does not exist", not as an error.

pub mod gitee;
pub mod github;

pub use gitee::Gitee;
pub use github::Github;

use serde::Deserialize;

use crate::error::{CliError, Result};

/// The authenticated account.
#[derive(Debug, Clone, Deserialize)]
pub struct GitUser {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// An organization the account belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct GitOrg {
    pub login: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl GitOrg {
    /// Label shown when the operator picks an organization.
    pub fn label(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => &self.login,
        }
    }
}

/// A remote repository, as returned by lookup or creation.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Contract shared by the hosting providers.
pub trait GitServer {
    /// Provider display name ("Github" / "Gitee")
    fn name(&self) -> &'static str;

    /// Installs the access token used by subsequent API calls.
    fn set_token(&mut self, token: &str);

    fn get_user(&self) -> Result<GitUser>;

    fn get_orgs(&self) -> Result<Vec<GitOrg>>;

    /// Looks up a repository; a 404 resolves to `Ok(None)`.
    fn get_repo(&self, login: &str, name: &str) -> Result<Option<RepoInfo>>;

    /// Creates a repository under the personal account.
    fn create_repo(&self, name: &str) -> Result<RepoInfo>;

    /// Creates a repository under an organization.
    fn create_org_repo(&self, name: &str, org: &str) -> Result<RepoInfo>;

    /// SSH remote URL for a repository.
    fn get_remote(&self, login: &str, name: &str) -> String;

    fn get_token_url(&self) -> &'static str;

    fn get_token_help_url(&self) -> &'static str;

    fn get_ssh_keys_url(&self) -> &'static str;

    fn get_ssh_keys_help_url(&self) -> &'static str;
}

/// Instantiates the provider named by the cached server string.
pub fn create_git_server(kind: &str) -> Result<Box<dyn GitServer>> {
    match kind {
        "Github" => Ok(Box::new(Github::new())),
        "Gitee" => Ok(Box::new(Gitee::new())),
        other => Err(CliError::remote_state(format!(
            "unknown git server '{}' (expected Github or Gitee)",
            other
        ))),
    }
}

/// The provider choices offered on first use.
pub const SERVER_CHOICES: [&str; 2] = ["Github", "Gitee"];
