use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Directory under the config root holding the cached git-hosting choices.
const GIT_ROOT_DIR: &str = ".git";

const GIT_SERVER_FILE: &str = ".git_server";
const GIT_TOKEN_FILE: &str = ".git_token";
const GIT_OWN_FILE: &str = ".git_own";
const GIT_LOGIN_FILE: &str = ".git_login";

/// Default hidden directory under the user's home.
const DEFAULT_CLI_HOME: &str = ".cms-cli";

const DEFAULT_TEMPLATE_SERVER: &str = "http://127.0.0.1:7001";
const DEFAULT_BUILD_SERVER: &str = "ws://127.0.0.1:7001";

/// Process-wide configuration, constructed once in `main` and passed by
/// reference to every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for all locally persisted state (`~/.cms-cli`).
    home: PathBuf,
    /// HTTP endpoint serving the template list.
    pub template_server: String,
    /// WebSocket endpoint of the cloud-build service.
    pub build_server: String,
    /// Emit extra progress detail.
    pub verbose: bool,
}

/// One cached value, stored as a single plain-text file under the config root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedValue {
    /// Remembered git-hosting choice ("Github" / "Gitee")
    Server,
    /// Access token for the hosting API
    Token,
    /// Ownership mode ("user" / "org")
    Owner,
    /// Remote login name
    Login,
}

impl CachedValue {
    fn file_name(self) -> &'static str {
        match self {
            CachedValue::Server => GIT_SERVER_FILE,
            CachedValue::Token => GIT_TOKEN_FILE,
            CachedValue::Owner => GIT_OWN_FILE,
            CachedValue::Login => GIT_LOGIN_FILE,
        }
    }
}

/// Whether a remote repository belongs to a personal account or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerMode {
    User,
    Org,
}

impl OwnerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerMode::User => "user",
            OwnerMode::Org => "org",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(OwnerMode::User),
            "org" => Some(OwnerMode::Org),
            _ => None,
        }
    }
}

impl Config {
    /// Builds a configuration rooted at `~/.cms-cli`, creating the directory
    /// if it does not exist.
    pub fn new(verbose: bool) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::remote_state("Cannot resolve the user home directory"))?
            .join(DEFAULT_CLI_HOME);
        Self::with_home(home, verbose)
    }

    /// Builds a configuration rooted at an explicit directory. Used by tests
    /// and by callers that relocate the cache.
    pub fn with_home(home: impl Into<PathBuf>, verbose: bool) -> Result<Self> {
        let home = home.into();
        fs::create_dir_all(&home)?;
        Ok(Config {
            home,
            template_server: DEFAULT_TEMPLATE_SERVER.to_string(),
            build_server: DEFAULT_BUILD_SERVER.to_string(),
            verbose,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Directory where downloaded template packages are cached.
    pub fn template_cache_dir(&self) -> PathBuf {
        self.home.join("template")
    }

    fn cached_value_path(&self, value: CachedValue) -> Result<PathBuf> {
        let root = self.home.join(GIT_ROOT_DIR);
        fs::create_dir_all(&root)?;
        Ok(root.join(value.file_name()))
    }

    /// Reads a cached value. Missing files and empty files both read as `None`.
    pub fn read_cached(&self, value: CachedValue) -> Result<Option<String>> {
        let path = self.cached_value_path(value)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    /// Writes a cached value, replacing any previous content.
    pub fn write_cached(&self, value: CachedValue, content: &str) -> Result<()> {
        let path = self.cached_value_path(value)?;
        fs::write(&path, content)?;
        Ok(())
    }
}
