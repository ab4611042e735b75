use thiserror::Error;

/// Unified error type for cms-cli operations.
///
/// The taxonomy follows the failure policy of the publish workflow:
/// user-input errors are re-promptable, conflicts always require manual
/// resolution, and remote auth failures carry a remediation URL.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    UserInput(String),

    #[error("Conflict detected: {0}")]
    Conflict(String),

    #[error("Remote authentication failed: {message}\n  See: {help_url}")]
    RemoteAuth { message: String, help_url: String },

    #[error("Remote state error: {0}")]
    RemoteState(String),

    #[error("Cloud build failed ({code}): {message}")]
    Build { code: String, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results in cms-cli
pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    /// Create a user-input error with context
    pub fn user_input(msg: impl Into<String>) -> Self {
        CliError::UserInput(msg.into())
    }

    /// Create a conflict error with context
    pub fn conflict(msg: impl Into<String>) -> Self {
        CliError::Conflict(msg.into())
    }

    /// Create a remote-auth error carrying a remediation link
    pub fn remote_auth(msg: impl Into<String>, help_url: impl Into<String>) -> Self {
        CliError::RemoteAuth {
            message: msg.into(),
            help_url: help_url.into(),
        }
    }

    /// Create a remote-state error with context
    pub fn remote_state(msg: impl Into<String>) -> Self {
        CliError::RemoteState(msg.into())
    }

    /// Create a classified build error
    pub fn build(code: impl Into<String>, msg: impl Into<String>) -> Self {
        CliError::Build {
            code: code.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error with context
    pub fn timeout(msg: impl Into<String>) -> Self {
        CliError::Timeout(msg.into())
    }

    /// Create a manifest error with context
    pub fn manifest(msg: impl Into<String>) -> Self {
        CliError::Manifest(msg.into())
    }

    /// Whether the error is fatal or may be resolved by re-prompting the user
    pub fn is_reprompt(&self) -> bool {
        matches!(self, CliError::UserInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliError::conflict("merge conflict in src/main.rs");
        assert_eq!(
            err.to_string(),
            "Conflict detected: merge conflict in src/main.rs"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CliError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_remote_auth_carries_help_url() {
        let err = CliError::remote_auth("ssh key rejected", "https://github.com/settings/keys");
        let msg = err.to_string();
        assert!(msg.contains("ssh key rejected"));
        assert!(msg.contains("https://github.com/settings/keys"));
    }

    #[test]
    fn test_build_error_carries_code() {
        let err = CliError::build("install failed", "npm exited with 1");
        let msg = err.to_string();
        assert!(msg.contains("install failed"));
        assert!(msg.contains("npm exited with 1"));
    }

    #[test]
    fn test_only_user_input_is_repromptable() {
        assert!(CliError::user_input("bad name").is_reprompt());
        assert!(!CliError::conflict("x").is_reprompt());
        assert!(!CliError::timeout("x").is_reprompt());
        assert!(!CliError::remote_state("x").is_reprompt());
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (CliError::user_input("x"), "Invalid input"),
            (CliError::conflict("x"), "Conflict detected"),
            (CliError::remote_state("x"), "Remote state error"),
            (CliError::timeout("x"), "Timed out"),
            (CliError::manifest("x"), "Manifest error"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }
}
