//! Error types for rebasebot-core.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rebasebot-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration is incomplete or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A repository or branch reference could not be parsed.
    #[error("invalid reference '{value}': {reason}")]
    InvalidRef {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A post-rebase hook failed.
    #[error("hook '{name}' failed: {message}")]
    Hook { name: String, message: String },

    /// The run was interrupted between stages.
    #[error("run cancelled")]
    Cancelled,

    /// Configuration file parsing error.
    #[error("failed to parse {file}: {message}")]
    ConfigParse { file: PathBuf, message: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Git operation error.
    #[error("git error: {0}")]
    Git(#[from] rebasebot_git::Error),
}

/// How the run controller reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration; fail fast.
    Configuration,
    /// Credentials rejected; fail fast.
    Authentication,
    /// Transport failure; retry with backoff.
    Network,
    /// Local working copy unusable; discard and re-clone.
    WorkspaceCorrupted,
    /// Remote branch moved; refetch and retry.
    PushRejected,
    /// Interrupted by a signal.
    Cancelled,
    /// Anything else; fail the run.
    Other,
}

impl ErrorKind {
    /// Classify a git error.
    #[must_use]
    pub const fn of_git(err: &rebasebot_git::Error) -> Self {
        use rebasebot_git::Error as G;
        match err {
            G::Network { .. } => Self::Network,
            G::Authentication { .. } => Self::Authentication,
            G::PushRejected { .. } => Self::PushRejected,
            G::WorkspaceCorrupted(_) | G::NotARepository => Self::WorkspaceCorrupted,
            G::RefNotFound(_) | G::RemoteNotFound(_) => Self::Configuration,
            _ => Self::Other,
        }
    }

    /// Whether the controller may try the run again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::WorkspaceCorrupted | Self::PushRejected
        )
    }
}

impl Error {
    /// Classify this error for the run controller.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::InvalidRef { .. } | Self::ConfigParse { .. } => {
                ErrorKind::Configuration
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Git(err) => ErrorKind::of_git(err),
            Self::Hook { .. } | Self::Io(_) => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_errors_classified() {
        let err = Error::Git(rebasebot_git::Error::PushRejected {
            branch: "rebasebot/main".into(),
            detail: "stale".into(),
        });
        assert_eq!(err.kind(), ErrorKind::PushRejected);

        let err = Error::Git(rebasebot_git::Error::WorkspaceCorrupted("x".into()));
        assert_eq!(err.kind(), ErrorKind::WorkspaceCorrupted);

        let err = Error::Git(rebasebot_git::Error::RefNotFound("source:nope".into()));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::PushRejected.is_retryable());
        assert!(!ErrorKind::Configuration.is_retryable());
        assert!(!ErrorKind::Authentication.is_retryable());
        assert!(!Error::Cancelled.kind().is_retryable());
    }
}
