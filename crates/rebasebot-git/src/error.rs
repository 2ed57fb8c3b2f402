//! Error types for rebasebot-git.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not inside a git repository.
    #[error("not a git repository")]
    NotARepository,

    /// Reference could not be resolved after fetching.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Remote not found.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Transport failure while talking to a remote.
    #[error("network error talking to {remote}: {message}")]
    Network { remote: String, message: String },

    /// The remote refused credentials.
    #[error("authentication rejected by {remote}: {message}")]
    Authentication { remote: String, message: String },

    /// The remote branch moved since it was last fetched.
    #[error("push to {branch} rejected: {detail}")]
    PushRejected { branch: String, detail: String },

    /// The local working copy is in a state it should never be in.
    #[error("workspace corrupted: {0}")]
    WorkspaceCorrupted(String),

    /// A replayed tree was requested while conflicts remain unresolved.
    #[error("unresolved conflicts in: {0:?}")]
    UnresolvedConflicts(Vec<String>),

    /// An external command run inside the workspace failed.
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}

impl Error {
    /// Classify a git2 error raised while talking to `remote`.
    ///
    /// Transport-level failures become [`Error::Network`], credential
    /// failures become [`Error::Authentication`], everything else is kept.
    #[must_use]
    pub fn from_remote(remote: &str, err: git2::Error) -> Self {
        match (err.code(), err.class()) {
            (git2::ErrorCode::Auth, _) | (_, git2::ErrorClass::Ssh) => Self::Authentication {
                remote: remote.to_string(),
                message: err.message().to_string(),
            },
            (_, git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Os) => {
                Self::Network {
                    remote: remote.to_string(),
                    message: err.message().to_string(),
                }
            }
            _ => Self::Git2(err),
        }
    }

    /// Whether retrying the whole operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::PushRejected { .. })
    }
}
