//! Error types for rebasebot-github.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub API operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication failed or token missing.
    #[error("GitHub authentication failed - check the configured token")]
    AuthenticationFailed,

    /// Token not found.
    #[error("no GitHub token found: {0}")]
    NoToken(String),

    /// The GitHub App private key is unreadable or unusable.
    #[error("invalid GitHub App key: {0}")]
    AppKey(String),

    /// The GitHub App is not installed on a repository it needs.
    #[error("GitHub App {app_id} is not installed on {repo}, or the repository does not exist")]
    AppNotInstalled { app_id: u64, repo: String },

    /// API rate limit exceeded.
    #[error("GitHub API rate limit exceeded - wait and try again")]
    RateLimited,

    /// API error with status code.
    #[error("GitHub API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("failed to parse GitHub response: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error (e.g., reading a token file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the request may succeed if retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Network(_) => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure is due to credentials.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::NoToken(_)
                | Self::AppKey(_)
                | Self::AppNotInstalled { .. }
        )
    }
}
