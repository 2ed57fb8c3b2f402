//! # rebasebot-github
//!
//! GitHub API integration for rebasebot: finding, creating, updating and
//! closing the tracked pull request, commenting on it, and minting GitHub
//! App installation tokens.
//!
//! # Security
//!
//! Authentication tokens are stored using `SecretString` which automatically
//! zeroizes memory when dropped, reducing credential exposure in memory dumps.

mod app;
mod auth;
mod client;
mod error;
mod traits;
mod types;

pub use app::GitHubApp;
pub use auth::Auth;
pub use client::GitHubClient;
pub use error::{Error, Result};
// Re-export SecretString for constructing Auth::Token
pub use secrecy::SecretString;
pub use traits::GitHubApi;
pub use types::{
    CreateComment, CreatePullRequest, IssueComment, PullRequest, PullRequestState,
    UpdatePullRequest,
};
