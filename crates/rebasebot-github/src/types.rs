//! GitHub API types.

use serde::{Deserialize, Serialize};

/// A pull request as rebasebot sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: PullRequestState,
    /// Branch name only; the owner is implied by the lookup.
    pub head_branch: String,
    /// Commit the head branch pointed at when GitHub last saw it.
    pub head_sha: String,
    pub base_branch: String,
    pub html_url: String,
}

/// Lifecycle state. GitHub reports merged pull requests as closed with a
/// merge time; the client folds that into [`PullRequestState::Merged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

/// Body of `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    /// `owner:branch` when the head lives in another repository.
    pub head: String,
    pub base: String,
    pub draft: bool,
    /// Whether base-repository maintainers may push to the head branch.
    pub maintainer_can_modify: bool,
}

/// Body of `PATCH /repos/{owner}/{repo}/pulls/{number}`. Unset fields are
/// left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdatePullRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Only `open` and `closed` are accepted by GitHub.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PullRequestState>,
}

/// A comment on a pull request's conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateComment {
    pub body: String,
}
