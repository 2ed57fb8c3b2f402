//! Trait abstractions for GitHub API operations.
//!
//! This module defines the `GitHubApi` trait which abstracts GitHub API operations,
//! enabling dependency injection and testability.

use crate::{CreateComment, CreatePullRequest, IssueComment, PullRequest, Result, UpdatePullRequest};

/// Trait for the GitHub API operations the pull-request synchronizer needs.
///
/// All methods take `owner` and `repo` as parameters so the head and base
/// of a pull request can live in different repositories.
pub trait GitHubApi: Send + Sync {
    // === PR Operations ===

    /// List open PRs from `head_owner:head_branch` into `base`, lowest
    /// number first.
    fn find_open_prs(
        &self,
        owner: &str,
        repo: &str,
        head_owner: &str,
        head_branch: &str,
        base: &str,
    ) -> impl std::future::Future<Output = Result<Vec<PullRequest>>> + Send;

    /// Create a pull request.
    fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        pr: CreatePullRequest,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;

    /// Update (or close) a pull request.
    fn update_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: UpdatePullRequest,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;

    // === Comment Operations ===

    /// Create a comment on a pull request.
    fn create_pr_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        comment: CreateComment,
    ) -> impl std::future::Future<Output = Result<IssueComment>> + Send;
}
