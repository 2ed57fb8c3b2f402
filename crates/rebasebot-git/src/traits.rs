//! Trait abstractions for git operations.
//!
//! This module defines the `GitOps` trait which abstracts git operations,
//! enabling dependency injection and testability.

use std::path::Path;

use git2::Oid;

use crate::{CommitInfo, Identity, PathChoice, PushMode, ReplayOutcome, Result};

/// Trait for the git operations a rebase run needs.
///
/// Note: Unlike `GitHubApi`, git operations are synchronous since
/// git2 is a synchronous library.
#[allow(clippy::missing_errors_doc)]
pub trait GitOps {
    // === Repository Info ===

    /// Get the working directory path.
    fn workdir(&self) -> Option<&Path>;

    // === Remotes ===

    /// Fetch a branch, tag or commit id from `remote` and resolve it.
    fn fetch(&self, remote: &str, reference: &str) -> Result<Oid>;

    /// Fetch a branch that may not exist on `remote`.
    fn fetch_optional(&self, remote: &str, branch: &str) -> Result<Option<Oid>>;

    /// Current value of a branch on `remote` without fetching it.
    fn remote_head(&self, remote: &str, branch: &str) -> Result<Option<Oid>>;

    /// Push `local_branch` to `remote_branch` on `remote`.
    fn push(&self, remote: &str, local_branch: &str, remote_branch: &str, mode: PushMode)
    -> Result<()>;

    // === History ===

    /// Find the merge base of two commits.
    fn merge_base(&self, one: Oid, two: Oid) -> Result<Oid>;

    /// Whether `ancestor` is reachable from `descendant`.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    /// Commits reachable from `to` but not `from`, parents first.
    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>>;

    /// Read a commit's metadata.
    fn commit_info(&self, commit: Oid) -> Result<CommitInfo>;

    /// Tree id of a commit.
    fn tree_id(&self, commit: Oid) -> Result<Oid>;

    // === Replay ===

    /// Replay `commit` onto `onto` in memory.
    fn replay_tree(&self, commit: Oid, onto: Oid, choices: &[PathChoice]) -> Result<ReplayOutcome>;

    /// Write the replayed commit for `original` with `tree` on `parent`.
    fn commit_replayed(
        &self,
        original: Oid,
        tree: Oid,
        parent: Oid,
        committer: &Identity,
    ) -> Result<Oid>;

    // === Branches and working tree ===

    /// Point a local branch at `target`.
    fn reset_branch(&self, branch: &str, target: Oid) -> Result<()>;

    /// Reset a local branch to `target` and check it out.
    fn checkout_branch_at(&self, branch: &str, target: Oid) -> Result<()>;

    /// Overwrite working-tree paths with their content at `from`.
    fn restore_paths(&self, from: Oid, paths: &[String]) -> Result<Vec<String>>;

    /// Commit every working-tree change on HEAD; `None` if nothing changed.
    fn commit_all(&self, message: &str, identity: &Identity, when: i64) -> Result<Option<Oid>>;
}

impl GitOps for crate::Workspace {
    fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    fn fetch(&self, remote: &str, reference: &str) -> Result<Oid> {
        self.repo
            .fetch_ref(remote, reference, self.credentials_for(remote))
    }

    fn fetch_optional(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        self.repo
            .fetch_optional(remote, branch, self.credentials_for(remote))
    }

    fn remote_head(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        self.repo
            .remote_head(remote, branch, self.credentials_for(remote))
    }

    fn push(
        &self,
        remote: &str,
        local_branch: &str,
        remote_branch: &str,
        mode: PushMode,
    ) -> Result<()> {
        self.repo.push(
            remote,
            local_branch,
            remote_branch,
            mode,
            self.credentials_for(remote),
        )
    }

    fn merge_base(&self, one: Oid, two: Oid) -> Result<Oid> {
        self.repo.merge_base(one, two)
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        self.repo.is_ancestor(ancestor, descendant)
    }

    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        self.repo.commits_between(from, to)
    }

    fn commit_info(&self, commit: Oid) -> Result<CommitInfo> {
        self.repo.commit_info(commit)
    }

    fn tree_id(&self, commit: Oid) -> Result<Oid> {
        self.repo.tree_id(commit)
    }

    fn replay_tree(&self, commit: Oid, onto: Oid, choices: &[PathChoice]) -> Result<ReplayOutcome> {
        self.repo.replay_tree(commit, onto, choices)
    }

    fn commit_replayed(
        &self,
        original: Oid,
        tree: Oid,
        parent: Oid,
        committer: &Identity,
    ) -> Result<Oid> {
        self.repo.commit_replayed(original, tree, parent, committer)
    }

    fn reset_branch(&self, branch: &str, target: Oid) -> Result<()> {
        self.repo.reset_branch(branch, target)
    }

    fn checkout_branch_at(&self, branch: &str, target: Oid) -> Result<()> {
        self.repo.checkout_branch_at(branch, target)
    }

    fn restore_paths(&self, from: Oid, paths: &[String]) -> Result<Vec<String>> {
        self.repo.restore_paths(from, paths)
    }

    fn commit_all(&self, message: &str, identity: &Identity, when: i64) -> Result<Option<Oid>> {
        self.repo.commit_all(message, identity, when)
    }
}
