//! Run data model: rebase attempts, conflict reports and the run report.

use std::fmt;

use chrono::{DateTime, Utc};
use rebasebot_git::{CommitInfo, ConflictedPath, Oid, short_id};
use serde::{Deserialize, Serialize};

use crate::config::StrategyKind;

/// A commit as read from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub id: String,
    pub parent_ids: Vec<String>,
    /// `Name <email>`.
    pub author: String,
    pub message: String,
    pub changed_paths: Vec<String>,
}

impl Commit {
    /// First line of the message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Abbreviated id.
    #[must_use]
    pub fn short_id(&self) -> &str {
        abbrev(&self.id)
    }
}

impl From<&CommitInfo> for Commit {
    fn from(info: &CommitInfo) -> Self {
        Self {
            id: info.id.to_string(),
            parent_ids: info.parent_ids.iter().map(ToString::to_string).collect(),
            author: format!("{} <{}>", info.author.name, info.author.email),
            message: info.message.clone(),
            changed_paths: info.changed_paths.clone(),
        }
    }
}

/// Outcome of a rebase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Succeeded,
    Conflicted,
    Failed,
}

impl AttemptStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Conflicted => "conflicted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conflicting path the resolver could not handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub commit_id: String,
    pub commit_summary: String,
    pub path: String,
    /// Conflict-marked content, or a description for delete conflicts.
    pub conflict_markers_or_diff: String,
}

impl ConflictReport {
    #[must_use]
    pub fn new(commit: &Commit, conflict: &ConflictedPath) -> Self {
        Self {
            commit_id: commit.id.clone(),
            commit_summary: commit.summary().to_string(),
            path: conflict.path.clone(),
            conflict_markers_or_diff: conflict.markers.clone(),
        }
    }
}

/// An automated conflict resolution, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub commit_id: String,
    pub path: String,
    pub strategy: StrategyKind,
    pub rationale: String,
}

/// Why a destination-only commit was not replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Merge commits are flattened; their changes arrive through their parents.
    MergeCommit,
    /// Replaying the commit changed nothing on top of the new base.
    AlreadyApplied,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MergeCommit => "merge commit",
            Self::AlreadyApplied => "already applied upstream",
        })
    }
}

/// A destination-only commit left out of the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCommit {
    pub commit_id: String,
    pub summary: String,
    pub reason: SkipReason,
}

/// One destination-only commit and the commit that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedCommit {
    pub original: Oid,
    pub replayed: Oid,
    /// The original was reused unchanged because its parent already
    /// matched the replay base.
    pub reused: bool,
}

/// A single rebase attempt, recomputed every run.
#[derive(Debug, Clone)]
pub struct RebaseAttempt {
    pub source_commit: Oid,
    pub destination_commit: Oid,
    pub merge_base_commit: Oid,
    /// Destination-only commits, parents first, exactly as observed.
    pub replayed_commits: Vec<Commit>,
    pub status: AttemptStatus,
    /// Trivially succeeded without replay.
    pub noop: bool,
    /// Candidate tip: the full replay, or the partial one when conflicted.
    pub tip: Option<Oid>,
    pub applied: Vec<AppliedCommit>,
    pub skipped: Vec<SkippedCommit>,
    pub resolutions: Vec<Resolution>,
    pub conflicts: Vec<ConflictReport>,
    /// Commits added on top of the replay by post-rebase hooks.
    pub hook_commits: Vec<Oid>,
}

impl RebaseAttempt {
    /// A fresh attempt in the `pending` state.
    #[must_use]
    pub const fn new(source_commit: Oid, destination_commit: Oid, merge_base_commit: Oid) -> Self {
        Self {
            source_commit,
            destination_commit,
            merge_base_commit,
            replayed_commits: Vec::new(),
            status: AttemptStatus::Pending,
            noop: false,
            tip: None,
            applied: Vec::new(),
            skipped: Vec::new(),
            resolutions: Vec::new(),
            conflicts: Vec::new(),
            hook_commits: Vec::new(),
        }
    }

    /// Whether any commit was replayed before the attempt stopped.
    #[must_use]
    pub fn has_progress(&self) -> bool {
        self.tip.is_some_and(|tip| tip != self.source_commit)
    }
}

/// What happened to the tracked pull request this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestAction {
    None,
    Created,
    Updated,
    Unchanged,
    Closed,
}

/// Structured result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: AttemptStatus,
    pub noop: bool,
    pub dry_run: bool,
    pub source: String,
    pub destination: String,
    pub source_commit: Option<String>,
    pub destination_commit: Option<String>,
    pub merge_base_commit: Option<String>,
    pub tip: Option<String>,
    pub replayed_count: usize,
    pub conflict_count: usize,
    pub conflicts: Vec<ConflictReport>,
    pub resolutions: Vec<Resolution>,
    pub skipped: Vec<SkippedCommit>,
    pub pushed: bool,
    pub pull_request_id: Option<u64>,
    pub pull_request_url: Option<String>,
    pub pull_request_action: PullRequestAction,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Report for a run that produced an attempt.
    #[must_use]
    pub fn from_attempt(source: String, destination: String, attempt: &RebaseAttempt) -> Self {
        Self {
            status: attempt.status,
            noop: attempt.noop,
            dry_run: false,
            source,
            destination,
            source_commit: Some(attempt.source_commit.to_string()),
            destination_commit: Some(attempt.destination_commit.to_string()),
            merge_base_commit: Some(attempt.merge_base_commit.to_string()),
            tip: attempt.tip.map(|t| t.to_string()),
            replayed_count: attempt.applied.len(),
            conflict_count: attempt.conflicts.len(),
            conflicts: attempt.conflicts.clone(),
            resolutions: attempt.resolutions.clone(),
            skipped: attempt.skipped.clone(),
            pushed: false,
            pull_request_id: None,
            pull_request_url: None,
            pull_request_action: PullRequestAction::None,
            error: None,
            finished_at: Utc::now(),
        }
    }

    /// Report for a run that failed before an attempt existed.
    #[must_use]
    pub fn failed(source: String, destination: String, error: String) -> Self {
        Self {
            status: AttemptStatus::Failed,
            noop: false,
            dry_run: false,
            source,
            destination,
            source_commit: None,
            destination_commit: None,
            merge_base_commit: None,
            tip: None,
            replayed_count: 0,
            conflict_count: 0,
            conflicts: Vec::new(),
            resolutions: Vec::new(),
            skipped: Vec::new(),
            pushed: false,
            pull_request_id: None,
            pull_request_url: None,
            pull_request_action: PullRequestAction::None,
            error: Some(error),
            finished_at: Utc::now(),
        }
    }

    /// One-line human summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let pr = self.pull_request_url.as_deref().unwrap_or("");
        if let Some(err) = &self.error {
            return format!(
                "I failed to rebase {} into {}: {err}",
                self.source, self.destination
            );
        }
        if self.dry_run {
            return format!(
                "Dry run: rebase of {} into {} {}; no changes were pushed.",
                self.source, self.destination, self.status
            );
        }
        match (self.status, self.pull_request_action) {
            (AttemptStatus::Conflicted, _) => {
                let mut msg = format!(
                    "Manual intervention is needed to rebase {} into {}: {} unresolved conflict(s).",
                    self.source, self.destination, self.conflict_count
                );
                if !pr.is_empty() {
                    msg.push_str(&format!(" See {pr}"));
                }
                msg
            }
            (_, PullRequestAction::Created) => format!("I created a new PR: {pr}"),
            (_, PullRequestAction::Updated) => format!("I updated existing PR: {pr}"),
            (_, PullRequestAction::Unchanged) => {
                format!("PR {pr} already contains all latest changes.")
            }
            (_, PullRequestAction::Closed) => format!(
                "Destination repo {} already contains all latest changes. I closed {pr}.",
                self.destination
            ),
            _ => format!(
                "Destination repo {} already contains all latest changes.",
                self.destination
            ),
        }
    }
}

/// First 12 characters of a textual commit id, or all of it when shorter.
///
/// Ids read back from pull request bodies may have been edited by hand, so
/// this never splits a character.
#[must_use]
pub fn abbrev(id: &str) -> &str {
    id.char_indices().nth(12).map_or(id, |(end, _)| &id[..end])
}

/// Short id of an optional commit, or `-`.
#[must_use]
pub fn short_or_dash(id: Option<Oid>) -> String {
    id.map_or_else(|| "-".to_string(), short_id)
}
