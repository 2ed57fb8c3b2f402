//! # rebasebot-core
//!
//! Core logic for rebasebot: configuration and reference parsing, the rebase
//! engine that replays downstream-only commits onto a new upstream commit,
//! the conflict resolver, post-rebase hooks and the pull-request lifecycle.
//!
//! Nothing here talks to a forge. Git access goes through
//! [`rebasebot_git::GitOps`] so the engine can run against any workspace.

pub mod config;
mod error;
pub mod hooks;
pub mod model;
pub mod pull_request;
pub mod rebase;
mod refs;
pub mod resolver;

pub use config::{Config, HookConfig, StrategyConfig, StrategyKind, Targets};
pub use error::{Error, ErrorKind, Result};
pub use hooks::{CANDIDATE_BRANCH, HookRunner};
pub use model::{
    AttemptStatus, Commit, ConflictReport, PullRequestAction, RebaseAttempt, Resolution,
    RunReport, SkipReason, SkippedCommit,
};
pub use pull_request::{
    ForgeState, Marker, PrAction, PrState, PullRequestPlanner, TrackedPullRequest,
};
pub use rebase::RebaseEngine;
pub use refs::{GitHubRef, RefName, SourceRef, pair_key};
pub use resolver::{ConflictResolver, Strategy};
