//! Run controller: one end-to-end rebase run.
//!
//! A run moves through fixed stages:
//! resolve → sync-workspace → rebase → hooks → push → sync-pr.
//! Cancellation is only observed between stages. Failures are classified
//! and either retried (network, rejected push), recovered (corrupted
//! workspace is discarded and re-cloned once) or returned.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use rebasebot_core::config::RetryConfig;
use rebasebot_core::model::short_or_dash;
use rebasebot_core::{
    AttemptStatus, CANDIDATE_BRANCH, ConflictResolver, ErrorKind, ForgeState, HookConfig, HookRunner,
    PullRequestPlanner, RebaseAttempt, RebaseEngine, RunReport, Targets,
};
use rebasebot_git::{Credentials, GitOps, Identity, Oid, PushMode, RemoteSpec, Workspace, short_id};
use rebasebot_github::GitHubApi;
use tracing::{info, warn};

use super::pull_request::PullRequestSync;

pub const SOURCE_REMOTE: &str = "source";
pub const DEST_REMOTE: &str = "dest";
pub const REBASE_REMOTE: &str = "rebase";

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    SyncWorkspace,
    Rebase,
    Hooks,
    Push,
    SyncPullRequest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::SyncWorkspace => "sync-workspace",
            Self::Rebase => "rebase",
            Self::Hooks => "hooks",
            Self::Push => "push",
            Self::SyncPullRequest => "sync-pr",
        })
    }
}

/// Opens (and on corruption discards) the working copy.
pub trait WorkspaceProvider {
    type Git: GitOps;

    /// Open the working copy, creating it if needed.
    fn open(&self) -> rebasebot_git::Result<Self::Git>;

    /// Remove the working copy so the next `open` starts from scratch.
    fn discard(&self) -> rebasebot_git::Result<()>;
}

/// The on-disk working copy with the `source`, `dest` and `rebase` remotes.
pub struct LocalWorkspace {
    path: PathBuf,
    remotes: Vec<RemoteSpec>,
}

impl LocalWorkspace {
    /// Remotes for `targets`; GitHub repositories are cloned from `web_url`.
    /// The source is always fetched anonymously.
    pub fn new(
        path: PathBuf,
        targets: &Targets,
        web_url: &str,
        dest_credentials: Option<Credentials>,
        rebase_credentials: Option<Credentials>,
    ) -> Self {
        let remotes = vec![
            RemoteSpec::new(SOURCE_REMOTE, targets.source.url.clone(), None),
            RemoteSpec::new(DEST_REMOTE, targets.dest.clone_url(web_url), dest_credentials),
            RemoteSpec::new(
                REBASE_REMOTE,
                targets.rebase.clone_url(web_url),
                rebase_credentials,
            ),
        ];
        Self { path, remotes }
    }
}

impl WorkspaceProvider for LocalWorkspace {
    type Git = Workspace;

    fn open(&self) -> rebasebot_git::Result<Workspace> {
        Workspace::ensure_clone(&self.path, self.remotes.clone())
    }

    fn discard(&self) -> rebasebot_git::Result<()> {
        Workspace::discard(&self.path)
    }
}

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub push_on_conflict: bool,
    pub committer: Identity,
    pub retry: RetryConfig,
}

/// Classify a failure by the first typed error in its chain.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<rebasebot_core::Error>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<rebasebot_git::Error>() {
            return ErrorKind::of_git(e);
        }
        if let Some(e) = cause.downcast_ref::<rebasebot_github::Error>() {
            return if e.is_authentication() {
                ErrorKind::Authentication
            } else if e.is_transient() {
                ErrorKind::Network
            } else {
                ErrorKind::Other
            };
        }
    }
    ErrorKind::Other
}

/// Drives one run through every stage.
pub struct RunController<'a, W: WorkspaceProvider, H: GitHubApi> {
    workspace: &'a W,
    github: Option<&'a H>,
    targets: &'a Targets,
    resolver: ConflictResolver,
    hooks: Vec<HookConfig>,
    planner: PullRequestPlanner,
    options: RunOptions,
    cancel: Arc<AtomicBool>,
}

#[allow(clippy::future_not_send)] // git2 handles are not Sync; runs stay on one thread
impl<'a, W: WorkspaceProvider, H: GitHubApi> RunController<'a, W, H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace: &'a W,
        github: Option<&'a H>,
        targets: &'a Targets,
        resolver: ConflictResolver,
        hooks: Vec<HookConfig>,
        planner: PullRequestPlanner,
        options: RunOptions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            workspace,
            github,
            targets,
            resolver,
            hooks,
            planner,
            options,
            cancel,
        }
    }

    /// Run until a report is produced or retries are exhausted.
    ///
    /// # Errors
    /// Returns the last failure once it is not retryable or the retry budget
    /// for its kind is spent.
    pub async fn run(&self) -> Result<RunReport> {
        let retry = &self.options.retry;
        let mut network_failures = 0u32;
        let mut push_rejections = 0u32;
        let mut recloned = false;

        loop {
            self.checkpoint(Stage::Resolve)?;
            let err = match self.attempt().await {
                Ok(report) => return Ok(report),
                Err(err) => err,
            };

            let kind = classify(&err);
            match kind {
                ErrorKind::Network if network_failures + 1 < retry.max_attempts => {
                    network_failures += 1;
                    let delay = backoff(retry.initial_backoff_ms, network_failures);
                    warn!(error = %err, attempt = network_failures, ?delay, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                ErrorKind::PushRejected if push_rejections + 1 < retry.push_rejected_attempts => {
                    push_rejections += 1;
                    warn!(error = %err, attempt = push_rejections, "push rejected, refetching");
                }
                ErrorKind::WorkspaceCorrupted if !recloned => {
                    recloned = true;
                    warn!(error = %err, "workspace corrupted, re-cloning");
                    self.workspace.discard()?;
                }
                _ => return Err(err),
            }
        }
    }

    fn checkpoint(&self, stage: Stage) -> rebasebot_core::Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            warn!(%stage, "cancelled before stage");
            return Err(rebasebot_core::Error::Cancelled);
        }
        info!(%stage, "entering stage");
        Ok(())
    }

    async fn attempt(&self) -> Result<RunReport> {
        let t = self.targets;

        self.checkpoint(Stage::SyncWorkspace)?;
        let git = self.workspace.open()?;
        let source_commit = git.fetch(SOURCE_REMOTE, &t.source.reference)?;
        let dest_commit = git.fetch(DEST_REMOTE, &t.dest.branch)?;
        let rebase_head = git.fetch_optional(REBASE_REMOTE, &t.rebase.branch)?;
        info!(
            source = %short_id(source_commit),
            dest = %short_id(dest_commit),
            rebase = %short_or_dash(rebase_head),
            "refs resolved"
        );

        self.checkpoint(Stage::Rebase)?;
        let engine = RebaseEngine::new(&git, &self.resolver, self.options.committer.clone());
        let mut attempt = engine.rebase(source_commit, dest_commit)?;

        if attempt.status == AttemptStatus::Succeeded && !attempt.noop && !self.hooks.is_empty() {
            self.checkpoint(Stage::Hooks)?;
            let tip = attempt
                .tip
                .ok_or_else(|| anyhow!("succeeded attempt has no tip"))?;
            let runner = HookRunner::new(&git, self.options.committer.clone());
            let (tip, added) = runner.run(&self.hooks, tip, source_commit)?;
            attempt.tip = Some(tip);
            attempt.hook_commits = added;
        }

        self.checkpoint(Stage::Push)?;
        let sync = if self.options.dry_run {
            None
        } else {
            let github = self.github.ok_or_else(|| {
                rebasebot_core::Error::Configuration("a GitHub token is required".into())
            })?;
            Some(PullRequestSync::new(github, &t.dest, &t.rebase))
        };
        let tracked = match &sync {
            Some(sync) => sync.lookup().await?,
            None => None,
        };
        let has_open_pr = tracked.as_ref().is_some_and(|pr| pr.state == ForgeState::Open);
        let (head, pushed) = self.push(&git, &attempt, rebase_head, has_open_pr)?;

        let mut report = RunReport::from_attempt(t.source.to_string(), t.dest.to_string(), &attempt);
        report.dry_run = self.options.dry_run;
        report.pushed = pushed;

        let Some(sync) = sync else {
            info!("dry run, leaving the pull request alone");
            return Ok(report);
        };

        self.checkpoint(Stage::SyncPullRequest)?;
        let outcome = sync
            .sync(&self.planner, tracked.as_ref(), &attempt, head)
            .await?;
        report.pull_request_action = outcome.action;
        report.pull_request_id = outcome.number;
        report.pull_request_url = outcome.url;

        Ok(report)
    }

    /// Push the candidate when policy allows. Returns the head now on the
    /// rebase branch (when it matches the candidate) and whether a push
    /// happened.
    ///
    /// A conflicted attempt with no open pull request is always pushed, so
    /// the conflict can be surfaced in a new one. Without progress that
    /// pushes the source commit itself.
    fn push(
        &self,
        git: &W::Git,
        attempt: &RebaseAttempt,
        rebase_head: Option<Oid>,
        has_open_pr: bool,
    ) -> Result<(Option<Oid>, bool)> {
        let Some(tip) = attempt.tip.filter(|_| !attempt.noop) else {
            return Ok((None, false));
        };

        let wanted = match attempt.status {
            AttemptStatus::Succeeded => true,
            AttemptStatus::Conflicted => {
                !has_open_pr || (self.options.push_on_conflict && attempt.has_progress())
            }
            AttemptStatus::Pending | AttemptStatus::Failed => false,
        };
        if !wanted {
            info!(status = %attempt.status, "not pushing");
            return Ok((None, false));
        }
        if rebase_head == Some(tip) {
            info!(tip = %short_id(tip), "rebase branch already up to date");
            return Ok((Some(tip), false));
        }
        if self.options.dry_run {
            info!(tip = %short_id(tip), "dry run, not pushing");
            return Ok((None, false));
        }

        git.reset_branch(CANDIDATE_BRANCH, tip)?;
        git.push(
            REBASE_REMOTE,
            CANDIDATE_BRANCH,
            &self.targets.rebase.branch,
            PushMode::ForceWithLease(rebase_head),
        )?;
        info!(tip = %short_id(tip), branch = %self.targets.rebase, "pushed candidate");
        Ok((Some(tip), true))
    }
}

/// `initial * 2^(n-1)`, capped at 2^10 times the initial delay.
fn backoff(initial_ms: u64, failures: u32) -> Duration {
    let factor = 1u64 << failures.saturating_sub(1).min(10);
    Duration::from_millis(initial_ms.saturating_mul(factor))
}
