//! Setup shared by `run` and `watch`.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use rebasebot_core::model::abbrev;
use rebasebot_core::{
    AttemptStatus, Config, ConflictResolver, ErrorKind, PullRequestAction, PullRequestPlanner,
    RunReport, Targets,
};
use rebasebot_github::{Auth, GitHubClient};
use tracing::{debug, error, info, warn};

use super::RunArgs;
use crate::lock::WorkspaceLock;
use crate::output;
use crate::services::{
    GitHubAuth, LocalWorkspace, RunController, RunOptions, SlackNotifier, classify,
};

/// Everything a run needs, built once per process.
///
/// Holds the workspace lock for its whole lifetime.
pub struct Session {
    pub config: Config,
    pub targets: Targets,
    auth: GitHubAuth,
    notifier: Option<SlackNotifier>,
    /// Status of the last announced run, so `watch` only speaks on change.
    last_status: Cell<Option<AttemptStatus>>,
    _lock: WorkspaceLock,
}

impl Session {
    /// Load configuration, take the lock and load credentials.
    ///
    /// # Errors
    /// Returns error on invalid configuration, a held lock, an unusable app
    /// key, or missing credentials outside dry-run mode.
    pub fn open(args: &RunArgs) -> Result<Self> {
        let config = args.load_config().context("Invalid configuration")?;
        let targets = config.targets().context("Invalid configuration")?;

        let lock = WorkspaceLock::acquire(&config.bot.working_dir)?;
        debug!(lock = %lock.path().display(), "holding workspace lock");

        let auth = GitHubAuth::from_config(&config.github, config.bot.dry_run)?;

        let notifier = config
            .notify
            .slack_webhook_file
            .as_deref()
            .map(SlackNotifier::from_file)
            .transpose()?;

        Ok(Self {
            config,
            targets,
            auth,
            notifier,
            last_status: Cell::new(None),
            _lock: lock,
        })
    }

    /// Run the pipeline once. Failures become a `failed` report; a run
    /// stopped by a signal returns `None`.
    #[allow(clippy::future_not_send)]
    pub async fn run_once(&self, cancel: Arc<AtomicBool>) -> Option<RunReport> {
        let bot = &self.config.bot;
        match self.execute(cancel).await {
            Ok(report) => {
                info!(
                    status = %report.status,
                    conflict_count = report.conflict_count,
                    pull_request_id = ?report.pull_request_id,
                    "run finished"
                );
                Some(report)
            }
            Err(err) => {
                let kind = classify(&err);
                if kind == ErrorKind::Cancelled {
                    info!("run cancelled");
                    return None;
                }
                error!(?kind, error = %format!("{err:#}"), "run failed");
                let mut report = RunReport::failed(
                    self.targets.source.to_string(),
                    self.targets.dest.to_string(),
                    format!("{err:#}"),
                );
                report.dry_run = bot.dry_run;
                Some(report)
            }
        }
    }

    #[allow(clippy::future_not_send)]
    async fn execute(&self, cancel: Arc<AtomicBool>) -> Result<RunReport> {
        let bot = &self.config.bot;
        let github_config = &self.config.github;
        let credentials = self.auth.resolve(&github_config.api_url, &self.targets).await?;

        let github = credentials
            .api
            .map(|t| GitHubClient::with_base_url(&Auth::Token(t), &github_config.api_url))
            .transpose()
            .context("Failed to set up the GitHub client")?;
        let workspace = LocalWorkspace::new(
            bot.working_dir.clone(),
            &self.targets,
            &github_config.web_url,
            credentials.dest,
            credentials.rebase,
        );

        let controller = RunController::new(
            &workspace,
            github.as_ref(),
            &self.targets,
            ConflictResolver::from_config(&self.config.strategies),
            self.config.hooks.clone(),
            PullRequestPlanner::new(&self.targets, &bot.pr_title),
            RunOptions {
                dry_run: bot.dry_run,
                push_on_conflict: bot.push_on_conflict,
                committer: self.config.git.identity(),
                retry: self.config.retry.clone(),
            },
            cancel,
        );
        controller.run().await
    }

    /// Post the run summary to Slack when configured and worth saying.
    pub async fn notify(&self, report: &RunReport) {
        let previous = self.last_status.replace(Some(report.status));
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !worth_notifying(previous, report) {
            debug!("nothing new to report, skipping Slack");
            return;
        }
        if let Err(e) = notifier.send(&report.summary()).await {
            warn!(error = %format!("{e:#}"), "Slack notification failed");
            output::warn("Failed to send the Slack notification");
        }
    }
}

/// A run is announced when it wrote to the pull request or its status
/// differs from the previous run's. A first run is announced unless it was
/// a quiet success.
fn worth_notifying(previous: Option<AttemptStatus>, report: &RunReport) -> bool {
    let wrote = matches!(
        report.pull_request_action,
        PullRequestAction::Created | PullRequestAction::Updated | PullRequestAction::Closed
    );
    if wrote || report.dry_run {
        return true;
    }
    previous.map_or(report.status != AttemptStatus::Succeeded, |status| {
        status != report.status
    })
}

/// 0 for success or no-op, 2 for an unresolved conflict, 1 for failure.
#[must_use]
pub const fn exit_code(report: &RunReport) -> i32 {
    match report.status {
        AttemptStatus::Succeeded => 0,
        AttemptStatus::Conflicted => 2,
        AttemptStatus::Pending | AttemptStatus::Failed => 1,
    }
}

/// Print `report` for humans, or as JSON.
///
/// # Errors
/// Returns error if the report cannot be serialized.
pub fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        output::essential(&serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match report.status {
        AttemptStatus::Succeeded => output::success(&report.summary()),
        AttemptStatus::Conflicted => output::warn(&report.summary()),
        AttemptStatus::Pending | AttemptStatus::Failed => output::error(&report.summary()),
    }
    if report.error.is_some() {
        return Ok(());
    }

    output::hr();
    output::detail(&format!(
        "  status    {}",
        output::status_label(report.status, report.noop)
    ));
    output::detail(&format!("  tip       {}", short(report.tip.as_deref())));
    output::detail(&format!(
        "  replayed  {} commit(s), {} skipped",
        report.replayed_count,
        report.skipped.len()
    ));
    for skipped in &report.skipped {
        output::detail(&format!(
            "    skipped {} {} ({})",
            short(Some(&skipped.commit_id)),
            skipped.summary,
            skipped.reason
        ));
    }
    for resolution in &report.resolutions {
        output::detail(&format!(
            "    resolved {} with {} in {}",
            resolution.path,
            resolution.strategy,
            short(Some(&resolution.commit_id))
        ));
    }
    for conflict in &report.conflicts {
        output::detail(&format!(
            "    conflict {} in {} {}",
            conflict.path,
            short(Some(&conflict.commit_id)),
            conflict.commit_summary
        ));
    }
    let pr = output::pr_ref(report.pull_request_id, report.pull_request_action);
    if !pr.is_empty() {
        output::detail(&format!("  pr        {pr}"));
    }
    if let Some(url) = &report.pull_request_url {
        output::essential(url);
    }
    Ok(())
}

fn short(id: Option<&str>) -> &str {
    id.map_or("-", abbrev)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(status: AttemptStatus, action: PullRequestAction) -> RunReport {
        let mut report = RunReport::failed("up:main".into(), "org/repo:main".into(), String::new());
        report.error = None;
        report.status = status;
        report.pull_request_action = action;
        report
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&report(AttemptStatus::Succeeded, PullRequestAction::None)), 0);
        assert_eq!(exit_code(&report(AttemptStatus::Conflicted, PullRequestAction::None)), 2);
        assert_eq!(exit_code(&report(AttemptStatus::Failed, PullRequestAction::None)), 1);
    }

    #[test]
    fn test_unchanged_runs_are_not_announced() {
        assert!(!worth_notifying(
            None,
            &report(AttemptStatus::Succeeded, PullRequestAction::Unchanged)
        ));
        assert!(worth_notifying(
            None,
            &report(AttemptStatus::Succeeded, PullRequestAction::Updated)
        ));
        assert!(worth_notifying(
            None,
            &report(AttemptStatus::Conflicted, PullRequestAction::Unchanged)
        ));
        assert!(worth_notifying(None, &report(AttemptStatus::Failed, PullRequestAction::None)));
    }

    #[test]
    fn test_watch_announces_only_changes() {
        let ticks = [
            (AttemptStatus::Conflicted, PullRequestAction::Created, true),
            (AttemptStatus::Conflicted, PullRequestAction::Unchanged, false),
            (AttemptStatus::Conflicted, PullRequestAction::Unchanged, false),
            (AttemptStatus::Failed, PullRequestAction::None, true),
            (AttemptStatus::Failed, PullRequestAction::None, false),
            (AttemptStatus::Conflicted, PullRequestAction::Unchanged, true),
            (AttemptStatus::Succeeded, PullRequestAction::Updated, true),
            (AttemptStatus::Succeeded, PullRequestAction::Unchanged, false),
        ];
        let mut previous = None;
        for (i, (status, action, expected)) in ticks.into_iter().enumerate() {
            let report = report(status, action);
            assert_eq!(worth_notifying(previous, &report), expected, "tick {i}");
            previous = Some(status);
        }
    }

    #[test]
    fn test_cancelled_run_produces_no_report() {
        let temp = TempDir::new().unwrap();
        let token = temp.path().join("token");
        std::fs::write(&token, "ghp_unused\n").unwrap();
        let args = RunArgs {
            source: Some("https://github.com/kubernetes/kubernetes:master".into()),
            dest: Some("org/kubernetes:main".into()),
            working_dir: Some(temp.path().join("work")),
            github_user_token: Some(token),
            dry_run: true,
            ..RunArgs::default()
        };
        let session = Session::open(&args).unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt.block_on(session.run_once(Arc::new(AtomicBool::new(true))));
        assert!(report.is_none());
        assert_eq!(session.last_status.get(), None);
    }

    #[test]
    fn test_short_ids() {
        assert_eq!(short(None), "-");
        assert_eq!(short(Some("abc")), "abc");
        assert_eq!(short(Some("0123456789abcdef")), "0123456789ab");
    }
}
