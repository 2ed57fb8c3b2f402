//! Configuration for rebasebot.
//!
//! Loaded from a TOML file; every section is optional and command-line
//! flags override individual fields afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::refs::{GitHubRef, SourceRef};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// What to rebase and where.
    #[serde(default)]
    pub bot: BotConfig,

    /// Identity used for commits the bot writes.
    #[serde(default)]
    pub git: GitConfig,

    /// GitHub endpoints and credentials.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Notification targets.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Conflict resolution strategies, tried in order.
    #[serde(default, rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,

    /// Post-rebase hooks, run in order.
    #[serde(default, rename = "hook")]
    pub hooks: Vec<HookConfig>,
}

impl Config {
    /// Load config from a TOML file.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            file: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse and check everything a run needs.
    ///
    /// # Errors
    /// Returns a `Configuration` or `InvalidRef` error describing the first
    /// problem found.
    pub fn targets(&self) -> Result<Targets> {
        let source: SourceRef = self
            .bot
            .source
            .as_deref()
            .ok_or_else(|| Error::Configuration("a source reference is required".into()))?
            .parse()?;
        let dest: GitHubRef = self
            .bot
            .dest
            .as_deref()
            .ok_or_else(|| Error::Configuration("a destination reference is required".into()))?
            .parse()?;
        let rebase = match self.bot.rebase.as_deref() {
            Some(r) => r.parse()?,
            None => dest.default_rebase_branch(),
        };

        if rebase.same_repo(&dest) && rebase.branch == dest.branch {
            return Err(Error::Configuration(
                "the rebase branch must differ from the destination branch".into(),
            ));
        }

        Ok(Targets {
            source,
            dest,
            rebase,
        })
    }

    /// Check settings that do not depend on the refs.
    ///
    /// # Errors
    /// Returns a `Configuration` error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.github.cloner.is_some() && self.github.app.is_none() {
            return Err(Error::Configuration(
                "github.cloner needs github.app for the destination".into(),
            ));
        }
        if self.bot.working_dir.as_os_str().is_empty() {
            return Err(Error::Configuration("bot.working_dir cannot be empty".into()));
        }
        for strategy in &self.strategies {
            if strategy.paths.iter().any(String::is_empty) {
                return Err(Error::Configuration(format!(
                    "strategy {} has an empty path pattern",
                    strategy.kind
                )));
            }
        }
        for hook in &self.hooks {
            if hook.name.is_empty() {
                return Err(Error::Configuration("every hook needs a name".into()));
            }
            if hook.commands.is_empty() && hook.restore_from_source.is_empty() {
                return Err(Error::Configuration(format!(
                    "hook '{}' has nothing to do",
                    hook.name
                )));
            }
            if hook.commit_message.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "hook '{}' needs a commit_message",
                    hook.name
                )));
            }
        }
        Ok(())
    }
}

/// The three references a run works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub source: SourceRef,
    pub dest: GitHubRef,
    pub rebase: GitHubRef,
}

/// What to rebase and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// `<git url>:<ref>` to rebase onto.
    pub source: Option<String>,
    /// `<owner>/<repo>:<branch>` to rebase and open the PR against.
    pub dest: Option<String>,
    /// `<owner>/<repo>:<branch>` the candidate is pushed to.
    pub rebase: Option<String>,
    /// Where the working copy lives.
    pub working_dir: PathBuf,
    /// Compute everything but push nothing and leave GitHub untouched.
    pub dry_run: bool,
    /// Push the partial replay when a conflict stops the rebase.
    pub push_on_conflict: bool,
    /// Seconds between runs in `watch` mode.
    pub poll_interval_secs: u64,
    /// Title for the pull request. `{source}` and `{dest}` are substituted.
    pub pr_title: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            source: None,
            dest: None,
            rebase: None,
            working_dir: PathBuf::from(".rebase"),
            dry_run: false,
            push_on_conflict: false,
            poll_interval_secs: 600,
            pr_title: "Merge {source} into {dest}".into(),
        }
    }
}

/// Identity used for commits the bot writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub username: String,
    pub email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        let identity = rebasebot_git::Identity::default();
        Self {
            username: identity.name,
            email: identity.email,
        }
    }
}

impl GitConfig {
    #[must_use]
    pub fn identity(&self) -> rebasebot_git::Identity {
        rebasebot_git::Identity::new(&self.username, &self.email)
    }
}

/// GitHub endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API base URL (GitHub Enterprise uses `https://host/api/v3`).
    pub api_url: String,
    /// Base URL repositories are cloned from.
    pub web_url: String,
    /// File holding a user access token. Takes precedence over the apps.
    pub token_file: Option<PathBuf>,
    /// App that reads the destination and owns the pull request.
    pub app: Option<AppConfig>,
    /// App that pushes to the rebase repository; `app` when unset.
    pub cloner: Option<AppConfig>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            web_url: "https://github.com".into(),
            token_file: None,
            app: None,
            cloner: None,
        }
    }
}

/// A GitHub App identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub id: u64,
    /// PEM private key of the app.
    pub key_file: PathBuf,
}

/// Notification targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// File holding a Slack incoming-webhook URL.
    pub slack_webhook_file: Option<PathBuf>,
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts for network failures, first try included.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubled each time.
    pub initial_backoff_ms: u64,
    /// Attempts after the rebase branch moved under us.
    pub push_rejected_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 2_000,
            push_rejected_attempts: 3,
        }
    }
}

/// Automated conflict resolution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Keep destination-side content in conflicting regions.
    TakeOurs,
    /// Keep source-side content in conflicting regions.
    TakeTheirs,
    /// Drop the replayed commit's change to matching paths.
    PathExclusion,
    /// Resolve modify/delete conflicts by deleting the file.
    AcceptDeletion,
    /// Never resolve matching paths automatically.
    Decline,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TakeOurs => "take-ours",
            Self::TakeTheirs => "take-theirs",
            Self::PathExclusion => "path-exclusion",
            Self::AcceptDeletion => "accept-deletion",
            Self::Decline => "decline",
        })
    }
}

/// One strategy and the paths it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Glob patterns; empty means every path.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// A step run on the replayed tip before it is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    pub name: String,
    /// Paths reset to their source-side content before the commands run.
    #[serde(default)]
    pub restore_from_source: Vec<String>,
    /// Shell commands run in the working copy. `{source_commit}` is replaced
    /// with the source commit id.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Message for the commit holding the hook's changes.
    pub commit_message: String,
}

impl HookConfig {
    /// Re-vendor Go modules against the new upstream.
    #[must_use]
    pub fn go_modules() -> Self {
        Self {
            name: "go-modules".into(),
            restore_from_source: vec!["go.mod".into(), "go.sum".into()],
            commands: vec!["go mod tidy".into(), "go mod vendor".into()],
            commit_message:
                "UPSTREAM: <carry>: Updating and vendoring go modules after an upstream rebase"
                    .into(),
        }
    }
}
