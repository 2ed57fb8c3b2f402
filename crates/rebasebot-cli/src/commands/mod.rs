//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use rebasebot_core::config::AppConfig;
use rebasebot_core::{Config, HookConfig, StrategyConfig, StrategyKind};

pub mod completions;
pub mod run;
pub mod utils;
pub mod watch;

/// rebasebot - keeps a downstream fork rebased onto its upstream.
#[derive(Parser)]
#[command(name = "rebasebot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only print errors and essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log filter for diagnostic output (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rebase the destination onto the source once and sync the pull request.
    ///
    /// Exits 0 when the destination is up to date or the rebase succeeded,
    /// 2 when conflicts need manual resolution and 1 on failure.
    Run(RunArgs),

    /// Repeat `run` on an interval until interrupted.
    Watch {
        #[command(flatten)]
        args: RunArgs,

        /// Seconds between runs (default from config, else 600).
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Options shared by `run` and `watch`. Flags override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Upstream to rebase onto, as `<git url>:<ref>`.
    #[arg(long)]
    pub source: Option<String>,

    /// Downstream branch and pull request base, as `<owner>/<repo>:<branch>`.
    #[arg(long)]
    pub dest: Option<String>,

    /// Branch the result is pushed to, as `<owner>/<repo>:<branch>`.
    #[arg(long)]
    pub rebase: Option<String>,

    /// Resolve conflicts in matching paths with the downstream side.
    #[arg(long = "ours", value_name = "GLOB")]
    pub ours: Vec<String>,

    /// Resolve conflicts in matching paths with the upstream side.
    #[arg(long = "theirs", value_name = "GLOB")]
    pub theirs: Vec<String>,

    /// Drop downstream changes to matching paths when they conflict.
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Directory holding the bot's working copy.
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Committer name for rewritten commits.
    #[arg(long)]
    pub git_username: Option<String>,

    /// Committer email for rewritten commits.
    #[arg(long)]
    pub git_email: Option<String>,

    /// File holding a GitHub token (default: `GITHUB_TOKEN`).
    #[arg(long, value_name = "FILE")]
    pub github_user_token: Option<PathBuf>,

    /// GitHub App that reads the destination and owns the pull request.
    #[arg(long, value_name = "ID", requires = "github_app_key")]
    pub github_app_id: Option<u64>,

    /// PEM private key of `--github-app-id`.
    #[arg(long, value_name = "FILE", requires = "github_app_id")]
    pub github_app_key: Option<PathBuf>,

    /// GitHub App that pushes to the rebase repository (default: the app above).
    #[arg(long, value_name = "ID", requires = "github_cloner_key")]
    pub github_cloner_id: Option<u64>,

    /// PEM private key of `--github-cloner-id`.
    #[arg(long, value_name = "FILE", requires = "github_cloner_id")]
    pub github_cloner_key: Option<PathBuf>,

    /// File holding a Slack webhook URL to post the run summary to.
    #[arg(long, value_name = "FILE")]
    pub slack_webhook: Option<PathBuf>,

    /// Re-vendor Go modules after the rebase.
    #[arg(long)]
    pub update_go_modules: bool,

    /// Push partial progress when the rebase stops on a conflict.
    #[arg(long)]
    pub push_on_conflict: bool,

    /// Compute everything but push nothing and leave the pull request alone.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Load the config file (if any) and apply flag overrides.
    ///
    /// Strategies given as flags run before those from the file, in the
    /// order ours, theirs, exclude.
    ///
    /// # Errors
    /// Returns error if the config file cannot be read or parsed.
    pub fn load_config(&self) -> rebasebot_core::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        let bot = &mut config.bot;
        override_with(&mut bot.source, self.source.as_ref());
        override_with(&mut bot.dest, self.dest.as_ref());
        override_with(&mut bot.rebase, self.rebase.as_ref());
        if let Some(dir) = &self.working_dir {
            bot.working_dir.clone_from(dir);
        }
        bot.dry_run |= self.dry_run;
        bot.push_on_conflict |= self.push_on_conflict;

        if let Some(name) = &self.git_username {
            config.git.username.clone_from(name);
        }
        if let Some(email) = &self.git_email {
            config.git.email.clone_from(email);
        }
        if self.github_user_token.is_some() {
            config.github.token_file.clone_from(&self.github_user_token);
        }
        if let Some(app) = app_flags(self.github_app_id, self.github_app_key.as_ref()) {
            config.github.app = Some(app);
        }
        if let Some(cloner) = app_flags(self.github_cloner_id, self.github_cloner_key.as_ref()) {
            config.github.cloner = Some(cloner);
        }
        if self.slack_webhook.is_some() {
            config.notify.slack_webhook_file.clone_from(&self.slack_webhook);
        }

        let flagged = [
            (StrategyKind::TakeOurs, &self.ours),
            (StrategyKind::TakeTheirs, &self.theirs),
            (StrategyKind::PathExclusion, &self.exclude),
        ]
        .into_iter()
        .filter(|(_, paths)| !paths.is_empty())
        .map(|(kind, paths)| StrategyConfig {
            kind,
            paths: paths.clone(),
        });
        config.strategies = flagged.chain(config.strategies).collect();

        if self.update_go_modules && !config.hooks.iter().any(|h| h.name == "go-modules") {
            config.hooks.push(HookConfig::go_modules());
        }

        config.validate()?;
        Ok(config)
    }
}

fn override_with(slot: &mut Option<String>, value: Option<&String>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

fn app_flags(id: Option<u64>, key_file: Option<&PathBuf>) -> Option<AppConfig> {
    Some(AppConfig {
        id: id?,
        key_file: key_file?.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rebasebot.toml");
        std::fs::write(
            &path,
            r#"
[bot]
source = "https://github.com/kubernetes/kubernetes:master"
dest = "org/kubernetes:main"
working_dir = "/var/lib/rebasebot"

[[strategy]]
kind = "take-theirs"
paths = ["vendor/**"]
"#,
        )
        .unwrap();

        let args = RunArgs {
            config: Some(path),
            dest: Some("org/kubernetes:release-1.30".into()),
            ours: vec!["docs/**".into()],
            update_go_modules: true,
            dry_run: true,
            ..RunArgs::default()
        };
        let config = args.load_config().unwrap();

        assert_eq!(config.bot.dest.as_deref(), Some("org/kubernetes:release-1.30"));
        assert_eq!(config.bot.working_dir, PathBuf::from("/var/lib/rebasebot"));
        assert!(config.bot.dry_run);
        assert_eq!(config.strategies.len(), 2);
        assert_eq!(config.strategies[0].kind, StrategyKind::TakeOurs);
        assert_eq!(config.strategies[1].kind, StrategyKind::TakeTheirs);
        assert_eq!(config.hooks, vec![HookConfig::go_modules()]);
    }

    #[test]
    fn test_no_file_uses_defaults() {
        let args = RunArgs {
            source: Some("https://git.example.com/up.git:main".into()),
            ..RunArgs::default()
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.bot.working_dir, PathBuf::from(".rebase"));
        assert!(config.strategies.is_empty());
        assert!(config.hooks.is_empty());
    }

    #[test]
    fn test_app_flags_override_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rebasebot.toml");
        std::fs::write(
            &path,
            r#"
[github.app]
id = 1
key_file = "/etc/rebasebot/app.pem"

[github.cloner]
id = 2
key_file = "/etc/rebasebot/cloner.pem"
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "rebasebot",
            "run",
            "--config",
            path.to_str().unwrap(),
            "--source",
            "https://github.com/kubernetes/kubernetes:master",
            "--github-app-id",
            "137509",
            "--github-app-key",
            "/run/secrets/app.pem",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        let config = args.load_config().unwrap();

        let app = config.github.app.unwrap();
        assert_eq!(app.id, 137_509);
        assert_eq!(app.key_file, PathBuf::from("/run/secrets/app.pem"));
        assert_eq!(config.github.cloner.unwrap().id, 2);
    }

    #[test]
    fn test_app_id_requires_key() {
        let result = Cli::try_parse_from([
            "rebasebot",
            "run",
            "--github-cloner-id",
            "137497",
        ]);
        assert!(result.is_err());
    }
}
