//! GitHub credentials for a run.
//!
//! A user token serves every remote and the API. With GitHub Apps the main
//! app's installation token reads the destination and writes the pull
//! request, and the cloner app's token pushes to the rebase repository.
//! Installation tokens are short-lived, so they are minted for every run.

use anyhow::{Context, Result};
use rebasebot_core::Targets;
use rebasebot_core::config::{AppConfig, GitHubConfig};
use rebasebot_git::Credentials;
use rebasebot_github::{Auth, GitHubApp, SecretString};
use tracing::{info, warn};

/// Where a run's GitHub credentials come from.
#[derive(Debug)]
pub enum GitHubAuth {
    Token(SecretString),
    Apps { app: GitHubApp, cloner: GitHubApp },
    /// No credentials at all; only dry runs get this far.
    Anonymous,
}

/// Credentials for one run.
#[derive(Debug, Default)]
pub struct RunCredentials {
    /// Token for the REST API (pull request calls on the destination).
    pub api: Option<SecretString>,
    pub dest: Option<Credentials>,
    pub rebase: Option<Credentials>,
}

fn load_app(config: &AppConfig) -> Result<GitHubApp> {
    GitHubApp::from_key_file(config.id, &config.key_file)
        .with_context(|| format!("Failed to load the key of GitHub App {}", config.id))
}

impl GitHubAuth {
    /// Pick the credential source: an explicit token file, then the apps,
    /// then `GITHUB_TOKEN`.
    ///
    /// # Errors
    /// Returns error if an app key cannot be loaded, or if no credentials
    /// are available outside a dry run.
    pub fn from_config(config: &GitHubConfig, dry_run: bool) -> Result<Self> {
        if config.token_file.is_none() {
            if let Some(app) = &config.app {
                let main = load_app(app)?;
                let cloner = match &config.cloner {
                    Some(cloner) => load_app(cloner)?,
                    None => main.clone(),
                };
                info!(app = main.app_id(), cloner = cloner.app_id(), "authenticating as GitHub Apps");
                return Ok(Self::Apps { app: main, cloner });
            }
        }

        match Auth::from_file_or_env(config.token_file.clone()).resolve() {
            Ok(token) => Ok(Self::Token(token)),
            Err(e) if dry_run => {
                warn!(error = %e, "no GitHub credentials, continuing anonymously for dry run");
                Ok(Self::Anonymous)
            }
            Err(e) => Err(e).context("A GitHub token or GitHub App is required"),
        }
    }

    /// Credentials for this run, minting installation tokens when needed.
    ///
    /// # Errors
    /// Returns error if an app is not installed on the repository it needs
    /// or GitHub refuses to mint a token.
    pub async fn resolve(&self, api_url: &str, targets: &Targets) -> Result<RunCredentials> {
        match self {
            Self::Anonymous => Ok(RunCredentials::default()),
            Self::Token(token) => Ok(RunCredentials {
                api: Some(token.clone()),
                dest: Some(Credentials::access_token(token.clone())),
                rebase: Some(Credentials::access_token(token.clone())),
            }),
            Self::Apps { app, cloner } => {
                let (dest, rebase) = (&targets.dest, &targets.rebase);
                let dest_token = app
                    .installation_token(api_url, &dest.owner, &dest.repo)
                    .await
                    .context("Failed to authenticate for the destination repository")?;
                let rebase_token = cloner
                    .installation_token(api_url, &rebase.owner, &rebase.repo)
                    .await
                    .context("Failed to authenticate for the rebase repository")?;
                Ok(RunCredentials {
                    api: Some(dest_token.clone()),
                    dest: Some(Credentials::access_token(dest_token)),
                    rebase: Some(Credentials::access_token(rebase_token)),
                })
            }
        }
    }
}
