//! Slack notification of run summaries.

use std::path::Path;

use anyhow::{Context, Result, bail};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

/// Posts messages to a Slack incoming webhook.
pub struct SlackNotifier {
    /// The webhook URL embeds a credential.
    webhook_url: SecretString,
    http: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: SecretString) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    /// Read the webhook URL from `path`, ignoring surrounding whitespace.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is empty.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read Slack webhook from {}", path.display()))?;
        let url = raw.trim();
        if url.is_empty() {
            bail!("Slack webhook file {} is empty", path.display());
        }
        Ok(Self::new(SecretString::from(url.to_string())))
    }

    /// Send `message` as a plain `text` payload.
    ///
    /// # Errors
    /// Returns error if the request fails or Slack answers with a non-2xx
    /// status.
    pub async fn send(&self, message: &str) -> Result<()> {
        debug!(len = message.len(), "sending Slack message");
        let payload = serde_json::json!({
            "text": message,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        let resp = self
            .http
            .post(self.webhook_url.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Slack")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "Slack webhook returned error");
            bail!("Slack webhook returned {status}: {body}");
        }

        info!("Slack message sent");
        Ok(())
    }
}
