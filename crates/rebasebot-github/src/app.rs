//! GitHub App authentication.
//!
//! An app signs a short-lived JWT with its private key, looks up its
//! installation on a repository and exchanges the JWT for an installation
//! token. Installation tokens expire after an hour, so callers mint a fresh
//! one for every run instead of caching it.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use ring::rand::SystemRandom;
use ring::signature::{RSA_PKCS1_SHA256, RsaKeyPair};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::client::GitHubClient;
use crate::error::{Error, Result};

/// Clock skew GitHub tolerates is small; backdate `iat` by a minute.
const JWT_BACKDATE_SECS: i64 = 60;
/// GitHub rejects app JWTs valid for more than ten minutes.
const JWT_LIFETIME_SECS: i64 = 540;

#[derive(Deserialize)]
struct Installation {
    id: u64,
}

#[derive(Deserialize)]
struct AccessToken {
    token: String,
}

/// A GitHub App identity: its numeric id and PEM private key.
#[derive(Clone)]
pub struct GitHubApp {
    app_id: u64,
    private_key: SecretString,
}

impl GitHubApp {
    /// Build from an in-memory PEM key. The key is checked on first use.
    #[must_use]
    pub const fn new(app_id: u64, private_key: SecretString) -> Self {
        Self {
            app_id,
            private_key,
        }
    }

    /// Read the PEM private key from `path` and check that it parses.
    ///
    /// # Errors
    /// Returns `AppKey` if the file cannot be read or holds no usable RSA key.
    pub fn from_key_file(app_id: u64, path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| Error::AppKey(format!("cannot read {}: {e}", path.display())))?;
        let app = Self::new(app_id, SecretString::from(pem));
        app.key_pair()?;
        Ok(app)
    }

    #[must_use]
    pub const fn app_id(&self) -> u64 {
        self.app_id
    }

    fn key_pair(&self) -> Result<RsaKeyPair> {
        let pem = self.private_key.expose_secret();
        let (label, der) = decode_pem(pem)?;
        let parsed = match label.as_str() {
            "RSA PRIVATE KEY" => RsaKeyPair::from_der(&der),
            "PRIVATE KEY" => RsaKeyPair::from_pkcs8(&der),
            other => return Err(Error::AppKey(format!("unsupported PEM block '{other}'"))),
        };
        parsed.map_err(|e| Error::AppKey(format!("rejected RSA key: {e}")))
    }

    /// A signed app JWT valid around `now` (seconds since the epoch).
    ///
    /// # Errors
    /// Returns `AppKey` if the private key cannot be used for signing.
    pub fn jwt(&self, now: i64) -> Result<SecretString> {
        let header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        let claims = serde_json::json!({
            "iat": now - JWT_BACKDATE_SECS,
            "exp": now + JWT_LIFETIME_SECS,
            "iss": self.app_id.to_string(),
        });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );

        let key = self.key_pair()?;
        let mut signature = vec![0; key.public().modulus_len()];
        key.sign(
            &RSA_PKCS1_SHA256,
            &SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .map_err(|_| Error::AppKey("signing the app JWT failed".into()))?;

        Ok(SecretString::from(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        )))
    }

    /// Mint an installation token for `owner/repo` against the REST API at
    /// `api_url`.
    ///
    /// # Errors
    /// Returns `AppNotInstalled` if the app has no installation covering the
    /// repository, or the usual API errors.
    pub async fn installation_token(
        &self,
        api_url: &str,
        owner: &str,
        repo: &str,
    ) -> Result<SecretString> {
        let base = api_url.trim_end_matches('/');
        let jwt = self.jwt(chrono::Utc::now().timestamp())?;
        let bearer = format!("Bearer {}", jwt.expose_secret());
        let http = GitHubClient::http_client()?;

        debug!(app_id = self.app_id, owner, repo, "looking up app installation");
        let response = http
            .request(Method::GET, format!("{base}/repos/{owner}/{repo}/installation"))
            .header(AUTHORIZATION, &bearer)
            .send()
            .await?;
        let installation: Installation = match GitHubClient::handle_response(response).await {
            Err(Error::ApiError { status: 404, .. }) => {
                return Err(Error::AppNotInstalled {
                    app_id: self.app_id,
                    repo: format!("{owner}/{repo}"),
                });
            }
            other => other?,
        };

        let response = http
            .request(
                Method::POST,
                format!("{base}/app/installations/{}/access_tokens", installation.id),
            )
            .header(AUTHORIZATION, &bearer)
            .send()
            .await?;
        let token: AccessToken = GitHubClient::handle_response(response).await?;
        info!(
            app_id = self.app_id,
            installation = installation.id,
            repo = %format!("{owner}/{repo}"),
            "minted installation token"
        );
        Ok(SecretString::from(token.token))
    }
}

impl std::fmt::Debug for GitHubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubApp")
            .field("app_id", &self.app_id)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// Label and DER bytes of the first PEM block in `pem`.
fn decode_pem(pem: &str) -> Result<(String, Vec<u8>)> {
    let mut lines = pem.lines().map(str::trim);
    let label = lines
        .by_ref()
        .find_map(|l| l.strip_prefix("-----BEGIN ")?.strip_suffix("-----"))
        .ok_or_else(|| Error::AppKey("no PEM block found".into()))?
        .to_string();
    let end = format!("-----END {label}-----");
    let body: String = lines.take_while(|l| *l != end).collect();
    let der = STANDARD
        .decode(body)
        .map_err(|e| Error::AppKey(format!("bad PEM encoding: {e}")))?;
    Ok((label, der))
}
