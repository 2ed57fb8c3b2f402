//! GitHub API client.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::Auth;
use crate::error::{Error, Result};
use crate::traits::GitHubApi;
use crate::types::{
    CreateComment, CreatePullRequest, IssueComment, PullRequest, PullRequestState,
    UpdatePullRequest,
};

/// Internal representation of a PR from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    /// GitHub reports merged PRs as state="closed" with `merged_at` set.
    merged_at: Option<String>,
    html_url: String,
    head: ApiBranch,
    base: ApiBranch,
}

/// Internal representation of a branch ref from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiBranch {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

impl ApiPullRequest {
    fn into_pull_request(self) -> PullRequest {
        let state = match (self.state.as_str(), self.merged_at) {
            (_, Some(_)) => PullRequestState::Merged,
            ("open", None) => PullRequestState::Open,
            _ => PullRequestState::Closed,
        };

        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body,
            state,
            head_branch: self.head.ref_name,
            head_sha: self.head.sha,
            base_branch: self.base.ref_name,
            html_url: self.html_url,
        }
    }
}

/// GitHub API client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    /// Token stored as `SecretString` for automatic zeroization on drop.
    token: SecretString,
}

impl GitHubClient {
    /// Default GitHub API URL.
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";

    /// Create a new GitHub client.
    ///
    /// # Errors
    /// Returns error if authentication fails.
    pub fn new(auth: &Auth) -> Result<Self> {
        Self::with_base_url(auth, Self::DEFAULT_API_URL)
    }

    /// Create a new GitHub client with a custom API URL (for GitHub Enterprise).
    ///
    /// # Errors
    /// Returns error if authentication fails.
    pub fn with_base_url(auth: &Auth, base_url: impl Into<String>) -> Result<Self> {
        let token = auth.resolve()?;
        let client = Self::http_client()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// HTTP client with the headers every GitHub REST call carries.
    pub(crate) fn http_client() -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("rebasebot"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(Client::builder().default_headers(headers).build()?)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "github request");
        self.client.request(method, url).header(
            AUTHORIZATION,
            format!("Bearer {}", self.token.expose_secret()),
        )
    }

    /// Make a GET request. `query` values are percent-encoded.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        Self::handle_response(response).await
    }

    /// Make a request with a JSON body.
    async fn send_json<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.request(method, path).json(body).send().await?;
        Self::handle_response(response).await
    }

    /// Handle API response.
    pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.json().await?;
            return Ok(body);
        }

        let status_code = status.as_u16();
        match status_code {
            401 => Err(Error::AuthenticationFailed),
            403 | 429
                if response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .is_some_and(|v| v == "0")
                    || status_code == 429 =>
            {
                Err(Error::RateLimited)
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::ApiError {
                    status: status_code,
                    message: text,
                })
            }
        }
    }

    // === PR Operations ===

    /// List open pull requests whose head is `head_owner:head_branch` and
    /// whose base is `base`, lowest number first.
    ///
    /// # Errors
    /// Returns error if API call fails.
    pub async fn find_open_prs(
        &self,
        owner: &str,
        repo: &str,
        head_owner: &str,
        head_branch: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>> {
        let head = format!("{head_owner}:{head_branch}");
        let prs: Vec<ApiPullRequest> = self
            .get(
                &format!("/repos/{owner}/{repo}/pulls"),
                &[
                    ("head", head.as_str()),
                    ("base", base),
                    ("state", "open"),
                    ("per_page", "100"),
                ],
            )
            .await?;

        let mut prs: Vec<PullRequest> = prs
            .into_iter()
            .map(ApiPullRequest::into_pull_request)
            .collect();
        prs.sort_by_key(|pr| pr.number);
        Ok(prs)
    }

    /// Create a pull request.
    ///
    /// # Errors
    /// Returns error if PR creation fails.
    pub async fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        pr: CreatePullRequest,
    ) -> Result<PullRequest> {
        let api_pr: ApiPullRequest = self
            .send_json(Method::POST, &format!("/repos/{owner}/{repo}/pulls"), &pr)
            .await?;

        Ok(api_pr.into_pull_request())
    }

    /// Update a pull request. Closing is an update with `state: closed`.
    ///
    /// # Errors
    /// Returns error if PR update fails.
    pub async fn update_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: UpdatePullRequest,
    ) -> Result<PullRequest> {
        let api_pr: ApiPullRequest = self
            .send_json(
                Method::PATCH,
                &format!("/repos/{owner}/{repo}/pulls/{number}"),
                &update,
            )
            .await?;

        Ok(api_pr.into_pull_request())
    }

    // === Comment Operations ===

    /// Create a comment on a pull request.
    ///
    /// # Errors
    /// Returns error if request fails.
    pub async fn create_pr_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        comment: CreateComment,
    ) -> Result<IssueComment> {
        self.send_json(
            Method::POST,
            &format!("/repos/{owner}/{repo}/issues/{pr_number}/comments"),
            &comment,
        )
        .await
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

// === Trait Implementation ===

impl GitHubApi for GitHubClient {
    async fn find_open_prs(
        &self,
        owner: &str,
        repo: &str,
        head_owner: &str,
        head_branch: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>> {
        self.find_open_prs(owner, repo, head_owner, head_branch, base)
            .await
    }

    async fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        pr: CreatePullRequest,
    ) -> Result<PullRequest> {
        self.create_pr(owner, repo, pr).await
    }

    async fn update_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: UpdatePullRequest,
    ) -> Result<PullRequest> {
        self.update_pr(owner, repo, number, update).await
    }

    async fn create_pr_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        comment: CreateComment,
    ) -> Result<IssueComment> {
        self.create_pr_comment(owner, repo, pr_number, comment)
            .await
    }
}
