//! Mock implementations for testing services.
//!
//! `MockGitHub` keeps pull requests in memory and records every write, so
//! tests can assert on exactly which API calls a run made.

use std::collections::VecDeque;
use std::sync::Mutex;

use rebasebot_github::{
    CreateComment, CreatePullRequest, Error as GitHubError, GitHubApi, IssueComment, PullRequest,
    PullRequestState, Result as GitHubResult, UpdatePullRequest,
};

/// In-memory GitHub.
#[derive(Default)]
pub struct MockGitHub {
    pub prs: Mutex<Vec<(String, PullRequest)>>,
    pub created: Mutex<Vec<CreatePullRequest>>,
    pub updates: Mutex<Vec<(u64, UpdatePullRequest)>>,
    pub comments: Mutex<Vec<(u64, String)>>,
    /// Errors returned, one per call, before any call succeeds.
    pub failures: Mutex<VecDeque<GitHubError>>,
}

impl MockGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an open pull request from `head_owner:head_branch` into `base`.
    pub fn with_open_pr(
        self,
        number: u64,
        head_owner: &str,
        head_branch: &str,
        base: &str,
        body: &str,
    ) -> Self {
        self.lock_prs().push((
            head_owner.to_string(),
            PullRequest {
                number,
                title: format!("PR {number}"),
                body: Some(body.to_string()),
                state: PullRequestState::Open,
                head_branch: head_branch.to_string(),
                head_sha: String::new(),
                base_branch: base.to_string(),
                html_url: format!("https://github.com/mock/repo/pull/{number}"),
            },
        ));
        self
    }

    /// Fail the next call with `err`.
    pub fn with_failure(self, err: GitHubError) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(err);
        }
        self
    }

    pub fn open_count(&self) -> usize {
        self.lock_prs()
            .iter()
            .filter(|(_, pr)| pr.state == PullRequestState::Open)
            .count()
    }

    /// Number of calls that changed something.
    pub fn write_count(&self) -> usize {
        self.created.lock().map_or(0, |v| v.len())
            + self.updates.lock().map_or(0, |v| v.len())
            + self.comments.lock().map_or(0, |v| v.len())
    }

    fn lock_prs(&self) -> std::sync::MutexGuard<'_, Vec<(String, PullRequest)>> {
        self.prs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_failure(&self) -> GitHubResult<()> {
        match self.failures.lock().ok().and_then(|mut f| f.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(number: u64) -> GitHubError {
        GitHubError::ApiError {
            status: 404,
            message: format!("pull request {number} not found"),
        }
    }
}

impl GitHubApi for MockGitHub {
    async fn find_open_prs(
        &self,
        _owner: &str,
        _repo: &str,
        head_owner: &str,
        head_branch: &str,
        base: &str,
    ) -> GitHubResult<Vec<PullRequest>> {
        self.next_failure()?;
        let mut open: Vec<PullRequest> = self
            .lock_prs()
            .iter()
            .filter(|(owner, pr)| {
                owner == head_owner
                    && pr.head_branch == head_branch
                    && pr.base_branch == base
                    && pr.state == PullRequestState::Open
            })
            .map(|(_, pr)| pr.clone())
            .collect();
        open.sort_by_key(|pr| pr.number);
        Ok(open)
    }

    async fn create_pr(
        &self,
        _owner: &str,
        _repo: &str,
        pr: CreatePullRequest,
    ) -> GitHubResult<PullRequest> {
        self.next_failure()?;
        let (head_owner, head_branch) = pr
            .head
            .split_once(':')
            .map_or((String::new(), pr.head.clone()), |(o, b)| {
                (o.to_string(), b.to_string())
            });

        let mut prs = self.lock_prs();
        let number = prs.iter().map(|(_, p)| p.number).max().unwrap_or(0) + 1;
        let created = PullRequest {
            number,
            title: pr.title.clone(),
            body: Some(pr.body.clone()),
            state: PullRequestState::Open,
            head_branch,
            head_sha: String::new(),
            base_branch: pr.base.clone(),
            html_url: format!("https://github.com/mock/repo/pull/{number}"),
        };
        prs.push((head_owner, created.clone()));
        drop(prs);

        if let Ok(mut log) = self.created.lock() {
            log.push(pr);
        }
        Ok(created)
    }

    async fn update_pr(
        &self,
        _owner: &str,
        _repo: &str,
        number: u64,
        update: UpdatePullRequest,
    ) -> GitHubResult<PullRequest> {
        self.next_failure()?;
        let mut prs = self.lock_prs();
        let (_, pr) = prs
            .iter_mut()
            .find(|(_, pr)| pr.number == number)
            .ok_or_else(|| Self::not_found(number))?;
        if let Some(title) = &update.title {
            pr.title.clone_from(title);
        }
        if let Some(body) = &update.body {
            pr.body = Some(body.clone());
        }
        if let Some(state) = update.state {
            pr.state = state;
        }
        let updated = pr.clone();
        drop(prs);

        if let Ok(mut log) = self.updates.lock() {
            log.push((number, update));
        }
        Ok(updated)
    }

    async fn create_pr_comment(
        &self,
        _owner: &str,
        _repo: &str,
        pr_number: u64,
        comment: CreateComment,
    ) -> GitHubResult<IssueComment> {
        self.next_failure()?;
        let mut comments = self
            .comments
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        comments.push((pr_number, comment.body.clone()));
        Ok(IssueComment {
            id: comments.len() as u64,
            body: Some(comment.body),
        })
    }
}
