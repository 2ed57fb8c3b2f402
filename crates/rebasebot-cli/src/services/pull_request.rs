//! Pull-request synchronization against GitHub.
//!
//! Looks up the tracked pull request, asks the planner what to do and
//! carries the action out. Lookup always happens before any write so a
//! second pull request is never opened for the same pair.

use anyhow::{Context, Result};
use rebasebot_core::{
    ForgeState, GitHubRef, Marker, PrAction, PrState, PullRequestAction, PullRequestPlanner,
    RebaseAttempt, TrackedPullRequest,
};
use rebasebot_git::Oid;
use rebasebot_github::{
    CreateComment, CreatePullRequest, GitHubApi, PullRequest, PullRequestState, UpdatePullRequest,
};
use tracing::{info, warn};

/// What the synchronizer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestOutcome {
    pub action: PullRequestAction,
    pub number: Option<u64>,
    pub url: Option<String>,
}

impl PullRequestOutcome {
    const fn none() -> Self {
        Self {
            action: PullRequestAction::None,
            number: None,
            url: None,
        }
    }
}

/// Keeps the single tracked pull request of a pair in step with the latest
/// attempt.
pub struct PullRequestSync<'a, H: GitHubApi> {
    github: &'a H,
    dest: &'a GitHubRef,
    rebase: &'a GitHubRef,
}

impl<'a, H: GitHubApi> PullRequestSync<'a, H> {
    pub const fn new(github: &'a H, dest: &'a GitHubRef, rebase: &'a GitHubRef) -> Self {
        Self {
            github,
            dest,
            rebase,
        }
    }

    /// Find the open pull request from the rebase branch into the
    /// destination branch.
    ///
    /// # Errors
    /// Returns error if the GitHub query fails.
    pub async fn lookup(&self) -> Result<Option<TrackedPullRequest>> {
        let mut open = self
            .github
            .find_open_prs(
                &self.dest.owner,
                &self.dest.repo,
                &self.rebase.owner,
                &self.rebase.branch,
                &self.dest.branch,
            )
            .await
            .context("Failed to look up existing pull requests")?;

        if open.len() > 1 {
            let numbers: Vec<u64> = open.iter().map(|pr| pr.number).collect();
            warn!(?numbers, "several open pull requests for one pair, tracking the oldest");
        }
        open.sort_by_key(|pr| pr.number);
        Ok(open.into_iter().next().map(|pr| self.track(pr)))
    }

    fn track(&self, pr: PullRequest) -> TrackedPullRequest {
        let body = pr.body.unwrap_or_default();
        let recorded = Marker::parse(&body).and_then(|m| m.head);
        TrackedPullRequest {
            id: pr.number,
            head_ref: format!("{}:{}", self.rebase.owner, pr.head_branch),
            base_ref: pr.base_branch,
            state: match pr.state {
                PullRequestState::Open => ForgeState::Open,
                PullRequestState::Closed => ForgeState::Closed,
                PullRequestState::Merged => ForgeState::Merged,
            },
            last_known_head_commit: recorded.or(Some(pr.head_sha)),
            body,
            url: pr.html_url,
        }
    }

    /// Plan and apply the transition for `attempt` given the pull request
    /// found by [`lookup`](Self::lookup).
    ///
    /// # Errors
    /// Returns error if any GitHub call fails.
    pub async fn sync(
        &self,
        planner: &PullRequestPlanner,
        tracked: Option<&TrackedPullRequest>,
        attempt: &RebaseAttempt,
        head: Option<Oid>,
    ) -> Result<PullRequestOutcome> {
        let state = tracked.map_or(PrState::Absent, TrackedPullRequest::lifecycle);
        let action = planner.plan(tracked, attempt, head);
        info!(?state, writes = action.is_write(), "planned pull request action");
        self.apply(action, tracked).await
    }

    /// Carry out `action`.
    ///
    /// # Errors
    /// Returns error if any GitHub call fails.
    pub async fn apply(
        &self,
        action: PrAction,
        tracked: Option<&TrackedPullRequest>,
    ) -> Result<PullRequestOutcome> {
        let (owner, repo) = (self.dest.owner.as_str(), self.dest.repo.as_str());
        let url = tracked.map(|pr| pr.url.clone());

        match action {
            PrAction::Nothing { reason } => {
                info!(reason, "no pull request needed");
                Ok(PullRequestOutcome::none())
            }
            PrAction::Unchanged { number } => Ok(PullRequestOutcome {
                action: PullRequestAction::Unchanged,
                number: Some(number),
                url,
            }),
            PrAction::Create { title, body } => {
                let pr = self
                    .github
                    .create_pr(
                        owner,
                        repo,
                        CreatePullRequest {
                            title,
                            body,
                            head: format!("{}:{}", self.rebase.owner, self.rebase.branch),
                            base: self.dest.branch.to_string(),
                            draft: false,
                            maintainer_can_modify: false,
                        },
                    )
                    .await
                    .context("Failed to create pull request")?;
                info!(number = pr.number, url = %pr.html_url, "created pull request");
                Ok(PullRequestOutcome {
                    action: PullRequestAction::Created,
                    number: Some(pr.number),
                    url: Some(pr.html_url),
                })
            }
            PrAction::Update {
                number,
                body,
                comment,
            } => {
                let update = UpdatePullRequest {
                    body: Some(body),
                    ..UpdatePullRequest::default()
                };
                let pr = self
                    .github
                    .update_pr(owner, repo, number, update)
                    .await
                    .with_context(|| format!("Failed to update pull request #{number}"))?;
                if let Some(body) = comment {
                    self.github
                        .create_pr_comment(owner, repo, number, CreateComment { body })
                        .await
                        .with_context(|| format!("Failed to comment on pull request #{number}"))?;
                }
                info!(number, "updated pull request");
                Ok(PullRequestOutcome {
                    action: PullRequestAction::Updated,
                    number: Some(number),
                    url: Some(pr.html_url),
                })
            }
            PrAction::Close { number, comment } => {
                self.github
                    .create_pr_comment(owner, repo, number, CreateComment { body: comment })
                    .await
                    .with_context(|| format!("Failed to comment on pull request #{number}"))?;
                let close = UpdatePullRequest {
                    state: Some(PullRequestState::Closed),
                    ..UpdatePullRequest::default()
                };
                let pr = self
                    .github
                    .update_pr(owner, repo, number, close)
                    .await
                    .with_context(|| format!("Failed to close pull request #{number}"))?;
                info!(number, "closed pull request");
                Ok(PullRequestOutcome {
                    action: PullRequestAction::Closed,
                    number: Some(number),
                    url: Some(pr.html_url),
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_mocks::MockGitHub;
    use rebasebot_core::{AttemptStatus, Targets};

    fn oid(n: u8) -> Oid {
        Oid::from_bytes(&[n; 20]).unwrap()
    }

    fn targets() -> Targets {
        Targets {
            source: "https://github.com/kubernetes/kubernetes:master".parse().unwrap(),
            dest: "openshift/kubernetes:main".parse().unwrap(),
            rebase: "openshift-bot/kubernetes:rebase".parse().unwrap(),
        }
    }

    /// One lookup-then-sync round, as the controller does it.
    async fn round(
        sync: &PullRequestSync<'_, MockGitHub>,
        planner: &PullRequestPlanner,
        attempt: &RebaseAttempt,
        head: Option<Oid>,
    ) -> PullRequestOutcome {
        let tracked = sync.lookup().await.unwrap();
        sync.sync(planner, tracked.as_ref(), attempt, head)
            .await
            .unwrap()
    }

    fn succeeded() -> RebaseAttempt {
        let mut attempt = RebaseAttempt::new(oid(1), oid(2), oid(3));
        attempt.status = AttemptStatus::Succeeded;
        attempt
    }

    #[tokio::test]
    async fn test_first_run_creates_then_second_is_unchanged() {
        let t = targets();
        let github = MockGitHub::new();
        let planner = PullRequestPlanner::new(&t, "Merge {source} into {dest}");
        let sync = PullRequestSync::new(&github, &t.dest, &t.rebase);

        let first = round(&sync, &planner, &succeeded(), Some(oid(9))).await;
        assert_eq!(first.action, PullRequestAction::Created);
        assert_eq!(first.number, Some(1));

        let created = github.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].head, "openshift-bot:rebase");
        assert_eq!(created[0].base, "main");
        assert!(!created[0].maintainer_can_modify);

        let second = round(&sync, &planner, &succeeded(), Some(oid(9))).await;
        assert_eq!(second.action, PullRequestAction::Unchanged);
        assert_eq!(github.write_count(), 1);
    }

    #[tokio::test]
    async fn test_new_head_updates_existing() {
        let t = targets();
        let github = MockGitHub::new();
        let planner = PullRequestPlanner::new(&t, "Merge");
        let sync = PullRequestSync::new(&github, &t.dest, &t.rebase);

        round(&sync, &planner, &succeeded(), Some(oid(9))).await;
        let outcome = round(&sync, &planner, &succeeded(), Some(oid(10))).await;

        assert_eq!(outcome.action, PullRequestAction::Updated);
        assert_eq!(github.open_count(), 1);
        assert_eq!(github.created.lock().unwrap().len(), 1);
        assert!(github.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_closes_with_comment() {
        let t = targets();
        let github = MockGitHub::new();
        let planner = PullRequestPlanner::new(&t, "Merge");
        let sync = PullRequestSync::new(&github, &t.dest, &t.rebase);
        round(&sync, &planner, &succeeded(), Some(oid(9))).await;

        let mut noop = RebaseAttempt::new(oid(1), oid(1), oid(1));
        noop.noop = true;
        noop.status = AttemptStatus::Succeeded;
        let outcome = round(&sync, &planner, &noop, None).await;

        assert_eq!(outcome.action, PullRequestAction::Closed);
        assert_eq!(github.open_count(), 0);
        assert_eq!(github.comments.lock().unwrap().len(), 1);

        let again = round(&sync, &planner, &noop, None).await;
        assert_eq!(again.action, PullRequestAction::None);
    }

    #[tokio::test]
    async fn test_oldest_of_duplicates_is_tracked() {
        let t = targets();
        let github = MockGitHub::new()
            .with_open_pr(12, "openshift-bot", "rebase", "main", "")
            .with_open_pr(5, "openshift-bot", "rebase", "main", "");
        let sync = PullRequestSync::new(&github, &t.dest, &t.rebase);

        let tracked = sync.lookup().await.unwrap().unwrap();
        assert_eq!(tracked.id, 5);
        assert_eq!(tracked.head_ref, "openshift-bot:rebase");
    }
}
