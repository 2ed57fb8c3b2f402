//! Pull-request lifecycle.
//!
//! This module decides what should happen to the single tracked pull request
//! of a (source, destination) pair. It never talks to a forge: callers look
//! the pull request up, ask [`PullRequestPlanner::plan`] for a [`PrAction`],
//! and carry it out.
//!
//! The body of every pull request the bot writes ends with a hidden marker
//! recording the pair, the attempt status and the head commit. Reading the
//! marker back is how a later run tells whether anything changed.

use std::fmt::Write as _;

use rebasebot_git::{Oid, short_id};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Targets;
use crate::model::{AttemptStatus, RebaseAttempt, abbrev};
use crate::refs::pair_key;

const MARKER_PREFIX: &str = "<!-- rebasebot: ";
const MARKER_SUFFIX: &str = " -->";
const MAX_MARKER_LINES: usize = 60;
const MAX_LISTED_CONFLICTS: usize = 20;

/// Forge-side state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeState {
    Open,
    Closed,
    Merged,
}

/// Lifecycle state of the tracked pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Absent,
    /// Open, last written for a conflicted attempt.
    OpenPending,
    /// Open, last written for a succeeded attempt.
    OpenReady,
    Closed,
}

/// The pull request the bot tracks for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPullRequest {
    pub id: u64,
    pub head_ref: String,
    pub base_ref: String,
    pub state: ForgeState,
    /// Head the bot last recorded, or the forge's head if no marker exists.
    pub last_known_head_commit: Option<String>,
    pub body: String,
    pub url: String,
}

impl TrackedPullRequest {
    /// The marker embedded in the body, if the bot wrote one.
    #[must_use]
    pub fn marker(&self) -> Option<Marker> {
        Marker::parse(&self.body)
    }

    /// Lifecycle state derived from forge state and the marker.
    #[must_use]
    pub fn lifecycle(&self) -> PrState {
        match self.state {
            ForgeState::Closed | ForgeState::Merged => PrState::Closed,
            ForgeState::Open => match self.marker().map(|m| m.status) {
                Some(AttemptStatus::Succeeded) => PrState::OpenReady,
                _ => PrState::OpenPending,
            },
        }
    }
}

/// Hidden state stored in the pull request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub pair: String,
    pub status: AttemptStatus,
    pub head: Option<String>,
}

impl Marker {
    /// Find and decode the marker in `body`.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let start = body.rfind(MARKER_PREFIX)? + MARKER_PREFIX.len();
        let end = body[start..].find(MARKER_SUFFIX)? + start;
        serde_json::from_str(&body[start..end]).ok()
    }

    fn render(&self) -> String {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{MARKER_PREFIX}{json}{MARKER_SUFFIX}")
    }
}

/// What to do with the tracked pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrAction {
    /// No pull request exists and none is needed.
    Nothing { reason: &'static str },
    /// The tracked pull request already reflects this attempt.
    Unchanged { number: u64 },
    Create { title: String, body: String },
    Update {
        number: u64,
        body: String,
        /// Posted when the attempt status changed.
        comment: Option<String>,
    },
    Close { number: u64, comment: String },
}

impl PrAction {
    /// Whether carrying out this action writes to the forge.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::Update { .. } | Self::Close { .. }
        )
    }
}

/// Renders pull request content and plans lifecycle transitions for a pair.
#[derive(Debug, Clone)]
pub struct PullRequestPlanner {
    pair: String,
    source: String,
    dest: String,
    title: String,
}

impl PullRequestPlanner {
    /// `title_template` may use `{source}` and `{dest}`.
    #[must_use]
    pub fn new(targets: &Targets, title_template: &str) -> Self {
        let source = targets.source.to_string();
        let dest = targets.dest.to_string();
        let title = title_template
            .replace("{source}", &source)
            .replace("{dest}", &dest);
        Self {
            pair: pair_key(&targets.source, &targets.dest),
            source,
            dest,
            title,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Decide the transition for `attempt`.
    ///
    /// `head` is the commit now on the rebase branch, or `None` when nothing
    /// was pushed for this attempt.
    #[must_use]
    pub fn plan(
        &self,
        tracked: Option<&TrackedPullRequest>,
        attempt: &RebaseAttempt,
        head: Option<Oid>,
    ) -> PrAction {
        let open = tracked.filter(|pr| pr.state == ForgeState::Open);

        if attempt.noop {
            return open.map_or(
                PrAction::Nothing {
                    reason: "destination already contains source",
                },
                |pr| PrAction::Close {
                    number: pr.id,
                    comment: format!(
                        "`{}` already contains all changes from `{}`. Closing.",
                        self.dest, self.source
                    ),
                },
            );
        }

        let Some(pr) = open else {
            return match head {
                None => PrAction::Nothing {
                    reason: "nothing was pushed",
                },
                // GitHub refuses a pull request without commits.
                Some(h) if h == attempt.destination_commit => PrAction::Nothing {
                    reason: "destination already matches the rebased branch",
                },
                Some(_) => PrAction::Create {
                    title: self.title.clone(),
                    body: self.body(attempt, head),
                },
            };
        };

        // Nothing pushed: describe the new attempt against the head already
        // on the branch.
        let head = head.map(|h| h.to_string()).or_else(|| {
            pr.marker()
                .and_then(|m| m.head)
                .or_else(|| pr.last_known_head_commit.clone())
        });
        let body = self.body_for_head(attempt, head.as_deref());
        let previous = pr.marker();

        if pr.last_known_head_commit == head
            && previous.as_ref().map(|m| m.status) == Some(attempt.status)
            && pr.body == body
        {
            debug!(number = pr.id, "pull request is up to date");
            return PrAction::Unchanged { number: pr.id };
        }

        let comment = match previous.map(|m| m.status) {
            Some(status) if status == attempt.status => None,
            _ => Some(self.status_comment(attempt)),
        };
        PrAction::Update {
            number: pr.id,
            body,
            comment,
        }
    }

    /// Body text for `attempt` with `head` on the rebase branch.
    #[must_use]
    pub fn body(&self, attempt: &RebaseAttempt, head: Option<Oid>) -> String {
        self.body_for_head(attempt, head.map(|h| h.to_string()).as_deref())
    }

    fn body_for_head(&self, attempt: &RebaseAttempt, head: Option<&str>) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Rebase of `{}` onto `{}`: **{}**.\n",
            self.dest, self.source, attempt.status
        );
        let _ = writeln!(out, "| | commit |\n|---|---|");
        let _ = writeln!(out, "| source | `{}` |", short_id(attempt.source_commit));
        let _ = writeln!(
            out,
            "| destination | `{}` |",
            short_id(attempt.destination_commit)
        );
        let _ = writeln!(
            out,
            "| merge base | `{}` |",
            short_id(attempt.merge_base_commit)
        );
        if let Some(head) = head {
            let _ = writeln!(out, "| head | `{}` |", abbrev(head));
        }

        if !attempt.replayed_commits.is_empty() {
            let _ = writeln!(out, "\n### Downstream commits\n");
            for commit in &attempt.replayed_commits {
                let _ = writeln!(out, "- `{}` {}", commit.short_id(), commit.summary());
            }
        }

        if !attempt.skipped.is_empty() {
            let _ = writeln!(out, "\n### Skipped\n");
            for skipped in &attempt.skipped {
                let _ = writeln!(
                    out,
                    "- `{}` {} ({})",
                    abbrev(&skipped.commit_id),
                    skipped.summary,
                    skipped.reason
                );
            }
        }

        if !attempt.resolutions.is_empty() {
            let _ = writeln!(out, "\n### Automatic conflict resolutions\n");
            let _ = writeln!(out, "| commit | path | strategy | rationale |\n|---|---|---|---|");
            for r in &attempt.resolutions {
                let _ = writeln!(
                    out,
                    "| `{}` | `{}` | {} | {} |",
                    abbrev(&r.commit_id),
                    r.path,
                    r.strategy,
                    r.rationale
                );
            }
        }

        if !attempt.hook_commits.is_empty() {
            let _ = writeln!(out, "\n### Hook commits\n");
            for id in &attempt.hook_commits {
                let _ = writeln!(out, "- `{}`", short_id(*id));
            }
        }

        if !attempt.conflicts.is_empty() {
            let _ = writeln!(
                out,
                "\n### Unresolved conflicts\n\nManual intervention is needed. \
                 The branch holds every commit replayed before the first conflict.\n"
            );
            for conflict in attempt.conflicts.iter().take(MAX_LISTED_CONFLICTS) {
                let _ = writeln!(
                    out,
                    "<details><summary><code>{}</code> in <code>{}</code> {}</summary>\n\n```",
                    conflict.path,
                    abbrev(&conflict.commit_id),
                    conflict.commit_summary
                );
                let lines: Vec<&str> = conflict.conflict_markers_or_diff.lines().collect();
                for line in lines.iter().take(MAX_MARKER_LINES) {
                    let _ = writeln!(out, "{line}");
                }
                if lines.len() > MAX_MARKER_LINES {
                    let _ = writeln!(out, "... {} more lines", lines.len() - MAX_MARKER_LINES);
                }
                let _ = writeln!(out, "```\n</details>\n");
            }
            if attempt.conflicts.len() > MAX_LISTED_CONFLICTS {
                let _ = writeln!(
                    out,
                    "... and {} more conflicting paths.",
                    attempt.conflicts.len() - MAX_LISTED_CONFLICTS
                );
            }
        }

        let marker = Marker {
            pair: self.pair.clone(),
            status: attempt.status,
            head: head.map(ToString::to_string),
        };
        let _ = write!(out, "\n{}", marker.render());
        out
    }

    fn status_comment(&self, attempt: &RebaseAttempt) -> String {
        match attempt.status {
            AttemptStatus::Conflicted => format!(
                "The rebase onto `{}` now has {} unresolved conflict(s). Manual intervention is needed.",
                self.source,
                attempt.conflicts.len()
            ),
            AttemptStatus::Succeeded => format!(
                "The rebase onto `{}` now applies cleanly.",
                self.source
            ),
            status => format!("Rebase status is now {status}."),
        }
    }
}
