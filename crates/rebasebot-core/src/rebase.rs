//! The rebase engine.
//!
//! Replays the commits unique to the destination branch on top of the
//! source commit, in parent-first order, asking the conflict resolver to
//! decide conflicting paths. The replay stops at the first step it cannot
//! resolve and keeps the partial result.

use rebasebot_git::{GitOps, Identity, Oid, ReplayOutcome, short_id};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{
    AppliedCommit, AttemptStatus, Commit, ConflictReport, RebaseAttempt, Resolution, SkipReason,
    SkippedCommit,
};
use crate::resolver::ConflictResolver;

/// Replays destination-only commits onto a new source commit.
pub struct RebaseEngine<'a, G: GitOps> {
    git: &'a G,
    resolver: &'a ConflictResolver,
    committer: Identity,
}

impl<'a, G: GitOps> RebaseEngine<'a, G> {
    #[must_use]
    pub const fn new(git: &'a G, resolver: &'a ConflictResolver, committer: Identity) -> Self {
        Self {
            git,
            resolver,
            committer,
        }
    }

    /// Rebase `destination` onto `source`.
    ///
    /// Conflicts are an outcome, not an error: they come back as a
    /// `conflicted` attempt with reports attached.
    ///
    /// # Errors
    /// Returns error if history cannot be read or objects cannot be written.
    pub fn rebase(&self, source: Oid, destination: Oid) -> Result<RebaseAttempt> {
        let merge_base = self.git.merge_base(source, destination)?;
        let mut attempt = RebaseAttempt::new(source, destination, merge_base);

        let pending = self.git.commits_between(merge_base, destination)?;
        attempt.replayed_commits = pending
            .iter()
            .map(|id| self.git.commit_info(*id).map(|info| Commit::from(&info)))
            .collect::<std::result::Result<_, _>>()?;

        info!(
            source = %short_id(source),
            destination = %short_id(destination),
            merge_base = %short_id(merge_base),
            commits = pending.len(),
            "rebasing"
        );

        if pending.is_empty() && self.git.is_ancestor(source, destination)? {
            info!("destination already contains source");
            attempt.noop = true;
            attempt.status = AttemptStatus::Succeeded;
            attempt.tip = Some(destination);
            return Ok(attempt);
        }

        let mut base = source;
        for (id, commit) in pending.iter().zip(attempt.replayed_commits.clone()) {
            let info = self.git.commit_info(*id)?;

            if info.is_merge() {
                debug!(commit = %info.short_id(), "skipping merge commit");
                attempt.skipped.push(SkippedCommit {
                    commit_id: commit.id.clone(),
                    summary: commit.summary().to_string(),
                    reason: SkipReason::MergeCommit,
                });
                continue;
            }

            if info.parent_ids.first() == Some(&base) {
                debug!(commit = %info.short_id(), "parent matches base, reusing");
                attempt.applied.push(AppliedCommit {
                    original: *id,
                    replayed: *id,
                    reused: true,
                });
                base = *id;
                continue;
            }

            match self.replay_one(*id, base, &commit, &mut attempt)? {
                Step::Applied(tree) => {
                    if tree == self.git.tree_id(base)? {
                        debug!(commit = %info.short_id(), "no changes left, skipping");
                        attempt.skipped.push(SkippedCommit {
                            commit_id: commit.id.clone(),
                            summary: commit.summary().to_string(),
                            reason: SkipReason::AlreadyApplied,
                        });
                        continue;
                    }
                    let replayed = self.git.commit_replayed(*id, tree, base, &self.committer)?;
                    attempt.applied.push(AppliedCommit {
                        original: *id,
                        replayed,
                        reused: false,
                    });
                    base = replayed;
                }
                Step::Stopped => {
                    warn!(
                        commit = %info.short_id(),
                        conflicts = attempt.conflicts.len(),
                        "unresolved conflicts, stopping replay"
                    );
                    attempt.status = AttemptStatus::Conflicted;
                    attempt.tip = Some(base);
                    return Ok(attempt);
                }
            }
        }

        attempt.status = AttemptStatus::Succeeded;
        attempt.tip = Some(base);
        info!(
            tip = %short_id(base),
            replayed = attempt.applied.len(),
            skipped = attempt.skipped.len(),
            "rebase succeeded"
        );
        Ok(attempt)
    }

    fn replay_one(
        &self,
        id: Oid,
        base: Oid,
        commit: &Commit,
        attempt: &mut RebaseAttempt,
    ) -> Result<Step> {
        let conflicts = match self.git.replay_tree(id, base, &[])? {
            ReplayOutcome::Clean { tree } => return Ok(Step::Applied(tree)),
            ReplayOutcome::Conflicted(conflicts) => conflicts,
        };

        let outcome = self.resolver.resolve(&conflicts);
        if !outcome.is_resolved() {
            attempt.conflicts.extend(
                outcome
                    .unresolved
                    .iter()
                    .map(|c| ConflictReport::new(commit, c)),
            );
            return Ok(Step::Stopped);
        }

        match self.git.replay_tree(id, base, &outcome.choices)? {
            ReplayOutcome::Clean { tree } => {
                attempt
                    .resolutions
                    .extend(outcome.decisions.into_iter().map(|d| Resolution {
                        commit_id: commit.id.clone(),
                        path: d.path,
                        strategy: d.strategy,
                        rationale: d.rationale,
                    }));
                Ok(Step::Applied(tree))
            }
            ReplayOutcome::Conflicted(left) => {
                attempt
                    .conflicts
                    .extend(left.iter().map(|c| ConflictReport::new(commit, c)));
                Ok(Step::Stopped)
            }
        }
    }
}

enum Step {
    Applied(Oid),
    Stopped,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::resolver::Strategy;
    use git2::{Signature, Time};
    use rebasebot_git::{RemoteSpec, Workspace};
    use std::path::Path;
    use tempfile::TempDir;

    /// A workspace plus a raw handle for building history.
    pub(crate) struct Fixture {
        pub temp: TempDir,
        pub ws: Workspace,
        pub raw: git2::Repository,
    }

    pub(crate) fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ws");
        let ws =
            Workspace::ensure_clone(&path, vec![RemoteSpec::new("source", "/nonexistent", None)])
                .unwrap();
        let raw = git2::Repository::open(&path).unwrap();
        Fixture { temp, ws, raw }
    }

    impl Fixture {
        /// Write a commit with `files` on top of `parents` without touching HEAD.
        pub(crate) fn commit(
            &self,
            parents: &[Oid],
            files: &[(&str, Option<&str>)],
            message: &str,
            time: i64,
        ) -> Oid {
            let base_tree = parents
                .first()
                .map(|p| self.raw.find_commit(*p).unwrap().tree().unwrap());
            let mut index = git2::Index::new().unwrap();
            if let Some(tree) = &base_tree {
                index.read_tree(tree).unwrap();
            }
            for (path, content) in files {
                match content {
                    Some(text) => {
                        let blob = self.raw.blob(text.as_bytes()).unwrap();
                        let entry = git2::IndexEntry {
                            ctime: git2::IndexTime::new(0, 0),
                            mtime: git2::IndexTime::new(0, 0),
                            dev: 0,
                            ino: 0,
                            mode: 0o100_644,
                            uid: 0,
                            gid: 0,
                            file_size: u32::try_from(text.len()).unwrap(),
                            id: blob,
                            flags: u16::try_from(path.len()).unwrap(),
                            flags_extended: 0,
                            path: path.as_bytes().to_vec(),
                        };
                        index.add(&entry).unwrap();
                    }
                    None => index.remove(Path::new(path), 0).unwrap(),
                }
            }
            let tree_id = index.write_tree_to(&self.raw).unwrap();
            let tree = self.raw.find_tree(tree_id).unwrap();
            let sig = Signature::new("Dev", "dev@example.com", &Time::new(time, 0)).unwrap();
            let parent_commits: Vec<git2::Commit<'_>> = parents
                .iter()
                .map(|p| self.raw.find_commit(*p).unwrap())
                .collect();
            let refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();
            self.raw
                .commit(None, &sig, &sig, message, &tree, &refs)
                .unwrap()
        }

        pub(crate) fn file(&self, commit: Oid, path: &str) -> Option<String> {
            let tree = self.raw.find_commit(commit).unwrap().tree().unwrap();
            let entry = tree.get_path(Path::new(path)).ok()?;
            let blob = self.raw.find_blob(entry.id()).unwrap();
            Some(String::from_utf8_lossy(blob.content()).into_owned())
        }

        pub(crate) fn message(&self, commit: Oid) -> String {
            self.raw
                .find_commit(commit)
                .unwrap()
                .message()
                .unwrap()
                .to_string()
        }
    }

    fn engine<'a>(fx: &'a Fixture, resolver: &'a ConflictResolver) -> RebaseEngine<'a, Workspace> {
        RebaseEngine::new(&fx.ws, resolver, Identity::new("bot", "bot@example.com"))
    }

    #[test]
    fn test_identical_refs_are_noop() {
        let fx = fixture();
        let a = fx.commit(&[], &[("a.txt", Some("a\n"))], "A", 1);
        let resolver = ConflictResolver::default();

        let attempt = engine(&fx, &resolver).rebase(a, a).unwrap();
        assert!(attempt.noop);
        assert_eq!(attempt.status, AttemptStatus::Succeeded);
        assert_eq!(attempt.tip, Some(a));
    }

    #[test]
    fn test_destination_ahead_reuses_commits() {
        // source [A, B], destination [A, B, D1, D2]
        let fx = fixture();
        let a = fx.commit(&[], &[("a.txt", Some("a\n"))], "A", 1);
        let b = fx.commit(&[a], &[("b.txt", Some("b\n"))], "B", 2);
        let d1 = fx.commit(&[b], &[("d1.txt", Some("1\n"))], "D1", 3);
        let d2 = fx.commit(&[d1], &[("d2.txt", Some("2\n"))], "D2", 4);
        let resolver = ConflictResolver::default();

        let attempt = engine(&fx, &resolver).rebase(b, d2).unwrap();
        assert!(!attempt.noop);
        assert_eq!(attempt.status, AttemptStatus::Succeeded);
        assert_eq!(attempt.merge_base_commit, b);
        assert_eq!(
            attempt.replayed_commits.iter().map(|c| c.summary()).collect::<Vec<_>>(),
            vec!["D1", "D2"]
        );
        assert_eq!(attempt.tip, Some(d2));
        assert!(attempt.applied.iter().all(|a| a.reused));
    }

    #[test]
    fn test_replay_preserves_order_and_is_deterministic() {
        let fx = fixture();
        let base = fx.commit(&[], &[("a.txt", Some("a\n"))], "base", 1);
        let up = fx.commit(&[base], &[("up.txt", Some("up\n"))], "upstream", 2);
        let d1 = fx.commit(&[base], &[("d1.txt", Some("1\n"))], "carry: one", 3);
        let d2 = fx.commit(&[d1], &[("d2.txt", Some("2\n"))], "carry: two", 4);
        let resolver = ConflictResolver::default();

        let first = engine(&fx, &resolver).rebase(up, d2).unwrap();
        let second = engine(&fx, &resolver).rebase(up, d2).unwrap();

        assert_eq!(first.status, AttemptStatus::Succeeded);
        assert_eq!(first.tip, second.tip);
        let tip = first.tip.unwrap();
        assert_eq!(fx.message(tip), "carry: two");
        let parent = fx.raw.find_commit(tip).unwrap().parent_id(0).unwrap();
        assert_eq!(fx.message(parent), "carry: one");
        assert_eq!(fx.raw.find_commit(parent).unwrap().parent_id(0).unwrap(), up);
        assert_eq!(fx.file(tip, "up.txt").as_deref(), Some("up\n"));
        assert_eq!(fx.file(tip, "d1.txt").as_deref(), Some("1\n"));
    }

    #[test]
    fn test_conflict_stops_with_partial_progress() {
        let fx = fixture();
        let base = fx.commit(&[], &[("a.txt", Some("a\n"))], "base", 1);
        let up = fx.commit(&[base], &[("a.txt", Some("upstream\n"))], "upstream", 2);
        let d1 = fx.commit(&[base], &[("d1.txt", Some("1\n"))], "carry: clean", 3);
        let d2 = fx.commit(&[d1], &[("a.txt", Some("downstream\n"))], "carry: clash", 4);
        let d3 = fx.commit(&[d2], &[("d3.txt", Some("3\n"))], "carry: after", 5);
        let resolver = ConflictResolver::default();

        let attempt = engine(&fx, &resolver).rebase(up, d3).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Conflicted);
        assert_eq!(attempt.conflicts.len(), 1);
        assert_eq!(attempt.conflicts[0].path, "a.txt");
        assert_eq!(attempt.conflicts[0].commit_id, d2.to_string());
        assert!(attempt.has_progress());
        assert_eq!(attempt.applied.len(), 1);
        assert_eq!(fx.message(attempt.tip.unwrap()), "carry: clean");
    }

    #[test]
    fn test_resolved_conflicts_are_audited() {
        let fx = fixture();
        let base = fx.commit(&[], &[("a.txt", Some("a\n"))], "base", 1);
        let up = fx.commit(&[base], &[("a.txt", Some("upstream\n"))], "upstream", 2);
        let d1 = fx.commit(&[base], &[("a.txt", Some("downstream\n"))], "carry: clash", 3);
        let resolver =
            ConflictResolver::new(vec![Strategy::new(StrategyKind::TakeOurs, vec!["*.txt".into()])]);

        let attempt = engine(&fx, &resolver).rebase(up, d1).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Succeeded);
        assert_eq!(attempt.resolutions.len(), 1);
        assert_eq!(attempt.resolutions[0].strategy, StrategyKind::TakeOurs);
        assert_eq!(attempt.resolutions[0].commit_id, d1.to_string());
        assert_eq!(fx.file(attempt.tip.unwrap(), "a.txt").as_deref(), Some("downstream\n"));
    }

    #[test]
    fn test_merge_and_already_applied_commits_are_recorded() {
        let fx = fixture();
        let base = fx.commit(&[], &[("a.txt", Some("a\n"))], "base", 1);
        let up = fx.commit(&[base], &[("fix.txt", Some("fix\n"))], "upstream fix", 2);
        // downstream cherry-picked the same fix, then merged a side branch
        let d1 = fx.commit(&[base], &[("fix.txt", Some("fix\n"))], "carry: fix", 3);
        let side = fx.commit(&[base], &[("side.txt", Some("s\n"))], "side", 4);
        let merge = fx.commit(&[d1, side], &[("side.txt", Some("s\n"))], "Merge side", 5);
        let resolver = ConflictResolver::default();

        let attempt = engine(&fx, &resolver).rebase(up, merge).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Succeeded);
        let reasons: Vec<(String, SkipReason)> = attempt
            .skipped
            .iter()
            .map(|s| (s.summary.clone(), s.reason))
            .collect();
        assert!(reasons.contains(&("carry: fix".into(), SkipReason::AlreadyApplied)));
        assert!(reasons.contains(&("Merge side".into(), SkipReason::MergeCommit)));
        assert_eq!(attempt.replayed_commits.len(), 3);
        assert_eq!(
            fx.file(attempt.tip.unwrap(), "side.txt").as_deref(),
            Some("s\n")
        );
    }
}
