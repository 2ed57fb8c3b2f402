//! In-memory replay of a single commit onto a new base.
//!
//! Replay never touches the working tree: the cherry-pick is computed into
//! an in-memory index, conflicting paths are resolved from explicit
//! per-path choices, and the result is written straight to the object
//! database. The same inputs always yield the same tree and commit ids.
//!
//! Sides follow the direction of the rebase: the *source* side is the base
//! being replayed onto (upstream), the *destination* side is the commit
//! being replayed (downstream).

use std::path::Path;

use git2::{FileFavor, IndexConflict, IndexEntry, IndexTime, MergeFileOptions, MergeOptions, Oid, Signature};
use tracing::debug;

use crate::commit::{Identity, short_id};
use crate::error::{Error, Result};
use crate::repository::Repository;

/// Stage bits in an index entry's flags.
const STAGE_MASK: u16 = 0x3000;
/// Path length bits in an index entry's flags.
const PATH_LEN_MASK: usize = 0x0fff;

/// How a conflicting path was shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides modified the same file.
    Content,
    /// Both sides added the path with different content.
    AddAdd,
    /// Upstream deleted a file the replayed commit modifies.
    DeletedBySource,
    /// The replayed commit deletes a file upstream modified.
    DeletedByDestination,
}

/// One conflicting path from a replay step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictedPath {
    pub path: String,
    pub ancestor: Option<Oid>,
    pub source: Option<Oid>,
    pub destination: Option<Oid>,
    /// Conflict-marked file content, or a description for delete conflicts.
    pub markers: String,
}

impl ConflictedPath {
    #[must_use]
    pub const fn kind(&self) -> ConflictKind {
        match (self.ancestor, self.source, self.destination) {
            (_, None, _) => ConflictKind::DeletedBySource,
            (_, _, None) => ConflictKind::DeletedByDestination,
            (None, _, _) => ConflictKind::AddAdd,
            _ => ConflictKind::Content,
        }
    }
}

/// Resolution applied to one conflicting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Keep destination-side content in conflicting regions.
    Destination,
    /// Keep source-side content in conflicting regions.
    Source,
    /// Drop the replayed commit's change to the path entirely.
    Omit,
    /// Resolve by deleting the path.
    Delete,
}

/// A [`Choice`] bound to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChoice {
    pub path: String,
    pub choice: Choice,
}

impl PathChoice {
    #[must_use]
    pub fn new(path: impl Into<String>, choice: Choice) -> Self {
        Self {
            path: path.into(),
            choice,
        }
    }
}

/// Result of replaying one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The replay produced this tree.
    Clean { tree: Oid },
    /// These paths conflict and no choice was supplied for them, sorted by path.
    Conflicted(Vec<ConflictedPath>),
}

fn entry_path(conflict: &IndexConflict) -> String {
    conflict
        .our
        .as_ref()
        .or(conflict.their.as_ref())
        .or(conflict.ancestor.as_ref())
        .map(|e| String::from_utf8_lossy(&e.path).into_owned())
        .unwrap_or_default()
}

/// Build a stage-0 entry for `path` with the given blob, borrowing the mode
/// of `template`.
fn stage_zero(template: &IndexEntry, id: Oid, size: usize) -> IndexEntry {
    let path = template.path.clone();
    #[allow(clippy::cast_possible_truncation)]
    let flags = (template.flags & !STAGE_MASK & !(PATH_LEN_MASK as u16))
        | (path.len().min(PATH_LEN_MASK) as u16);
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: template.mode,
        uid: 0,
        gid: 0,
        file_size: u32::try_from(size).unwrap_or(u32::MAX),
        id,
        flags,
        flags_extended: 0,
        path,
    }
}

impl Repository {
    fn replay_options() -> MergeOptions {
        let mut opts = MergeOptions::new();
        opts.find_renames(true);
        opts.target_limit(999_999);
        opts
    }

    fn empty_entry_like(&self, template: &IndexEntry) -> Result<IndexEntry> {
        let empty = self.inner.blob(b"")?;
        Ok(stage_zero(template, empty, 0))
    }

    /// Merge the two sides of a content conflict, returning the merged bytes.
    fn merge_sides(
        &self,
        conflict: &IndexConflict,
        favor: FileFavor,
        labels: Option<(&str, &str)>,
    ) -> Result<(Vec<u8>, u32)> {
        let (Some(ours), Some(theirs)) = (conflict.our.as_ref(), conflict.their.as_ref()) else {
            return Err(Error::UnresolvedConflicts(vec![entry_path(conflict)]));
        };
        let ancestor = match conflict.ancestor.as_ref() {
            Some(a) => stage_zero(a, a.id, a.file_size as usize),
            None => self.empty_entry_like(ours)?,
        };
        let mut opts = MergeFileOptions::new();
        opts.favor(favor);
        if let Some((source_label, destination_label)) = labels {
            opts.ancestor_label("merge-base")
                .our_label(source_label)
                .their_label(destination_label);
        }
        let merged = self
            .inner
            .merge_file_from_index(&ancestor, ours, theirs, Some(&mut opts))?;
        Ok((merged.content().to_vec(), merged.mode()))
    }

    fn describe_conflict(&self, conflict: &IndexConflict, label: &str) -> Result<String> {
        let path = entry_path(conflict);
        match (conflict.our.is_some(), conflict.their.is_some()) {
            (false, _) => Ok(format!(
                "{path}: deleted upstream, modified by {label}\n"
            )),
            (_, false) => Ok(format!(
                "{path}: modified upstream, deleted by {label}\n"
            )),
            _ => {
                let (bytes, _) =
                    self.merge_sides(conflict, FileFavor::Normal, Some(("source", label)))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    fn resolve_conflict(
        &self,
        index: &mut git2::Index,
        conflict: &IndexConflict,
        choice: Choice,
    ) -> Result<()> {
        let path = entry_path(conflict);
        let source = conflict.our.as_ref();
        let destination = conflict.their.as_ref();

        // (entry to keep whole, or favor to merge with)
        let resolved: Option<IndexEntry> = match choice {
            Choice::Delete => None,
            Choice::Omit => source.map(|e| stage_zero(e, e.id, e.file_size as usize)),
            Choice::Destination | Choice::Source => {
                let (favor, preferred, other) = if choice == Choice::Destination {
                    (FileFavor::Theirs, destination, source)
                } else {
                    (FileFavor::Ours, source, destination)
                };
                match (preferred, other) {
                    (None, _) => None,
                    (Some(keep), None) => Some(stage_zero(keep, keep.id, keep.file_size as usize)),
                    (Some(keep), Some(_)) => {
                        let (bytes, mode) = self.merge_sides(conflict, favor, None)?;
                        let blob = self.inner.blob(&bytes)?;
                        let mut entry = stage_zero(keep, blob, bytes.len());
                        entry.mode = mode;
                        Some(entry)
                    }
                }
            }
        };

        index.conflict_remove(Path::new(&path))?;
        if let Some(entry) = resolved {
            index.add(&entry)?;
        }
        debug!(path = %path, ?choice, "resolved conflict");
        Ok(())
    }

    /// Replay `commit` onto `onto`, resolving conflicts from `choices`.
    ///
    /// Conflicting paths without a matching choice are returned as
    /// [`ReplayOutcome::Conflicted`]; choices for paths that do not conflict
    /// are ignored.
    ///
    /// # Errors
    /// Returns error if either commit is missing or the merge machinery fails.
    pub fn replay_tree(
        &self,
        commit: Oid,
        onto: Oid,
        choices: &[PathChoice],
    ) -> Result<ReplayOutcome> {
        let picked = self.inner.find_commit(commit)?;
        let base = self.inner.find_commit(onto)?;
        let mainline = u32::from(picked.parent_count() > 1);

        let mut index =
            self.inner
                .cherrypick_commit(&picked, &base, mainline, Some(&Self::replay_options()))?;

        if index.has_conflicts() {
            let mut conflicts: Vec<IndexConflict> =
                index.conflicts()?.collect::<std::result::Result<_, _>>()?;
            conflicts.sort_by_key(entry_path);

            let label = format!("{} ({})", short_id(commit), picked.summary().unwrap_or(""));
            let mut unresolved = Vec::new();
            for conflict in &conflicts {
                let path = entry_path(conflict);
                match choices.iter().find(|c| c.path == path) {
                    Some(c) => self.resolve_conflict(&mut index, conflict, c.choice)?,
                    None => unresolved.push(ConflictedPath {
                        markers: self.describe_conflict(conflict, &label)?,
                        ancestor: conflict.ancestor.as_ref().map(|e| e.id),
                        source: conflict.our.as_ref().map(|e| e.id),
                        destination: conflict.their.as_ref().map(|e| e.id),
                        path,
                    }),
                }
            }
            if !unresolved.is_empty() {
                return Ok(ReplayOutcome::Conflicted(unresolved));
            }
        }

        let tree = index.write_tree_to(&self.inner)?;
        Ok(ReplayOutcome::Clean { tree })
    }

    /// Write a commit replaying `original` with `tree` on top of `parent`.
    ///
    /// Author, author time, message and commit time are copied from the
    /// original; only the committer identity changes. No reference is moved.
    ///
    /// # Errors
    /// Returns error if objects cannot be read or written.
    pub fn commit_replayed(
        &self,
        original: Oid,
        tree: Oid,
        parent: Oid,
        committer: &Identity,
    ) -> Result<Oid> {
        let original = self.inner.find_commit(original)?;
        let tree = self.inner.find_tree(tree)?;
        let parent = self.inner.find_commit(parent)?;
        let committer = Signature::new(
            &committer.name,
            &committer.email,
            &original.committer().when(),
        )?;
        let message = original.message_raw().unwrap_or_default();
        Ok(self
            .inner
            .commit(None, &original.author(), &committer, message, &tree, &[&parent])?)
    }
}
