//! Repository wrapper providing high-level git operations.

use std::path::Path;

use git2::{BranchType, DiffOptions, IndexAddOption, Oid, RepositoryState, Signature, Sort, Time};
use tracing::debug;

use crate::commit::{CommitInfo, Identity, short_id};
use crate::error::{Error, Result};

/// High-level wrapper around a git repository.
pub struct Repository {
    pub(crate) inner: git2::Repository,
}

impl Repository {
    /// Open the repository rooted exactly at `path`.
    ///
    /// Unlike discovery this never walks up into a parent repository, so a
    /// working directory nested inside another checkout stays isolated.
    ///
    /// # Errors
    /// Returns error if no repository exists at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::open(path).map_err(|_| Error::NotARepository)?;
        Ok(Self { inner })
    }

    /// Create an empty repository at `path`.
    ///
    /// # Errors
    /// Returns error if initialization fails.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::init(path)?;
        Ok(Self { inner })
    }

    /// Get the path to the repository root (workdir).
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    /// Get the path to the .git directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        self.inner.path()
    }

    /// Get the current repository state.
    #[must_use]
    pub fn state(&self) -> RepositoryState {
        self.inner.state()
    }

    /// Fail with [`Error::WorkspaceCorrupted`] if an operation was left half
    /// finished or the index still carries conflict entries.
    ///
    /// # Errors
    /// Returns `WorkspaceCorrupted` on any unexpected state.
    pub fn verify_idle(&self) -> Result<()> {
        let state = self.state();
        if state != RepositoryState::Clean {
            return Err(Error::WorkspaceCorrupted(format!(
                "repository left in state {state:?}"
            )));
        }
        if self.inner.index()?.has_conflicts() {
            return Err(Error::WorkspaceCorrupted(
                "index contains conflict entries".into(),
            ));
        }
        Ok(())
    }

    // === Branch operations ===

    /// Get the commit SHA for a local branch.
    ///
    /// # Errors
    /// Returns error if branch doesn't exist.
    pub fn branch_commit(&self, branch_name: &str) -> Result<Oid> {
        let branch = self
            .inner
            .find_branch(branch_name, BranchType::Local)
            .map_err(|_| Error::RefNotFound(branch_name.into()))?;

        branch
            .get()
            .target()
            .ok_or_else(|| Error::RefNotFound(branch_name.into()))
    }

    /// Check if a local branch exists.
    #[must_use]
    pub fn branch_exists(&self, name: &str) -> bool {
        self.inner.find_branch(name, BranchType::Local).is_ok()
    }

    /// Resolve a full reference name (`refs/...`) to a commit id.
    #[must_use]
    pub fn reference_commit(&self, name: &str) -> Option<Oid> {
        self.inner
            .find_reference(name)
            .ok()
            .and_then(|r| r.peel_to_commit().ok())
            .map(|c| c.id())
    }

    /// Resolve a revision expression (hex id, abbreviated id) to a commit.
    #[must_use]
    pub fn revparse_commit(&self, spec: &str) -> Option<Oid> {
        self.inner
            .revparse_single(spec)
            .ok()
            .and_then(|o| o.peel_to_commit().ok())
            .map(|c| c.id())
    }

    // === Working directory state ===

    /// Check if the working directory is clean.
    ///
    /// # Errors
    /// Returns error if status check fails.
    pub fn is_clean(&self) -> Result<bool> {
        let statuses = self.inner.statuses(None)?;
        Ok(statuses.is_empty())
    }

    // === Commit operations ===

    /// Get a commit by its SHA.
    ///
    /// # Errors
    /// Returns error if commit not found.
    pub fn find_commit(&self, oid: Oid) -> Result<git2::Commit<'_>> {
        Ok(self.inner.find_commit(oid)?)
    }

    /// Read commit metadata, including paths changed against the first parent.
    ///
    /// # Errors
    /// Returns error if the commit or its trees cannot be read.
    pub fn commit_info(&self, oid: Oid) -> Result<CommitInfo> {
        let commit = self.inner.find_commit(oid)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };

        let mut opts = DiffOptions::new();
        opts.include_typechange(true);
        let diff =
            self.inner
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        let mut changed_paths: Vec<String> = diff
            .deltas()
            .filter_map(|d| d.new_file().path().or_else(|| d.old_file().path()))
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        changed_paths.sort();
        changed_paths.dedup();

        let author = commit.author();
        Ok(CommitInfo {
            id: oid,
            parent_ids: commit.parent_ids().collect(),
            author: Identity::new(
                author.name().unwrap_or_default(),
                author.email().unwrap_or_default(),
            ),
            authored_at: author.when().seconds(),
            committed_at: commit.committer().when().seconds(),
            message: commit.message().unwrap_or_default().to_string(),
            changed_paths,
        })
    }

    /// Get the tree id of a commit.
    ///
    /// # Errors
    /// Returns error if the commit is missing.
    pub fn tree_id(&self, commit: Oid) -> Result<Oid> {
        Ok(self.inner.find_commit(commit)?.tree_id())
    }

    /// Get the merge base between two commits.
    ///
    /// # Errors
    /// Returns error if merge base calculation fails.
    pub fn merge_base(&self, one: Oid, two: Oid) -> Result<Oid> {
        Ok(self.inner.merge_base(one, two)?)
    }

    /// Check if `ancestor` is reachable from `descendant` (or equal to it).
    ///
    /// # Errors
    /// Returns error if the graph walk fails.
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.inner.graph_descendant_of(descendant, ancestor)?)
    }

    /// Commits reachable from `to` but not from `from`, parents before children.
    ///
    /// The walk order depends only on the commit graph, never on wall-clock
    /// time or local state.
    ///
    /// # Errors
    /// Returns error if revwalk fails.
    pub fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(to)?;
        revwalk.hide(from)?;

        revwalk.map(|r| r.map_err(Error::from)).collect()
    }

    // === Reset operations ===

    /// Point a local branch at `target`, creating it if needed.
    ///
    /// If the branch is checked out the working directory is hard reset too.
    ///
    /// # Errors
    /// Returns error if reset fails, or `WorkspaceCorrupted` if the branch
    /// does not point at `target` afterwards.
    pub fn reset_branch(&self, branch_name: &str, target: Oid) -> Result<()> {
        let commit = self.inner.find_commit(target)?;
        let reference_name = format!("refs/heads/{branch_name}");

        self.inner.reference(
            &reference_name,
            target,
            true,
            &format!("rebasebot: reset to {}", short_id(target)),
        )?;

        let head_is_branch = self
            .inner
            .head()
            .ok()
            .and_then(|h| h.name().map(String::from))
            .is_some_and(|name| name == reference_name);
        if head_is_branch {
            self.inner
                .reset(commit.as_object(), git2::ResetType::Hard, None)?;
        }

        let landed = self.branch_commit(branch_name)?;
        if landed != target {
            return Err(Error::WorkspaceCorrupted(format!(
                "branch {branch_name} is at {landed} after reset to {target}"
            )));
        }

        Ok(())
    }

    /// Reset `branch_name` to `target` and check it out, discarding any
    /// working-tree changes.
    ///
    /// # Errors
    /// Returns error if the reset or checkout fails.
    pub fn checkout_branch_at(&self, branch_name: &str, target: Oid) -> Result<()> {
        self.reset_branch(branch_name, target)?;
        self.inner.set_head(&format!("refs/heads/{branch_name}"))?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.inner.checkout_head(Some(&mut checkout))?;
        debug!(branch = branch_name, commit = %short_id(target), "checked out");
        Ok(())
    }

    /// Overwrite `paths` in the working tree with their content at `from`.
    ///
    /// Paths absent from `from` are left untouched. Returns the paths that
    /// were restored.
    ///
    /// # Errors
    /// Returns error if checkout fails.
    pub fn restore_paths(&self, from: Oid, paths: &[String]) -> Result<Vec<String>> {
        let commit = self.inner.find_commit(from)?;
        let tree = commit.tree()?;
        let present: Vec<&String> = paths
            .iter()
            .filter(|p| tree.get_path(Path::new(p.as_str())).is_ok())
            .collect();

        if present.is_empty() {
            return Ok(vec![]);
        }

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        for path in &present {
            checkout.path(path.as_str());
        }
        self.inner
            .checkout_tree(commit.as_object(), Some(&mut checkout))?;

        Ok(present.into_iter().cloned().collect())
    }

    /// Stage every change in the working tree and commit it on HEAD.
    ///
    /// Returns `None` when the resulting tree equals HEAD's tree. The commit
    /// is stamped with `when` (seconds since the epoch) so repeated runs over
    /// the same inputs produce the same id.
    ///
    /// # Errors
    /// Returns error if staging or committing fails.
    pub fn commit_all(&self, message: &str, identity: &Identity, when: i64) -> Result<Option<Oid>> {
        let mut index = self.inner.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let head = self.inner.head()?.peel_to_commit()?;
        if head.tree_id() == tree_id {
            return Ok(None);
        }

        let tree = self.inner.find_tree(tree_id)?;
        let sig = Signature::new(&identity.name, &identity.email, &Time::new(when, 0))?;
        let oid = self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head])?;
        Ok(Some(oid))
    }

    // === Low-level access ===

    /// Get a reference to the underlying git2 repository.
    ///
    /// Use sparingly - prefer high-level methods.
    #[must_use]
    pub const fn inner(&self) -> &git2::Repository {
        &self.inner
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.git_dir())
            .finish()
    }
}
