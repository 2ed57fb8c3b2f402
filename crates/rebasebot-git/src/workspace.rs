//! The bot's local working copy and its remotes.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::remote::{Credentials, RemoteSpec};
use crate::repository::Repository;

/// A single repository in the working directory with the bot's remotes
/// configured.
#[derive(Debug)]
pub struct Workspace {
    pub(crate) repo: Repository,
    pub(crate) path: PathBuf,
    pub(crate) remotes: Vec<RemoteSpec>,
}

impl Workspace {
    /// Open the repository at `path`, creating it if the directory is
    /// missing or empty, and configure `remotes`. Each remote keeps its own
    /// credentials.
    ///
    /// # Errors
    /// Returns `WorkspaceCorrupted` if the directory holds something other
    /// than a usable repository, or if a previous run left an operation
    /// half finished.
    pub fn ensure_clone(
        path: impl AsRef<Path>,
        remotes: Vec<RemoteSpec>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let repo = if is_missing_or_empty(&path) {
            info!(path = %path.display(), "initialising workspace");
            std::fs::create_dir_all(&path).map_err(|e| {
                Error::WorkspaceCorrupted(format!("cannot create {}: {e}", path.display()))
            })?;
            Repository::init(&path)?
        } else {
            Repository::open(&path).map_err(|_| {
                Error::WorkspaceCorrupted(format!("{} is not a git repository", path.display()))
            })?
        };

        repo.verify_idle()?;
        for remote in &remotes {
            repo.ensure_remote(&remote.name, &remote.url)?;
        }

        Ok(Self {
            repo,
            path,
            remotes,
        })
    }

    /// Delete the working directory so the next `ensure_clone` starts over.
    ///
    /// # Errors
    /// Returns `WorkspaceCorrupted` if the directory cannot be removed.
    pub fn discard(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            warn!(path = %path.display(), "discarding workspace");
            std::fs::remove_dir_all(path).map_err(|e| {
                Error::WorkspaceCorrupted(format!("cannot remove {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }

    /// Path of the working directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Credentials configured for `remote`, if any.
    pub(crate) fn credentials_for(&self, remote: &str) -> Option<&Credentials> {
        self.remotes
            .iter()
            .find(|r| r.name == remote)
            .and_then(|r| r.credentials.as_ref())
    }
}

fn is_missing_or_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
}
