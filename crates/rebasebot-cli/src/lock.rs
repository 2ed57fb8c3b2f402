//! Exclusive lock on a working directory.
//!
//! Two bots sharing a working copy would corrupt it, so every run holds an
//! advisory lock on `<working dir>.lock` for as long as it touches the
//! workspace. The lock file sits beside the directory so that discarding
//! and re-cloning the workspace keeps the lock.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use tracing::debug;

pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Take the lock for `working_dir` without waiting.
    ///
    /// # Errors
    /// Returns error if another process holds the lock or the lock file
    /// cannot be created.
    pub fn acquire(working_dir: &Path) -> Result<Self> {
        let path = lock_path(working_dir);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == std::io::ErrorKind::WouldBlock {
                bail!(
                    "another rebasebot run holds {}; refusing to share the working directory",
                    path.display()
                );
            }
            return Err(err).with_context(|| format!("Failed to lock {}", path.display()));
        }

        let _ = file.set_len(0);
        let _ = writeln!(file, "pid={}", std::process::id());
        let _ = writeln!(file, "working_dir={}", working_dir.display());
        let _ = writeln!(file, "acquired_at={}", chrono::Utc::now().to_rfc3339());
        let _ = file.sync_data();
        debug!(path = %path.display(), "workspace lock acquired");

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// `<dir>.lock`, next to the directory.
fn lock_path(working_dir: &Path) -> PathBuf {
    let mut name = working_dir
        .file_name()
        .map_or_else(|| ".rebase".into(), std::ffi::OsStr::to_os_string);
    name.push(".lock");
    working_dir.with_file_name(name)
}
