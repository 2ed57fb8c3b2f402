//! Read-only commit metadata and committer identity.

use git2::Oid;

/// A name/email pair used for authoring or committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new("rebasebot", "rebasebot@users.noreply.github.com")
    }
}

/// Commit metadata as read from the object database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit id.
    pub id: Oid,
    /// Parent ids, first parent first.
    pub parent_ids: Vec<Oid>,
    /// Original author.
    pub author: Identity,
    /// Author time in seconds since the epoch.
    pub authored_at: i64,
    /// Committer time in seconds since the epoch.
    pub committed_at: i64,
    /// Full commit message.
    pub message: String,
    /// Paths touched relative to the first parent, sorted.
    pub changed_paths: Vec<String>,
}

impl CommitInfo {
    /// First line of the commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Whether this commit has more than one parent.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// Abbreviated commit id.
    #[must_use]
    pub fn short_id(&self) -> String {
        short_id(self.id)
    }
}

/// Abbreviate a commit id to 12 hex characters.
#[must_use]
pub fn short_id(id: Oid) -> String {
    let mut full = id.to_string();
    full.truncate(12);
    full
}
