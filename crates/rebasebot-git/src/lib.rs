//! # rebasebot-git
//!
//! Workspace primitives for rebasebot, built on git2-rs.
//! Provides the bot's working copy with its remotes, fetch and push with
//! token credentials, and in-memory replay of commits onto a new base.

mod commit;
mod error;
mod remote;
mod replay;
mod repository;
mod traits;
mod workspace;

pub use commit::{CommitInfo, Identity, short_id};
pub use error::{Error, Result};
pub use git2::Oid;
pub use remote::{Credentials, PushMode, RemoteSpec};
pub use replay::{Choice, ConflictKind, ConflictedPath, PathChoice, ReplayOutcome};
pub use repository::Repository;
pub use traits::GitOps;
pub use workspace::Workspace;
