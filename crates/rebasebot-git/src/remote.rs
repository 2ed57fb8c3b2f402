//! Fetch and push against the configured remotes.

use std::cell::{Cell, RefCell};

use git2::{Cred, Direction, FetchOptions, Oid, PushOptions, RemoteCallbacks};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::commit::short_id;
use crate::error::{Error, Result};
use crate::repository::Repository;

/// HTTPS credentials presented to authenticated remotes.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub token: SecretString,
}

impl Credentials {
    /// Token credentials in the form GitHub expects for app and user tokens.
    #[must_use]
    pub fn access_token(token: SecretString) -> Self {
        Self {
            username: "x-access-token".into(),
            token,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// A remote to configure in the workspace.
#[derive(Debug, Clone)]
pub struct RemoteSpec {
    pub name: String,
    pub url: String,
    /// Offered to this remote only. `None` means anonymous access.
    pub credentials: Option<Credentials>,
}

impl RemoteSpec {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            credentials,
        }
    }
}

/// How a push treats the remote branch's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Plain push; the remote refuses anything but a fast-forward.
    FastForwardOnly,
    /// Overwrite the remote branch only if it still points at the given
    /// commit (`None` meaning the branch must not exist).
    ForceWithLease(Option<Oid>),
}

fn callbacks(credentials: Option<&Credentials>) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(creds) = credentials {
        // libgit2 keeps asking while the server rejects; offer the token once.
        let offered = Cell::new(false);
        callbacks.credentials(move |_url, _username, _allowed| {
            if offered.replace(true) {
                return Err(git2::Error::new(
                    git2::ErrorCode::Auth,
                    git2::ErrorClass::Http,
                    "credentials rejected",
                ));
            }
            Cred::userpass_plaintext(&creds.username, creds.token.expose_secret())
        });
    }
    callbacks
}

impl Repository {
    /// Create `name` pointing at `url`, or repoint it if the URL changed.
    ///
    /// # Errors
    /// Returns error if the remote configuration cannot be written.
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.inner.find_remote(name) {
            Ok(remote) if remote.url() == Some(url) => Ok(()),
            Ok(_) => {
                debug!(remote = name, url, "updating remote url");
                self.inner.remote_set_url(name, url)?;
                Ok(())
            }
            Err(_) => {
                debug!(remote = name, url, "adding remote");
                self.inner.remote(name, url)?;
                Ok(())
            }
        }
    }

    /// List the refs advertised by a remote.
    ///
    /// # Errors
    /// Returns `Network` or `Authentication` errors on transport failure.
    pub fn list_remote_refs(
        &self,
        remote_name: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<(String, Oid)>> {
        let mut remote = self
            .inner
            .find_remote(remote_name)
            .map_err(|_| Error::RemoteNotFound(remote_name.into()))?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(callbacks(credentials)), None)
            .map_err(|e| Error::from_remote(remote_name, e))?;
        let heads = connection
            .list()
            .map_err(|e| Error::from_remote(remote_name, e))?
            .iter()
            .map(|head| (head.name().to_string(), head.oid()))
            .collect();
        Ok(heads)
    }

    /// Current value of `refs/heads/<branch>` on the remote, if it exists.
    ///
    /// # Errors
    /// Returns `Network` or `Authentication` errors on transport failure.
    pub fn remote_head(
        &self,
        remote_name: &str,
        branch: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Oid>> {
        let wanted = format!("refs/heads/{branch}");
        Ok(self
            .list_remote_refs(remote_name, credentials)?
            .into_iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, oid)| oid))
    }

    fn fetch_refspecs(
        &self,
        remote_name: &str,
        refspecs: &[String],
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let mut remote = self
            .inner
            .find_remote(remote_name)
            .map_err(|_| Error::RemoteNotFound(remote_name.into()))?;
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks(credentials));
        opts.download_tags(git2::AutotagOption::None);
        remote
            .fetch(refspecs, Some(&mut opts), None)
            .map_err(|e| Error::from_remote(remote_name, e))?;
        Ok(())
    }

    /// Fetch `reference` from a remote and resolve it to a commit.
    ///
    /// Branches land in `refs/remotes/<remote>/<branch>`, tags in
    /// `refs/tags/<tag>`. A reference naming neither is treated as a commit
    /// id and resolved after fetching every branch of the remote.
    ///
    /// # Errors
    /// Returns `RefNotFound` if the reference cannot be resolved, or a
    /// `Network`/`Authentication` error on transport failure.
    pub fn fetch_ref(
        &self,
        remote_name: &str,
        reference: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Oid> {
        let advertised = self.list_remote_refs(remote_name, credentials)?;
        let has = |name: &str| advertised.iter().any(|(n, _)| n == name);

        let branch_ref = format!("refs/heads/{reference}");
        let tag_ref = format!("refs/tags/{reference}");

        let (refspec, local) = if has(&branch_ref) {
            let local = format!("refs/remotes/{remote_name}/{reference}");
            (format!("+{branch_ref}:{local}"), Some(local))
        } else if has(&tag_ref) {
            (format!("+{tag_ref}:{tag_ref}"), Some(tag_ref.clone()))
        } else {
            (format!("+refs/heads/*:refs/remotes/{remote_name}/*"), None)
        };

        info!(remote = remote_name, reference, "fetching");
        self.fetch_refspecs(remote_name, &[refspec], credentials)?;

        let resolved = match local {
            Some(name) => self.reference_commit(&name),
            None if looks_like_commit_id(reference) => self.revparse_commit(reference),
            None => None,
        };
        let oid = resolved.ok_or_else(|| Error::RefNotFound(format!("{remote_name}:{reference}")))?;
        debug!(remote = remote_name, reference, commit = %short_id(oid), "resolved");
        Ok(oid)
    }

    /// Fetch a branch that may legitimately be missing on the remote.
    ///
    /// When the branch is gone the local tracking ref is deleted so stale
    /// state from earlier runs cannot leak into this one.
    ///
    /// # Errors
    /// Returns a `Network`/`Authentication` error on transport failure.
    pub fn fetch_optional(
        &self,
        remote_name: &str,
        branch: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Oid>> {
        let local = format!("refs/remotes/{remote_name}/{branch}");
        if self.remote_head(remote_name, branch, credentials)?.is_none() {
            if let Ok(mut stale) = self.inner.find_reference(&local) {
                stale.delete()?;
            }
            debug!(remote = remote_name, branch, "branch absent on remote");
            return Ok(None);
        }
        self.fetch_refspecs(
            remote_name,
            &[format!("+refs/heads/{branch}:{local}")],
            credentials,
        )?;
        Ok(self.reference_commit(&local))
    }

    /// Push a local branch to `remote_branch` on a remote.
    ///
    /// # Errors
    /// Returns `PushRejected` if the remote refuses the update or the lease
    /// no longer holds.
    pub fn push(
        &self,
        remote_name: &str,
        local_branch: &str,
        remote_branch: &str,
        mode: PushMode,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        if let PushMode::ForceWithLease(expected) = mode {
            let current = self.remote_head(remote_name, remote_branch, credentials)?;
            if current != expected {
                return Err(Error::PushRejected {
                    branch: remote_branch.into(),
                    detail: format!(
                        "remote is at {}, expected {}",
                        current.map_or_else(|| "nothing".into(), short_id),
                        expected.map_or_else(|| "nothing".into(), short_id),
                    ),
                });
            }
        }

        let mut remote = self
            .inner
            .find_remote(remote_name)
            .map_err(|_| Error::RemoteNotFound(remote_name.into()))?;

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut cbs = callbacks(credentials);
        cbs.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *rejection.borrow_mut() = Some(msg.to_string());
            }
            Ok(())
        });
        let mut opts = PushOptions::new();
        opts.remote_callbacks(cbs);

        let force = if matches!(mode, PushMode::ForceWithLease(_)) { "+" } else { "" };
        let refspec = format!("{force}refs/heads/{local_branch}:refs/heads/{remote_branch}");
        info!(remote = remote_name, branch = remote_branch, "pushing");

        let result = remote.push(&[refspec.as_str()], Some(&mut opts));
        drop(opts);
        match result {
            Err(e) if e.code() == git2::ErrorCode::NotFastForward => {
                return Err(Error::PushRejected {
                    branch: remote_branch.into(),
                    detail: e.message().to_string(),
                });
            }
            Err(e) => return Err(Error::from_remote(remote_name, e)),
            Ok(()) => {}
        }

        if let Some(detail) = rejection.into_inner() {
            return Err(Error::PushRejected {
                branch: remote_branch.into(),
                detail,
            });
        }
        Ok(())
    }
}

fn looks_like_commit_id(reference: &str) -> bool {
    (7..=40).contains(&reference.len()) && reference.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repository::tests::commit_files;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        upstream: git2::Repository,
        local: Repository,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let upstream = git2::Repository::init(temp.path().join("upstream")).unwrap();
        commit_files(&upstream, &[("a.txt", Some("a\n"))], "A", 1_000);
        let local = Repository::init(temp.path().join("local")).unwrap();
        let url = temp.path().join("upstream").to_string_lossy().into_owned();
        local.ensure_remote("source", &url).unwrap();
        Fixture {
            _temp: temp,
            upstream,
            local,
        }
    }

    fn upstream_branch(fx: &Fixture) -> String {
        fx.upstream.head().unwrap().shorthand().unwrap().to_string()
    }

    #[test]
    fn test_fetch_branch() {
        let fx = fixture();
        let head = fx.upstream.head().unwrap().target().unwrap();
        let branch = upstream_branch(&fx);

        let oid = fx.local.fetch_ref("source", &branch, None).unwrap();
        assert_eq!(oid, head);
        assert_eq!(
            fx.local
                .reference_commit(&format!("refs/remotes/source/{branch}")),
            Some(head)
        );
    }

    #[test]
    fn test_fetch_tag_and_commit_id() {
        let fx = fixture();
        let head = fx.upstream.head().unwrap().target().unwrap();
        let obj = fx.upstream.find_object(head, None).unwrap();
        fx.upstream.tag_lightweight("v1.0.0", &obj, false).unwrap();

        assert_eq!(fx.local.fetch_ref("source", "v1.0.0", None).unwrap(), head);
        let full = head.to_string();
        assert_eq!(fx.local.fetch_ref("source", &full, None).unwrap(), head);
    }

    #[test]
    fn test_fetch_unknown_ref() {
        let fx = fixture();
        let err = fx.local.fetch_ref("source", "no-such-branch", None).unwrap_err();
        assert!(matches!(err, Error::RefNotFound(_)));
    }

    #[test]
    fn test_fetch_optional_missing_branch() {
        let fx = fixture();
        assert_eq!(fx.local.fetch_optional("source", "rebase", None).unwrap(), None);
    }

    #[test]
    fn test_ensure_remote_updates_url() {
        let fx = fixture();
        fx.local.ensure_remote("source", "/tmp/elsewhere").unwrap();
        let remote = fx.local.inner().find_remote("source").unwrap();
        assert_eq!(remote.url(), Some("/tmp/elsewhere"));
    }

    #[test]
    fn test_push_with_stale_lease_is_rejected() {
        let fx = fixture();
        let branch = upstream_branch(&fx);
        let head = fx.local.fetch_ref("source", &branch, None).unwrap();
        fx.local.reset_branch("candidate", head).unwrap();

        let err = fx
            .local
            .push(
                "source",
                "candidate",
                &branch,
                PushMode::ForceWithLease(None),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::PushRejected { .. }));
    }

    #[test]
    fn test_push_new_branch() {
        let fx = fixture();
        let branch = upstream_branch(&fx);
        let head = fx.local.fetch_ref("source", &branch, None).unwrap();
        fx.local.reset_branch("candidate", head).unwrap();

        fx.local
            .push(
                "source",
                "candidate",
                "rebasebot/main",
                PushMode::ForceWithLease(None),
                None,
            )
            .unwrap();
        assert_eq!(
            fx.local.remote_head("source", "rebasebot/main", None).unwrap(),
            Some(head)
        );
    }

    #[test]
    fn test_commit_id_detection() {
        assert!(looks_like_commit_id("deadbeef"));
        assert!(!looks_like_commit_id("main"));
        assert!(!looks_like_commit_id("abc"));
    }
}
