//! Repository and branch references.
//!
//! Provides [`RefName`], a validated branch or tag name, and the two
//! location forms the bot accepts: [`SourceRef`] (`<git url>:<ref>`) and
//! [`GitHubRef`] (`<owner>/<repo>:<branch>`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A validated git branch, tag or commit name.
///
/// Names are later substituted into refspecs and hook commands, so besides
/// git's own rules shell metacharacters are rejected as well.
///
/// # Examples
///
/// ```
/// use rebasebot_core::RefName;
///
/// assert!(RefName::new("release-4.16").is_ok());
/// assert!(RefName::new("rebasebot/main").is_ok());
/// assert!(RefName::new("../etc/passwd").is_err());
/// assert!(RefName::new("main;rm -rf").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefName(String);

impl RefName {
    /// Create a new validated name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRef`] if the name violates git's ref naming
    /// rules or contains shell metacharacters.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        validate_ref_name(&name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for RefName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for RefName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

const GIT_FORBIDDEN: &[char] = &[' ', '~', '^', ':', '?', '*', '['];
const SHELL_META: &[char] = &[
    '$', ';', '|', '&', '>', '<', '`', '\\', '"', '\'', '(', ')', '{', '}', '!',
];

fn validate_ref_name(name: &str) -> Result<(), Error> {
    let reject = |reason: String| {
        Err(Error::InvalidRef {
            value: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("name cannot be empty".into());
    }
    if name == "@" {
        return reject("name cannot be '@'".into());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return reject("name cannot start or end with '.'".into());
    }
    #[allow(clippy::case_sensitive_file_extension_comparisons)]
    if name.ends_with(".lock") {
        return reject("name cannot end with '.lock'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return reject("name cannot start or end with '/'".into());
    }
    if let Some(c) = name.chars().find(char::is_ascii_control) {
        return reject(format!("name cannot contain control character {c:?}"));
    }
    if let Some(c) = name.chars().find(|c| GIT_FORBIDDEN.contains(c)) {
        return reject(format!("name cannot contain '{c}'"));
    }
    if let Some(c) = name.chars().find(|c| SHELL_META.contains(c)) {
        return reject(format!("name cannot contain shell metacharacter '{c}'"));
    }
    for seq in ["..", "//", "@{", "/."] {
        if name.contains(seq) {
            return reject(format!("name cannot contain '{seq}'"));
        }
    }

    Ok(())
}

/// Upstream location: any git URL plus a branch, tag or commit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub url: String,
    pub reference: RefName,
}

impl FromStr for SourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidRef {
            value: s.to_string(),
            reason: format!("{reason}; expected <git url>:<ref>"),
        };

        let (url, reference) = s.rsplit_once(':').ok_or_else(|| invalid("missing ':'"))?;
        if !is_git_url(url) {
            return Err(invalid("not a git url"));
        }
        Ok(Self {
            url: url.to_string(),
            reference: RefName::new(reference).map_err(|_| invalid("invalid ref"))?,
        })
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.url, self.reference)
    }
}

/// `scheme://...`, an absolute path, or scp-like `user@host:path`.
fn is_git_url(url: &str) -> bool {
    if let Some((scheme, rest)) = url.split_once("://") {
        return !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            && !rest.is_empty();
    }
    if url.starts_with('/') {
        return url.len() > 1;
    }
    url.split_once('@')
        .and_then(|(user, rest)| rest.split_once(':').map(|(host, path)| (user, host, path)))
        .is_some_and(|(user, host, path)| !user.is_empty() && !host.is_empty() && !path.is_empty())
}

/// A branch in a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRef {
    pub owner: String,
    pub repo: String,
    pub branch: RefName,
}

impl GitHubRef {
    /// Clone URL of the repository under `web_url` (e.g. `https://github.com`).
    #[must_use]
    pub fn clone_url(&self, web_url: &str) -> String {
        format!(
            "{}/{}/{}.git",
            web_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }

    /// Whether both refs name the same repository.
    #[must_use]
    pub fn same_repo(&self, other: &Self) -> bool {
        self.owner == other.owner && self.repo == other.repo
    }

    /// The bot branch used when none is configured: `rebasebot/<branch>` in
    /// the same repository.
    #[must_use]
    pub fn default_rebase_branch(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: RefName(format!("rebasebot/{}", self.branch)),
        }
    }
}

impl FromStr for GitHubRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidRef {
            value: s.to_string(),
            reason: format!("{reason}; expected <owner>/<repo>:<branch>"),
        };

        let (owner, rest) = s.split_once('/').ok_or_else(|| invalid("missing '/'"))?;
        let (repo, branch) = rest.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        if owner.is_empty() || repo.is_empty() {
            return Err(invalid("owner and repository are required"));
        }
        if repo.contains('/') {
            return Err(invalid("repository name cannot contain '/'"));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: RefName::new(branch).map_err(|_| invalid("invalid branch"))?,
        })
    }
}

impl fmt::Display for GitHubRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.repo, self.branch)
    }
}

macro_rules! serde_via_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_str!(SourceRef);
serde_via_str!(GitHubRef);

impl FromStr for RefName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

serde_via_str!(RefName);

/// Identifies one (source, destination) pair across runs.
#[must_use]
pub fn pair_key(source: &SourceRef, dest: &GitHubRef) -> String {
    format!("{source} -> {dest}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ref_names() {
        for name in [
            "main",
            "release-4.16",
            "rebasebot/main",
            "v1.0.0",
            "user@feature",
            "0123456789abcdef",
        ] {
            assert!(RefName::new(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_ref_names() {
        for name in [
            "",
            "@",
            ".hidden",
            "branch.",
            "branch.lock",
            "/branch",
            "branch/",
            "a..b",
            "a//b",
            "a/.b",
            "a@{1}",
            "a b",
            "a:b",
            "a\tb",
            "a$(whoami)",
            "a;rm -rf /",
        ] {
            let err = RefName::new(name).unwrap_err();
            assert!(matches!(err, Error::InvalidRef { .. }), "{name:?}");
        }
    }

    #[test]
    fn test_source_ref_splits_on_last_colon() {
        let r: SourceRef = "https://github.com/kubernetes/kubernetes:release-1.30"
            .parse()
            .unwrap();
        assert_eq!(r.url, "https://github.com/kubernetes/kubernetes");
        assert_eq!(r.reference, "release-1.30");

        let r: SourceRef = "git@github.com:org/up.git:main".parse().unwrap();
        assert_eq!(r.url, "git@github.com:org/up.git");

        let r: SourceRef = "/srv/git/up.git:v1.2.3".parse().unwrap();
        assert_eq!(r.to_string(), "/srv/git/up.git:v1.2.3");
    }

    #[test]
    fn test_source_ref_rejects_bad_input() {
        for s in ["main", "github.com/x:main", "https://github.com/x:", "https://:main"] {
            assert!(s.parse::<SourceRef>().is_err(), "{s}");
        }
    }

    #[test]
    fn test_github_ref_parse() {
        let r: GitHubRef = "openshift/cluster-api:main".parse().unwrap();
        assert_eq!(r.owner, "openshift");
        assert_eq!(r.repo, "cluster-api");
        assert_eq!(r.branch, "main");
        assert_eq!(r.to_string(), "openshift/cluster-api:main");
        assert_eq!(
            r.clone_url("https://github.com/"),
            "https://github.com/openshift/cluster-api.git"
        );
    }

    #[test]
    fn test_github_ref_rejects_bad_input() {
        for s in ["cluster-api:main", "org/repo", "/repo:main", "org/:main", "org/a/b:main"] {
            assert!(s.parse::<GitHubRef>().is_err(), "{s}");
        }
    }

    #[test]
    fn test_default_rebase_branch() {
        let dest: GitHubRef = "org/repo:release-4.16".parse().unwrap();
        let rebase = dest.default_rebase_branch();
        assert_eq!(rebase.to_string(), "org/repo:rebasebot/release-4.16");
        assert!(rebase.same_repo(&dest));
    }

    #[test]
    fn test_serde_roundtrip_through_strings() {
        let dest: GitHubRef = serde_json::from_str("\"org/repo:main\"").unwrap();
        assert_eq!(serde_json::to_string(&dest).unwrap(), "\"org/repo:main\"");
        assert!(serde_json::from_str::<GitHubRef>("\"bad\"").is_err());
    }

    #[test]
    fn test_pair_key() {
        let source: SourceRef = "https://git.example.com/up.git:main".parse().unwrap();
        let dest: GitHubRef = "org/repo:master".parse().unwrap();
        assert_eq!(
            pair_key(&source, &dest),
            "https://git.example.com/up.git:main -> org/repo:master"
        );
    }
}
