//! Authentication handling for GitHub API.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Authentication method for GitHub API.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Read the token from a file (trailing whitespace ignored).
    TokenFile(PathBuf),

    /// Use token from environment variable.
    EnvVar(String),

    /// Use a specific token.
    Token(SecretString),
}

impl Auth {
    /// Use `file` if given, otherwise the `GITHUB_TOKEN` environment variable.
    #[must_use]
    pub fn from_file_or_env(file: Option<PathBuf>) -> Self {
        file.map_or_else(|| Self::EnvVar("GITHUB_TOKEN".into()), Self::TokenFile)
    }

    /// Resolve the authentication to a token.
    ///
    /// # Errors
    /// Returns error if token cannot be obtained or is empty.
    pub fn resolve(&self) -> Result<SecretString> {
        let raw = match self {
            Self::TokenFile(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::NoToken(format!("cannot read {}: {e}", path.display()))
            })?,
            Self::EnvVar(var) => {
                std::env::var(var).map_err(|_| Error::NoToken(format!("{var} is not set")))?
            }
            Self::Token(t) => t.expose_secret().to_string(),
        };

        let token = raw.trim();
        if token.is_empty() {
            return Err(Error::NoToken("token is empty".into()));
        }
        Ok(SecretString::from(token.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_token_auth() {
        let auth = Auth::Token(SecretString::from("test_token"));
        assert_eq!(auth.resolve().unwrap().expose_secret(), "test_token");
    }

    #[test]
    fn test_token_file_is_trimmed() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "ghs_abc123\n").unwrap();
        let auth = Auth::TokenFile(file.path().to_path_buf());
        assert_eq!(auth.resolve().unwrap().expose_secret(), "ghs_abc123");
    }

    #[test]
    fn test_empty_token_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "  \n").unwrap();
        let auth = Auth::TokenFile(file.path().to_path_buf());
        assert!(matches!(auth.resolve(), Err(Error::NoToken(_))));
    }

    #[test]
    fn test_missing_token_file() {
        let auth = Auth::from_file_or_env(Some("/nonexistent/token".into()));
        assert!(matches!(auth.resolve(), Err(Error::NoToken(_))));
    }

    #[test]
    fn test_missing_env_var() {
        let auth = Auth::EnvVar("REBASEBOT_TEST_UNSET_TOKEN_VAR".into());
        assert!(matches!(auth.resolve(), Err(Error::NoToken(_))));
    }
}
