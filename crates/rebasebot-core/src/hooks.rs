//! Post-rebase hooks.
//!
//! A hook restores a set of paths to their source-side content, runs shell
//! commands in the working copy and commits whatever changed on top of the
//! candidate tip. Hooks are how generated files (vendored modules, lock
//! files) are regenerated against the new upstream.

use std::process::Command;

use rebasebot_git::{GitOps, Identity, Oid, short_id};
use tracing::{debug, info};

use crate::config::HookConfig;
use crate::error::{Error, Result};

/// Local branch holding the candidate tip while hooks run and for pushing.
pub const CANDIDATE_BRANCH: &str = "rebasebot/candidate";

/// Runs configured hooks on a candidate tip.
pub struct HookRunner<'a, G: GitOps> {
    git: &'a G,
    committer: Identity,
}

impl<'a, G: GitOps> HookRunner<'a, G> {
    #[must_use]
    pub const fn new(git: &'a G, committer: Identity) -> Self {
        Self { git, committer }
    }

    /// Run `hooks` in order on `tip`.
    ///
    /// Returns the new tip and the commits the hooks added. A hook that
    /// changes nothing adds no commit. Each hook commit reuses the committer
    /// time of the tip it builds on, so identical inputs give identical ids.
    ///
    /// # Errors
    /// Returns [`Error::Hook`] when a command cannot be started or exits
    /// non-zero.
    pub fn run(
        &self,
        hooks: &[HookConfig],
        tip: Oid,
        source_commit: Oid,
    ) -> Result<(Oid, Vec<Oid>)> {
        if hooks.is_empty() {
            return Ok((tip, Vec::new()));
        }

        let workdir = self
            .git
            .workdir()
            .ok_or_else(|| Error::Configuration("hooks need a working tree".into()))?
            .to_path_buf();
        self.git.checkout_branch_at(CANDIDATE_BRANCH, tip)?;

        let mut current = tip;
        let mut added = Vec::new();

        for hook in hooks {
            info!(hook = %hook.name, tip = %short_id(current), "running hook");

            let restored = self
                .git
                .restore_paths(source_commit, &hook.restore_from_source)?;
            if !restored.is_empty() {
                debug!(hook = %hook.name, paths = ?restored, "restored from source");
            }

            for command in &hook.commands {
                let command = command.replace("{source_commit}", &source_commit.to_string());
                debug!(hook = %hook.name, %command, "running command");

                let output = Command::new("sh")
                    .arg("-c")
                    .arg(&command)
                    .current_dir(&workdir)
                    .output()
                    .map_err(|e| Error::Hook {
                        name: hook.name.clone(),
                        message: format!("failed to start '{command}': {e}"),
                    })?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Hook {
                        name: hook.name.clone(),
                        message: format!("'{command}' {}: {}", output.status, stderr.trim()),
                    });
                }
            }

            let when = self.git.commit_info(current)?.committed_at;
            match self.git.commit_all(&hook.commit_message, &self.committer, when)? {
                Some(commit) => {
                    info!(hook = %hook.name, commit = %short_id(commit), "hook committed changes");
                    added.push(commit);
                    current = commit;
                }
                None => debug!(hook = %hook.name, "hook made no changes"),
            }
        }

        Ok((current, added))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rebase::tests::fixture;

    fn hook(commands: &[&str], restore: &[&str]) -> HookConfig {
        HookConfig {
            name: "regen".into(),
            restore_from_source: restore.iter().map(ToString::to_string).collect(),
            commands: commands.iter().map(ToString::to_string).collect(),
            commit_message: "UPSTREAM: <carry>: regenerate".into(),
        }
    }

    #[test]
    fn test_no_hooks_keeps_tip() {
        let fx = fixture();
        let tip = fx.commit(&[], &[("a.txt", Some("a\n"))], "A", 1);
        let runner = HookRunner::new(&fx.ws, Identity::default());

        let (new_tip, added) = runner.run(&[], tip, tip).unwrap();
        assert_eq!(new_tip, tip);
        assert!(added.is_empty());
    }

    #[test]
    fn test_hook_commits_changes_on_candidate() {
        let fx = fixture();
        let source = fx.commit(&[], &[("go.mod", Some("upstream\n"))], "up", 1);
        let tip = fx.commit(&[source], &[("go.mod", Some("downstream\n"))], "carry", 2);
        let runner = HookRunner::new(&fx.ws, Identity::default());

        let hooks = [hook(&["echo {source_commit} > generated.txt"], &["go.mod"])];
        let (new_tip, added) = runner.run(&hooks, tip, source).unwrap();

        assert_eq!(added, vec![new_tip]);
        assert_eq!(fx.message(new_tip), "UPSTREAM: <carry>: regenerate");
        assert_eq!(fx.file(new_tip, "go.mod").as_deref(), Some("upstream\n"));
        assert_eq!(
            fx.file(new_tip, "generated.txt").unwrap().trim(),
            source.to_string()
        );
        let commit = fx.raw.find_commit(new_tip).unwrap();
        assert_eq!(commit.parent_id(0).unwrap(), tip);
        assert_eq!(commit.committer().when().seconds(), 2);
    }

    #[test]
    fn test_hook_without_changes_adds_nothing() {
        let fx = fixture();
        let tip = fx.commit(&[], &[("a.txt", Some("a\n"))], "A", 1);
        let runner = HookRunner::new(&fx.ws, Identity::default());

        let (new_tip, added) = runner.run(&[hook(&["true"], &[])], tip, tip).unwrap();
        assert_eq!(new_tip, tip);
        assert!(added.is_empty());
    }

    #[test]
    fn test_failing_command_is_hook_error() {
        let fx = fixture();
        let tip = fx.commit(&[], &[("a.txt", Some("a\n"))], "A", 1);
        let runner = HookRunner::new(&fx.ws, Identity::default());

        let err = runner
            .run(&[hook(&["echo broken >&2; exit 3"], &[])], tip, tip)
            .unwrap_err();
        match err {
            Error::Hook { name, message } => {
                assert_eq!(name, "regen");
                assert!(message.contains("broken"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
