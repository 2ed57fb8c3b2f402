//! Automated conflict resolution.
//!
//! Each conflicting path is offered to the configured strategies in order;
//! the first strategy whose patterns match and that knows how to handle the
//! conflict's shape decides it. A matching `decline` strategy, or running
//! out of strategies, leaves the path unresolved.

use glob_match::glob_match;
use rebasebot_git::{Choice, ConflictKind, ConflictedPath, PathChoice};
use tracing::debug;

use crate::config::{StrategyConfig, StrategyKind};

/// A strategy scoped to a set of glob patterns.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub kind: StrategyKind,
    patterns: Vec<String>,
}

impl Strategy {
    #[must_use]
    pub fn new(kind: StrategyKind, patterns: Vec<String>) -> Self {
        Self { kind, patterns }
    }

    /// Whether `path` is in scope. No patterns means every path.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| glob_match(p, path))
    }

    /// The choice this strategy makes for `conflict`, if it handles its kind.
    fn choose(&self, conflict: &ConflictedPath) -> Option<Choice> {
        let deletion = matches!(
            conflict.kind(),
            ConflictKind::DeletedBySource | ConflictKind::DeletedByDestination
        );
        match self.kind {
            StrategyKind::TakeOurs => Some(Choice::Destination),
            StrategyKind::TakeTheirs => Some(Choice::Source),
            StrategyKind::PathExclusion => Some(Choice::Omit),
            StrategyKind::AcceptDeletion if deletion => Some(Choice::Delete),
            StrategyKind::AcceptDeletion | StrategyKind::Decline => None,
        }
    }

    fn rationale(&self, conflict: &ConflictedPath) -> String {
        match self.kind {
            StrategyKind::TakeOurs => "kept downstream content in conflicting regions".into(),
            StrategyKind::TakeTheirs => "kept upstream content in conflicting regions".into(),
            StrategyKind::PathExclusion => "dropped the downstream change to this path".into(),
            StrategyKind::AcceptDeletion => match conflict.kind() {
                ConflictKind::DeletedBySource => "file was deleted upstream".into(),
                _ => "file was deleted downstream".into(),
            },
            StrategyKind::Decline => String::new(),
        }
    }
}

impl From<&StrategyConfig> for Strategy {
    fn from(config: &StrategyConfig) -> Self {
        Self::new(config.kind, config.paths.clone())
    }
}

/// One automated decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub path: String,
    pub strategy: StrategyKind,
    pub rationale: String,
}

/// Result of resolving one replay step's conflicts.
#[derive(Debug, Clone, Default)]
pub struct ResolverOutcome {
    /// Choices to feed back into the replay.
    pub choices: Vec<PathChoice>,
    /// Audit trail for `choices`, same order.
    pub decisions: Vec<Decision>,
    /// Paths no strategy resolved.
    pub unresolved: Vec<ConflictedPath>,
}

impl ResolverOutcome {
    /// Whether every conflict got a choice.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Applies an ordered list of strategies to conflicting paths.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    strategies: Vec<Strategy>,
}

impl ConflictResolver {
    #[must_use]
    pub const fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Build from configuration, preserving order.
    #[must_use]
    pub fn from_config(configs: &[StrategyConfig]) -> Self {
        Self::new(configs.iter().map(Strategy::from).collect())
    }

    /// Decide every conflict in `conflicts`.
    #[must_use]
    pub fn resolve(&self, conflicts: &[ConflictedPath]) -> ResolverOutcome {
        let mut outcome = ResolverOutcome::default();

        for conflict in conflicts {
            let decided = self
                .strategies
                .iter()
                .filter(|s| s.matches(&conflict.path))
                .map_while(|s| (s.kind != StrategyKind::Decline).then_some(s))
                .find_map(|s| s.choose(conflict).map(|choice| (s, choice)));

            if let Some((strategy, choice)) = decided {
                debug!(path = %conflict.path, strategy = %strategy.kind, "conflict resolved");
                outcome
                    .choices
                    .push(PathChoice::new(conflict.path.clone(), choice));
                outcome.decisions.push(Decision {
                    path: conflict.path.clone(),
                    strategy: strategy.kind,
                    rationale: strategy.rationale(conflict),
                });
            } else {
                debug!(path = %conflict.path, "conflict declined");
                outcome.unresolved.push(conflict.clone());
            }
        }

        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rebasebot_git::Oid;

    fn oid(n: u8) -> Option<Oid> {
        Some(Oid::from_bytes(&[n; 20]).unwrap())
    }

    fn content(path: &str) -> ConflictedPath {
        ConflictedPath {
            path: path.into(),
            ancestor: oid(1),
            source: oid(2),
            destination: oid(3),
            markers: String::new(),
        }
    }

    fn deleted_upstream(path: &str) -> ConflictedPath {
        ConflictedPath {
            source: None,
            ..content(path)
        }
    }

    fn strategy(kind: StrategyKind, paths: &[&str]) -> Strategy {
        Strategy::new(kind, paths.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_no_strategies_declines_everything() {
        let outcome = ConflictResolver::default().resolve(&[content("a.go")]);
        assert!(!outcome.is_resolved());
        assert!(outcome.choices.is_empty());
    }

    #[test]
    fn test_first_matching_strategy_wins() {
        let resolver = ConflictResolver::new(vec![
            strategy(StrategyKind::TakeTheirs, &["vendor/**"]),
            strategy(StrategyKind::TakeOurs, &[]),
        ]);
        let outcome = resolver.resolve(&[content("vendor/k8s.io/api/types.go"), content("main.go")]);

        assert!(outcome.is_resolved());
        assert_eq!(
            outcome.choices,
            vec![
                PathChoice::new("vendor/k8s.io/api/types.go", Choice::Source),
                PathChoice::new("main.go", Choice::Destination),
            ]
        );
        assert_eq!(outcome.decisions[0].strategy, StrategyKind::TakeTheirs);
        assert_eq!(outcome.decisions[1].strategy, StrategyKind::TakeOurs);
    }

    #[test]
    fn test_accept_deletion_only_handles_deletes() {
        let resolver = ConflictResolver::new(vec![strategy(StrategyKind::AcceptDeletion, &[])]);
        let outcome = resolver.resolve(&[deleted_upstream("old.go"), content("main.go")]);

        assert_eq!(outcome.choices, vec![PathChoice::new("old.go", Choice::Delete)]);
        assert_eq!(outcome.decisions[0].rationale, "file was deleted upstream");
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(outcome.unresolved[0].path, "main.go");
    }

    #[test]
    fn test_accept_deletion_falls_through_to_later_strategies() {
        let resolver = ConflictResolver::new(vec![
            strategy(StrategyKind::AcceptDeletion, &[]),
            strategy(StrategyKind::PathExclusion, &["docs/**"]),
        ]);
        let outcome = resolver.resolve(&[content("docs/README.md")]);
        assert_eq!(
            outcome.choices,
            vec![PathChoice::new("docs/README.md", Choice::Omit)]
        );
    }

    #[test]
    fn test_decline_stops_later_strategies() {
        let resolver = ConflictResolver::new(vec![
            strategy(StrategyKind::Decline, &["api/**"]),
            strategy(StrategyKind::TakeOurs, &[]),
        ]);
        let outcome = resolver.resolve(&[content("api/v1/types.go"), content("cmd/main.go")]);

        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(outcome.unresolved[0].path, "api/v1/types.go");
        assert_eq!(outcome.choices, vec![PathChoice::new("cmd/main.go", Choice::Destination)]);
    }

    #[test]
    fn test_glob_scope() {
        let s = strategy(StrategyKind::TakeOurs, &["*.md", "vendor/**"]);
        assert!(s.matches("README.md"));
        assert!(!s.matches("docs/README.md"));
        assert!(s.matches("vendor/a/b/c.go"));
        assert!(!s.matches("main.go"));
    }
}
