//! Ordered rule collection and first-match resolution.

use std::path::{Path, PathBuf};

use crate::rule::Rule;

/// The full ordered set of active rules.
///
/// Built wholesale by the loader and never edited in place. Resolution has no
/// hidden state, so two sets built from the same file resolve identically.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a set from rules in any order; precedence is taken from `rank`.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(Rule::rank);
        Self { rules }
    }

    /// A set that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// The first rule (lowest rank) whose pattern matches the base name of
    /// `name`. `None` is the no-match result.
    pub fn resolve(&self, name: impl AsRef<Path>) -> Option<&Rule> {
        self.matches(name).next()
    }

    /// Target directory of the winning rule.
    pub fn resolve_target(&self, name: impl AsRef<Path>) -> Option<&Path> {
        self.resolve(name).map(Rule::target)
    }

    /// Every matching rule, highest precedence first.
    ///
    /// Only the base name is considered; any directory component of `name`
    /// is dropped before matching.
    pub fn matches(&self, name: impl AsRef<Path>) -> impl Iterator<Item = &Rule> {
        let base: Option<PathBuf> = name.as_ref().file_name().map(PathBuf::from);
        self.rules
            .iter()
            .filter(move |rule| base.as_ref().is_some_and(|b| rule.is_match(b)))
    }
}
