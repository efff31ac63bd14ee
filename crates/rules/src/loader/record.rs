//! Typed form of a single rules-file entry.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One `{pattern, target}` entry as written in the rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
    pub pattern: String,
    pub target: PathBuf,
}

impl RuleRecord {
    pub fn new(pattern: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
        }
    }
}
