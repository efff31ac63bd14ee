//! Core [`RuleSetLoader`]: bytes in, validated [`RuleSet`] out.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::rule::{CaseSensitivity, Rule};
use crate::rule_set::RuleSet;
use crate::validation::validate_records;

use super::error::{LoadError, Result};
use super::record::RuleRecord;

/// Parses rules-file content into a [`RuleSet`].
///
/// The loader holds no rule state of its own. Callers decide what to do with
/// a failed load; the watcher keeps its previous set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSetLoader {
    case: CaseSensitivity,
}

impl RuleSetLoader {
    pub fn new(case: CaseSensitivity) -> Self {
        Self { case }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    /// Parse and validate rules-file content.
    ///
    /// Empty content, whitespace, comments only, or an explicit YAML `null`
    /// yields an empty set. Anything else must be a sequence of `{pattern, target}` records.
    /// Validation warnings are logged; any validation error fails the load.
    pub fn load(&self, source: &[u8]) -> Result<RuleSet> {
        if is_blank(source) {
            debug!("rules source is empty");
            return Ok(RuleSet::empty());
        }

        let document: Value = serde_yaml::from_slice(source).map_err(|e| LoadError::Parse {
            index: None,
            message: e.to_string(),
        })?;

        let records = match document {
            Value::Null => return Ok(RuleSet::empty()),
            Value::Sequence(records) => records,
            other => {
                return Err(LoadError::Parse {
                    index: None,
                    message: format!(
                        "expected a list of rules, found {}",
                        describe(&other)
                    ),
                })
            }
        };

        let report = validate_records(&records, self.case);
        for warning in &report.warnings {
            warn!(location = %warning.path, "{}", warning.message);
        }
        if !report.is_valid() {
            return Err(LoadError::Invalid(report.errors));
        }

        let rules = records
            .into_iter()
            .enumerate()
            .map(|(rank, value)| self.compile(rank, value))
            .collect::<Result<Vec<_>>>()?;

        info!(rules = rules.len(), case = %self.case, "parsed rules");
        Ok(RuleSet::new(rules))
    }

    /// Read and parse a rules file.
    ///
    /// A missing file is not an error: it yields an empty set, so the engine
    /// can start before the user has written any rules.
    pub fn load_file(&self, path: &Path) -> Result<RuleSet> {
        match fs::read(path) {
            Ok(bytes) => self.load(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "rules file not found, starting with no rules");
                Ok(RuleSet::empty())
            }
            Err(source) => Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn compile(&self, rank: usize, value: Value) -> Result<Rule> {
        let record: RuleRecord = serde_yaml::from_value(value).map_err(|e| LoadError::Parse {
            index: Some(rank),
            message: e.to_string(),
        })?;

        Rule::new(rank, &record.pattern, record.target, self.case).map_err(|e| {
            LoadError::Parse {
                index: Some(rank),
                message: e.to_string(),
            }
        })
    }
}

/// True when the source holds nothing but whitespace and comment lines.
fn is_blank(source: &[u8]) -> bool {
    std::str::from_utf8(source).is_ok_and(|text| {
        text.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        })
    })
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
