//! Rule record validation with structured errors and suggestions.
//!
//! Works on raw YAML values so that a single pass can report every bad
//! record, with its position, instead of stopping at the first serde error.
//! Errors block a load; warnings are advisory and only logged.

mod fuzzy;
mod record_checks;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rule::CaseSensitivity;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location of the offending value, e.g. `"rules[2].target"`.
    pub path: String,
    pub message: String,
    /// Optional "did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) {
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: suggestion.map(String::from),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean `{suggestion}`?)")?;
        }
        Ok(())
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a list of raw rule records, in file order.
pub fn validate_records(records: &[serde_yaml::Value], case: CaseSensitivity) -> ValidationResult {
    let mut result = ValidationResult::default();
    for (index, record) in records.iter().enumerate() {
        record_checks::validate_record(index, record, case, &mut result);
    }
    record_checks::check_shadowed_patterns(records, &mut result);
    result
}

/// Location string for a record field.
pub(crate) fn field_path(index: usize, field: &str) -> String {
    format!("rules[{index}].{field}")
}

/// Location string for a whole record.
pub(crate) fn record_path(index: usize) -> String {
    format!("rules[{index}]")
}
