//! Per-record checks: shape, pattern syntax, target path.

use std::collections::HashMap;
use std::path::Path;

use serde_yaml::Value;

use super::fuzzy::closest;
use super::{field_path, record_path, ValidationResult};
use crate::rule::{CaseSensitivity, Rule};

const PATTERN: &str = "pattern";
const TARGET: &str = "target";
const KNOWN_FIELDS: &[&str] = &[PATTERN, TARGET];

pub(super) fn validate_record(
    index: usize,
    record: &Value,
    case: CaseSensitivity,
    result: &mut ValidationResult,
) {
    let Some(map) = record.as_mapping() else {
        result.error(
            record_path(index),
            "expected a mapping with `pattern` and `target`",
        );
        return;
    };

    for key in map.keys() {
        let Some(name) = key.as_str() else {
            result.error(record_path(index), "record keys must be strings");
            continue;
        };
        if !KNOWN_FIELDS.contains(&name) {
            result.error_with_suggestion(
                field_path(index, name),
                "unknown field",
                closest(name, KNOWN_FIELDS),
            );
        }
    }

    if let Some(pattern) = required_string(index, PATTERN, map.get(PATTERN), result) {
        check_pattern(index, pattern, case, result);
    }
    if let Some(target) = required_string(index, TARGET, map.get(TARGET), result) {
        check_target(index, target, result);
    }
}

/// Warn about rules that can never win because an earlier rule has the
/// exact same pattern.
pub(super) fn check_shadowed_patterns(records: &[Value], result: &mut ValidationResult) {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let Some(pattern) = record.get(PATTERN).and_then(Value::as_str) else {
            continue;
        };
        if pattern.trim().is_empty() {
            continue;
        }
        match first_seen.get(pattern) {
            Some(&earlier) => result.warn(
                field_path(index, PATTERN),
                format!(
                    "pattern '{pattern}' is shadowed by {} and will never match",
                    record_path(earlier)
                ),
            ),
            None => {
                first_seen.insert(pattern, index);
            }
        }
    }
}

fn required_string<'a>(
    index: usize,
    field: &str,
    value: Option<&'a Value>,
    result: &mut ValidationResult,
) -> Option<&'a str> {
    match value {
        None | Some(Value::Null) => {
            result.error(field_path(index, field), "missing required field");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            result.error(field_path(index, field), "must not be empty");
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            result.error(field_path(index, field), "must be a string");
            None
        }
    }
}

fn check_pattern(index: usize, pattern: &str, case: CaseSensitivity, result: &mut ValidationResult) {
    if let Err(e) = Rule::new(index, pattern, "/", case) {
        result.error(
            field_path(index, PATTERN),
            format!("invalid glob '{pattern}': {}", e.kind()),
        );
    }
}

fn check_target(index: usize, target: &str, result: &mut ValidationResult) {
    let path = Path::new(target);
    let location = field_path(index, TARGET);

    if !path.is_absolute() {
        result.error(location, format!("'{target}' must be an absolute path"));
        return;
    }

    match path.metadata() {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => result.error(location, format!("'{target}' exists but is not a directory")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => result.warn(
            location,
            format!("'{target}' does not exist yet; it will be created on first dispatch"),
        ),
        Err(e) => result.error(location, format!("'{target}' cannot be inspected: {e}")),
    }
}
