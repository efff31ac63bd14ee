//! Error types for the rules loader.

use std::path::PathBuf;

use crate::validation::ValidationError;

/// Errors that can occur while loading a rules file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The rules file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not YAML, is not a list, or a record has the wrong shape.
    #[error("failed to parse rules{}: {message}", record_suffix(.index))]
    Parse {
        /// Zero-based record position, when the failure is tied to one record.
        index: Option<usize>,
        message: String,
    },

    /// One or more records failed validation.
    #[error("{} invalid rule record(s): {}", count(.0), join(.0))]
    Invalid(Vec<ValidationError>),
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

fn record_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" (record {i})")).unwrap_or_default()
}

fn count(errors: &[ValidationError]) -> usize {
    errors.len()
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
