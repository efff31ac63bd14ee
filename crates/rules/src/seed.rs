//! Example rules written on first run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::loader::RuleRecord;

/// Example rules pointing at the platform's picture, document and audio
/// directories. Entries whose directory the platform cannot name are left
/// out rather than written with an empty target.
pub fn example_records() -> Vec<RuleRecord> {
    [
        ("*.jpg", dirs::picture_dir()),
        ("*.pdf", dirs::document_dir()),
        ("*.mp3", dirs::audio_dir()),
    ]
    .into_iter()
    .filter_map(|(pattern, target)| target.map(|t| RuleRecord::new(pattern, t)))
    .collect()
}

/// Render records as rules-file YAML.
pub fn render(records: &[RuleRecord]) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(records)
}

/// Create the rules file with example content if it does not exist yet.
///
/// Returns `true` when a file was written. Writes to a dot-prefixed `.tmp`
/// sibling first and renames it into place, so a watcher never observes a
/// half-written rules file.
pub fn ensure_rules_file(path: &Path) -> io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml = render(&example_records()).map_err(io::Error::other)?;
    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, yaml)?;
    fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), "created example rules file");
    Ok(true)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rules".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
