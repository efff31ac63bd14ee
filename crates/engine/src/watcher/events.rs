//! Turning raw notify events into engine actions.

use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use tracing::{trace, warn};

/// What the watch loop should do with one wormhole event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WormholeAction {
    /// Files that appeared or changed.
    Enqueue(Vec<PathBuf>),
    /// The backend dropped events; list the directory again.
    Rescan,
    /// The wormhole directory itself was removed or renamed away.
    RootLost,
    /// Directories moved or created in the wormhole. Their contents are not
    /// watched, so they are reported and left alone.
    SkipDirectories(Vec<PathBuf>),
    Ignore,
}

pub(crate) fn classify_wormhole_event(
    event: &Event,
    wormhole: &Path,
    rules_path: &Path,
) -> WormholeAction {
    if event.need_rescan() {
        return WormholeAction::Rescan;
    }

    let root_touched = event.paths.iter().any(|p| p == wormhole);
    if root_touched
        && matches!(
            event.kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        )
    {
        return WormholeAction::RootLost;
    }

    let (candidates, arrival): (Vec<&PathBuf>, bool) = match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            (event.paths.iter().collect(), true)
        }
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => (event.paths.iter().collect(), false),
        // Paths are [from, to]; only the new name can be in the wormhole now.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            (event.paths.last().into_iter().collect(), true)
        }
        _ => (Vec::new(), false),
    };

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for path in candidates {
        if path.parent() != Some(wormhole) || path == rules_path {
            continue;
        }
        if path.is_dir() {
            dirs.push(path.clone());
        } else {
            files.push(path.clone());
        }
    }

    if !files.is_empty() {
        WormholeAction::Enqueue(files)
    } else if arrival && !dirs.is_empty() {
        WormholeAction::SkipDirectories(dirs)
    } else {
        if !dirs.is_empty() {
            trace!(paths = ?dirs, "ignoring directory change");
        }
        WormholeAction::Ignore
    }
}

/// True when a config-directory event concerns the rules file.
pub(crate) fn touches_rules_file(event: &Event, rules_path: &Path) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.need_rescan() || event.paths.iter().any(|p| p == rules_path)
}

/// Files currently sitting in the wormhole.
pub(crate) fn sweep_wormhole(wormhole: &Path, rules_path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(wormhole) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %wormhole.display(), error = %e, "cannot list wormhole");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => warn_directory(&path),
            Ok(_) if path != rules_path => found.push(path),
            _ => {}
        }
    }
    found.sort();
    found
}

/// Nested directories are not descended into.
pub(crate) fn warn_directory(path: &Path) {
    warn!(
        path = %path.display(),
        "directory in wormhole is not dispatched, move its files to the top level"
    );
}
