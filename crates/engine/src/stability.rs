//! Write-completion detection for files dropped into the wormhole.
//!
//! Create notifications fire when a write starts, not when it ends, and there
//! is no portable "write finished" event. [`StabilityTracker`] polls size and
//! modification time instead and calls a file stable once neither has moved
//! for the quiet period. Other strategies can stand in through
//! [`CompletionSignal`] without the dispatcher noticing.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, trace, warn};

/// Size and modification time of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileSnapshot {
    /// Read the snapshot for `path`. `Ok(None)` means the file is gone.
    pub fn probe(path: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self {
                size: meta.len(),
                modified: meta.modified().ok(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A file being watched for quiescence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub path: PathBuf,
    pub last_observed_size: u64,
    pub last_observed_modified: Option<SystemTime>,
    pub last_observed_time: Instant,
    /// Set once two consecutive observations agree; cleared on any change.
    pub stable_since: Option<Instant>,
}

impl PendingEntry {
    fn new(path: PathBuf, snapshot: FileSnapshot, now: Instant) -> Self {
        Self {
            path,
            last_observed_size: snapshot.size,
            last_observed_modified: snapshot.modified,
            last_observed_time: now,
            stable_since: None,
        }
    }

    fn matches(&self, snapshot: &FileSnapshot) -> bool {
        self.last_observed_size == snapshot.size && self.last_observed_modified == snapshot.modified
    }
}

/// Result of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Still changing, or not quiet for long enough yet.
    Pending,
    /// Quiet for the full period. Emitted once; the entry is dropped.
    Stable(PendingEntry),
    /// The file disappeared before it settled.
    Vanished,
}

/// Decides when a wormhole file is done being written.
pub trait CompletionSignal: Send + Sync {
    /// Check `path` once and report where it stands.
    fn observe(&self, path: &Path) -> Observation;

    /// Drop any state for `path` (e.g. the engine is shutting down).
    fn forget(&self, path: &Path);
}

/// Poll-for-quiescence [`CompletionSignal`].
#[derive(Debug)]
pub struct StabilityTracker {
    quiet_period: Duration,
    entries: Mutex<HashMap<PathBuf, PendingEntry>>,
}

impl StabilityTracker {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Number of files currently being tracked.
    pub fn pending(&self) -> usize {
        self.entries.lock().expect("stability lock poisoned").len()
    }

    /// Fold one observation into the tracker at time `now`.
    ///
    /// `snapshot` is `None` when the file no longer exists. The first sighting
    /// is always pending; after that a file becomes stable once its snapshot
    /// has matched for at least the quiet period.
    pub fn observe_at(
        &self,
        path: &Path,
        snapshot: Option<FileSnapshot>,
        now: Instant,
    ) -> Observation {
        let mut entries = self.entries.lock().expect("stability lock poisoned");

        let Some(snapshot) = snapshot else {
            entries.remove(path);
            return Observation::Vanished;
        };

        if !entries.contains_key(path) {
            trace!(path = %path.display(), size = snapshot.size, "tracking new file");
            entries.insert(
                path.to_path_buf(),
                PendingEntry::new(path.to_path_buf(), snapshot, now),
            );
            return Observation::Pending;
        }
        let Some(entry) = entries.get_mut(path) else {
            return Observation::Pending;
        };

        if entry.matches(&snapshot) {
            let since = *entry.stable_since.get_or_insert(entry.last_observed_time);
            entry.last_observed_time = now;
            if now.saturating_duration_since(since) >= self.quiet_period {
                return entries
                    .remove(path)
                    .map_or(Observation::Vanished, Observation::Stable);
            }
        } else {
            trace!(
                path = %path.display(),
                from = entry.last_observed_size,
                to = snapshot.size,
                "file still changing"
            );
            entry.last_observed_size = snapshot.size;
            entry.last_observed_modified = snapshot.modified;
            entry.last_observed_time = now;
            entry.stable_since = None;
        }

        Observation::Pending
    }
}

impl CompletionSignal for StabilityTracker {
    fn observe(&self, path: &Path) -> Observation {
        let snapshot = match FileSnapshot::probe(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Unreadable metadata (e.g. locked by the writer) counts as
                // still changing; the next tick tries again.
                debug!(path = %path.display(), error = %e, "cannot stat pending file");
                return Observation::Pending;
            }
        };
        self.observe_at(path, snapshot, Instant::now())
    }

    fn forget(&self, path: &Path) {
        if self
            .entries
            .lock()
            .expect("stability lock poisoned")
            .remove(path)
            .is_some()
        {
            warn!(path = %path.display(), "abandoned pending file before it settled");
        }
    }
}
