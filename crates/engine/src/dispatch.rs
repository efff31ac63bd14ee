//! Resolving a stable file against the rules and moving it.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use wurmloch_rules::RuleSet;

use crate::stability::PendingEntry;

/// Highest numeric suffix tried before a conflict is given up on.
const MAX_CONFLICT_SUFFIX: u32 = 9_999;

/// What happened to one stable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Moved under its own name.
    Moved { destination: PathBuf },
    /// No rule matched; the file stays in the wormhole.
    NoMatch,
    /// The name was taken at the target, so the file was moved under a
    /// suffixed name instead. Nothing was overwritten.
    MoveConflict {
        requested: PathBuf,
        destination: PathBuf,
    },
    /// The move did not happen; the source is untouched.
    MoveFailed { reason: String },
}

impl DispatchOutcome {
    /// Where the file ended up, if it moved.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Self::Moved { destination } | Self::MoveConflict { destination, .. } => {
                Some(destination)
            }
            Self::NoMatch | Self::MoveFailed { .. } => None,
        }
    }
}

/// An outcome together with the file it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub source: PathBuf,
    pub outcome: DispatchOutcome,
    pub at: DateTime<Utc>,
}

impl DispatchReport {
    pub fn new(source: PathBuf, outcome: DispatchOutcome) -> Self {
        Self {
            source,
            outcome,
            at: Utc::now(),
        }
    }

    /// Emit the one log line every outcome gets.
    pub fn log(&self) {
        let source = self.source.display();
        match &self.outcome {
            DispatchOutcome::Moved { destination } => {
                info!(source = %source, destination = %destination.display(), "moved file");
            }
            DispatchOutcome::NoMatch => {
                warn!(source = %source, "no rule matched, file left in place");
            }
            DispatchOutcome::MoveConflict {
                requested,
                destination,
            } => {
                warn!(
                    source = %source,
                    requested = %requested.display(),
                    destination = %destination.display(),
                    "destination name taken, moved under a new name"
                );
            }
            DispatchOutcome::MoveFailed { reason } => {
                error!(source = %source, reason = %reason, "move failed, file left in place");
            }
        }
    }
}

/// Moves stable files to the directory of the first matching rule.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    max_suffix: u32,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            max_suffix: MAX_CONFLICT_SUFFIX,
        }
    }

    /// Dispatch one stable file against a rule snapshot.
    ///
    /// Never overwrites: a taken name becomes `stem (N).ext` with the lowest
    /// free `N`. The source is only gone when the file is complete at its
    /// destination.
    pub fn dispatch(&self, entry: &PendingEntry, rules: &RuleSet) -> DispatchOutcome {
        let source = entry.path.as_path();
        let Some(name) = source.file_name() else {
            return DispatchOutcome::MoveFailed {
                reason: "path has no file name".to_string(),
            };
        };

        let mut matches = rules.matches(name);
        let Some(rule) = matches.next() else {
            return DispatchOutcome::NoMatch;
        };
        debug!(rule = %rule, file = ?name, "rule matched");
        for shadowed in matches {
            debug!(rule = %shadowed, file = ?name, "would also have matched but has lower priority");
        }

        let target = rule.target();
        if is_same_dir(source.parent(), target) {
            return DispatchOutcome::MoveFailed {
                reason: format!("rule {rule} points back into the wormhole"),
            };
        }
        if let Err(e) = fs::create_dir_all(target) {
            return DispatchOutcome::MoveFailed {
                reason: format!("cannot create {}: {e}", target.display()),
            };
        }

        for n in 0..=self.max_suffix {
            let candidate = target.join(candidate_name(name, n));
            match move_no_clobber(source, &candidate) {
                Ok(()) if n == 0 => return DispatchOutcome::Moved {
                    destination: candidate,
                },
                Ok(()) => {
                    return DispatchOutcome::MoveConflict {
                        requested: target.join(name),
                        destination: candidate,
                    }
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return DispatchOutcome::MoveFailed {
                        reason: format!("cannot move to {}: {e}", candidate.display()),
                    }
                }
            }
        }

        DispatchOutcome::MoveFailed {
            reason: format!(
                "no free name for {} in {} after {} attempts",
                name.to_string_lossy(),
                target.display(),
                self.max_suffix
            ),
        }
    }
}

/// `name` for `n == 0`, otherwise `stem (n).ext`.
fn candidate_name(name: &OsStr, n: u32) -> OsString {
    if n == 0 {
        return name.to_os_string();
    }
    let path = Path::new(name);
    let mut candidate = path.file_stem().unwrap_or(name).to_os_string();
    candidate.push(format!(" ({n})"));
    if let Some(ext) = path.extension() {
        candidate.push(".");
        candidate.push(ext);
    }
    candidate
}

fn is_same_dir(a: Option<&Path>, b: &Path) -> bool {
    let Some(a) = a else {
        return false;
    };
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Move `src` to `dst` without ever replacing an existing `dst`.
///
/// The new name is claimed with a hard link, which fails with
/// `AlreadyExists` atomically, so two dispatches racing for one name cannot
/// both win. Where linking is impossible (another filesystem, or no hard
/// link support) the data is copied into a hidden temp file next to `dst`
/// and persisted without clobbering. `src` is removed only after `dst` holds
/// the complete file.
pub(crate) fn move_no_clobber(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => remove_source(src, dst),
        Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::NotFound) => Err(e),
        Err(e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                error = %e,
                "cannot hard link, copying"
            );
            copy_across(src, dst)
        }
    }
}

fn copy_across(src: &Path, dst: &Path) -> io::Result<()> {
    let dir = dst.parent().ok_or_else(|| {
        io::Error::new(ErrorKind::InvalidInput, "destination has no parent directory")
    })?;

    let mut reader = fs::File::open(src)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".wurmloch-")
        .suffix(".partial")
        .tempfile_in(dir)?;
    io::copy(&mut reader, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = reader.metadata() {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }

    // The temp file is removed on drop if persisting fails.
    tmp.persist_noclobber(dst).map_err(|e| e.error)?;
    remove_source(src, dst)
}

/// Drop `src` once `dst` is complete. On failure `dst` is removed again so
/// the file exists in exactly one place.
fn remove_source(src: &Path, dst: &Path) -> io::Result<()> {
    if let Err(e) = fs::remove_file(src) {
        if let Err(cleanup) = fs::remove_file(dst) {
            error!(dst = %dst.display(), error = %cleanup, "failed to roll back moved file");
        }
        return Err(e);
    }
    Ok(())
}
