//! Error types for the dispatch engine.
//!
//! Only failures that stop the engine live here. Per-file problems are
//! [`DispatchOutcome`](crate::DispatchOutcome)s and rules-file problems are
//! logged [`LoadError`](wurmloch_rules::LoadError)s; neither ends the run.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The wormhole path is unusable (relative, missing, or not a directory).
    #[error("invalid wormhole {path}: {reason}")]
    InvalidWormhole { path: PathBuf, reason: String },

    /// The platform watcher could not be created or armed.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// The wormhole watch was lost and every re-arm attempt failed.
    #[error("lost watch on {path} after {attempts} re-arm attempts")]
    WatchLost { path: PathBuf, attempts: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
