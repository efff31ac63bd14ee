//! Rule-driven dispatch engine for the wormhole directory.
//!
//! ```text
//!  notify (wormhole) ──► PendingQueue ──► poller ◄──► StabilityTracker
//!                                           │ stable
//!                                           ▼
//!  notify (rules file) ──► ActiveRules ──► workers ──► Dispatcher ──► move
//! ```
//!
//! The [`Watcher`] owns both notify watches and the active rule set. One
//! poller checks every unsettled file on a shared tick and hands settled ones
//! to the workers. Workers take a snapshot of the rules for each dispatch, so
//! a reload never tears a dispatch in half.

pub mod active;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod stability;
pub mod watcher;

pub use active::ActiveRules;
pub use config::{EngineConfig, RearmPolicy};
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher};
pub use error::{EngineError, Result};
pub use queue::PendingQueue;
pub use stability::{CompletionSignal, FileSnapshot, Observation, PendingEntry, StabilityTracker};
pub use watcher::{EngineState, Watcher};
