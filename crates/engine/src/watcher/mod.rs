//! Watch loop: notify events in, queued paths and rule reloads out.

mod core;
mod events;
mod worker;


pub use self::core::{EngineState, Watcher};
