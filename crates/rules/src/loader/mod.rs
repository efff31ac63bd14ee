//! Rules file loader.
//!
//! Parses the YAML rules file into a [`RuleSet`](crate::RuleSet) in two
//! passes: raw values are validated first (so every bad record is reported
//! with its position), then deserialized into typed [`RuleRecord`]s and
//! compiled. A failed load never produces a partial rule set.

mod core;
mod error;
mod record;


pub use self::core::RuleSetLoader;
pub use self::error::{LoadError, Result};
pub use self::record::RuleRecord;
