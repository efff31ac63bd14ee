//! Filename-pattern rules for the wormhole.
//!
//! This crate provides:
//! - [`Rule`]: an immutable (glob pattern, target directory) pair with a rank
//! - [`RuleSet`]: the ordered collection, resolving a file name to its target
//! - [`RuleSetLoader`]: YAML parsing and validation into a [`RuleSet`]
//! - Example rules for seeding a fresh configuration file
//!
//! Nothing in here touches the watched directory. Resolution is a pure
//! function of the file name and the rule list.

pub mod loader;
pub mod rule;
pub mod rule_set;
pub mod seed;
pub mod validation;

pub use loader::{LoadError, RuleSetLoader};
pub use rule::{CaseSensitivity, Rule};
pub use rule_set::RuleSet;
