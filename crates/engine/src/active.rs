//! The active rule set, swapped whole on every successful reload.

use std::sync::{Arc, RwLock};

use wurmloch_rules::RuleSet;

/// Shared pointer to the current [`RuleSet`].
///
/// Readers clone the `Arc` and drop the lock immediately, so a slow move never
/// holds it and a reload never waits on a move. A dispatch keeps using the
/// snapshot it took even if a reload lands halfway through.
#[derive(Debug, Default)]
pub struct ActiveRules {
    current: RwLock<Arc<RuleSet>>,
}

impl ActiveRules {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
        }
    }

    /// The rule set in effect right now.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().expect("active rules lock poisoned"))
    }

    /// Install a new rule set, returning the one it replaced.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(rules);
        std::mem::replace(
            &mut *self.current.write().expect("active rules lock poisoned"),
            next,
        )
    }
}
