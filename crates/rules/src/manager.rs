//! Indexed registry of compiled rules

use std::collections::HashMap;
use std::sync::Arc;

use crate::rule::Rule;

/// Registry of a product's compiled rules, indexed by ID and by event name
///
/// Not safe for concurrent mutation. Products replace the whole manager on
/// a settings change and swap the reference under a single-writer
/// discipline; readers keep whatever manager they already hold.
#[derive(Default)]
pub struct RuleManager {
    rules: HashMap<String, Arc<Rule>>,
    /// Event name → rules in registration order; the first is the matching
    /// rule when several share an event
    events: HashMap<String, Vec<Arc<Rule>>>,
}

impl RuleManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled rule, returning its ID
    pub fn add_rule(&mut self, rule: Rule) -> String {
        let id = rule.id.clone();
        let rule = Arc::new(rule);

        self.events
            .entry(rule.event.clone())
            .or_default()
            .push(Arc::clone(&rule));
        self.rules.insert(id.clone(), rule);

        id
    }

    /// Remove a rule by ID
    pub fn delete_rule(&mut self, id: &str) {
        let Some(rule) = self.rules.remove(id) else {
            return;
        };

        if let Some(set) = self.events.get_mut(&rule.event) {
            set.retain(|r| r.id != id);
            if set.is_empty() {
                self.events.remove(&rule.event);
            }
        }
    }

    /// Look up a rule by ID
    pub fn get_rule(&self, id: &str) -> Option<&Arc<Rule>> {
        self.rules.get(id)
    }

    /// All registered rules
    pub fn get_rules(&self) -> Vec<&Arc<Rule>> {
        self.rules.values().collect()
    }

    /// Rules matching an event name
    ///
    /// Empty when the event is unknown to this product.
    pub fn get_rules_by_event(&self, event: &str) -> &[Arc<Rule>] {
        self.events.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All event names with at least one rule
    pub fn get_events(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleManager")
            .field("rules", &self.rules.len())
            .field("events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
