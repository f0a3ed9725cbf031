//! Request-local decision cache

use crate::types::Resource;
use serde::Serialize;
use std::collections::HashMap;

/// Identity of a checked object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectKey {
    pub resource_type: String,
    pub id: String,
}

impl ObjectKey {
    pub fn of(resource: &dyn Resource) -> Self {
        Self {
            resource_type: resource.resource_type().to_string(),
            id: resource.resource_id(),
        }
    }
}

/// Decisions per category (`resource_type.right`) and object.
///
/// The static decision of a category is stored under `None`.
#[derive(Debug, Default)]
pub struct ValidatedSet {
    by_category: HashMap<String, HashMap<Option<ObjectKey>, bool>>,
}

impl ValidatedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached decision, if any
    pub fn get(&self, category: &str, key: &Option<ObjectKey>) -> Option<bool> {
        self.by_category.get(category)?.get(key).copied()
    }

    /// Record a decision; returns false when one was already recorded
    pub fn record(&mut self, category: &str, key: Option<ObjectKey>, allowed: bool) -> bool {
        let decisions = self.by_category.entry(category.to_string()).or_default();
        if decisions.contains_key(&key) {
            return false;
        }
        decisions.insert(key, allowed);
        true
    }

    /// Whether the object was allowed under `category`
    pub fn is_validated(&self, category: &str, key: &Option<ObjectKey>) -> bool {
        self.get(category, key) == Some(true)
    }

    /// Objects allowed under `category`
    pub fn validated(&self, category: &str) -> Vec<&ObjectKey> {
        self.by_category
            .get(category)
            .into_iter()
            .flatten()
            .filter(|(_, allowed)| **allowed)
            .filter_map(|(key, _)| key.as_ref())
            .collect()
    }

    /// Number of recorded decisions
    pub fn len(&self) -> usize {
        self.by_category.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.by_category.clear();
    }
}

/// Evaluation counters of one security context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    /// Rule evaluations performed
    pub evaluations: usize,
    /// Checks answered from the cache
    pub cache_hits: usize,
    /// Checks that evaluated false
    pub denials: usize,
}

impl ContextStats {
    /// Share of checks answered from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.evaluations + self.cache_hits;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
