//! Category registry.
//!
//! Categories are enumerated once from configuration at startup and never
//! change for the lifetime of an engine.

use std::collections::HashMap;
use std::sync::Arc;

use weave_id::CategoryKey;

use crate::config::CategoryConfig;
use crate::error::{AssignError, AssignResult};

/// A registered task category.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub key: CategoryKey,
    pub visible: bool,
    /// Constant criticality weight used for cross-category comparisons.
    pub urgency_multiplier: f64,
    /// Enabled for every capable worker by policy; skipped by the allocator.
    pub always_enabled: bool,
}

impl Category {
    /// True if the allocator schedules this category.
    pub fn is_schedulable(&self) -> bool {
        self.visible && !self.always_enabled
    }
}

/// Built-in urgency multiplier for well-known category keys.
pub fn default_urgency_multiplier(key: &str) -> f64 {
    match key {
        "medical" | "doctor" | "firefighting" | "firefighter" => 3.0,
        "construction" | "repair" => 1.5,
        "growing" | "hauling" => 1.3,
        _ => 1.0,
    }
}

/// Immutable, cheaply clonable list of categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: Arc<[Category]>,
    index: Arc<HashMap<CategoryKey, usize>>,
}

impl CategoryRegistry {
    /// Build the registry from config entries, in declaration order.
    pub fn from_config(entries: &[CategoryConfig]) -> AssignResult<Self> {
        let mut categories = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());

        for entry in entries {
            if index.contains_key(&entry.key) {
                return Err(AssignError::InvalidConfig(format!(
                    "duplicate category '{}'",
                    entry.key
                )));
            }
            index.insert(entry.key.clone(), categories.len());
            categories.push(Category {
                key: entry.key.clone(),
                visible: entry.visible,
                urgency_multiplier: entry
                    .urgency_multiplier
                    .unwrap_or_else(|| default_urgency_multiplier(entry.key.as_str())),
                always_enabled: entry.always_enabled,
            });
        }

        Ok(Self {
            categories: categories.into(),
            index: Arc::new(index),
        })
    }

    pub fn get(&self, key: &CategoryKey) -> Option<&Category> {
        self.index.get(key).map(|&i| &self.categories[i])
    }

    pub fn contains(&self, key: &CategoryKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    /// Categories that take part in scheduling.
    pub fn visible(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.visible)
    }

    /// Visible categories the allocator is allowed to touch.
    pub fn schedulable(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.is_schedulable())
    }

    pub fn visible_count(&self) -> usize {
        self.visible().count()
    }

    /// Urgency multiplier for a key; 1.0 for unknown keys.
    pub fn urgency_multiplier(&self, key: &CategoryKey) -> f64 {
        self.get(key).map(|c| c.urgency_multiplier).unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
