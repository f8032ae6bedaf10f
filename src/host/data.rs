/// Per-entry runtime registry, keyed by config entry id.
///
/// Holds whatever an integration keeps alive between setup and unload.
/// Insert happens once per successful setup, remove once per unload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct IntegrationData<T> {
    entries: Arc<RwLock<HashMap<String, T>>>,
}

impl<T> Clone for IntegrationData<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for IntegrationData<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Clone> IntegrationData<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `entry_id`, returning any value it replaced.
    pub fn insert(&self, entry_id: &str, value: T) -> Option<T> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(entry_id.to_string(), value)
    }

    pub fn remove(&self, entry_id: &str) -> Option<T> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(entry_id)
    }

    pub fn get(&self, entry_id: &str) -> Option<T> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(entry_id)
            .cloned()
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
