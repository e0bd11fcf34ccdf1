//! Runtime data kept under `hass.data["adaptive_lighting"]`

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::number::SimpleNumber;

/// Objects one config entry shares between its platforms
#[derive(Default)]
pub struct EntryData {
    pub numbers: HashMap<String, Arc<SimpleNumber>>,
}

/// Per config entry slots, keyed by entry id
#[derive(Default)]
pub struct AdaptiveLightingData {
    entries: DashMap<String, EntryData>,
}

impl AdaptiveLightingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the slot for `entry_id` if it does not exist yet
    pub fn ensure_entry(&self, entry_id: &str) {
        self.entries.entry(entry_id.to_string()).or_default();
    }

    pub fn insert_number(&self, entry_id: &str, key: &str, number: Arc<SimpleNumber>) {
        self.entries
            .entry(entry_id.to_string())
            .or_default()
            .numbers
            .insert(key.to_string(), number);
    }

    pub fn number(&self, entry_id: &str, key: &str) -> Option<Arc<SimpleNumber>> {
        self.entries.get(entry_id)?.numbers.get(key).cloned()
    }

    /// Whether the entry's numbers have been created
    pub fn has_numbers(&self, entry_id: &str) -> bool {
        self.entries
            .get(entry_id)
            .is_some_and(|entry| !entry.numbers.is_empty())
    }

    pub fn contains_entry(&self, entry_id: &str) -> bool {
        self.entries.contains_key(entry_id)
    }

    pub fn remove_entry(&self, entry_id: &str) -> bool {
        self.entries.remove(entry_id).is_some()
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}
