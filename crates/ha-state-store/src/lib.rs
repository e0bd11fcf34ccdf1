//! Entity state storage with domain indexing for Home Assistant
//!
//! The StateStore holds the current state of every entity, keeps a
//! per-domain index, and broadcasts a `StateChangedData` for every write
//! and removal so listeners (restore state, switches reading overrides,
//! tests) can follow along.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Default channel capacity for state change subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Current state of all entities
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    /// Change notifications
    changes: broadcast::Sender<StateChangedData>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            changes,
        }
    }

    /// Receive every subsequent state change
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedData> {
        self.changes.subscribe()
    }

    /// Set the state of an entity
    ///
    /// `last_changed` is only bumped when the state value differs from the
    /// stored one.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let entity_id_str = entity_id.to_string();

        let old_state = self.states.get(&entity_id_str).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context),
            None => State::new(entity_id.clone(), state, attributes, context),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(entity_id_str.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(entity_id_str);
        }

        // No receivers is fine
        let _ = self.changes.send(StateChangedData {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string, or None if entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// All entity IDs for a domain, in insertion order
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Remove an entity's state, broadcasting `new_state: None`
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let entity_id_str = entity_id.to_string();
        let old_state = self.states.remove(&entity_id_str).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &entity_id_str);
            }

            let _ = self.changes.send(StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(state.clone()),
                new_state: None,
            });
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let store = StateStore::new();
        store.set(
            id("number.override_brightness"),
            "80",
            HashMap::from([("unit_of_measurement".to_string(), json!("%"))]),
            Context::new(),
        );

        let state = store.get("number.override_brightness").unwrap();
        assert_eq!(state.state, "80");
        assert_eq!(state.attribute::<String>("unit_of_measurement").as_deref(), Some("%"));
        assert!(store.is_state("number.override_brightness", "80"));
        assert_eq!(store.entity_ids("number"), vec!["number.override_brightness"]);
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_domain_index_not_duplicated_on_update() {
        let store = StateStore::new();
        store.set(id("number.a"), "1", HashMap::new(), Context::new());
        store.set(id("number.a"), "2", HashMap::new(), Context::new());
        store.set(id("number.b"), "3", HashMap::new(), Context::new());

        assert_eq!(store.entity_ids("number"), vec!["number.a", "number.b"]);
        assert!(store.entity_ids("switch").is_empty());
    }

    #[tokio::test]
    async fn test_changes_broadcast() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        store.set(id("number.a"), "1", HashMap::new(), Context::new());
        store.set(id("number.a"), "2", HashMap::new(), Context::new());
        store.remove(&id("number.a"));

        let first = rx.recv().await.unwrap();
        assert!(first.old_state.is_none());
        assert_eq!(first.new_state.unwrap().state, "1");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.old_state.unwrap().state, "1");
        assert_eq!(second.new_state.unwrap().state, "2");

        let removed = rx.recv().await.unwrap();
        assert!(removed.new_state.is_none());
        assert!(store.get("number.a").is_none());
        assert!(store.entity_ids("number").is_empty());
    }
}
