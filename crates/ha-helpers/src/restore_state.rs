//! Restore state
//!
//! Entities that opt in via [`Entity::should_restore`](crate::Entity::should_restore)
//! are tracked here. On shutdown their current states are written to
//! `.storage/core.restore_state`; on the next start the stored states are
//! loaded back so each entity can pick its last value up again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use ha_core::{EntityId, State};
use ha_registries::{Storable, Storage, StorageResult};
use ha_state_store::StateStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const STORAGE_KEY: &str = "core.restore_state";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Stored states of entities that are gone are kept this long
pub const STATE_EXPIRATION_DAYS: i64 = 7;

/// One persisted state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
    pub state: State,
    /// Extra entity data beyond the state (unused by simple entities)
    #[serde(default)]
    pub extra_data: Option<serde_json::Value>,
    /// When this state was last seen live
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreStateStorage(pub Vec<StoredState>);

impl Storable for RestoreStateStorage {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

pub struct RestoreStateData {
    storage: Arc<Storage>,
    /// States loaded at startup (or captured when a tracked entity was removed)
    last_states: DashMap<String, StoredState>,
    /// Entity ids currently opted in to restore
    entities: DashSet<String>,
}

impl RestoreStateData {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            last_states: DashMap::new(),
            entities: DashSet::new(),
        }
    }

    /// Load the states saved by the previous run
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<RestoreStateStorage>().await? {
            info!(
                "Loading {} restore states from storage",
                storage_file.data.0.len()
            );
            for stored in storage_file.data.0 {
                self.last_states
                    .insert(stored.state.entity_id.to_string(), stored);
            }
        }
        Ok(())
    }

    pub fn async_get_stored_state(&self, entity_id: &str) -> Option<StoredState> {
        self.last_states.get(entity_id).map(|r| r.value().clone())
    }

    pub fn async_restore_entity_added(&self, entity_id: &EntityId) {
        debug!(%entity_id, "Tracking entity for restore");
        self.entities.insert(entity_id.to_string());
    }

    /// Stop tracking an entity, remembering the state it had when removed
    pub fn async_restore_entity_removed(&self, entity_id: &EntityId, last_state: Option<State>) {
        let key = entity_id.to_string();
        self.entities.remove(&key);
        if let Some(state) = last_state {
            self.last_states.insert(
                key,
                StoredState {
                    state,
                    extra_data: None,
                    last_seen: Utc::now(),
                },
            );
        }
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.entities.contains(entity_id)
    }

    /// States that would be written by [`async_dump_states`](Self::async_dump_states)
    ///
    /// Current states of tracked entities, plus earlier stored states of
    /// entities without a live state that were seen within the expiration window.
    pub fn async_get_stored_states(&self, states: &StateStore) -> Vec<StoredState> {
        let now = Utc::now();
        let expiration = now - Duration::days(STATE_EXPIRATION_DAYS);

        let mut current: Vec<StoredState> = self
            .entities
            .iter()
            .filter_map(|id| states.get(id.key()))
            .map(|state| StoredState {
                state,
                extra_data: None,
                last_seen: now,
            })
            .collect();

        let earlier = self
            .last_states
            .iter()
            .filter(|r| r.last_seen > expiration)
            .filter(|r| !current.iter().any(|c| &c.state.entity_id.to_string() == r.key()))
            .map(|r| r.value().clone())
            .collect::<Vec<_>>();

        current.extend(earlier);
        current
    }

    /// Persist the stored states, returning how many were written
    pub async fn async_dump_states(&self, states: &StateStore) -> StorageResult<usize> {
        let stored = self.async_get_stored_states(states);
        let count = stored.len();
        self.storage.save(&RestoreStateStorage(stored)).await?;
        debug!("Dumped {} states for restore", count);
        Ok(count)
    }
}
