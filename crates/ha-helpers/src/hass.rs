//! The Home Assistant hub handed to integrations

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use ha_registries::{Registries, Storage, StorageResult};
use ha_state_store::StateStore;
use tracing::info;

use crate::restore_state::RestoreStateData;

/// Per-integration runtime data (`hass.data`)
///
/// Integrations keep their own typed value under their domain. Values are
/// shared `Arc`s so platforms of the same integration can reach each other's
/// entities.
#[derive(Default)]
pub struct HassData {
    values: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl HassData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning whatever was under the key before
    pub fn insert<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: Arc<T>,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.values.insert(key.into(), value)
    }

    /// The value under `key`, if present and of type `T`
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.values.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    /// The value under `key`, inserting `init()` when absent
    ///
    /// Returns `None` when the key holds a value of another type.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let value = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Running instance: states, registries, restore state and `hass.data`
pub struct HomeAssistant {
    pub states: Arc<StateStore>,
    pub registries: Arc<Registries>,
    pub restore_state: Arc<RestoreStateData>,
    pub data: HassData,
}

impl HomeAssistant {
    /// Create an instance persisting to `config_dir/.storage`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));
        Self {
            states: Arc::new(StateStore::new()),
            registries: Arc::new(Registries::with_storage(storage.clone())),
            restore_state: Arc::new(RestoreStateData::new(storage)),
            data: HassData::new(),
        }
    }

    /// Load registries and last states from storage
    pub async fn async_start(&self) -> StorageResult<()> {
        self.registries.load_all().await?;
        self.restore_state.load().await?;
        info!("Home Assistant started");
        Ok(())
    }

    /// Persist registries and the states of restorable entities
    pub async fn async_stop(&self) -> StorageResult<()> {
        self.restore_state.async_dump_states(&self.states).await?;
        self.registries.save_all().await?;
        info!("Home Assistant stopped");
        Ok(())
    }
}
