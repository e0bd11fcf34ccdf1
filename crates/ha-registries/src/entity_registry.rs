//! Entity Registry
//!
//! Remembers which entity_id each `(domain, platform, unique_id)` was given,
//! so entities keep their id (and restored state) across restarts.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::EntityId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityRegistryError {
    #[error("Entity not found: {0}")]
    NotFound(String),
}

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 19;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    ConfigEntry,
    Device,
    Hass,
    Integration,
    User,
}

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal ULID
    pub id: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Integration that provides the entity (e.g. "adaptive_lighting")
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,

    /// User-set name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name the integration gave the entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id,
            platform: platform.into(),
            device_id: None,
            config_entry_id: None,
            name: None,
            original_name: None,
            icon: None,
            original_icon: None,
            unit_of_measurement: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or(&self.entity_id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

/// Registration request for [`EntityRegistry::get_or_create`]
#[derive(Debug, Clone, Default)]
pub struct EntityRegistration<'a> {
    pub unique_id: &'a str,
    pub config_entry_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub original_name: Option<&'a str>,
    pub original_icon: Option<&'a str>,
    pub unit_of_measurement: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

type UniqueKey = (String, String, String);

/// Entity registry indexed by entity_id, unique_id and config entry
///
/// Entries are stored as `Arc<EntityEntry>` so reads never clone the entry.
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// Primary index, insertion ordered
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// Index: (domain, platform, unique_id) -> entity_id
    by_unique_id: DashMap<UniqueKey, String>,

    /// Index: config_entry_id -> set of entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<EntityRegistryData>().await? {
            info!(
                "Loading {} entities from storage (v{}.{})",
                storage_file.data.entities.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let entities: Vec<EntityEntry> = self
            .by_entity_id
            .read()
            .map(|e| e.values().map(|v| (**v).clone()).collect())
            .unwrap_or_default();
        let count = entities.len();

        self.storage.save(&EntityRegistryData { entities }).await?;
        debug!("Saved {} entities to storage", count);
        Ok(())
    }

    fn unique_key(domain: &str, platform: &str, unique_id: &str) -> UniqueKey {
        (domain.to_string(), platform.to_string(), unique_id.to_string())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.insert(
                Self::unique_key(entry.domain(), &entry.platform, unique_id),
                entity_id.clone(),
            );
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entity_id, entry);
        }
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&Self::unique_key(entry.domain(), &entry.platform, unique_id));
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.entity_id);
            }
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.shift_remove(&entry.entity_id);
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    /// Entity id already assigned to `(domain, platform, unique_id)`
    pub fn async_get_entity_id(
        &self,
        domain: &str,
        platform: &str,
        unique_id: &str,
    ) -> Option<String> {
        self.by_unique_id
            .get(&Self::unique_key(domain, platform, unique_id))
            .map(|r| r.value().clone())
    }

    /// Whether an entity id is taken by the registry or by `reserved`
    fn is_taken(&self, entity_id: &str, reserved: &HashSet<String>) -> bool {
        reserved.contains(entity_id) || self.get(entity_id).is_some()
    }

    /// Pick a free entity id in `domain` for the suggested object id
    ///
    /// `number.foo` is tried first, then `number.foo_2`, `number.foo_3`, ...
    /// Ids in `reserved` (for instance current states) count as taken.
    pub fn generate_entity_id(
        &self,
        domain: &str,
        suggested_object_id: &str,
        reserved: &HashSet<String>,
    ) -> Result<EntityId, ha_core::EntityIdError> {
        let base = EntityId::from_name(domain, suggested_object_id)?;
        if !self.is_taken(&base.to_string(), reserved) {
            return Ok(base);
        }

        let mut n = 2;
        loop {
            let candidate = base.with_suffix(n);
            if !self.is_taken(&candidate.to_string(), reserved) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Register an entity, or return the existing entry for its unique id
    ///
    /// An existing entry keeps its entity_id but picks up the latest
    /// original name, icon, unit, device and config entry.
    pub fn get_or_create(
        &self,
        domain: &str,
        platform: &str,
        entity_id: &EntityId,
        registration: EntityRegistration<'_>,
    ) -> Arc<EntityEntry> {
        let apply = |entry: &mut EntityEntry| {
            entry.config_entry_id = registration.config_entry_id.map(String::from);
            entry.device_id = registration.device_id.map(String::from);
            entry.original_name = registration.original_name.map(String::from);
            entry.original_icon = registration.original_icon.map(String::from);
            entry.unit_of_measurement = registration.unit_of_measurement.map(String::from);
        };

        if let Some(existing_id) =
            self.async_get_entity_id(domain, platform, registration.unique_id)
        {
            if let Ok(updated) = self.update(&existing_id, |entry| {
                apply(entry);
                entry.modified_at = Utc::now();
            }) {
                debug!("Found existing entity by unique_id: {}", updated.entity_id);
                return updated;
            }
        }

        let mut entry = EntityEntry::new(
            entity_id.to_string(),
            platform,
            Some(registration.unique_id.to_string()),
        );
        apply(&mut entry);

        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));

        info!("Registered new entity: {}", entity_id);
        arc_entry
    }

    /// Update an entity entry in place
    pub fn update<F>(&self, entity_id: &str, f: F) -> Result<Arc<EntityEntry>, EntityRegistryError>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let existing = self
            .get(entity_id)
            .ok_or_else(|| EntityRegistryError::NotFound(entity_id.to_string()))?;

        self.unindex_entry(&existing);
        let mut entry = (*existing).clone();
        f(&mut entry);

        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        Ok(arc_entry)
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let entry = self.get(entity_id)?;
        self.unindex_entry(&entry);
        info!("Removed entity: {}", entity_id);
        Some(entry)
    }

    pub fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> EntityRegistry {
        EntityRegistry::new(Arc::new(Storage::new(dir.path())))
    }

    fn registration(unique_id: &str) -> EntityRegistration<'_> {
        EntityRegistration {
            unique_id,
            config_entry_id: Some("entry1"),
            original_name: Some("Adaptive Lighting Override Brightness: den"),
            unit_of_measurement: Some("%"),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_or_create_reuses_unique_id() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let first_id: EntityId = "number.first".parse().unwrap();
        let first = reg.get_or_create("number", "adaptive_lighting", &first_id, registration("den_override_brightness"));

        let other_id: EntityId = "number.other".parse().unwrap();
        let second = reg.get_or_create("number", "adaptive_lighting", &other_id, registration("den_override_brightness"));

        assert_eq!(first.id, second.id);
        assert_eq!(second.entity_id, "number.first");
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.async_get_entity_id("number", "adaptive_lighting", "den_override_brightness"),
            Some("number.first".to_string())
        );
        // Unique ids are scoped by platform
        assert!(reg
            .async_get_entity_id("number", "other_platform", "den_override_brightness")
            .is_none());
    }

    #[test]
    fn test_generate_entity_id_avoids_collisions() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let taken: EntityId = "number.override".parse().unwrap();
        reg.get_or_create("number", "adaptive_lighting", &taken, registration("a"));

        let reserved = HashSet::from(["number.override_2".to_string()]);
        let generated = reg
            .generate_entity_id("number", "Override", &reserved)
            .unwrap();
        assert_eq!(generated.to_string(), "number.override_3");

        let free = reg
            .generate_entity_id("number", "Something Else", &HashSet::new())
            .unwrap();
        assert_eq!(free.to_string(), "number.something_else");
    }

    #[test]
    fn test_entries_for_config_entry_and_remove() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let a: EntityId = "number.a".parse().unwrap();
        let b: EntityId = "number.b".parse().unwrap();
        reg.get_or_create("number", "adaptive_lighting", &a, registration("a"));
        reg.get_or_create("number", "adaptive_lighting", &b, registration("b"));

        assert_eq!(reg.entries_for_config_entry("entry1").len(), 2);

        reg.remove("number.a").unwrap();
        assert_eq!(reg.entries_for_config_entry("entry1").len(), 1);
        assert!(reg.async_get_entity_id("number", "adaptive_lighting", "a").is_none());
        assert!(reg.remove("number.a").is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let id: EntityId = "number.den_override_brightness".parse().unwrap();
        reg.get_or_create("number", "adaptive_lighting", &id, registration("den_override_brightness"));
        reg.save().await.unwrap();

        let reloaded = registry(&dir);
        reloaded.load().await.unwrap();
        let entry = reloaded.get("number.den_override_brightness").unwrap();
        assert_eq!(entry.platform, "adaptive_lighting");
        assert_eq!(entry.unit_of_measurement.as_deref(), Some("%"));
        assert_eq!(
            reloaded.async_get_entity_id("number", "adaptive_lighting", "den_override_brightness"),
            Some("number.den_override_brightness".to_string())
        );
    }
}
