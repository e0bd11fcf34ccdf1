//! Entity platform
//!
//! One platform exists per (entity domain, integration, config entry), for
//! example the `number` platform of one Adaptive Lighting entry. It is the
//! `async_add_entities` callback integrations call from their setup: it
//! resolves entity ids through the registry, registers devices and
//! entities, binds each entity and writes its first state.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_core::{EntityId, EntityIdError};
use ha_registries::EntityRegistration;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::entity::{Entity, EntityError};
use crate::hass::HomeAssistant;

/// Object id suggestion for entities without a name
const DEVICE_DEFAULT_NAME: &str = "Unnamed Device";

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("entity id {0} already exists")]
    DuplicateEntityId(String),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// The `async_add_entities` callback passed to platform setup
#[async_trait]
pub trait AddEntities: Send + Sync {
    /// Add entities to Home Assistant
    ///
    /// With `update_before_add`, each entity's `async_update` runs before
    /// its first state is written.
    async fn add_entities(
        &self,
        entities: Vec<Arc<dyn Entity>>,
        update_before_add: bool,
    ) -> Result<(), PlatformError>;
}

pub struct EntityPlatform {
    hass: Arc<HomeAssistant>,
    /// Entity domain (e.g. "number")
    domain: String,
    /// Integration providing the entities (e.g. "adaptive_lighting")
    platform_name: String,
    config_entry_id: Option<String>,
    /// Added entities by entity_id, in order of addition
    entities: RwLock<IndexMap<String, Arc<dyn Entity>>>,
}

impl std::fmt::Debug for EntityPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPlatform")
            .field("domain", &self.domain)
            .field("platform_name", &self.platform_name)
            .field("config_entry_id", &self.config_entry_id)
            .finish()
    }
}

impl EntityPlatform {
    pub fn new(
        hass: Arc<HomeAssistant>,
        domain: impl Into<String>,
        platform_name: impl Into<String>,
        config_entry: Option<&ConfigEntry>,
    ) -> Self {
        Self {
            hass,
            domain: domain.into(),
            platform_name: platform_name.into(),
            config_entry_id: config_entry.map(|e| e.entry_id.clone()),
            entities: RwLock::new(IndexMap::new()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entities
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<Arc<dyn Entity>> {
        self.entities
            .read()
            .ok()
            .and_then(|e| e.get(entity_id).cloned())
    }

    fn is_added(&self, entity_id: &str) -> bool {
        self.entities
            .read()
            .map(|e| e.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Whether `entity_id` is already live or registered to another config entry
    fn is_taken(&self, entity_id: &str) -> bool {
        if self.is_added(entity_id) || self.hass.states.get(entity_id).is_some() {
            return true;
        }
        self.hass
            .registries
            .entities
            .get(entity_id)
            .and_then(|entry| entry.config_entry_id.clone())
            .is_some_and(|owner| self.config_entry_id.as_deref() != Some(owner.as_str()))
    }

    /// Entity id from the registry, or a fresh one generated from the name
    fn resolve_entity_id(&self, entity: &dyn Entity) -> Result<EntityId, PlatformError> {
        let registry = &self.hass.registries.entities;

        if let Some(unique_id) = entity.unique_id() {
            if let Some(existing) =
                registry.async_get_entity_id(&self.domain, &self.platform_name, &unique_id)
            {
                return Ok(existing.parse()?);
            }
        }

        let mut reserved: HashSet<String> =
            self.hass.states.entity_ids(&self.domain).into_iter().collect();
        reserved.extend(self.entity_ids());

        let suggested = entity
            .name()
            .unwrap_or_else(|| DEVICE_DEFAULT_NAME.to_string());
        Ok(registry.generate_entity_id(&self.domain, &suggested, &reserved)?)
    }

    async fn add_entity(
        &self,
        entity: Arc<dyn Entity>,
        update_before_add: bool,
    ) -> Result<EntityId, PlatformError> {
        let entity_id = self.resolve_entity_id(entity.as_ref())?;
        let key = entity_id.to_string();
        if self.is_taken(&key) {
            return Err(PlatformError::DuplicateEntityId(key));
        }

        if let Some(unique_id) = entity.unique_id() {
            let device_id = match (entity.device_info(), &self.config_entry_id) {
                (Some(info), Some(entry_id)) => Some(
                    self.hass
                        .registries
                        .devices
                        .get_or_create(entry_id, info.registration())
                        .id
                        .clone(),
                ),
                _ => None,
            };

            let name = entity.name();
            let icon = entity.icon();
            let unit = entity.unit_of_measurement();
            let registry_entry = self.hass.registries.entities.get_or_create(
                &self.domain,
                &self.platform_name,
                &entity_id,
                EntityRegistration {
                    unique_id: &unique_id,
                    config_entry_id: self.config_entry_id.as_deref(),
                    device_id: device_id.as_deref(),
                    original_name: name.as_deref(),
                    original_icon: icon.as_deref(),
                    unit_of_measurement: unit.as_deref(),
                },
            );
            if registry_entry.is_disabled() {
                debug!(%entity_id, "Not adding disabled entity");
                return Ok(entity_id);
            }
        }

        entity.binding().bind(
            entity_id.clone(),
            self.hass.states.clone(),
            self.hass.restore_state.clone(),
        )?;
        if let Ok(mut entities) = self.entities.write() {
            entities.insert(key, entity.clone());
        }
        if entity.should_restore() {
            self.hass
                .restore_state
                .async_restore_entity_added(&entity_id);
        }

        if update_before_add {
            entity.async_update().await?;
        }
        entity.async_added_to_hass().await?;
        entity.async_write_ha_state()?;

        debug!(%entity_id, "Entity added");
        Ok(entity_id)
    }

    /// Remove every entity of this platform from the state machine
    ///
    /// Registry entries are kept so ids stay stable when the entry is set up again.
    pub fn async_reset(&self) {
        let entities: Vec<Arc<dyn Entity>> = self
            .entities
            .write()
            .map(|mut e| e.drain(..).map(|(_, entity)| entity).collect())
            .unwrap_or_default();

        for entity in entities {
            if let Some(entity_id) = entity.entity_id() {
                let last_state = self.hass.states.remove(&entity_id);
                if entity.should_restore() {
                    self.hass
                        .restore_state
                        .async_restore_entity_removed(&entity_id, last_state);
                }
            }
        }
        info!(
            "Reset {} platform for {}",
            self.domain, self.platform_name
        );
    }
}

#[async_trait]
impl AddEntities for EntityPlatform {
    /// Entities are added one by one; a failing entity is logged and
    /// skipped, and the first failure is returned once all were tried.
    async fn add_entities(
        &self,
        entities: Vec<Arc<dyn Entity>>,
        update_before_add: bool,
    ) -> Result<(), PlatformError> {
        info!(
            "Adding {} {} entities for {}",
            entities.len(),
            self.domain,
            self.platform_name
        );

        let mut first_error = None;
        for entity in entities {
            if let Err(e) = self.add_entity(entity, update_before_add).await {
                error!(
                    "Error adding entity to {}.{}: {}",
                    self.platform_name, self.domain, e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
