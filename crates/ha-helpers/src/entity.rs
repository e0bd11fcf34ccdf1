//! Base entity trait
//!
//! An entity is one value exposed to the UI and to automations. The
//! platform that adds it fills in its [`EntityBinding`]; from then on the
//! entity can write its own state and look up what it was before the last
//! restart.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use ha_core::{Context, EntityId, State, STATE_UNKNOWN};
use ha_registries::{DeviceEntryType, DeviceIdentifier, DeviceRegistration};
use ha_state_store::StateStore;
use serde_json::{json, Value};
use thiserror::Error;

use crate::restore_state::RestoreStateData;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntityError {
    #[error("entity has not been added to Home Assistant yet")]
    NotAdded,

    #[error("entity {0} has already been added to Home Assistant")]
    AlreadyAdded(String),

    #[error("value {value} for {entity_id} is outside the range {min}..={max}")]
    OutOfRange {
        entity_id: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Device an entity belongs to
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceInfo {
    pub identifiers: Vec<DeviceIdentifier>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub entry_type: Option<DeviceEntryType>,
}

impl DeviceInfo {
    pub fn registration(&self) -> DeviceRegistration<'_> {
        DeviceRegistration {
            identifiers: &self.identifiers,
            name: self.name.as_deref(),
            manufacturer: self.manufacturer.as_deref(),
            model: self.model.as_deref(),
            entry_type: self.entry_type,
        }
    }
}

struct Bound {
    entity_id: EntityId,
    states: Arc<StateStore>,
    restore_state: Arc<RestoreStateData>,
}

/// Link between an entity and the running instance, set once when added
#[derive(Default)]
pub struct EntityBinding {
    bound: OnceLock<Bound>,
}

impl EntityBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(
        &self,
        entity_id: EntityId,
        states: Arc<StateStore>,
        restore_state: Arc<RestoreStateData>,
    ) -> Result<(), EntityError> {
        let id = entity_id.to_string();
        self.bound
            .set(Bound {
                entity_id,
                states,
                restore_state,
            })
            .map_err(|_| EntityError::AlreadyAdded(id))
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.bound.get().map(|b| &b.entity_id)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }
}

impl std::fmt::Debug for EntityBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityBinding")
            .field("entity_id", &self.entity_id())
            .finish()
    }
}

#[async_trait]
pub trait Entity: Send + Sync {
    fn binding(&self) -> &EntityBinding;

    /// Stable id used by the entity registry to keep the entity_id across restarts
    fn unique_id(&self) -> Option<String> {
        None
    }

    fn name(&self) -> Option<String> {
        None
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn unit_of_measurement(&self) -> Option<String> {
        None
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Current state value; `None` is written as `unknown`
    fn state(&self) -> Option<String>;

    /// Domain specific attributes merged into the written state
    fn state_attributes(&self) -> HashMap<String, Value> {
        HashMap::new()
    }

    /// Whether the last state is persisted across restarts
    fn should_restore(&self) -> bool {
        false
    }

    /// Refresh from the underlying source (run before add when requested)
    async fn async_update(&self) -> Result<(), EntityError> {
        Ok(())
    }

    /// Called once the entity is bound, before its first state write
    async fn async_added_to_hass(&self) -> Result<(), EntityError> {
        Ok(())
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.binding().entity_id().cloned()
    }

    /// Write the current state and attributes to the state machine
    fn async_write_ha_state(&self) -> Result<State, EntityError> {
        let bound = self.binding().bound.get().ok_or(EntityError::NotAdded)?;

        let mut attributes = self.state_attributes();
        if let Some(unit) = self.unit_of_measurement() {
            attributes.insert("unit_of_measurement".to_string(), json!(unit));
        }
        if let Some(name) = self.name() {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        if let Some(icon) = self.icon() {
            attributes.insert("icon".to_string(), json!(icon));
        }

        let state = self.state().unwrap_or_else(|| STATE_UNKNOWN.to_string());
        Ok(bound
            .states
            .set(bound.entity_id.clone(), state, attributes, Context::new()))
    }

    /// State this entity had when the instance last stopped
    async fn async_get_last_state(&self) -> Option<State> {
        let bound = self.binding().bound.get()?;
        bound
            .restore_state
            .async_get_stored_state(&bound.entity_id.to_string())
            .map(|stored| stored.state)
    }
}
