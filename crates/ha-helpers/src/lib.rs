//! Entity model for Home Assistant integrations
//!
//! Everything an integration platform plugs into:
//!
//! - [`HomeAssistant`] - the hub handed to platforms (states, registries,
//!   restore state and the per-integration [`HassData`] store)
//! - [`Entity`] / [`NumberEntity`] - what a platform implements
//! - [`EntityPlatform`] - the [`AddEntities`] callback that registers
//!   entities with the registries and writes their first state
//! - [`RestoreStateData`] - last known states carried across restarts

pub mod entity;
pub mod entity_platform;
pub mod hass;
pub mod number;
pub mod restore_state;

pub use entity::{DeviceInfo, Entity, EntityBinding, EntityError};
pub use entity_platform::{AddEntities, EntityPlatform, PlatformError};
pub use hass::{HassData, HomeAssistant};
pub use number::{NumberEntity, NumberMode};
pub use restore_state::{RestoreStateData, StoredState};
