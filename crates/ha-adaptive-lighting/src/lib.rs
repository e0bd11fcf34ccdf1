//! Adaptive Lighting integration
//!
//! Only the number platform lives here: per config entry, an override
//! brightness and an override color temperature the user can pin from the
//! UI. Other platforms read those values through [`override_brightness`]
//! and [`override_color_temp`].

pub mod config;
pub mod consts;
pub mod data;
pub mod number;

use std::sync::Arc;

use ha_config_entries::{ConfigEntry, ConfigEntryState};
use ha_helpers::{EntityPlatform, HomeAssistant, NumberEntity, PlatformError};
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use config::AdaptiveLightingConfig;
pub use consts::DOMAIN;
pub use data::{AdaptiveLightingData, EntryData};
pub use number::SimpleNumber;

use consts::{OVERRIDE_BRIGHTNESS_NUMBER, OVERRIDE_COLOR_TEMP_NUMBER};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("adaptive_lighting runtime data is not initialized")]
    NotInitialized,

    #[error("config entry {0} is already set up")]
    AlreadySetUp(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Set up a config entry
///
/// Creates the integration's runtime data and the entry slot when missing,
/// then sets up the number platform. An entry that is already set up is
/// refused without touching its entities. The returned platform is what
/// [`async_unload_entry`] tears down.
#[instrument(skip_all, fields(entry_id = %entry.entry_id, title = %entry.title))]
pub async fn async_setup_entry(
    hass: &Arc<HomeAssistant>,
    entry: &mut ConfigEntry,
) -> Result<EntityPlatform, SetupError> {
    let data = hass
        .data
        .get_or_insert_with(DOMAIN, AdaptiveLightingData::new)
        .ok_or(SetupError::NotInitialized)?;
    if entry.is_loaded() || data.has_numbers(&entry.entry_id) {
        return Err(SetupError::AlreadySetUp(entry.entry_id.clone()));
    }
    data.ensure_entry(&entry.entry_id);

    let platform = EntityPlatform::new(
        hass.clone(),
        ha_helpers::number::DOMAIN,
        DOMAIN,
        Some(&*entry),
    );

    match number::async_setup_entry(hass, entry, &platform).await {
        Ok(()) => {
            entry.set_state(ConfigEntryState::Loaded, None);
            info!("Set up Adaptive Lighting entry");
            Ok(platform)
        }
        Err(e) => {
            warn!("Error setting up Adaptive Lighting entry: {}", e);
            platform.async_reset();
            data.remove_entry(&entry.entry_id);
            entry.set_state(ConfigEntryState::SetupError, Some(e.to_string()));
            Err(e)
        }
    }
}

/// Unload a config entry set up by [`async_setup_entry`]
///
/// States are removed (their last values kept for restore) and the entry
/// slot is dropped. Registry entries stay so ids survive a reload.
#[instrument(skip_all, fields(entry_id = %entry.entry_id))]
pub fn async_unload_entry(hass: &HomeAssistant, entry: &mut ConfigEntry, platform: EntityPlatform) {
    platform.async_reset();
    if let Some(data) = hass.data.get::<AdaptiveLightingData>(DOMAIN) {
        data.remove_entry(&entry.entry_id);
    }
    entry.set_state(ConfigEntryState::NotLoaded, None);
    info!("Unloaded Adaptive Lighting entry");
}

/// Entry's override number stored under `key`
pub fn override_number(hass: &HomeAssistant, entry_id: &str, key: &str) -> Option<Arc<SimpleNumber>> {
    hass.data
        .get::<AdaptiveLightingData>(DOMAIN)?
        .number(entry_id, key)
}

/// Current override brightness (percent) of an entry
pub fn override_brightness(hass: &HomeAssistant, entry_id: &str) -> Option<f64> {
    override_number(hass, entry_id, OVERRIDE_BRIGHTNESS_NUMBER)?.native_value()
}

/// Current override color temperature (Kelvin) of an entry
pub fn override_color_temp(hass: &HomeAssistant, entry_id: &str) -> Option<f64> {
    override_number(hass, entry_id, OVERRIDE_COLOR_TEMP_NUMBER)?.native_value()
}
