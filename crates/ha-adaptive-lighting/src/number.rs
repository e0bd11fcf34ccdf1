//! Number platform for Adaptive Lighting
//!
//! Each config entry gets two slider numbers, override brightness and
//! override color temperature. They hold a user chosen value, survive
//! restarts through restore state, and are shared with the switch through
//! the integration's runtime data.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_core::{slugify, STATE_UNAVAILABLE, STATE_UNKNOWN};
use ha_helpers::number::{number_attributes, number_state};
use ha_helpers::{
    AddEntities, DeviceInfo, Entity, EntityBinding, EntityError, HomeAssistant, NumberEntity,
    NumberMode,
};
use ha_registries::{DeviceEntryType, DeviceIdentifier};
use serde_json::Value;
use tracing::debug;

use crate::consts::{
    CONF_NAME, DEFAULT_OVERRIDE_BRIGHTNESS, DEFAULT_OVERRIDE_COLOR_TEMP, DOMAIN, ICON_BRIGHTNESS,
    ICON_COLOR_TEMP, OVERRIDE_BRIGHTNESS_NUMBER, OVERRIDE_COLOR_TEMP_NUMBER,
};
use crate::data::AdaptiveLightingData;
use crate::SetupError;

/// Bounds and presentation of a [`SimpleNumber`]
#[derive(Debug, Clone, PartialEq)]
pub struct NumberDescription {
    pub which: &'static str,
    pub initial_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub step: f64,
    pub unit: &'static str,
    pub icon: &'static str,
}

pub const OVERRIDE_BRIGHTNESS: NumberDescription = NumberDescription {
    which: "Override Brightness",
    initial_value: DEFAULT_OVERRIDE_BRIGHTNESS,
    min_value: 1.0,
    max_value: 100.0,
    step: 1.0,
    unit: "%",
    icon: ICON_BRIGHTNESS,
};

pub const OVERRIDE_COLOR_TEMP: NumberDescription = NumberDescription {
    which: "Override Color Temperature",
    initial_value: DEFAULT_OVERRIDE_COLOR_TEMP,
    min_value: 2000.0,
    max_value: 6500.0,
    step: 100.0,
    unit: "K",
    icon: ICON_COLOR_TEMP,
};

/// A restorable slider number belonging to one Adaptive Lighting entry
pub struct SimpleNumber {
    binding: EntityBinding,
    description: NumberDescription,
    config_name: String,
    unique_id: String,
    name: String,
    value: RwLock<Option<f64>>,
}

impl SimpleNumber {
    /// The entry's configured name is read from data, then options, then the title
    pub fn new(description: NumberDescription, config_entry: &ConfigEntry) -> Self {
        let config_name = config_entry
            .lookup_str(CONF_NAME)
            .unwrap_or_else(|| config_entry.title.clone());
        let unique_id = format!("{}_{}", config_name, slugify(description.which));
        let name = format!("Adaptive Lighting {}: {}", description.which, config_name);

        Self {
            binding: EntityBinding::new(),
            description,
            config_name,
            unique_id,
            name,
            value: RwLock::new(None),
        }
    }

    pub fn which(&self) -> &str {
        self.description.which
    }

    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    pub fn initial_value(&self) -> f64 {
        self.description.initial_value
    }

    fn store(&self, value: f64) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

impl std::fmt::Debug for SimpleNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleNumber")
            .field("unique_id", &self.unique_id)
            .field("entity_id", &self.binding.entity_id())
            .field("value", &self.native_value())
            .finish()
    }
}

#[async_trait]
impl Entity for SimpleNumber {
    fn binding(&self) -> &EntityBinding {
        &self.binding
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.unique_id.clone())
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn icon(&self) -> Option<String> {
        Some(self.description.icon.to_string())
    }

    fn unit_of_measurement(&self) -> Option<String> {
        self.native_unit_of_measurement()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(DeviceInfo {
            identifiers: vec![DeviceIdentifier::new(DOMAIN, self.config_name.as_str())],
            name: Some(format!("Adaptive Lighting: {}", self.config_name)),
            entry_type: Some(DeviceEntryType::Service),
            ..Default::default()
        })
    }

    fn state(&self) -> Option<String> {
        number_state(self)
    }

    fn state_attributes(&self) -> HashMap<String, Value> {
        number_attributes(self)
    }

    fn should_restore(&self) -> bool {
        true
    }

    async fn async_added_to_hass(&self) -> Result<(), EntityError> {
        let last_state = self.async_get_last_state().await;
        debug!("{}: last state is {:?}", self.name, last_state);

        let value = match last_state {
            Some(state) if state.state != STATE_UNKNOWN && state.state != STATE_UNAVAILABLE => {
                parse_float(&state.state).unwrap_or(self.description.initial_value)
            }
            _ => self.description.initial_value,
        };
        self.store(value);
        Ok(())
    }
}

#[async_trait]
impl NumberEntity for SimpleNumber {
    fn native_value(&self) -> Option<f64> {
        *self.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn native_min_value(&self) -> f64 {
        self.description.min_value
    }

    fn native_max_value(&self) -> f64 {
        self.description.max_value
    }

    fn native_step(&self) -> Option<f64> {
        Some(self.description.step)
    }

    fn native_unit_of_measurement(&self) -> Option<String> {
        Some(self.description.unit.to_string())
    }

    fn mode(&self) -> NumberMode {
        NumberMode::Slider
    }

    async fn async_set_native_value(&self, value: f64) -> Result<(), EntityError> {
        debug!("{}: Setting value to {}", self.name, value);
        self.store(value);
        self.async_write_ha_state()?;
        Ok(())
    }
}

/// Parse a stored state as a float
///
/// Surrounding whitespace is ignored and `_` is accepted between digits.
fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    if !text.contains('_') {
        return text.parse().ok();
    }

    let bytes = text.as_bytes();
    let separators_ok = bytes.iter().enumerate().all(|(i, b)| {
        *b != b'_'
            || (i > 0
                && bytes[i - 1].is_ascii_digit()
                && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    });
    if !separators_ok {
        return None;
    }
    text.replace('_', "").parse().ok()
}

/// Set up the number entities of one config entry
///
/// Requires the integration's runtime data to exist. Both numbers are
/// stored in the entry's slot before they are handed to `add_entities`.
pub async fn async_setup_entry(
    hass: &HomeAssistant,
    config_entry: &ConfigEntry,
    add_entities: &dyn AddEntities,
) -> Result<(), SetupError> {
    let data = hass
        .data
        .get::<AdaptiveLightingData>(DOMAIN)
        .ok_or(SetupError::NotInitialized)?;

    let override_brightness = Arc::new(SimpleNumber::new(OVERRIDE_BRIGHTNESS, config_entry));
    let override_color_temp = Arc::new(SimpleNumber::new(OVERRIDE_COLOR_TEMP, config_entry));

    data.insert_number(
        &config_entry.entry_id,
        OVERRIDE_BRIGHTNESS_NUMBER,
        override_brightness.clone(),
    );
    data.insert_number(
        &config_entry.entry_id,
        OVERRIDE_COLOR_TEMP_NUMBER,
        override_color_temp.clone(),
    );

    add_entities
        .add_entities(
            vec![
                override_brightness as Arc<dyn Entity>,
                override_color_temp as Arc<dyn Entity>,
            ],
            true,
        )
        .await?;
    Ok(())
}
