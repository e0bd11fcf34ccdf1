//! Test Home Assistant instance
//!
//! An isolated instance backed by a temporary config directory, so the
//! same directory can be reopened to simulate a restart.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use ha_adaptive_lighting::{AdaptiveLightingConfig, DOMAIN};
use ha_config_entries::ConfigEntry;
use ha_core::State;
use ha_helpers::HomeAssistant;
use serde_json::json;
use tempfile::TempDir;

pub const BRIGHTNESS_ENTITY: &str = "number.adaptive_lighting_override_brightness_living_room";
pub const COLOR_TEMP_ENTITY: &str =
    "number.adaptive_lighting_override_color_temperature_living_room";

/// Install a test subscriber once; `RUST_LOG` controls the output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestHomeAssistant {
    pub hass: Arc<HomeAssistant>,
}

impl TestHomeAssistant {
    /// Start an instance on `config_dir`, loading anything stored there
    pub async fn start(config_dir: &Path) -> Self {
        init_tracing();
        let hass = Arc::new(HomeAssistant::new(config_dir));
        hass.async_start().await.expect("Failed to start");
        Self { hass }
    }

    /// Stop the instance, persisting registries and restore state
    pub async fn stop(self) {
        self.hass.async_stop().await.expect("Failed to stop");
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.hass.states.get(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.hass.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }
}

pub fn temp_config_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Config entry named "Living Room" with a fixed entry id
pub fn living_room_entry() -> ConfigEntry {
    ConfigEntry::new(DOMAIN, "Living Room")
        .with_entry_id("01JLIVINGROOM")
        .with_data_value("name", json!("Living Room"))
}

/// Same entry as [`living_room_entry`], built through a YAML import
pub fn living_room_import() -> ConfigEntry {
    let config: AdaptiveLightingConfig =
        serde_yaml::from_str("name: Living Room\ninterval: 90").expect("Invalid YAML");
    config.into_config_entry().with_entry_id("01JLIVINGROOM")
}
