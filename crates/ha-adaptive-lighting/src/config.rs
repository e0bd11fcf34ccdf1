//! YAML configuration imported as config entries

use std::collections::HashMap;

use ha_config_entries::{ConfigEntry, ConfigEntrySource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::consts::{CONF_NAME, DOMAIN};

/// One `adaptive_lighting:` list item from configuration.yaml
///
/// ```yaml
/// adaptive_lighting:
///   - name: living_room
///     lights: [light.couch]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveLightingConfig {
    pub name: String,

    /// Remaining options, passed through to the entry untouched
    #[serde(flatten)]
    pub options: HashMap<String, Value>,
}

impl AdaptiveLightingConfig {
    /// Config entry created when importing this item
    ///
    /// The name doubles as title and unique id so a second import of the
    /// same item can be recognized.
    pub fn into_config_entry(self) -> ConfigEntry {
        ConfigEntry::new(DOMAIN, self.name.clone())
            .with_unique_id(self.name.clone())
            .with_source(ConfigEntrySource::Import)
            .with_data_value(CONF_NAME, json!(self.name))
            .with_options(self.options)
    }
}
