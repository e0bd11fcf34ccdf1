//! Device Registry
//!
//! Groups entities under devices. Integrations identify a device by one or
//! more `(domain, id)` identifiers; the registry hands back a stable device id.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "core.device_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 12;

/// Device entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEntryType {
    /// Virtual device standing for a service rather than hardware
    Service,
}

/// A device identifier `(domain, id)`, serialized as a two element array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal ULID
    pub id: String,

    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,

    /// Config entries that reference this device
    #[serde(default)]
    pub config_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_by_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<DeviceEntryType>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    pub fn new(name: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            identifiers: Vec::new(),
            config_entries: Vec::new(),
            name: name.map(String::from),
            name_by_user: None,
            manufacturer: None,
            model: None,
            entry_type: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// User-set name if present, else the integration's name
    pub fn display_name(&self) -> &str {
        self.name_by_user
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("Unnamed Device")
    }
}

/// What an integration knows about a device when registering it
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistration<'a> {
    pub identifiers: &'a [DeviceIdentifier],
    pub name: Option<&'a str>,
    pub manufacturer: Option<&'a str>,
    pub model: Option<&'a str>,
    pub entry_type: Option<DeviceEntryType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier -> device_id
    by_identifier: DashMap<DeviceIdentifier, String>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<DeviceRegistryData>().await? {
            info!(
                "Loading {} devices from storage (v{}.{})",
                storage_file.data.devices.len(),
                storage_file.version,
                storage_file.minor_version
            );
            for device in storage_file.data.devices {
                self.index_entry(Arc::new(device));
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let devices: Vec<DeviceEntry> = self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        let count = devices.len();
        self.storage.save(&DeviceRegistryData { devices }).await?;
        debug!("Saved {} devices to storage", count);
        Ok(())
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        for identifier in &entry.identifiers {
            self.by_identifier
                .insert(identifier.clone(), entry.id.clone());
        }
        self.by_id.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| r.value().clone())
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_identifier
            .get(&DeviceIdentifier::new(domain, id))
            .and_then(|device_id| self.get(device_id.value()))
    }

    /// Register a device for a config entry, merging with any device that
    /// already owns one of the identifiers
    pub fn get_or_create(
        &self,
        config_entry_id: &str,
        registration: DeviceRegistration<'_>,
    ) -> Arc<DeviceEntry> {
        let existing = registration
            .identifiers
            .iter()
            .find_map(|ident| self.get_by_identifier(ident.domain(), ident.id()));

        let mut entry = match existing {
            Some(existing) => {
                debug!("Found existing device by identifier: {}", existing.id);
                (*existing).clone()
            }
            None => DeviceEntry::new(None),
        };

        let known: HashSet<DeviceIdentifier> = entry.identifiers.iter().cloned().collect();
        for ident in registration.identifiers {
            if !known.contains(ident) {
                entry.identifiers.push(ident.clone());
            }
        }
        if !entry.config_entries.iter().any(|id| id == config_entry_id) {
            entry.config_entries.push(config_entry_id.to_string());
        }
        if let Some(name) = registration.name {
            entry.name = Some(name.to_string());
        }
        if let Some(manufacturer) = registration.manufacturer {
            entry.manufacturer = Some(manufacturer.to_string());
        }
        if let Some(model) = registration.model {
            entry.model = Some(model.to_string());
        }
        if registration.entry_type.is_some() {
            entry.entry_type = registration.entry_type;
        }
        entry.modified_at = Utc::now();

        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Detach a config entry; devices left without any entry are removed
    ///
    /// Returns the ids of removed devices.
    pub fn clear_config_entry(&self, config_entry_id: &str) -> Vec<String> {
        let affected: Vec<Arc<DeviceEntry>> = self
            .by_id
            .iter()
            .filter(|r| r.config_entries.iter().any(|id| id == config_entry_id))
            .map(|r| r.value().clone())
            .collect();

        let mut removed = Vec::new();
        for device in affected {
            let mut entry = (*device).clone();
            entry.config_entries.retain(|id| id != config_entry_id);

            if entry.config_entries.is_empty() {
                self.by_id.remove(&entry.id);
                for ident in &entry.identifiers {
                    self.by_identifier.remove(ident);
                }
                info!("Removed device: {}", entry.id);
                removed.push(entry.id);
            } else {
                entry.modified_at = Utc::now();
                self.index_entry(Arc::new(entry));
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(Storage::new(dir.path())))
    }

    #[test]
    fn test_get_or_create_merges_by_identifier() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let identifiers = [DeviceIdentifier::new("adaptive_lighting", "den")];

        let first = reg.get_or_create(
            "entry1",
            DeviceRegistration {
                identifiers: &identifiers,
                name: Some("Adaptive Lighting: den"),
                entry_type: Some(DeviceEntryType::Service),
                ..Default::default()
            },
        );
        let second = reg.get_or_create(
            "entry1",
            DeviceRegistration {
                identifiers: &identifiers,
                ..Default::default()
            },
        );

        assert_eq!(first.id, second.id);
        assert_eq!(reg.len(), 1);
        assert_eq!(second.display_name(), "Adaptive Lighting: den");
        assert_eq!(second.entry_type, Some(DeviceEntryType::Service));
        assert_eq!(second.config_entries, vec!["entry1".to_string()]);
        assert!(reg.get_by_identifier("adaptive_lighting", "den").is_some());
    }

    #[test]
    fn test_clear_config_entry_removes_orphans() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let shared = [DeviceIdentifier::new("adaptive_lighting", "shared")];
        let solo = [DeviceIdentifier::new("adaptive_lighting", "solo")];

        reg.get_or_create("a", DeviceRegistration { identifiers: &shared, ..Default::default() });
        reg.get_or_create("b", DeviceRegistration { identifiers: &shared, ..Default::default() });
        let solo_device =
            reg.get_or_create("a", DeviceRegistration { identifiers: &solo, ..Default::default() });

        let removed = reg.clear_config_entry("a");
        assert_eq!(removed, vec![solo_device.id.clone()]);
        assert!(reg.get_by_identifier("adaptive_lighting", "solo").is_none());

        let remaining = reg.get_by_identifier("adaptive_lighting", "shared").unwrap();
        assert_eq!(remaining.config_entries, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let identifiers = [DeviceIdentifier::new("adaptive_lighting", "den")];
        reg.get_or_create(
            "entry1",
            DeviceRegistration {
                identifiers: &identifiers,
                name: Some("Adaptive Lighting: den"),
                entry_type: Some(DeviceEntryType::Service),
                ..Default::default()
            },
        );
        reg.save().await.unwrap();

        let reloaded = registry(&dir);
        reloaded.load().await.unwrap();
        let device = reloaded.get_by_identifier("adaptive_lighting", "den").unwrap();
        assert_eq!(device.name.as_deref(), Some("Adaptive Lighting: den"));
        assert_eq!(device.entry_type, Some(DeviceEntryType::Service));
    }
}
