//! Home Assistant Registries
//!
//! Persistent registries for entities and devices, stored as versioned JSON
//! in the `.storage/` directory.

pub mod storage;

pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use entity_registry::{
    DisabledBy, EntityEntry, EntityRegistration, EntityRegistry, EntityRegistryData,
    EntityRegistryError,
};

pub use device_registry::{
    DeviceEntry, DeviceEntryType, DeviceIdentifier, DeviceRegistration, DeviceRegistry,
    DeviceRegistryData,
};

use std::sync::Arc;

/// Entity and device registries sharing one storage handle
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
}

impl Registries {
    /// Create new registries with the given config directory
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        Self::with_storage(Arc::new(Storage::new(config_dir)))
    }

    pub fn with_storage(storage: Arc<Storage>) -> Self {
        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            storage,
        }
    }

    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        Ok(())
    }

    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        Ok(())
    }
}
