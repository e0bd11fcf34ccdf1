//! Versioned JSON files under `.storage/`
//!
//! Registries and restore state each own one file, named by their storage
//! key and wrapped in a version envelope.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{key} is stored as version {from}, expected {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// On-disk envelope:
///
/// ```json
/// {
///   "version": 1,
///   "minor_version": 1,
///   "key": "core.restore_state",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Bumped on incompatible layout changes
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted under a fixed storage key
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Handle on the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// `config_dir` is the Home Assistant config directory; files go to `config_dir/.storage`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    /// Load a storable, `None` if it was never saved
    ///
    /// A major version other than `T::VERSION` is refused rather than
    /// misread.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<StorageFile<T>>> {
        let path = self.file_path(T::KEY);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = T::KEY, "Nothing stored yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;
        if storage_file.version != T::VERSION {
            return Err(StorageError::MigrationRequired {
                key: T::KEY.to_string(),
                from: storage_file.version,
                to: T::VERSION,
            });
        }

        debug!(
            key = T::KEY,
            version = storage_file.version,
            minor_version = storage_file.minor_version,
            "Loaded from storage"
        );
        Ok(Some(storage_file))
    }

    /// Save a storable
    ///
    /// Writes to `<key>.tmp` first and renames over the real file.
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.storage_dir).await?;

        let storage_file = StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION);
        let content = serde_json::to_string_pretty(&storage_file)?;

        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = T::KEY, bytes = content.len(), "Written to storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    impl Storable for TestData {
        const KEY: &'static str = "test.data";
        const VERSION: u32 = 1;
        const MINOR_VERSION: u32 = 2;
    }

    #[tokio::test]
    async fn test_storage_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };
        storage.save(&data).await.unwrap();
        assert!(storage.file_path("test.data").exists());
        assert!(!storage.file_path("test.data.tmp").exists());

        let loaded = storage.load::<TestData>().await.unwrap().unwrap();
        assert_eq!(loaded.data, data);
        assert_eq!(loaded.key, "test.data");
        assert_eq!(loaded.minor_version, 2);
    }

    #[tokio::test]
    async fn test_storage_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        assert!(storage.load::<TestData>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_refuses_other_major_version() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        std::fs::create_dir_all(storage.storage_dir()).unwrap();
        std::fs::write(
            storage.file_path("test.data"),
            r#"{"version": 2, "minor_version": 1, "key": "test.data", "data": {"name": "x", "value": 1}}"#,
        )
        .unwrap();

        let err = storage.load::<TestData>().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::MigrationRequired { from: 2, to: 1, .. }
        ));
    }
}
