use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use usm_core::storage::KeyValueStorage;
use usm_core::StorageError;

/// Storage area kept as one JSON object in a file.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Map<String, Value>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StorageError(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| StorageError(format!("Invalid store '{}': {}", self.path.display(), e)))
    }

    async fn write(&self, entries: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError(format!("Failed to create '{}': {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError(format!("Failed to serialize store: {}", e)))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StorageError(format!("Failed to write '{}': {}", self.path.display(), e)))
    }
}

impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.read().await?;
        entries.insert(key.to_string(), value);
        self.write(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.read().await?;
        if entries.remove(key).is_some() {
            self.write(&entries).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read().await?.keys().cloned().collect())
    }
}
