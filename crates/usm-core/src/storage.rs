//! Key-value persistence seam
//!
//! The extension keeps everything in the browser's local storage area.
//! Hosts provide that through [`KeyValueStorage`]; [`MemoryStorage`] is a
//! process-local implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::StorageError;

/// Storage key holding the script collection.
pub const SCRIPTS_KEY: &str = "scripts";
/// Storage key holding the auto-update preference.
pub const AUTO_UPDATE_KEY: &str = "autoUpdateEnabled";

/// Asynchronous JSON key-value store.
#[allow(async_fn_in_trait)]
pub trait KeyValueStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Value>) -> T,
    ) -> Result<T, StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError("memory storage lock poisoned".to_string()))?;
        Ok(f(&mut entries))
    }
}

impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.with_entries(|entries| entries.keys().cloned().collect())
    }
}

/// Persisted user preferences, read fresh for each call that needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub auto_update_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_update_enabled: true,
        }
    }
}

impl Preferences {
    /// Load preferences. Anything but an explicit `false` enables updates.
    pub async fn load<S: KeyValueStorage>(storage: &S) -> Result<Self, StorageError> {
        let auto_update_enabled = !matches!(
            storage.get(AUTO_UPDATE_KEY).await?,
            Some(Value::Bool(false))
        );
        Ok(Self {
            auto_update_enabled,
        })
    }

    pub async fn save<S: KeyValueStorage>(&self, storage: &S) -> Result<(), StorageError> {
        storage
            .set(AUTO_UPDATE_KEY, Value::Bool(self.auto_update_enabled))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").await.unwrap(), None);

        storage.set("a", json!([1, 2])).await.unwrap();
        assert_eq!(storage.get("a").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(storage.keys().await.unwrap(), vec!["a".to_string()]);

        storage.remove("a").await.unwrap();
        storage.remove("a").await.unwrap();
        assert_eq!(storage.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_preferences_default_to_enabled() {
        let storage = MemoryStorage::new();
        assert!(Preferences::load(&storage).await.unwrap().auto_update_enabled);

        storage.set(AUTO_UPDATE_KEY, json!("nonsense")).await.unwrap();
        assert!(Preferences::load(&storage).await.unwrap().auto_update_enabled);

        Preferences {
            auto_update_enabled: false,
        }
        .save(&storage)
        .await
        .unwrap();
        assert!(!Preferences::load(&storage).await.unwrap().auto_update_enabled);
    }
}
