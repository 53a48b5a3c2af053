//! `GM_getValue` / `GM_setValue` storage
//!
//! Values share the extension's storage area under
//! `<namespace>_<callerId>_<key>`, where the caller id is the sending
//! tab's id or `global` when the request has no tab.

use std::sync::Arc;

use serde_json::Value;

use crate::error::StorageError;
use crate::storage::KeyValueStorage;

pub const VALUE_NAMESPACE: &str = "gm";
pub const GLOBAL_CALLER: &str = "global";

/// Caller id for a request sender.
pub fn caller_id(tab_id: Option<i64>) -> String {
    match tab_id {
        Some(id) => id.to_string(),
        None => GLOBAL_CALLER.to_string(),
    }
}

pub struct ValueStore<S> {
    storage: Arc<S>,
}

impl<S: KeyValueStorage> ValueStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn prefix(caller: &str) -> String {
        format!("{}_{}_", VALUE_NAMESPACE, caller)
    }

    fn storage_key(caller: &str, key: &str) -> String {
        format!("{}{}", Self::prefix(caller), key)
    }

    /// Stored value, or `default` when absent.
    pub async fn get(&self, caller: &str, key: &str, default: Value) -> Value {
        match self.storage.get(&Self::storage_key(caller, key)).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                log::warn!("GM_getValue {:?} failed: {}", key, e);
                default
            }
        }
    }

    pub async fn set(&self, caller: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.storage.set(&Self::storage_key(caller, key), value).await
    }

    pub async fn delete(&self, caller: &str, key: &str) -> Result<(), StorageError> {
        self.storage.remove(&Self::storage_key(caller, key)).await
    }

    /// Keys stored by `caller`, without the namespace prefix, sorted.
    pub async fn list(&self, caller: &str) -> Vec<String> {
        let prefix = Self::prefix(caller);
        let mut keys: Vec<String> = match self.storage.keys().await {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                log::warn!("GM_listValues failed: {}", e);
                Vec::new()
            }
        };
        keys.sort();
        keys
    }
}
