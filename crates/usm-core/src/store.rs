//! Durable script collection
//!
//! Every mutation is a full read → mutate → write round trip of the
//! collection stored under [`SCRIPTS_KEY`]. There is no compare-and-swap:
//! two overlapping mutations race and the later write wins, dropping the
//! earlier change. Callers that mutate concurrently must serialize.
//!
//! Entries that fail to decode are skipped when reading and written back
//! untouched, so one bad record never costs the others.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::metadata::parse_metadata;
use crate::storage::{KeyValueStorage, SCRIPTS_KEY};
use crate::types::{NewScript, ScriptPatch, ScriptRecord};

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The stored collection, split into decodable records and the rest.
#[derive(Debug, Default)]
struct Collection {
    records: Vec<ScriptRecord>,
    unreadable: Vec<Value>,
}

impl Collection {
    fn decode(value: Value) -> Self {
        let entries = match value {
            Value::Array(entries) => entries,
            other => {
                log::warn!("Stored scripts are not a list, treating as empty: {}", other);
                return Self::default();
            }
        };

        let mut collection = Self::default();
        for entry in entries {
            match serde_json::from_value::<ScriptRecord>(entry.clone()) {
                Ok(record) => collection.records.push(record),
                Err(e) => {
                    log::warn!("Skipping malformed script record: {}", e);
                    collection.unreadable.push(entry);
                }
            }
        }
        collection
    }

    /// Whether any entry, readable or not, carries `id`.
    fn has_id(&self, id: &str) -> bool {
        self.records.iter().any(|s| s.id == id)
            || self
                .unreadable
                .iter()
                .any(|entry| entry.get("id").and_then(Value::as_str) == Some(id))
    }

    fn encode(&self) -> Result<Value> {
        let mut entries = Vec::with_capacity(self.records.len() + self.unreadable.len());
        for record in &self.records {
            entries.push(serde_json::to_value(record)?);
        }
        entries.extend(self.unreadable.iter().cloned());
        Ok(Value::Array(entries))
    }
}

/// CRUD over the persisted script collection.
pub struct ScriptStore<S> {
    storage: Arc<S>,
}

impl<S> Clone for ScriptStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: KeyValueStorage> ScriptStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// All readable records. Missing or unreadable storage yields an empty list.
    pub async fn list(&self) -> Vec<ScriptRecord> {
        self.load().await.records
    }

    pub async fn get(&self, id: &str) -> Option<ScriptRecord> {
        self.list().await.into_iter().find(|s| s.id == id)
    }

    /// Store a new script, deriving `version` and `updateURL` from its header.
    ///
    /// Fails when the name is taken, or when a supplied id is already in use.
    pub async fn add(&self, script: NewScript) -> Result<ScriptRecord> {
        let mut collection = self.load().await;

        if collection.records.iter().any(|s| s.name == script.name) {
            return Err(Error::DuplicateName(script.name));
        }

        let now = now_millis();
        let id = match script.id {
            Some(id) if collection.has_id(&id) => {
                return Err(Error::DuplicateId(id));
            }
            Some(id) => id,
            None => generate_id(&collection.records, now),
        };

        let metadata = parse_metadata(&script.code);
        let record = ScriptRecord {
            id,
            name: script.name,
            version: metadata.version().map(str::to_string),
            update_url: metadata.update_url().map(str::to_string),
            code: script.code,
            enabled: true,
            created: now,
            modified: now,
            install_url: script.install_url,
        };

        collection.records.push(record.clone());
        self.save(&collection).await?;

        log::info!("Added script {:?} ({})", record.name, record.id);
        Ok(record)
    }

    /// Merge `patch` onto a record. `Ok(None)` when the id is unknown.
    pub async fn update(&self, id: &str, patch: ScriptPatch) -> Result<Option<ScriptRecord>> {
        self.mutate(id, |record| patch.apply_to(record)).await
    }

    /// Replace a record's code, re-deriving its version from the new header.
    pub async fn replace_code(&self, id: &str, code: String) -> Result<Option<ScriptRecord>> {
        let version = parse_metadata(&code).version().map(str::to_string);
        self.mutate(id, move |record| {
            record.code = code;
            record.version = version;
        })
        .await
    }

    /// Flip `enabled`. `Ok(None)` when the id is unknown.
    pub async fn toggle(&self, id: &str) -> Result<Option<ScriptRecord>> {
        self.mutate(id, |record| record.enabled = !record.enabled)
            .await
    }

    /// Remove a record. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut collection = self.load().await;
        let before = collection.records.len();
        collection.records.retain(|s| s.id != id);
        let removed = collection.records.len() != before;

        self.save(&collection).await?;

        log::debug!("Delete {}: removed={}", id, removed);
        Ok(removed)
    }

    async fn mutate(
        &self,
        id: &str,
        f: impl FnOnce(&mut ScriptRecord),
    ) -> Result<Option<ScriptRecord>> {
        let mut collection = self.load().await;
        let record = match collection.records.iter_mut().find(|s| s.id == id) {
            Some(record) => record,
            None => return Ok(None),
        };

        f(record);
        record.modified = now_millis();
        let updated = record.clone();

        self.save(&collection).await?;
        Ok(Some(updated))
    }

    async fn load(&self) -> Collection {
        match self.storage.get(SCRIPTS_KEY).await {
            Ok(Some(value)) => Collection::decode(value),
            Ok(None) => Collection::default(),
            Err(e) => {
                log::warn!("Failed to read scripts, treating as empty: {}", e);
                Collection::default()
            }
        }
    }

    async fn save(&self, collection: &Collection) -> Result<()> {
        self.storage.set(SCRIPTS_KEY, collection.encode()?).await?;
        Ok(())
    }
}

/// Time-derived id, suffixed when another record already holds it.
fn generate_id(existing: &[ScriptRecord], now: i64) -> String {
    let base = format!("script_{}", now);
    if !existing.iter().any(|s| s.id == base) {
        return base;
    }

    let mut n = 1u32;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !existing.iter().any(|s| s.id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn store() -> ScriptStore<MemoryStorage> {
        ScriptStore::new(Arc::new(MemoryStorage::new()))
    }

    fn new_script(name: &str, code: &str) -> NewScript {
        NewScript {
            name: name.to_string(),
            code: code.to_string(),
            ..Default::default()
        }
    }

    const HEADER: &str = "// ==UserScript==\n\
        // @name Foo\n\
        // @version 1.0\n\
        // @downloadURL https://example.com/foo.user.js\n\
        // @match https://example.com/*\n\
        // ==/UserScript==\n";

    #[tokio::test]
    async fn test_add_then_get() {
        let store = store();
        let added = store.add(new_script("Foo", HEADER)).await.unwrap();

        let got = store.get(&added.id).await.unwrap();
        assert_eq!(got.name, "Foo");
        assert_eq!(got.code, HEADER);
        assert!(got.enabled);
        assert!(got.id.starts_with("script_"));
        assert_eq!(got.created, got.modified);
    }

    #[tokio::test]
    async fn test_add_derives_metadata() {
        let store = store();
        let added = store.add(new_script("Foo", HEADER)).await.unwrap();
        assert_eq!(added.version.as_deref(), Some("1.0"));
        assert_eq!(added.update_url.as_deref(), Some("https://example.com/foo.user.js"));
        assert_eq!(added.install_url, None);
    }

    #[tokio::test]
    async fn test_add_keeps_supplied_id() {
        let store = store();
        let mut script = new_script("Foo", "");
        script.id = Some("custom".to_string());
        let added = store.add(script).await.unwrap();
        assert_eq!(added.id, "custom");
    }

    #[tokio::test]
    async fn test_supplied_id_must_be_unused() {
        let store = store();
        let a = store.add(new_script("A", "")).await.unwrap();

        let mut b = new_script("B", "");
        b.id = Some(a.id.clone());
        let err = store.add(b).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateId(ref id) if *id == a.id));

        let scripts = store.list().await;
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name, "A");

        assert!(store.delete(&a.id).await.unwrap());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = store();
        store.add(new_script("Foo", "a")).await.unwrap();
        let err = store.add(new_script("Foo", "b")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref name) if name == "Foo"));
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let store = store();
        let a = store.add(new_script("A", "")).await.unwrap();
        let b = store.add(new_script("B", "")).await.unwrap();
        let c = store.add(new_script("C", "")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_update_merges_and_restamps() {
        let store = store();
        let added = store.add(new_script("Foo", HEADER)).await.unwrap();

        let patch = ScriptPatch {
            name: Some("Bar".to_string()),
            ..Default::default()
        };
        let updated = store.update(&added.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.id, added.id);
        assert_eq!(updated.name, "Bar");
        assert_eq!(updated.code, HEADER);
        assert!(updated.modified >= added.modified);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_none() {
        let store = store();
        let result = store.update("missing", ScriptPatch::default()).await.unwrap();
        assert!(result.is_none());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_code_rederives_version() {
        let store = store();
        let added = store.add(new_script("Foo", HEADER)).await.unwrap();

        let new_code = HEADER.replace("1.0", "2.0");
        let updated = store.replace_code(&added.id, new_code.clone()).await.unwrap().unwrap();
        assert_eq!(updated.version.as_deref(), Some("2.0"));
        assert_eq!(updated.code, new_code);

        let updated = store
            .replace_code(&added.id, "no header".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, None);
    }

    #[tokio::test]
    async fn test_toggle_flips_enabled() {
        let store = store();
        let added = store.add(new_script("Foo", "")).await.unwrap();
        let toggled = store.toggle(&added.id).await.unwrap().unwrap();
        assert!(!toggled.enabled);
        let toggled = store.toggle(&added.id).await.unwrap().unwrap();
        assert!(toggled.enabled);
        assert!(store.toggle("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store();
        let a = store.add(new_script("A", "")).await.unwrap();
        store.add(new_script("B", "")).await.unwrap();

        assert!(store.delete(&a.id).await.unwrap());
        let after_first = store.list().await;
        assert!(!store.delete(&a.id).await.unwrap());
        assert_eq!(store.list().await, after_first);
        assert_eq!(after_first.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_storage_reads_as_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SCRIPTS_KEY, json!({"not": "a list"})).await.unwrap();
        let store = ScriptStore::new(Arc::clone(&storage));
        assert!(store.list().await.is_empty());

        store.add(new_script("Foo", "")).await.unwrap();
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_cost_the_others() {
        let storage = Arc::new(MemoryStorage::new());
        let bad = json!({"id": "s2", "name": "Bad", "code": "", "enabled": null});
        storage
            .set(
                SCRIPTS_KEY,
                json!([
                    {"id": "s1", "name": "Good", "code": "", "enabled": true, "created": 1, "modified": 1},
                    bad.clone(),
                ]),
            )
            .await
            .unwrap();
        let store = ScriptStore::new(Arc::clone(&storage));

        let scripts = store.list().await;
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].id, "s1");

        store.add(new_script("New", "")).await.unwrap();
        store.toggle("s1").await.unwrap().unwrap();
        store.delete("missing").await.unwrap();

        let names: Vec<String> = store.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Good", "New"]);
        assert!(!store.get("s1").await.unwrap().enabled);

        let stored = storage.get(SCRIPTS_KEY).await.unwrap().unwrap();
        assert!(stored.as_array().unwrap().contains(&bad));

        let mut clash = new_script("Other", "");
        clash.id = Some("s2".to_string());
        assert!(matches!(store.add(clash).await, Err(Error::DuplicateId(_))));
    }

    #[test]
    fn test_generate_id_suffixes_collisions() {
        let existing = vec![ScriptRecord {
            id: "script_5".to_string(),
            name: "A".to_string(),
            code: String::new(),
            enabled: true,
            created: 5,
            modified: 5,
            version: None,
            update_url: None,
            install_url: None,
        }];
        assert_eq!(generate_id(&existing, 5), "script_5_1");
        assert_eq!(generate_id(&existing, 6), "script_6");
    }
}
