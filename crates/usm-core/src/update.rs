//! Update checking
//!
//! Each record with an update source (`updateURL`, else `installURL`) is
//! fetched in turn and its `@version` compared with the stored one. The
//! loop is sequential, so a full check costs the sum of all fetch
//! latencies; fine for a handful of scripts, slow for hundreds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};
use crate::metadata::parse_metadata;
use crate::storage::{KeyValueStorage, Preferences};
use crate::store::ScriptStore;
use crate::types::ScriptRecord;

// =============================================================================
// Fetching
// =============================================================================

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: default_method(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            data: None,
        }
    }
}

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub response_text: String,
    /// `name: value` lines joined by CRLF
    pub response_headers: String,
    pub final_url: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network access. Implementations should bound each request with a timeout.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;

    /// GET `url` and return the body; non-2xx statuses are errors.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.fetch(&HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
                status_text: response.status_text,
            });
        }
        Ok(response.response_text)
    }
}

// =============================================================================
// Update Checker
// =============================================================================

/// A newer copy of a stored script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableUpdate {
    pub id: String,
    pub name: String,
    pub old_version: String,
    pub new_version: String,
    pub code: String,
}

pub struct UpdateChecker<S> {
    store: ScriptStore<S>,
}

impl<S: KeyValueStorage> UpdateChecker<S> {
    pub fn new(store: ScriptStore<S>) -> Self {
        Self { store }
    }

    /// Fetch every update source and report records with a different version.
    pub async fn find_updates<F: Fetcher>(&self, fetcher: &F) -> Vec<AvailableUpdate> {
        let mut updates = Vec::new();
        for script in self.store.list().await {
            if let Some(update) = check_script(fetcher, &script).await {
                updates.push(update);
            }
        }
        updates
    }

    /// Check and apply updates in place. Returns the number of records updated.
    ///
    /// Unless `force` is set, does nothing when auto-update is disabled.
    pub async fn check_all<F: Fetcher>(
        &self,
        fetcher: &F,
        force: bool,
        preferences: Preferences,
    ) -> Result<usize> {
        if !force && !preferences.auto_update_enabled {
            log::info!("Auto-update is disabled. Skipping update check.");
            return Ok(0);
        }

        log::info!("Checking for script updates...");
        let mut count = 0;
        for script in self.store.list().await {
            let update = match check_script(fetcher, &script).await {
                Some(update) => update,
                None => continue,
            };

            log::info!(
                "Update available for {}: {} -> {}",
                update.name,
                update.old_version,
                update.new_version
            );
            match self.apply(&update.id, update.code).await {
                Ok(Some(_)) => count += 1,
                Ok(None) => {}
                Err(e) => log::error!("Failed to apply update for {}: {}", update.name, e),
            }
        }

        log::info!("Update check complete. {} script(s) updated.", count);
        Ok(count)
    }

    /// Replace a record's code with fetched code.
    pub async fn apply(&self, id: &str, code: String) -> Result<Option<ScriptRecord>> {
        self.store.replace_code(id, code).await
    }
}

/// Compare one record against its update source. Failures are logged.
async fn check_script<F: Fetcher>(fetcher: &F, script: &ScriptRecord) -> Option<AvailableUpdate> {
    let source = script.update_source()?;

    let code = match fetcher.fetch_text(source).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("Failed to check update for {}: {}", script.name, e);
            return None;
        }
    };

    let old_version = script.version.as_deref()?;
    let new_version = parse_metadata(&code).version()?.to_string();
    if new_version == old_version {
        return None;
    }

    Some(AvailableUpdate {
        id: script.id.clone(),
        name: script.name.clone(),
        old_version: old_version.to_string(),
        new_version,
        code,
    })
}
