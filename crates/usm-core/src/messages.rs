//! Background message protocol
//!
//! Popup, editor, install page and the page bridge all talk to the
//! background through one request/response exchange. Requests are a
//! closed set tagged by `action`; every request gets exactly one
//! [`Response`], and any failure inside a handler becomes an error
//! envelope instead of escaping to the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::inject::{ActivationReport, InjectionEngine, PageExecutor, Tabs};
use crate::metadata::parse_metadata;
use crate::shim::SCRIPT_HANDLER;
use crate::storage::{KeyValueStorage, Preferences};
use crate::store::ScriptStore;
use crate::types::{EngineConfig, NavigationEvent, NewScript, ScriptPatch, ScriptRecord};
use crate::update::{Fetcher, HttpRequest, UpdateChecker};
use crate::values::{caller_id, ValueStore};

/// Name given to scripts whose header declares none.
pub const UNNAMED_SCRIPT: &str = "Unnamed Script";

// =============================================================================
// Requests
// =============================================================================

/// A request to the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetScripts,
    GetScript {
        id: String,
    },
    AddScript {
        script: NewScript,
    },
    UpdateScript {
        id: String,
        #[serde(default)]
        updates: ScriptPatch,
    },
    DeleteScript {
        id: String,
    },
    ToggleScript {
        id: String,
    },
    InstallFromUrl {
        url: String,
    },
    InstallScript {
        code: String,
    },
    FetchUserscript {
        url: String,
    },
    ActivateScripts,
    CheckUpdates,
    ApplyUpdate {
        id: String,
        code: String,
    },
    CheckUpdatesNow,
    SetAutoUpdate {
        enabled: bool,
    },
    #[serde(rename = "GM_xmlhttpRequest")]
    GmXmlHttpRequest {
        details: HttpRequest,
    },
    #[serde(rename = "GM_getValue")]
    GmGetValue {
        key: String,
        #[serde(rename = "defaultValue", default)]
        default_value: Value,
    },
    #[serde(rename = "GM_setValue")]
    GmSetValue {
        key: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "GM_deleteValue")]
    GmDeleteValue {
        key: String,
    },
    #[serde(rename = "GM_listValues")]
    GmListValues,
    #[serde(rename = "GM_openInTab")]
    GmOpenInTab {
        url: String,
        #[serde(default = "default_active")]
        active: bool,
    },
    #[serde(rename = "GM_notification")]
    GmNotification {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

fn default_active() -> bool {
    true
}

/// Every `action` tag the background understands.
pub const ACTIONS: &[&str] = &[
    "getScripts",
    "getScript",
    "addScript",
    "updateScript",
    "deleteScript",
    "toggleScript",
    "installFromUrl",
    "installScript",
    "fetchUserscript",
    "activateScripts",
    "checkUpdates",
    "applyUpdate",
    "checkUpdatesNow",
    "setAutoUpdate",
    "GM_xmlhttpRequest",
    "GM_getValue",
    "GM_setValue",
    "GM_deleteValue",
    "GM_listValues",
    "GM_openInTab",
    "GM_notification",
];

/// Who sent a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sender {
    /// Tab of the page bridge; `None` for extension pages
    pub tab_id: Option<i64>,
}

// =============================================================================
// Responses
// =============================================================================

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// Background
// =============================================================================

/// The privileged side of the extension.
pub struct Background<S, F, B> {
    storage: Arc<S>,
    store: ScriptStore<S>,
    values: ValueStore<S>,
    updater: UpdateChecker<S>,
    engine: InjectionEngine<S, B>,
    fetcher: F,
    browser: Arc<B>,
}

impl<S, F, B> Background<S, F, B>
where
    S: KeyValueStorage,
    F: Fetcher,
    B: PageExecutor + Tabs,
{
    pub fn new(storage: Arc<S>, fetcher: F, browser: Arc<B>, config: EngineConfig) -> Self {
        let store = ScriptStore::new(Arc::clone(&storage));
        Self {
            values: ValueStore::new(Arc::clone(&storage)),
            updater: UpdateChecker::new(store.clone()),
            engine: InjectionEngine::new(store.clone(), Arc::clone(&browser), config),
            store,
            storage,
            fetcher,
            browser,
        }
    }

    pub fn store(&self) -> &ScriptStore<S> {
        &self.store
    }

    pub fn engine(&self) -> &InjectionEngine<S, B> {
        &self.engine
    }

    /// Answer a request. Never fails; errors become error envelopes.
    pub async fn handle(&self, request: Request, sender: Sender) -> Response {
        match self.dispatch(request, sender).await {
            Ok(data) => Response::ok(data),
            Err(e) => Response::error(e.to_string()),
        }
    }

    /// Answer a raw JSON request.
    pub async fn handle_json(&self, raw: &str, sender: Sender) -> Response {
        match parse_request(raw) {
            Ok(request) => self.handle(request, sender).await,
            Err(response) => response,
        }
    }

    async fn dispatch(&self, request: Request, sender: Sender) -> Result<Value> {
        match request {
            Request::GetScripts => Ok(serde_json::to_value(self.store.list().await)?),
            Request::GetScript { id } => Ok(serde_json::to_value(self.store.get(&id).await)?),
            Request::AddScript { script } => Ok(serde_json::to_value(self.store.add(script).await?)?),
            Request::UpdateScript { id, updates } => {
                Ok(serde_json::to_value(self.store.update(&id, updates).await?)?)
            }
            Request::DeleteScript { id } => {
                self.store.delete(&id).await?;
                Ok(Value::Null)
            }
            Request::ToggleScript { id } => {
                self.store.toggle(&id).await?;
                Ok(Value::Null)
            }
            Request::InstallFromUrl { url } => {
                let code = self.fetcher.fetch_text(&url).await?;
                Ok(serde_json::to_value(self.install(code, Some(url)).await?)?)
            }
            Request::InstallScript { code } => {
                Ok(serde_json::to_value(self.install(code, None).await?)?)
            }
            Request::FetchUserscript { url } => {
                let code = self.fetcher.fetch_text(&url).await?;
                log::debug!("Fetched userscript from {} ({} bytes)", url, code.len());
                Ok(json!({ "code": code }))
            }
            Request::ActivateScripts => Ok(serde_json::to_value(self.activate_current_tab().await?)?),
            Request::CheckUpdates => {
                Ok(serde_json::to_value(self.updater.find_updates(&self.fetcher).await)?)
            }
            Request::ApplyUpdate { id, code } => {
                self.updater.apply(&id, code).await?;
                Ok(Value::Null)
            }
            Request::CheckUpdatesNow => {
                let count = self.check_updates(true).await?;
                Ok(json!({ "count": count }))
            }
            Request::SetAutoUpdate { enabled } => {
                Preferences {
                    auto_update_enabled: enabled,
                }
                .save(self.storage.as_ref())
                .await?;
                Ok(Value::Null)
            }
            Request::GmXmlHttpRequest { details } => {
                Ok(serde_json::to_value(self.fetcher.fetch(&details).await?)?)
            }
            Request::GmGetValue { key, default_value } => {
                Ok(self.values.get(&caller_id(sender.tab_id), &key, default_value).await)
            }
            Request::GmSetValue { key, value } => {
                self.values.set(&caller_id(sender.tab_id), &key, value).await?;
                Ok(Value::Null)
            }
            Request::GmDeleteValue { key } => {
                self.values.delete(&caller_id(sender.tab_id), &key).await?;
                Ok(Value::Null)
            }
            Request::GmListValues => {
                Ok(serde_json::to_value(self.values.list(&caller_id(sender.tab_id)).await)?)
            }
            Request::GmOpenInTab { url, active } => {
                self.browser.open_tab(&url, active).await?;
                Ok(Value::Null)
            }
            Request::GmNotification { title, message } => {
                let title = title.unwrap_or_else(|| SCRIPT_HANDLER.to_string());
                self.notify(&title, message.as_deref().unwrap_or("")).await;
                Ok(Value::Null)
            }
        }
    }

    async fn install(&self, code: String, install_url: Option<String>) -> Result<ScriptRecord> {
        let name = parse_metadata(&code)
            .name()
            .unwrap_or(UNNAMED_SCRIPT)
            .to_string();
        self.store
            .add(NewScript {
                id: None,
                name,
                code,
                install_url,
            })
            .await
    }

    async fn activate_current_tab(&self) -> Result<ActivationReport> {
        let tab = self.browser.active_tab().await.ok_or(Error::NoActiveTab)?;
        log::info!("Activating scripts for: {}", tab.url);
        Ok(self.engine.activate(tab.id, &tab.url).await?)
    }

    /// Run an update check with the stored preferences.
    pub async fn check_updates(&self, force: bool) -> Result<usize> {
        let preferences = Preferences::load(self.storage.as_ref()).await?;
        let count = self
            .updater
            .check_all(&self.fetcher, force, preferences)
            .await?;
        if count > 0 {
            self.notify(
                SCRIPT_HANDLER,
                &format!("Updated {} script(s) automatically!", count),
            )
            .await;
        }
        Ok(count)
    }

    async fn notify(&self, title: &str, message: &str) {
        if !self.engine.config().notifications {
            log::info!("Notification (disabled): {}: {}", title, message);
            return;
        }
        if let Err(e) = self.browser.notify(title, message).await {
            log::warn!("Failed to show notification: {}", e);
        }
    }

    /// Extension installed or browser started.
    pub async fn on_startup(&self) -> usize {
        match self.check_updates(false).await {
            Ok(count) => count,
            Err(e) => {
                log::error!("Startup update check failed: {}", e);
                0
            }
        }
    }

    /// Before a navigation starts. Sends `.user.js` loads to the install page.
    pub async fn on_before_navigate(&self, event: &NavigationEvent) -> Result<Option<String>> {
        let redirect = match self.engine.install_redirect(event) {
            Some(redirect) => redirect,
            None => return Ok(None),
        };
        self.browser.navigate(event.tab_id, &redirect).await?;
        Ok(Some(redirect))
    }

    /// A navigation committed. Injects only in automatic mode.
    pub async fn on_committed(&self, event: &NavigationEvent) -> Option<ActivationReport> {
        match self.engine.on_committed(event).await {
            Ok(report) => report,
            Err(e) => {
                log::error!("Automatic injection into {} failed: {}", event.url, e);
                None
            }
        }
    }
}

/// Decode a raw request, distinguishing unknown actions from bad fields.
pub fn parse_request(raw: &str) -> std::result::Result<Request, Response> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Response::error(format!("Invalid request: {}", e)))?;

    let known = value
        .get("action")
        .and_then(Value::as_str)
        .map_or(false, |action| ACTIONS.contains(&action));
    if !known {
        return Err(Response::error("Unknown action"));
    }

    serde_json::from_value(value).map_err(|e| Response::error(format!("Invalid request: {}", e)))
}
