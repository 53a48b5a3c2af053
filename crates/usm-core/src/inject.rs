//! Injection sequencing
//!
//! An activation injects the capability shim into every frame of a tab,
//! then each resolved userscript in resolution order. The shim is a hard
//! prerequisite: if it fails, nothing else is injected. Userscripts are
//! independent: one failing does not stop the rest.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{HostError, InjectionError};
use crate::resolver::resolve;
use crate::shim::{shim_source, wrap_script};
use crate::storage::KeyValueStorage;
use crate::store::ScriptStore;
use crate::types::{EngineConfig, FrameTarget, InjectionMode, NavigationEvent, TabInfo};
use crate::url::{install_page_url, is_userscript_url};

// =============================================================================
// Host Capabilities
// =============================================================================

/// Runs code in page context.
///
/// This is the one place arbitrary, unchecked code reaches a page. Hosts
/// implement it with their script-execution API (main world, all frames
/// when `target.all_frames` is set).
#[allow(async_fn_in_trait)]
pub trait PageExecutor {
    async fn execute_in_page(&self, code: &str, target: FrameTarget) -> Result<(), InjectionError>;
}

/// Tab and notification operations of the browser host.
#[allow(async_fn_in_trait)]
pub trait Tabs {
    /// Active tab of the focused window.
    async fn active_tab(&self) -> Option<TabInfo>;

    async fn open_tab(&self, url: &str, active: bool) -> Result<(), HostError>;

    /// Send an existing tab to `url`.
    async fn navigate(&self, tab_id: i64, url: &str) -> Result<(), HostError>;

    async fn notify(&self, title: &str, message: &str) -> Result<(), HostError>;
}

// =============================================================================
// Activation Report
// =============================================================================

/// Outcome of one activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReport {
    pub url: String,
    /// Number of scripts that resolved for the URL
    pub matched: usize,
    /// Names of scripts injected successfully
    pub injected: Vec<String>,
    /// Names of scripts whose injection failed
    pub failed: Vec<String>,
}

// =============================================================================
// Injection Engine
// =============================================================================

pub struct InjectionEngine<S, E> {
    store: ScriptStore<S>,
    executor: Arc<E>,
    config: EngineConfig,
}

impl<S: KeyValueStorage, E: PageExecutor> InjectionEngine<S, E> {
    pub fn new(store: ScriptStore<S>, executor: Arc<E>, config: EngineConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Inject every script matching `url` into `tab_id`.
    ///
    /// Returns an empty report without touching the page when nothing
    /// matches, and an error only when the shim could not be injected.
    pub async fn activate(&self, tab_id: i64, url: &str) -> Result<ActivationReport, InjectionError> {
        let scripts = resolve(url, &self.store.list().await);

        let mut report = ActivationReport {
            url: url.to_string(),
            matched: scripts.len(),
            ..Default::default()
        };

        if scripts.is_empty() {
            return Ok(report);
        }

        let target = FrameTarget::all_frames(tab_id);

        if let Err(e) = self.executor.execute_in_page(&shim_source(), target).await {
            log::error!("Failed to inject GM API into tab {}: {}", tab_id, e);
            return Err(e);
        }

        for script in &scripts {
            match self.executor.execute_in_page(&wrap_script(script), target).await {
                Ok(()) => report.injected.push(script.name.clone()),
                Err(e) => {
                    log::error!("Failed to inject script {:?}: {}", script.name, e);
                    report.failed.push(script.name.clone());
                }
            }
        }

        log::info!(
            "Activated {} of {} script(s) on {}",
            report.injected.len(),
            report.matched,
            url
        );
        Ok(report)
    }

    /// Navigation committed. Activates only in automatic mode, main frame only.
    pub async fn on_committed(
        &self,
        event: &NavigationEvent,
    ) -> Result<Option<ActivationReport>, InjectionError> {
        if self.config.injection_mode != InjectionMode::Automatic || !event.is_main_frame() {
            return Ok(None);
        }
        self.activate(event.tab_id, &event.url).await.map(Some)
    }

    /// Install page to send a main-frame `.user.js` navigation to, if any.
    pub fn install_redirect(&self, event: &NavigationEvent) -> Option<String> {
        if !event.is_main_frame() || !is_userscript_url(&event.url) {
            return None;
        }
        Some(install_page_url(&self.config.install_page, &event.url))
    }
}
