//! Core type definitions for usm
//!
//! These types are persisted in storage and travel over the message
//! protocol, so their serde names are part of the wire format.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Script Records
// =============================================================================

/// A stored userscript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    /// Stable identifier, assigned once at creation
    pub id: String,
    /// Display name, unique across the collection
    pub name: String,
    /// Full source including the metadata header
    pub code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Creation time (Unix ms)
    #[serde(default)]
    pub created: i64,
    /// Last mutation time (Unix ms)
    #[serde(default)]
    pub modified: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `@updateURL`, falling back to `@downloadURL`
    #[serde(rename = "updateURL", default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    /// Set only when installed from a remote URL
    #[serde(rename = "installURL", default, skip_serializing_if = "Option::is_none")]
    pub install_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ScriptRecord {
    /// Where the update checker should look for a newer copy.
    pub fn update_source(&self) -> Option<&str> {
        self.update_url.as_deref().or(self.install_url.as_deref())
    }
}

/// A script as submitted for creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub code: String,
    #[serde(rename = "installURL", default, skip_serializing_if = "Option::is_none")]
    pub install_url: Option<String>,
}

/// Fields to merge onto an existing record. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "updateURL", default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    #[serde(rename = "installURL", default, skip_serializing_if = "Option::is_none")]
    pub install_url: Option<String>,
}

impl ScriptPatch {
    pub fn apply_to(self, record: &mut ScriptRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(code) = self.code {
            record.code = code;
        }
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
        if let Some(version) = self.version {
            record.version = Some(version);
        }
        if let Some(update_url) = self.update_url {
            record.update_url = Some(update_url);
        }
        if let Some(install_url) = self.install_url {
            record.install_url = Some(install_url);
        }
    }
}

// =============================================================================
// Injection Targets
// =============================================================================

/// When userscripts get injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionMode {
    /// Only when explicitly requested (popup action)
    #[default]
    OnDemand,
    /// On every top-level navigation commit
    Automatic,
}

/// Where injected code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    pub tab_id: i64,
    pub all_frames: bool,
}

impl FrameTarget {
    /// Every frame of a tab.
    pub fn all_frames(tab_id: i64) -> Self {
        Self {
            tab_id,
            all_frames: true,
        }
    }
}

/// A browser tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    pub url: String,
}

/// A navigation lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub tab_id: i64,
    /// 0 is the main frame
    pub frame_id: i64,
    pub url: String,
}

impl NavigationEvent {
    pub fn is_main_frame(&self) -> bool {
        self.frame_id == 0
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Default bound on network fetches and on the page bridge round trip.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Host-chosen engine behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub injection_mode: InjectionMode,
    /// Page that reviews and installs `.user.js` files
    pub install_page: String,
    /// Forward GM_notification and update summaries to the host
    pub notifications: bool,
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            injection_mode: InjectionMode::OnDemand,
            install_page: "install/install.html".to_string(),
            notifications: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ScriptRecord {
        ScriptRecord {
            id: "script_1".to_string(),
            name: "Foo".to_string(),
            code: "// code".to_string(),
            enabled: true,
            created: 1,
            modified: 1,
            version: None,
            update_url: None,
            install_url: None,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let mut r = record();
        r.update_url = Some("https://a/u.js".to_string());
        r.install_url = Some("https://a/i.js".to_string());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["updateURL"], "https://a/u.js");
        assert_eq!(json["installURL"], "https://a/i.js");
        assert!(json.get("version").is_none());
    }

    #[test]
    fn test_enabled_defaults_true_when_missing() {
        let r: ScriptRecord =
            serde_json::from_str(r#"{"id":"x","name":"n","code":"c"}"#).unwrap();
        assert!(r.enabled);
        assert_eq!(r.created, 0);
    }

    #[test]
    fn test_update_source_prefers_update_url() {
        let mut r = record();
        assert_eq!(r.update_source(), None);
        r.install_url = Some("https://a/i.js".to_string());
        assert_eq!(r.update_source(), Some("https://a/i.js"));
        r.update_url = Some("https://a/u.js".to_string());
        assert_eq!(r.update_source(), Some("https://a/u.js"));
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut r = record();
        ScriptPatch {
            enabled: Some(false),
            ..Default::default()
        }
        .apply_to(&mut r);
        assert!(!r.enabled);
        assert_eq!(r.name, "Foo");
        assert_eq!(r.code, "// code");
    }

    #[test]
    fn test_injection_mode_names() {
        assert_eq!(
            serde_json::to_string(&InjectionMode::OnDemand).unwrap(),
            "\"on-demand\""
        );
        assert_eq!(InjectionMode::default(), InjectionMode::OnDemand);
    }
}
