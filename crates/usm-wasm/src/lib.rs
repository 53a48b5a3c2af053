//! WebAssembly bindings for usm
//!
//! Exposes the pure parts of the core to the extension's JS glue. Records
//! cross the boundary as plain JS objects in their stored JSON shape.

use wasm_bindgen::prelude::*;

use usm_core::metadata;
use usm_core::pattern;
use usm_core::resolver::resolve;
use usm_core::shim;
use usm_core::types::{EngineConfig, ScriptRecord};
use usm_core::url::{install_page_url, is_userscript_url as is_userscript};

fn warn(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&JsValue::from_str(message));
    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

fn to_json(value: &JsValue) -> Result<String, JsValue> {
    js_sys::JSON::stringify(value)
        .map(String::from)
        .map_err(|_| JsValue::from_str("Value is not serializable"))
}

fn from_json(json: &str) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(json)
}

/// Decode each stored record, skipping malformed ones.
fn decode_records(json: &str) -> Result<Vec<ScriptRecord>, String> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| format!("Scripts must be an array: {}", e))?;

    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn(&format!("Skipping malformed script record: {}", e));
                None
            }
        })
        .collect())
}

fn resolve_json(url: &str, scripts_json: &str) -> Result<String, String> {
    let scripts = decode_records(scripts_json)?;
    serde_json::to_string(&resolve(url, &scripts)).map_err(|e| e.to_string())
}

fn wrap_json(script_json: &str) -> Result<String, String> {
    let script: ScriptRecord =
        serde_json::from_str(script_json).map_err(|e| format!("Invalid script record: {}", e))?;
    Ok(shim::wrap_script(&script))
}

fn redirect_for(install_page: Option<&str>, url: &str) -> Option<String> {
    if !is_userscript(url) {
        return None;
    }
    let default_page = EngineConfig::default().install_page;
    Some(install_page_url(install_page.unwrap_or(&default_page), url))
}

// =============================================================================
// Metadata and Matching
// =============================================================================

/// Parse a userscript header into `{ key: [values...] }`.
#[wasm_bindgen]
pub fn parse_metadata(code: &str) -> JsValue {
    let parsed = metadata::parse_metadata(code);
    let result = js_sys::Object::new();
    for key in parsed.keys() {
        let values = js_sys::Array::new();
        for value in parsed.values(key) {
            values.push(&JsValue::from_str(value));
        }
        let _ = js_sys::Reflect::set(&result, &JsValue::from_str(key), &values);
    }
    result.into()
}

#[wasm_bindgen]
pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    pattern::matches_pattern(url, pattern)
}

/// Scripts from `scripts` that run on `url`, in order.
#[wasm_bindgen]
pub fn resolve_scripts(url: &str, scripts: JsValue) -> Result<JsValue, JsValue> {
    let json = to_json(&scripts)?;
    let resolved = resolve_json(url, &json).map_err(|e| JsValue::from_str(&e))?;
    from_json(&resolved)
}

// =============================================================================
// Install Links
// =============================================================================

#[wasm_bindgen]
pub fn is_userscript_url(url: &str) -> bool {
    is_userscript(url)
}

/// Install-page URL for a `.user.js` navigation, or `undefined`.
#[wasm_bindgen]
pub fn install_redirect(url: &str, install_page: Option<String>) -> Option<String> {
    redirect_for(install_page.as_deref(), url)
}

// =============================================================================
// Page Payloads
// =============================================================================

#[wasm_bindgen]
pub fn shim_source() -> String {
    shim::shim_source()
}

#[wasm_bindgen]
pub fn bridge_source() -> String {
    shim::bridge_source()
}

#[wasm_bindgen]
pub fn wrap_script(script: JsValue) -> Result<String, JsValue> {
    let json = to_json(&script)?;
    wrap_json(&json).map_err(|e| JsValue::from_str(&e))
}
