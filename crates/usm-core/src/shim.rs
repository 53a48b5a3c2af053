//! Page-context payloads
//!
//! The shim is injected once per activation, before any userscript. It
//! installs the `GM_*` API on `window` and talks to the extension through
//! `window.postMessage`, which the content-script bridge forwards as a
//! protocol [`Request`](crate::messages::Request).
//!
//! Each userscript is then wrapped by [`wrap_script`] so that its
//! top-level declarations live in a private function scope.

use serde_json::json;

use crate::types::ScriptRecord;

/// Page → bridge message type.
pub const REQUEST_MESSAGE_TYPE: &str = "USM_GM_REQUEST";
/// Bridge → page message type.
pub const RESPONSE_MESSAGE_TYPE: &str = "USM_GM_RESPONSE";
/// How long a page-side GM call waits for the extension.
pub const BRIDGE_TIMEOUT_MS: u64 = 30_000;

/// Name reported as `GM_info.scriptHandler`.
pub const SCRIPT_HANDLER: &str = "usm";

const SHIM_TEMPLATE: &str = r#"(function() {
  'use strict';

  if (window.__usmShimLoaded) return;
  window.__usmShimLoaded = true;

  let requestIdCounter = 0;
  const pendingRequests = new Map();

  function sendBridgeMessage(action, payload) {
    return new Promise((resolve, reject) => {
      const requestId = ++requestIdCounter;
      pendingRequests.set(requestId, { resolve, reject });

      window.postMessage({
        type: '__REQUEST_TYPE__',
        requestId: requestId,
        action: action,
        payload: payload
      }, '*');

      setTimeout(() => {
        if (pendingRequests.has(requestId)) {
          pendingRequests.delete(requestId);
          reject(new Error('Request timeout'));
        }
      }, __BRIDGE_TIMEOUT_MS__);
    });
  }

  window.addEventListener('message', (event) => {
    if (event.source !== window) return;
    if (!event.data || event.data.type !== '__RESPONSE_TYPE__') return;

    const pending = pendingRequests.get(event.data.requestId);
    if (pending) {
      pendingRequests.delete(event.data.requestId);
      pending.resolve(event.data.response || { success: false, error: 'No response' });
    }
  });

  function dataOf(response) {
    if (!response.success) throw new Error(response.error || 'Request failed');
    return response.data;
  }

  window.GM_xmlhttpRequest = function(details) {
    return sendBridgeMessage('GM_xmlhttpRequest', {
      details: {
        method: details.method || 'GET',
        url: details.url,
        headers: details.headers || {},
        data: details.data
      }
    }).then((response) => {
      if (response.success) {
        const result = Object.assign({ readyState: 4 }, response.data);
        if (details.onload) details.onload(result);
        return result;
      }
      const errorResult = {
        readyState: 4,
        status: 0,
        statusText: response.error || 'Error',
        error: response.error
      };
      if (details.onerror) details.onerror(errorResult);
      throw new Error(response.error);
    });
  };

  window.GM_getValue = function(key, defaultValue) {
    return sendBridgeMessage('GM_getValue', { key, defaultValue })
      .then((response) => response.success ? response.data : defaultValue);
  };

  window.GM_setValue = function(key, value) {
    return sendBridgeMessage('GM_setValue', { key, value })
      .then((response) => response.success);
  };

  window.GM_deleteValue = function(key) {
    return sendBridgeMessage('GM_deleteValue', { key })
      .then((response) => response.success);
  };

  window.GM_listValues = function() {
    return sendBridgeMessage('GM_listValues', {})
      .then((response) => (response.success && response.data) || []);
  };

  window.GM_addStyle = function(css) {
    const style = document.createElement('style');
    style.textContent = css;
    (document.head || document.documentElement).appendChild(style);
    return style;
  };

  window.GM_getResourceText = function(name) {
    console.warn('GM_getResourceText is not supported:', name);
    return '';
  };

  window.GM_getResourceURL = function(name) {
    console.warn('GM_getResourceURL is not supported:', name);
    return '';
  };

  window.GM_openInTab = function(url, openInBackground) {
    return sendBridgeMessage('GM_openInTab', { url, active: !openInBackground })
      .then(dataOf);
  };

  window.GM_setClipboard = function(text) {
    navigator.clipboard.writeText(text).catch((err) => {
      console.error('Failed to set clipboard:', err);
    });
  };

  window.GM_notification = function(details) {
    const text = typeof details === 'string' ? details : details.text;
    const title = typeof details === 'object' && details.title ? details.title : '__HANDLER__';
    return sendBridgeMessage('GM_notification', { title, message: text });
  };

  window.GM_info = {
    script: { name: 'User Script', version: '' },
    scriptHandler: '__HANDLER__',
    version: '__HANDLER_VERSION__'
  };

  window.unsafeWindow = window;
})();
"#;

const BRIDGE_TEMPLATE: &str = r#"(function() {
  window.addEventListener('message', (event) => {
    if (event.source !== window) return;
    if (!event.data || event.data.type !== '__REQUEST_TYPE__') return;

    const { requestId, action, payload } = event.data;
    chrome.runtime.sendMessage(Object.assign({ action }, payload), (response) => {
      window.postMessage({
        type: '__RESPONSE_TYPE__',
        requestId: requestId,
        response: response
      }, '*');
    });
  });
})();
"#;

fn fill(template: &str) -> String {
    template
        .replace("__REQUEST_TYPE__", REQUEST_MESSAGE_TYPE)
        .replace("__RESPONSE_TYPE__", RESPONSE_MESSAGE_TYPE)
        .replace("__BRIDGE_TIMEOUT_MS__", &BRIDGE_TIMEOUT_MS.to_string())
        .replace("__HANDLER_VERSION__", env!("CARGO_PKG_VERSION"))
        .replace("__HANDLER__", SCRIPT_HANDLER)
}

/// The capability shim, injected before any userscript.
pub fn shim_source() -> String {
    fill(SHIM_TEMPLATE)
}

/// Content-script bridge relaying shim requests to the background.
pub fn bridge_source() -> String {
    fill(BRIDGE_TEMPLATE)
}

/// Page-side set of script ids already run in the current document.
pub const INJECTED_REGISTRY: &str = "__usmInjected";

/// Wrap a userscript in its own function scope.
///
/// The source is embedded as a JSON string and evaluated with a direct
/// `eval`, so syntax errors are caught here instead of failing the whole
/// injection call, and `GM_info` reflects this script. A script id seen
/// before in the same document returns without running again.
pub fn wrap_script(script: &ScriptRecord) -> String {
    let id = json!(script.id).to_string();
    let code = json!(script.code).to_string();
    let name = json!(script.name).to_string();
    let info = json!({
        "name": script.name,
        "version": script.version.as_deref().unwrap_or(""),
    })
    .to_string();

    format!(
        "(function() {{\n\
         \x20 const injected = window.{registry} = window.{registry} || new Set();\n\
         \x20 if (injected.has({id})) return;\n\
         \x20 injected.add({id});\n\
         \x20 const GM_info = Object.assign({{}}, window.GM_info, {{ script: {info} }});\n\
         \x20 try {{\n\
         \x20   eval({code});\n\
         \x20 }} catch (e) {{\n\
         \x20   console.error('[{handler}] Script error in', {name}, e);\n\
         \x20 }}\n\
         }})();\n",
        registry = INJECTED_REGISTRY,
        id = id,
        info = info,
        code = code,
        name = name,
        handler = SCRIPT_HANDLER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, code: &str) -> ScriptRecord {
        ScriptRecord {
            id: "id".to_string(),
            name: name.to_string(),
            code: code.to_string(),
            enabled: true,
            created: 0,
            modified: 0,
            version: Some("1.0".to_string()),
            update_url: None,
            install_url: None,
        }
    }

    #[test]
    fn test_shim_placeholders_filled() {
        let shim = shim_source();
        for placeholder in ["__REQUEST_TYPE__", "__RESPONSE_TYPE__", "__BRIDGE_TIMEOUT_MS__", "__HANDLER"] {
            assert!(!shim.contains(placeholder), "unfilled {}", placeholder);
        }
        assert!(shim.contains("30000"));
        assert!(shim.contains(REQUEST_MESSAGE_TYPE));
        assert!(shim.contains(RESPONSE_MESSAGE_TYPE));
        assert!(shim.contains("window.GM_getValue"));
    }

    #[test]
    fn test_bridge_placeholders_filled() {
        let bridge = bridge_source();
        assert!(bridge.contains(REQUEST_MESSAGE_TYPE));
        assert!(bridge.contains(RESPONSE_MESSAGE_TYPE));
        assert!(!bridge.contains("__REQUEST_TYPE__"));
    }

    #[test]
    fn test_wrap_escapes_source() {
        let wrapped = wrap_script(&record("Quote \"me\"", "var a = '</script>';\nconsole.log(`x`);"));
        assert!(wrapped.starts_with("(function() {"));
        assert!(wrapped.trim_end().ends_with("})();"));
        assert!(wrapped.contains(r#"eval("var a = '</script>';\nconsole.log(`x`);")"#));
        assert!(wrapped.contains(r#""Quote \"me\"""#));
        assert!(wrapped.contains(r#""version":"1.0""#));
    }

    #[test]
    fn test_wrap_runs_once_per_document() {
        let wrapped = wrap_script(&record("A", "run()"));
        let guard = wrapped.find(r#"if (injected.has("id")) return;"#).unwrap();
        let register = wrapped.find(r#"injected.add("id");"#).unwrap();
        let body = wrapped.find("eval(").unwrap();
        assert!(guard < register && register < body);
        assert!(wrapped.contains("window.__usmInjected = window.__usmInjected || new Set()"));
    }
}
