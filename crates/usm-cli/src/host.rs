use std::sync::Mutex;

use usm_core::inject::{PageExecutor, Tabs};
use usm_core::types::{FrameTarget, TabInfo};
use usm_core::{HostError, InjectionError};

/// Tab id given to the simulated page.
pub const CLI_TAB_ID: i64 = 1;

/// Desktop stand-in for the browser.
///
/// Page code is collected in injection order instead of executed, so an
/// activation produces one bundle that can be loaded into a page by hand.
#[derive(Default)]
pub struct CliBrowser {
    page: Option<TabInfo>,
    payloads: Mutex<Vec<String>>,
}

impl CliBrowser {
    pub fn new(page_url: Option<String>) -> Self {
        Self {
            page: page_url.map(|url| TabInfo { id: CLI_TAB_ID, url }),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Everything injected so far, joined in order.
    pub fn bundle(&self) -> String {
        match self.payloads.lock() {
            Ok(payloads) => payloads.join("\n;\n"),
            Err(_) => String::new(),
        }
    }

    pub fn payload_count(&self) -> usize {
        self.payloads.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl PageExecutor for CliBrowser {
    async fn execute_in_page(&self, code: &str, target: FrameTarget) -> Result<(), InjectionError> {
        log::debug!("Bundling {} bytes for tab {}", code.len(), target.tab_id);
        self.payloads
            .lock()
            .map_err(|_| InjectionError("payload buffer poisoned".to_string()))?
            .push(code.to_string());
        Ok(())
    }
}

impl Tabs for CliBrowser {
    async fn active_tab(&self) -> Option<TabInfo> {
        self.page.clone()
    }

    async fn open_tab(&self, url: &str, active: bool) -> Result<(), HostError> {
        println!("Open tab{}: {}", if active { "" } else { " (background)" }, url);
        Ok(())
    }

    async fn navigate(&self, tab_id: i64, url: &str) -> Result<(), HostError> {
        println!("Navigate tab {}: {}", tab_id, url);
        Ok(())
    }

    async fn notify(&self, title: &str, message: &str) -> Result<(), HostError> {
        println!("[{}] {}", title, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bundle_keeps_injection_order() {
        let browser = CliBrowser::new(Some("https://example.com/".to_string()));
        let target = FrameTarget::all_frames(CLI_TAB_ID);
        browser.execute_in_page("shim()", target).await.unwrap();
        browser.execute_in_page("script()", target).await.unwrap();

        assert_eq!(browser.payload_count(), 2);
        assert_eq!(browser.bundle(), "shim()\n;\nscript()");
    }

    #[tokio::test]
    async fn test_active_tab_from_page_url() {
        let browser = CliBrowser::new(Some("https://example.com/".to_string()));
        let tab = browser.active_tab().await.unwrap();
        assert_eq!(tab.id, CLI_TAB_ID);
        assert_eq!(tab.url, "https://example.com/");

        assert!(CliBrowser::new(None).active_tab().await.is_none());
    }
}
