use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::dom;
use crate::types::PageSnapshot;

/// How the session may be torn down. Resolved once when the handle is
/// acquired, never re-probed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TerminateMode {
    /// We own the Chrome process: dropping the handle kills it outright.
    Kill,
    /// We attached to someone else's Chrome: only close our tab.
    CloseTab,
}

/// Persistent browser session. Created once at startup, shared by the task
/// agent and the summarizer, released exactly once at shutdown.
pub struct BrowserSession {
    browser: Browser,
    pub tab: Arc<Tab>,
    terminate: TerminateMode,
}

impl BrowserSession {
    pub fn launch() -> Result<Self> {
        // 1. Try to attach to an already-running Chrome first.
        info!("[Browser] attempting to attach to existing Chrome on port 9222...");
        if let Ok(browser) = Browser::connect("http://127.0.0.1:9222".to_string()) {
            info!("[Browser] attached to existing Chrome");

            let tab = {
                let tabs_lock = browser.get_tabs();
                let tabs = tabs_lock.lock().unwrap();
                if let Some(t) = tabs.first() {
                    t.clone()
                } else {
                    browser.new_tab()?
                }
            };

            return Ok(Self {
                browser,
                tab,
                terminate: TerminateMode::CloseTab,
            });
        }

        info!("[Browser] could not attach, launching a fresh Chrome...");

        let options = LaunchOptions {
            headless: false,
            // Leave the window geometry unset: a fixed --window-size would
            // defeat --start-maximized, and the operator wants the browser's
            // native maximized layout.
            window_size: None,
            args: vec![
                OsStr::new("--start-maximized"),
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
            ],
            // Menu idle time must not reap the browser between actions.
            idle_browser_timeout: Duration::from_secs(3600),
            ..Default::default()
        };

        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        info!("[Browser] Chrome ready");

        Ok(Self {
            browser,
            tab,
            terminate: TerminateMode::Kill,
        })
    }

    /// Open a new tab and make it current.
    pub fn new_tab(&mut self) -> Result<()> {
        let tab = self.browser.new_tab()?;
        self.tab = tab;
        Ok(())
    }

    /// Release the session using the termination capability resolved at
    /// launch. Consumes the handle so release happens at most once.
    pub fn shutdown(self) -> Result<()> {
        match self.terminate {
            TerminateMode::Kill => {
                info!("[Browser] killing the Chrome process");
                // Dropping the handle terminates the child process.
                drop(self.browser);
                Ok(())
            }
            TerminateMode::CloseTab => {
                info!("[Browser] closing our tab in the attached Chrome");
                self.tab.close(true)?;
                Ok(())
            }
        }
    }
}

/// Snapshot a tab directly. Split out so async callers can clone the
/// `Arc<Tab>` into a blocking task without borrowing the session.
pub fn snapshot_tab(tab: &Arc<Tab>, include_screenshot: bool) -> Result<PageSnapshot> {
    let url = dom::current_url(tab).unwrap_or_else(|_| "unknown".into());
    let title = dom::page_title(tab).unwrap_or_else(|_| "untitled".into());
    let ui_elements = match dom::indexed_elements(tab) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("[Browser] UI element indexing failed: {:#}", e);
            None
        }
    };

    let screenshot = if include_screenshot {
        match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true) {
            Ok(bytes) => Some(BASE64.encode(bytes)),
            Err(e) => {
                warn!("[Browser] screenshot capture failed: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(PageSnapshot {
        url,
        title,
        ui_elements,
        screenshot,
    })
}
