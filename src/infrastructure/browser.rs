//! Rendering surface abstraction and the chromiumoxide-backed implementation.
//!
//! A `RenderSurface` is a scoped resource: the orchestrator acquires one per
//! item attempt through a `SurfaceFactory` and releases it on every exit path,
//! so no rendering session leaks across iterations.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::error::ScrapeError;
use crate::infrastructure::config::BrowserConfig as BrowserSettings;

/// A controllable page-rendering session.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Navigate the session to `url` and wait for the load event.
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    /// Evaluate a script in the page and return its JSON result.
    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, ScrapeError>;

    /// Read the current rendered markup.
    async fn content(&self) -> Result<String, ScrapeError>;

    /// Capture a PNG screenshot of the first element matching `selector`.
    async fn screenshot_element(&self, selector: &str, path: &Path) -> Result<(), ScrapeError>;

    /// Deterministic teardown. Idempotent; never fails the caller.
    async fn close(&self);
}

/// Produces one rendering session per scrape attempt.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn RenderSurface>, ScrapeError>;
}

fn map_cdp(err: CdpError, what: &str) -> ScrapeError {
    let message = format!("{what}: {err}");
    let lower = message.to_lowercase();
    if matches!(err, CdpError::Timeout) || lower.contains("timeout") {
        ScrapeError::Timeout(message)
    } else if lower.contains("net::") || lower.contains("connection") || lower.contains("dns") {
        ScrapeError::Network(message)
    } else {
        ScrapeError::Browser(message)
    }
}

/// Chromium session driven over the DevTools protocol.
pub struct ChromiumSurface {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| match map_cdp(e, "goto") {
                ScrapeError::Browser(msg) => ScrapeError::Navigation(msg),
                other => other,
            })
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| match map_cdp(e, "evaluate") {
                ScrapeError::Browser(msg) => ScrapeError::Script(msg),
                other => other,
            })?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.page
            .content()
            .await
            .map_err(|e| map_cdp(e, "read content"))
    }

    async fn screenshot_element(&self, selector: &str, path: &Path) -> Result<(), ScrapeError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| map_cdp(e, "find screenshot target"))?;
        let bytes = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| map_cdp(e, "capture screenshot"))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| ScrapeError::Browser(format!("failed to write screenshot: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        debug!("Rendering session released");
    }
}

/// Launches a fresh Chromium instance per acquired surface.
pub struct ChromiumSurfaceFactory {
    settings: BrowserSettings,
}

impl ChromiumSurfaceFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SurfaceFactory for ChromiumSurfaceFactory {
    async fn acquire(&self) -> Result<Box<dyn RenderSurface>, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_secs(self.settings.request_timeout_seconds))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", self.settings.user_agent));
        if !self.settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(ScrapeError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| map_cdp(e, "launch"))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| map_cdp(e, "open page"))?;

        Ok(Box::new(ChromiumSurface {
            page,
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
        }))
    }
}
