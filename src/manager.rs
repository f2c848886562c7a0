//! Browser instance manager
//!
//! Owns the one browser the daemon drives and the tab showing the target
//! application.
//!
//! # Architecture
//!
//! Uses `Arc<Mutex<Option<BrowserWrapper>>>` pattern:
//! - Lazy launch (or attach) on first use
//! - Health checking on every access and automatic crash recovery
//! - Proper cleanup on shutdown
//!
//! # Async Lock Requirements
//!
//! Must use `tokio::sync::Mutex`: browser operations are async and the
//! guard is held across `.await` points.

use anyhow::{Context, Result};
use chromiumoxide::page::Page;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::BrowserConfig;
use crate::browser::{BrowserError, BrowserWrapper, connect_browser, find_target_page, launch_browser};

/// Manager for the automated browser with health checking and crash recovery
///
/// # Health Checking and Crash Recovery
///
/// Every call to `get_or_launch()` performs a health check via `browser.version()`
/// CDP command. If the browser has crashed (or the user closed it), it is
/// cleaned up and a new instance is launched or re-attached. A scheduled cycle
/// that hits a dead browser therefore recovers on the next tick.
pub struct BrowserManager {
    config: BrowserConfig,
    target_url: String,
    navigation_timeout: Duration,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
    current_page: Arc<Mutex<Option<Page>>>,
}

impl BrowserManager {
    /// Create a manager; nothing is launched until the first `get_or_launch()`
    pub fn new(config: BrowserConfig, target_url: impl Into<String>, navigation_timeout: Duration) -> Self {
        Self {
            config,
            target_url: target_url.into(),
            navigation_timeout,
            browser: Arc::new(Mutex::new(None)),
            current_page: Arc::new(Mutex::new(None)),
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    async fn start_browser(&self) -> Result<BrowserWrapper> {
        match self.config.connect_url.as_deref() {
            Some(endpoint) => connect_browser(endpoint).await,
            None => launch_browser(&self.config).await,
        }
    }

    /// Get or launch the shared browser instance with health checking and auto-recovery
    ///
    /// # Health Check and Recovery Flow
    /// 1. Lock browser mutex
    /// 2. If browser exists, check health via version() CDP command
    /// 3. If unhealthy, close crashed browser and remove from cache
    /// 4. If no browser or was unhealthy, launch (or attach) a new instance
    ///
    /// # Returns
    /// Arc to the browser Mutex - caller locks it to access BrowserWrapper
    pub async fn get_or_launch(&self) -> Result<Arc<Mutex<Option<BrowserWrapper>>>> {
        let mut guard = self.browser.lock().await;

        // Health check: if browser exists, verify it's alive
        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    tracing::debug!("Browser health check passed, reusing existing browser");
                    drop(guard);
                    return Ok(self.browser.clone());
                }
                Err(e) => {
                    tracing::warn!("Browser health check failed: {}. Triggering recovery...", e);

                    if let Some(mut crashed_wrapper) = guard.take() {
                        // Best-effort cleanup (may fail if process already dead)
                        if !crashed_wrapper.is_attached() {
                            let _ = crashed_wrapper.browser_mut().close().await;
                            let _ = crashed_wrapper.browser_mut().wait().await;
                        }
                        crashed_wrapper.cleanup_temp_dir();
                    }
                    self.current_page.lock().await.take();

                    tracing::info!("Crashed browser cleaned up, starting new instance");
                }
            }
        }

        tracing::info!("Starting browser (first time or after recovery)");
        let wrapper = self.start_browser().await?;
        *guard = Some(wrapper);
        drop(guard);

        Ok(self.browser.clone())
    }

    /// The tab showing the target application
    ///
    /// Reuses the cached tab while it responds, then any open tab on the
    /// target host (the user may have navigated to a specific report), and
    /// only then opens `target_url` in a new tab.
    pub async fn target_page(&self) -> Result<Page> {
        if let Some(page) = self.current_page.lock().await.clone() {
            if page.url().await.is_ok() {
                return Ok(page);
            }
            tracing::debug!("Cached page no longer responds, looking for a new one");
        }

        let browser_arc = self.get_or_launch().await?;
        let browser_guard = browser_arc.lock().await;
        let wrapper = browser_guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Browser not available after launch"))?;

        let page = match find_target_page(wrapper, &self.target_url).await? {
            Some(page) => {
                info!("Reusing open tab for {}", self.target_url);
                page
            }
            None => {
                info!("Opening {}", self.target_url);
                let page = tokio::time::timeout(
                    self.navigation_timeout,
                    wrapper.browser().new_page(self.target_url.as_str()),
                )
                .await
                .map_err(|_| {
                    BrowserError::NavigationFailed(format!(
                        "timeout after {}ms for URL: {}",
                        self.navigation_timeout.as_millis(),
                        self.target_url
                    ))
                })?
                .with_context(|| format!("Failed to open {}", self.target_url))?;

                // Sign-in redirects can leave this pending; the element waits
                // downstream cover the rest of the rendering
                if tokio::time::timeout(self.navigation_timeout, page.wait_for_navigation())
                    .await
                    .is_err()
                {
                    tracing::warn!("Page load did not settle within {}ms", self.navigation_timeout.as_millis());
                }
                page
            }
        };
        drop(browser_guard);

        *self.current_page.lock().await = Some(page.clone());
        Ok(page)
    }

    /// Shutdown the browser if running
    ///
    /// Safe to call multiple times (subsequent calls are no-ops). A browser
    /// we only attached to is left running.
    ///
    /// # Critical Implementation Note
    ///
    /// We must call BOTH:
    /// 1. `browser.close().await` - Sends close command to Chrome
    /// 2. `browser.wait().await` - Waits for process to fully exit
    ///
    /// `BrowserWrapper::drop()` only aborts the handler task.
    pub async fn shutdown(&self) -> Result<()> {
        self.current_page.lock().await.take();
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            if wrapper.is_attached() {
                info!("Detaching from browser");
                return Ok(());
            }

            info!("Shutting down browser");

            if let Err(e) = wrapper.browser_mut().close().await {
                tracing::warn!("Failed to close browser cleanly: {}", e);
            }

            if let Err(e) = wrapper.browser_mut().wait().await {
                tracing::warn!("Failed to wait for browser exit: {}", e);
            }

            wrapper.cleanup_temp_dir();
        }

        Ok(())
    }

    /// Non-blocking check of browser state
    pub async fn is_browser_running(&self) -> bool {
        self.browser.lock().await.is_some()
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        // Not a clean shutdown - only aborts the handler.
        // Call shutdown().await before dropping.
        info!("BrowserManager dropping - browser will be cleaned up");
    }
}
