//! Browser lifecycle management
//!
//! Handles launching (or attaching to) a chromiumoxide browser and locating
//! the tab that shows the target application.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use crate::BrowserConfig;

/// Wrapper for Browser and its event handler task
///
/// Ensures handler is properly cleaned up when browser is dropped.
/// Handler MUST be aborted to prevent it running indefinitely after
/// browser is closed.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Profile directory to delete on shutdown (ephemeral profiles only)
    user_data_dir: Option<PathBuf>,
    /// Attached to a browser the user started; never close it
    attached: bool,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, ephemeral_dir: Option<PathBuf>) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: ephemeral_dir,
            attached: false,
        }
    }

    pub(crate) fn attached(browser: Browser, handler: JoinHandle<()>) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: None,
            attached: true,
        }
    }

    /// Get reference to inner browser
    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Get mutable reference to inner browser
    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    /// Whether this wrapper only attached to someone else's browser
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Clean up an ephemeral profile directory (blocking operation)
    ///
    /// MUST be called AFTER `browser.wait()` completes to ensure Chrome
    /// has released all file handles. Windows will fail to remove locked files.
    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        info!("Dropping BrowserWrapper - aborting handler task");
        self.handler.abort();

        if let Some(path) = self.user_data_dir.as_ref() {
            tracing::warn!(
                "BrowserWrapper dropped without explicit cleanup. \
                Temp directory will be orphaned: {}. \
                Call BrowserManager::shutdown() before dropping to ensure proper cleanup.",
                path.display()
            );
        }
    }
}

/// Launch a new browser instance
///
/// The profile is persistent unless `ephemeral_profile` is set, in which case
/// a per-process temp directory is used and handed to the wrapper for cleanup.
///
/// # Handler Lifecycle
/// The returned wrapper aborts the CDP handler task when dropped.
pub async fn launch_browser(config: &BrowserConfig) -> Result<BrowserWrapper> {
    info!("Launching browser instance");

    let (profile_dir, ephemeral) = if config.ephemeral_profile {
        let dir = std::env::temp_dir().join(format!("pbi_autopilot_{}", std::process::id()));
        (dir, true)
    } else {
        let dir = config
            .profile_dir
            .clone()
            .unwrap_or_else(crate::default_profile_dir);
        (dir, false)
    };

    let (browser, handler) =
        crate::browser_setup::launch_browser(config, profile_dir.clone(), ephemeral).await?;

    Ok(BrowserWrapper::new(
        browser,
        handler,
        ephemeral.then_some(profile_dir),
    ))
}

/// Attach to a running browser through its DevTools endpoint
pub async fn connect_browser(endpoint: &str) -> Result<BrowserWrapper> {
    info!("Connecting to browser at {}", endpoint);
    let (browser, handler) = Browser::connect(endpoint)
        .await
        .with_context(|| format!("Failed to connect to DevTools endpoint {endpoint}"))?;
    let handler_task = crate::browser_setup::spawn_handler(handler);
    Ok(BrowserWrapper::attached(browser, handler_task))
}

/// Find the open tab showing `target_url`
///
/// Returns `None` when no tab matches; the caller decides whether to open one.
pub async fn find_target_page(wrapper: &BrowserWrapper, target_url: &str) -> Result<Option<Page>> {
    Url::parse(target_url).with_context(|| format!("Invalid target URL: {target_url}"))?;

    let pages = wrapper
        .browser()
        .pages()
        .await
        .context("Failed to get browser pages")?;

    let mut urls = Vec::with_capacity(pages.len());
    for page in &pages {
        urls.push(page.url().await.ok().flatten());
    }

    Ok(select_target(target_url, &urls).map(|i| pages[i].clone()))
}

/// Pick the tab for `target` among open tab URLs
///
/// A tab at `target` itself or below it wins; any tab on the same host is the
/// fallback.
fn select_target(target: &str, urls: &[Option<String>]) -> Option<usize> {
    let wanted = target.trim_end_matches('/');
    let under_target = |url: &str| {
        url.strip_prefix(wanted)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
    };
    if let Some(i) = urls
        .iter()
        .position(|u| u.as_deref().is_some_and(under_target))
    {
        return Some(i);
    }

    let host_of = |url: &str| Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_owned));
    let target_host = host_of(target)?;
    urls.iter()
        .position(|u| u.as_deref().and_then(host_of).as_deref() == Some(target_host.as_str()))
}
