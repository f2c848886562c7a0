//! Chrome/Chromium discovery, download and launch
//!
//! Shared by the launch path of [`crate::BrowserManager`]; attaching to an
//! existing browser only reuses [`spawn_handler`].

use anyhow::{Context, Result};
use chromiumoxide::Handler;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::BrowserConfig;
use crate::utils::constants::CHROME_USER_AGENT;

/// RAII guard for a freshly created profile directory
///
/// Removes the directory on drop unless consumed by `into_path()`, so a
/// failed launch does not leave an empty throwaway profile behind. Persistent
/// profiles are never removed.
struct TempDirGuard {
    path: PathBuf,
    keep: bool,
}

impl TempDirGuard {
    /// Create directory and guard for automatic cleanup
    fn new(path: PathBuf, ephemeral: bool) -> Result<Self> {
        std::fs::create_dir_all(&path)
            .context("Failed to create user data directory")?;
        Ok(Self {
            path,
            keep: !ephemeral,
        })
    }

    /// Consume guard and return path, preventing automatic cleanup
    ///
    /// Call this on success to transfer ownership to BrowserWrapper
    fn into_path(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to clean up temp dir {}: {}",
                    self.path.display(), e);
            } else {
                info!("Cleaned up temp dir after launch failure: {}",
                    self.path.display());
            }
        }
    }
}

/// Environment variables that point straight at a browser binary, in priority order
const EXECUTABLE_ENV_VARS: &[&str] = &["PBI_AUTOPILOT_CHROME", "CHROMIUM_PATH"];

/// Chromium-family install locations for the current platform
///
/// Edge is included: it is the default browser on most machines that show
/// Power BI dashboards, and it speaks the same DevTools protocol.
fn candidate_paths() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &[
            r"%PROGRAMFILES%\Google\Chrome\Application\chrome.exe",
            r"%PROGRAMFILES(X86)%\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"%PROGRAMFILES(X86)%\Microsoft\Edge\Application\msedge.exe",
            r"%PROGRAMFILES%\Microsoft\Edge\Application\msedge.exe",
            r"%PROGRAMFILES%\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/microsoft-edge",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    }
}

/// Turn a candidate entry into a concrete path (`~/` and `%VAR%` expansion)
fn expand_candidate(candidate: &str) -> Option<PathBuf> {
    if let Some(rest) = candidate.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    if candidate.contains('%') {
        return Some(PathBuf::from(expand_windows_env_vars(candidate)));
    }
    Some(PathBuf::from(candidate))
}

/// Find a Chromium-family executable.
///
/// Order: `explicit` (from config), the environment overrides, the platform
/// install locations, then `which` on Unix.
pub async fn find_browser_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            info!("Using configured browser executable: {}", path.display());
            return Ok(path.to_path_buf());
        }
        warn!("Configured browser executable does not exist: {}", path.display());
    }

    for var in EXECUTABLE_ENV_VARS {
        if let Ok(path) = std::env::var(var) {
            let path = PathBuf::from(path);
            if path.exists() {
                info!("Using browser from {} environment variable: {}", var, path.display());
                return Ok(path);
            }
            warn!(
                "{} environment variable points to non-existent file: {}",
                var,
                path.display()
            );
        }
    }

    if let Some(path) = candidate_paths()
        .iter()
        .filter_map(|c| expand_candidate(c))
        .find(|p| p.exists())
    {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    // Use 'which' command on Unix systems
    if !cfg!(target_os = "windows") {
        for cmd in &["google-chrome", "chromium", "chromium-browser", "microsoft-edge"] {
            let output = Command::new("which").arg(cmd).output();

            if let Ok(output) = output
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser using 'which' command: {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    warn!("No Chromium-family executable found. Will download and use fetcher.");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Expand Windows environment variables in the form %VAR% within a path string.
///
/// Unknown variables are left as the original `%VAR%` token, so the resulting
/// path simply fails the existence check.
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }
        let var_name: String = chars.by_ref().take_while(|&c| c != '%').collect();
        if var_name.is_empty() {
            result.push('%');
        } else if let Ok(value) = std::env::var(&var_name) {
            result.push_str(&value);
        } else {
            result.push('%');
            result.push_str(&var_name);
            result.push('%');
        }
    }

    result
}

/// Downloads and manages Chromium browser if not found locally.
/// Returns a path to the downloaded executable.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser...");

    // Create cache directory for downloaded browser
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir().join(".cache");
            warn!(
                "Could not determine system cache directory, using temp directory fallback: {}",
                fallback.display()
            );
            fallback
        })
        .join("pbi-autopilot/chromium");

    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

    // Use fetcher to download Chrome
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );

    // Download Chrome
    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;

    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Unified browser launcher that finds or downloads Chrome/Chromium and
/// configures it for unattended dashboard automation.
///
/// # Arguments
/// * `config` - Headless mode, window size and security settings
/// * `profile_dir` - User data directory; persistent unless `ephemeral`
/// * `ephemeral` - Remove `profile_dir` again if the launch fails
///
/// # Profile Persistence
/// Power BI requires an interactive sign-in. A persistent profile keeps the
/// session cookies between runs so the daemon can be restarted unattended.
pub async fn launch_browser(
    config: &BrowserConfig,
    profile_dir: PathBuf,
    ephemeral: bool,
) -> Result<(Browser, JoinHandle<()>)> {
    // First try to find the browser
    let chrome_path = match find_browser_executable(config.executable.as_deref()).await {
        Ok(path) => path,
        Err(_) => {
            // If not found, download a managed browser
            download_managed_browser().await?
        }
    };

    // Create directory with automatic cleanup on error
    let temp_guard = TempDirGuard::new(profile_dir, ephemeral)?;
    let user_data_dir = temp_guard.path.clone();

    // Build browser config with the executable path
    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(config.window.width, config.window.height)
        .user_data_dir(user_data_dir)
        .chrome_executable(chrome_path);

    // Set headless mode based on parameter
    if config.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    // Flags for a long-running kiosk tab (benign flags always added)
    config_builder = config_builder
        .arg(format!("--user-agent={}", CHROME_USER_AGENT))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-popup-blocking")
        // Scheduled refreshes must keep firing while the window is covered
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-renderer-backgrounding")
        .arg("--disable-breakpad")
        .arg("--disable-features=TranslateUI")
        .arg("--disable-hang-monitor")
        .arg("--disable-prompt-on-repost")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--mute-audio");

    // Conditionally add security-disabling flags
    if config.disable_security {
        info!("WARNING: Disabling browser security features (disable_security=true)");
        config_builder = config_builder
            .arg("--disable-web-security")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--ignore-certificate-errors");
    }

    // Always disable sandbox in containerized environments (Docker detection)
    if should_disable_sandbox() {
        info!("Detected containerized environment, disabling sandbox");
        config_builder = config_builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");
    } else if config.disable_security {
        // Only disable sandbox if explicitly requested AND not in container
        config_builder = config_builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");
    }

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    info!("Launching browser with config: {:?}", browser_config);
    let (browser, handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = spawn_handler(handler);

    // Success - prevent automatic cleanup (BrowserWrapper now owns the directory)
    temp_guard.into_path();

    Ok((browser, handler_task))
}

/// Drive the CDP event stream until the connection closes
pub(crate) fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();

                // Filter out known non-fatal CDP serialization errors
                // These occur when Chrome sends CDP events that chromiumoxide doesn't recognize
                // Reference: https://github.com/mattsse/chromiumoxide/issues/167
                //            https://github.com/mattsse/chromiumoxide/issues/229
                let is_benign_serialization_error =
                    error_msg.contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");

                if !is_benign_serialization_error {
                    error!("Browser handler error: {:?}", e);
                } else {
                    trace!("Suppressed benign CDP serialization error: {}", error_msg);
                }
            }
        }
        info!("Browser handler task completed");
    })
}

/// Detect if running in containerized environment (Docker, etc.)
/// In containers, sandbox must be disabled as setuid doesn't work
fn should_disable_sandbox() -> bool {
    std::path::Path::new("/.dockerenv").exists()
        || std::env::var("container").is_ok()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}
