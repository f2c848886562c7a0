//! Scheduled refresh and full-screen automation for Power BI pages
//!
//! Drives a Chrome/Chromium tab over the DevTools protocol via chromiumoxide:
//! waits for the application's controls to become visible, clicks through the
//! refresh menus on a per-page-kind schedule and keeps report pages full-screen.

pub mod app;
mod browser;
pub mod browser_setup;
pub mod control;
pub mod indicator;
pub mod locator;
mod manager;
pub mod routines;
pub mod schedule;
pub mod settings;
pub mod surface;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page opened when no matching tab exists yet
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// How often the status line is logged while the indicator is displayed
    #[serde(default = "default_status_every_secs")]
    pub status_every_secs: u64,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    ///
    /// Off by default: the user has to sign in once and the report is meant
    /// to be looked at.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Browser binary; discovered automatically when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// DevTools endpoint of an already running browser (`http://127.0.0.1:9222`
    /// or a `ws://` URL). When set, nothing is launched.
    #[serde(default)]
    pub connect_url: Option<String>,

    /// Profile directory; defaults to a persistent per-user directory so the
    /// sign-in survives restarts
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Use a throwaway profile that is deleted on shutdown
    #[serde(default)]
    pub ephemeral_profile: bool,

    /// Also put the browser window itself into full-screen (the F11 state)
    /// whenever a report enters full-screen
    #[serde(default = "default_window_fullscreen")]
    pub window_fullscreen: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Waits and timeouts used by the automation routines, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_element_timeout_ms")]
    pub element_timeout_ms: u64,

    #[serde(default = "default_menu_expand_wait_ms")]
    pub menu_expand_wait_ms: u64,

    /// Time the semantic model refresh is given before the cycle ends
    #[serde(default = "default_semantic_refresh_wait_ms")]
    pub semantic_refresh_wait_ms: u64,

    /// Time report visuals are given to reload before going full-screen
    #[serde(default = "default_report_refresh_wait_ms")]
    pub report_refresh_wait_ms: u64,

    /// Debounce window after entering full-screen
    #[serde(default = "default_fullscreen_lock_ms")]
    pub fullscreen_lock_ms: u64,

    #[serde(default = "default_fullscreen_check_ms")]
    pub fullscreen_check_ms: u64,

    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_semantic_model_interval_secs")]
    pub semantic_model_interval_secs: u64,

    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// How often a report tab is put back into full-screen if it left it
    #[serde(default = "default_full_screen_interval_secs")]
    pub full_screen_interval_secs: u64,

    /// Start the schedules on launch even if they were not left running,
    /// resuming any stored countdown phase
    #[serde(default)]
    pub autostart: bool,
}

fn default_target_url() -> String {
    "https://app.powerbi.com/home".to_string()
}
fn default_status_every_secs() -> u64 {
    30
}

fn default_headless() -> bool {
    false
}

fn default_disable_security() -> bool {
    false  // SECURE BY DEFAULT
}

fn default_window_fullscreen() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_poll_interval_ms() -> u64 {
    250
}
fn default_element_timeout_ms() -> u64 {
    10_000
}
fn default_menu_expand_wait_ms() -> u64 {
    1_000
}
fn default_semantic_refresh_wait_ms() -> u64 {
    60_000
}
fn default_report_refresh_wait_ms() -> u64 {
    10_000
}
fn default_fullscreen_lock_ms() -> u64 {
    15_000
}
fn default_fullscreen_check_ms() -> u64 {
    1_000
}
fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_semantic_model_interval_secs() -> u64 {
    60 * 60
}
fn default_report_interval_secs() -> u64 {
    30 * 60
}
fn default_full_screen_interval_secs() -> u64 {
    60 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            status_every_secs: default_status_every_secs(),
            browser: BrowserConfig::default(),
            timing: TimingConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            executable: None,
            connect_url: None,
            profile_dir: None,
            ephemeral_profile: false,
            window_fullscreen: default_window_fullscreen(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            element_timeout_ms: default_element_timeout_ms(),
            menu_expand_wait_ms: default_menu_expand_wait_ms(),
            semantic_refresh_wait_ms: default_semantic_refresh_wait_ms(),
            report_refresh_wait_ms: default_report_refresh_wait_ms(),
            fullscreen_lock_ms: default_fullscreen_lock_ms(),
            fullscreen_check_ms: default_fullscreen_check_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            semantic_model_interval_secs: default_semantic_model_interval_secs(),
            report_interval_secs: default_report_interval_secs(),
            full_screen_interval_secs: default_full_screen_interval_secs(),
            autostart: false,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }
    pub fn menu_expand_wait(&self) -> Duration {
        Duration::from_millis(self.menu_expand_wait_ms)
    }
    pub fn semantic_refresh_wait(&self) -> Duration {
        Duration::from_millis(self.semantic_refresh_wait_ms)
    }
    pub fn report_refresh_wait(&self) -> Duration {
        Duration::from_millis(self.report_refresh_wait_ms)
    }
    pub fn fullscreen_lock(&self) -> Duration {
        Duration::from_millis(self.fullscreen_lock_ms)
    }
    pub fn fullscreen_check(&self) -> Duration {
        Duration::from_millis(self.fullscreen_check_ms)
    }
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Reject values that would make the waiter spin or a schedule never fire
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("timing.poll_interval_ms must be > 0".into()));
        }
        if self.timing.fullscreen_check_ms == 0 {
            return Err(ConfigError::Invalid("timing.fullscreen_check_ms must be > 0".into()));
        }
        utils::validate_wait_timeout(self.timing.element_timeout_ms)
            .map_err(|e| ConfigError::Invalid(format!("timing.element_timeout_ms: {e}")))?;
        utils::validate_navigation_timeout(self.timing.navigation_timeout_ms)
            .map_err(|e| ConfigError::Invalid(format!("timing.navigation_timeout_ms: {e}")))?;
        for (name, secs) in [
            ("schedule.semantic_model_interval_secs", self.schedule.semantic_model_interval_secs),
            ("schedule.report_interval_secs", self.schedule.report_interval_secs),
            ("schedule.full_screen_interval_secs", self.schedule.full_screen_interval_secs),
        ] {
            schedule::Interval::from_secs(secs)
                .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        }
        if !self.target_url.starts_with("http://") && !self.target_url.starts_with("https://") {
            return Err(ConfigError::Invalid(
                "target_url must start with http:// or https://".into(),
            ));
        }
        Ok(())
    }

    /// Default interval for a page kind, before any stored override
    pub fn default_interval_secs(&self, kind: routines::PageKind) -> u64 {
        match kind {
            routines::PageKind::SemanticModel => self.schedule.semantic_model_interval_secs,
            routines::PageKind::Report => self.schedule.report_interval_secs,
            // Pages of unknown kind fall back to the hourly cadence
            routines::PageKind::Unknown => self.schedule.semantic_model_interval_secs,
        }
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(std::env::temp_dir).join("pbi-autopilot")
}

/// `<config_dir>/pbi-autopilot/config.yaml`
pub fn default_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join("config.yaml")
}

/// `<data_local_dir>/pbi-autopilot/settings.json`
pub fn default_state_path() -> PathBuf {
    app_dir(dirs::data_local_dir()).join("settings.json")
}

/// `<data_local_dir>/pbi-autopilot/profile`
pub fn default_profile_dir() -> PathBuf {
    app_dir(dirs::data_local_dir()).join("profile")
}

/// Load config from a YAML file, falling back to defaults when it does not exist
pub fn load_yaml_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let config = if config_path.exists() {
        let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: config_path.clone(),
            source,
        })?
    } else {
        tracing::debug!("No config at {}, using defaults", config_path.display());
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

pub use browser::{BrowserError, BrowserResult, BrowserWrapper, launch_browser};
pub use browser_setup::{download_managed_browser, find_browser_executable};
pub use manager::BrowserManager;
pub use utils::{WaitOptions, wait_for, wait_for_element};
