//! Shared configuration constants for browser automation
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

use std::time::Duration;

/// Chrome user agent string
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Default poll cadence of the element waiter
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pause between opening a menu and clicking one of its items
pub const CLICK_SETTLE: Duration = Duration::from_millis(150);

/// Pause after a refresh click before the long refresh wait starts
pub const POST_CLICK_SETTLE: Duration = Duration::from_millis(500);

/// Time given to the page to leave full-screen before the report is touched
pub const FULLSCREEN_EXIT_SETTLE: Duration = Duration::from_secs(1);
