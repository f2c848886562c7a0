//! Timeout validation utilities for browser operations

use std::time::Duration;
use thiserror::Error;

/// Maximum timeout for browser navigation operations (5 minutes)
/// Covers slow-loading sites, heavy SPAs, and network delays
pub const MAX_NAVIGATION_TIMEOUT_MS: u64 = 300_000; // 5 minutes

/// Maximum timeout for a single element wait (2 minutes)
///
/// Power BI renders menus lazily but never takes minutes; anything longer is
/// a misconfiguration that would stall the whole cycle.
pub const MAX_WAIT_TIMEOUT_MS: u64 = 120_000; // 2 minutes

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("Timeout must be greater than 0ms")]
    Zero,

    #[error("Timeout cannot exceed {max_ms}ms. Received: {ms}ms")]
    TooLong { ms: u64, max_ms: u64 },
}

fn validate(ms: u64, max_ms: u64) -> Result<Duration, TimeoutError> {
    if ms == 0 {
        return Err(TimeoutError::Zero);
    }
    if ms > max_ms {
        return Err(TimeoutError::TooLong { ms, max_ms });
    }
    Ok(Duration::from_millis(ms))
}

/// Validate timeout for navigation operations
///
/// # Example
/// ```ignore
/// let timeout = validate_navigation_timeout(45_000)?;
/// ```
pub fn validate_navigation_timeout(ms: u64) -> Result<Duration, TimeoutError> {
    validate(ms, MAX_NAVIGATION_TIMEOUT_MS)
}

/// Validate timeout for element waits (probe, locator)
pub fn validate_wait_timeout(ms: u64) -> Result<Duration, TimeoutError> {
    validate(ms, MAX_WAIT_TIMEOUT_MS)
}
