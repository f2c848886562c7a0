//! Element polling utility for SPA support
//!
//! Power BI renders its app bar and menus via JavaScript long after the load
//! event fires, so every click is preceded by a wait. `wait_for()` is the one
//! polling primitive; `wait_for_element()` specialises it to "first visible
//! element matching a CSS selector".

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::surface::Surface;
use crate::utils::constants::DEFAULT_POLL_INTERVAL;

/// Timeout and poll cadence of a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll: Duration,
}

impl WaitOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

/// Re-run `probe` at a fixed cadence until it yields `Some` or the timeout passes
///
/// # Polling Strategy
/// - Probes immediately, then every `poll` (constant, no backoff)
/// - The last probe happens exactly at the deadline, so a miss resolves to
///   `None` no later than `timeout`
/// - Timing out is an ordinary outcome, not an error
pub async fn wait_for<T, F, Fut>(options: WaitOptions, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + options.timeout;
    // A zero cadence would spin the runtime
    let poll = options.poll.max(Duration::from_millis(1));

    loop {
        if let Some(found) = probe().await {
            return Some(found);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Wait for a visible element matching `selector` to appear
///
/// Visible means a non-zero layout box, computed `display` other than `none`
/// and computed `visibility` other than `hidden`. Present-but-hidden elements
/// keep the wait going.
///
/// # Arguments
/// * `surface` - The page to search
/// * `selector` - CSS selector for the element
/// * `root` - Restrict the search to descendants of this element
/// * `options` - Timeout and poll cadence
///
/// # Returns
/// * `Some(element)` - The first visible match, in document order
/// * `None` - Nothing visible matched before the timeout
pub async fn wait_for_element<S: Surface>(
    surface: &S,
    selector: &str,
    root: Option<&S::Element>,
    options: WaitOptions,
) -> Option<S::Element> {
    let found = wait_for(options, || async move {
        match surface.find_visible(selector, root).await {
            Ok(found) => found,
            Err(e) => {
                // Transient while the page is re-rendering; keep polling
                debug!("Query for '{}' failed: {}", selector, e);
                None
            }
        }
    })
    .await;

    if found.is_none() {
        debug!(
            "Element not found (timeout after {}ms): '{}'",
            options.timeout.as_millis(),
            selector
        );
    }
    found
}
