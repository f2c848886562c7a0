//! Refresh and full-screen routines
//!
//! Each routine is a sequential chain of locate → click → settle steps over a
//! [`Surface`], so the same code drives a live tab and the scripted page used
//! in tests.

mod full_screen;
mod page_kind;
mod report;
mod semantic_model;

pub use full_screen::{FullScreenLatch, enter_full_screen, is_full_screen, keep_full_screen};
pub use page_kind::PageKind;
pub use report::refresh_report;
pub use semantic_model::refresh_semantic_model;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::TimingConfig;
use crate::browser::BrowserError;
use crate::locator::{Control, ControlLocator};
use crate::surface::Surface;

/// How a routine ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A full-screen attempt happened too recently
    Locked,
    AlreadyFullScreen,
    /// Another routine holds the busy flag
    Busy,
    /// The tab is not a page any routine handles
    UnsupportedPage,
    /// A schedule fired while the tab shows a different kind of page
    PageMismatch { expected: PageKind, actual: PageKind },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Locked => f.write_str("full-screen was entered moments ago"),
            SkipReason::AlreadyFullScreen => f.write_str("already full-screen"),
            SkipReason::Busy => f.write_str("another refresh is running"),
            SkipReason::UnsupportedPage => f.write_str("page is neither a semantic model nor a report"),
            SkipReason::PageMismatch { expected, actual } => {
                write!(f, "{expected} schedule fired on a {actual} page")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("{control} not found within {}ms", .timeout.as_millis())]
    NotFound { control: Control, timeout: Duration },

    #[error("{control} is disabled, a refresh may already be in progress")]
    Disabled { control: Control },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Everything a routine needs besides the page itself
#[derive(Debug, Clone)]
pub struct RoutineContext {
    pub locator: ControlLocator,
    pub timing: TimingConfig,
    /// Also switch the browser window to full-screen, not just the report
    pub window_fullscreen: bool,
    pub latch: Arc<FullScreenLatch>,
}

impl RoutineContext {
    pub fn new(timing: TimingConfig, window_fullscreen: bool) -> Self {
        Self {
            locator: ControlLocator::power_bi().with_poll(timing.poll_interval()),
            timing,
            window_fullscreen,
            latch: Arc::new(FullScreenLatch::default()),
        }
    }

    async fn require<S: Surface>(
        &self,
        surface: &S,
        control: Control,
        timeout: Duration,
    ) -> Result<S::Element, AutomationError> {
        self.locator
            .locate(surface, control, timeout)
            .await
            .ok_or(AutomationError::NotFound { control, timeout })
    }

    async fn click_control<S: Surface>(
        &self,
        surface: &S,
        control: Control,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let element = self.require(surface, control, timeout).await?;
        surface.click(&element).await?;
        info!("Clicked {}", control);
        Ok(())
    }
}

/// Run the routine that belongs to `kind`
pub async fn run_for_kind<S: Surface>(
    surface: &S,
    kind: PageKind,
    ctx: &RoutineContext,
) -> Result<Outcome, AutomationError> {
    match kind {
        PageKind::SemanticModel => refresh_semantic_model(surface, ctx).await,
        PageKind::Report => refresh_report(surface, ctx).await,
        PageKind::Unknown => Ok(Outcome::Skipped(SkipReason::UnsupportedPage)),
    }
}

/// Classify the page the surface currently shows
pub async fn detect_page_kind<S: Surface>(surface: &S) -> Result<PageKind, AutomationError> {
    let url = surface.current_url().await?;
    Ok(url.as_deref().map(PageKind::detect).unwrap_or(PageKind::Unknown))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::fake::FakeSurface;

    #[tokio::test(start_paused = true)]
    async fn unknown_page_is_skipped() {
        let surface = FakeSurface::new().at_url("https://app.powerbi.com/home");
        let ctx = test_support::fast_context();

        let kind = detect_page_kind(&surface).await.unwrap();
        let outcome = run_for_kind(&surface, kind, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::UnsupportedPage));
        assert!(surface.clicks().is_empty());
    }

    #[test]
    fn not_found_names_control_and_timeout() {
        let err = AutomationError::NotFound {
            control: Control::ViewMenu,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "View not found within 5000ms");
    }
}
