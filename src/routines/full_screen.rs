use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::{AutomationError, Outcome, PageKind, RoutineContext, SkipReason, detect_page_kind};
use crate::locator::Control;
use crate::surface::Surface;
use crate::utils::constants::CLICK_SETTLE;

const VIEW_MENU_TIMEOUT: Duration = Duration::from_secs(5);
const OPEN_FULL_SCREEN_TIMEOUT: Duration = Duration::from_secs(4);

/// Debounce for full-screen attempts
///
/// Engaged after a successful attempt. While it holds, further attempts skip
/// instead of reopening the View menu over a report that is still
/// transitioning. A report refresh releases it before leaving full-screen, and
/// so does the watcher when the user leaves full-screen.
#[derive(Debug, Default)]
pub struct FullScreenLatch {
    until: Mutex<Option<Instant>>,
}

impl FullScreenLatch {
    pub fn engage(&self, hold: Duration) {
        *self.until.lock() = Some(Instant::now() + hold);
    }

    pub fn release(&self) {
        self.until.lock().take();
    }

    pub fn is_engaged(&self) -> bool {
        self.remaining().is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        let until = (*self.until.lock())?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }
}

/// Whether the report is full-screen, either as the document's full-screen
/// element or through the application's own full-screen mode
pub async fn is_full_screen<S: Surface>(
    surface: &S,
    ctx: &RoutineContext,
) -> Result<bool, AutomationError> {
    if surface.document_fullscreen().await? {
        return Ok(true);
    }
    Ok(ctx.locator.probe(surface, Control::ExitFullScreen).await.is_some())
}

/// Switch the report to full-screen through its View menu
pub async fn enter_full_screen<S: Surface>(
    surface: &S,
    ctx: &RoutineContext,
) -> Result<Outcome, AutomationError> {
    if let Some(left) = ctx.latch.remaining() {
        debug!("Full-screen latch engaged for another {}ms", left.as_millis());
        return Ok(Outcome::Skipped(SkipReason::Locked));
    }
    if is_full_screen(surface, ctx).await? {
        debug!("Report is already full-screen");
        return Ok(Outcome::Skipped(SkipReason::AlreadyFullScreen));
    }

    ctx.click_control(surface, Control::ViewMenu, VIEW_MENU_TIMEOUT).await?;

    match ctx
        .locator
        .locate(surface, Control::OpenFullScreen, OPEN_FULL_SCREEN_TIMEOUT)
        .await
    {
        Some(open) => {
            sleep(CLICK_SETTLE).await;
            surface.click(&open).await?;
            info!("Clicked {}", Control::OpenFullScreen);
        }
        None => {
            if ctx.locator.probe(surface, Control::ExitFullScreen).await.is_some() {
                info!("View menu offers only exit, report is already full-screen");
                return Ok(Outcome::Skipped(SkipReason::AlreadyFullScreen));
            }
            return Err(AutomationError::NotFound {
                control: Control::OpenFullScreen,
                timeout: OPEN_FULL_SCREEN_TIMEOUT,
            });
        }
    }

    ctx.latch.engage(ctx.timing.fullscreen_lock());

    if ctx.window_fullscreen {
        if let Err(e) = surface.set_window_fullscreen(true).await {
            warn!("Could not make the browser window full-screen: {}", e);
            if let Err(e) = surface.request_document_fullscreen().await {
                warn!("Document full-screen request was refused: {}", e);
            }
        }
    }

    Ok(Outcome::Completed)
}

/// Put a report tab back into full-screen; other pages are left alone
pub async fn keep_full_screen<S: Surface>(
    surface: &S,
    ctx: &RoutineContext,
) -> Result<Outcome, AutomationError> {
    match detect_page_kind(surface).await? {
        PageKind::Report => enter_full_screen(surface, ctx).await,
        actual => Ok(Outcome::Skipped(SkipReason::PageMismatch {
            expected: PageKind::Report,
            actual,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::test_support::fast_context;
    use crate::surface::fake::{Effect, FakeNode, FakeSurface};

    const VIEW_BTN: &str = r#"button[data-testid="app-bar-view-menu-btn"]"#;
    const OPEN_BTN: &str = r#"button[data-testid="open-in-full-screen-btn"]"#;
    const EXIT_BTN: &str = r#"button[data-testid="exit-full-screen-btn"]"#;

    fn report_page() -> FakeSurface {
        FakeSurface::new()
            .with(FakeNode::new(1, VIEW_BTN).text("View").on_click(Effect::Reveal(2)))
            .with(FakeNode::new(2, OPEN_BTN).text("Full screen").hidden().on_click(Effect::Reveal(3)))
            .with(FakeNode::new(3, EXIT_BTN).text("Exit full screen").hidden())
    }

    #[tokio::test(start_paused = true)]
    async fn opens_view_menu_then_full_screen_and_engages_latch() {
        let surface = report_page();
        let ctx = fast_context();

        let outcome = enter_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(surface.clicks(), vec![1, 2]);
        assert!(ctx.latch.is_engaged());
        assert!(surface.is_window_fullscreen());
    }

    #[tokio::test(start_paused = true)]
    async fn second_attempt_inside_lock_window_is_skipped() {
        let surface = report_page();
        let ctx = fast_context();
        ctx.latch.engage(Duration::from_secs(15));

        let outcome = enter_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::Locked));
        assert!(surface.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upkeep_inside_lock_window_opens_view_menu_once() {
        // The report never reports full-screen, so only the latch stops a retry
        let surface = FakeSurface::new()
            .at_url("https://app.powerbi.com/groups/me/reports/42/ReportSection")
            .with(FakeNode::new(1, VIEW_BTN).text("View").on_click(Effect::Reveal(2)))
            .with(FakeNode::new(2, OPEN_BTN).text("Full screen").hidden());
        let ctx = fast_context();

        let first = keep_full_screen(&surface, &ctx).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let second = keep_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(first, Outcome::Completed);
        assert_eq!(second, Outcome::Skipped(SkipReason::Locked));
        assert_eq!(surface.clicks(), vec![1, 2]);

        tokio::time::advance(Duration::from_secs(11)).await;
        let third = keep_full_screen(&surface, &ctx).await.unwrap();
        assert_eq!(third, Outcome::Completed);
        assert_eq!(surface.clicks(), vec![1, 2, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn upkeep_leaves_semantic_model_page_alone() {
        let surface = report_page().at_url("https://app.powerbi.com/groups/me/datasets/7/details");
        let ctx = fast_context();

        let outcome = keep_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::PageMismatch {
                expected: PageKind::Report,
                actual: PageKind::SemanticModel,
            })
        );
        assert!(surface.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn latch_expires_after_hold() {
        let latch = FullScreenLatch::default();
        latch.engage(Duration::from_secs(15));
        tokio::time::advance(Duration::from_secs(14)).await;
        assert!(latch.is_engaged());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!latch.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn document_full_screen_is_left_alone() {
        let surface = report_page().in_fullscreen();
        let ctx = fast_context();

        let outcome = enter_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::AlreadyFullScreen));
        assert!(surface.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn visible_exit_button_means_already_full_screen() {
        let surface = FakeSurface::new()
            .with(FakeNode::new(1, VIEW_BTN).text("View"))
            .with(FakeNode::new(3, EXIT_BTN).text("Exit full screen"));
        let ctx = fast_context();

        let outcome = enter_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::AlreadyFullScreen));
        assert!(surface.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn view_menu_with_only_exit_item_skips() {
        let surface = FakeSurface::new()
            .with(FakeNode::new(1, VIEW_BTN).text("View").on_click(Effect::Reveal(4)))
            .with(
                FakeNode::new(4, r#"button,[role="menuitem"]"#)
                    .text("Exit full screen")
                    .hidden()
                    .appears_after(Duration::from_secs(1)),
            );
        let ctx = fast_context();

        let outcome = enter_full_screen(&surface, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::AlreadyFullScreen));
        assert_eq!(surface.clicks(), vec![1]);
        assert!(!ctx.latch.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_view_menu_is_not_found() {
        let surface = FakeSurface::new();
        let ctx = fast_context();

        let err = enter_full_screen(&surface, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            AutomationError::NotFound { control: Control::ViewMenu, .. }
        ));
        assert!(!ctx.latch.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_full_screen_item_is_not_found() {
        let surface = FakeSurface::new().with(FakeNode::new(1, VIEW_BTN).text("View"));
        let ctx = fast_context();

        let err = enter_full_screen(&surface, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            AutomationError::NotFound { control: Control::OpenFullScreen, .. }
        ));
    }
}
