use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use super::{AutomationError, Outcome, RoutineContext};
use crate::locator::Control;
use crate::surface::Surface;
use crate::utils::constants::POST_CLICK_SETTLE;

const REFRESH_NOW_TIMEOUT: Duration = Duration::from_secs(5);

/// Trigger "Refresh now" on a semantic model details page and give the
/// service time to run the refresh
pub async fn refresh_semantic_model<S: Surface>(
    surface: &S,
    ctx: &RoutineContext,
) -> Result<Outcome, AutomationError> {
    info!("Refreshing semantic model");

    ctx.click_control(surface, Control::ModelRefresh, ctx.timing.element_timeout())
        .await?;
    sleep(ctx.timing.menu_expand_wait()).await;

    let refresh_now = ctx
        .require(surface, Control::RefreshNow, REFRESH_NOW_TIMEOUT)
        .await?;
    if !surface.is_enabled(&refresh_now).await? {
        return Err(AutomationError::Disabled {
            control: Control::RefreshNow,
        });
    }
    surface.click(&refresh_now).await?;
    info!(
        target: "notice",
        "Semantic model refresh triggered, waiting {}s for it to finish",
        ctx.timing.semantic_refresh_wait().as_secs()
    );

    sleep(POST_CLICK_SETTLE + ctx.timing.semantic_refresh_wait()).await;
    info!("Semantic model refresh cycle finished");
    Ok(Outcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::test_support::fast_context;
    use crate::surface::fake::{Effect, FakeNode, FakeSurface};
    use tokio::time::Instant;

    const REFRESH_BTN: &str = "#model-actionbar-refresh";
    const MENU_SPAN: &str = "span.dropDown-displayName";

    #[tokio::test(start_paused = true)]
    async fn clicks_refresh_then_refresh_now_and_waits() {
        let surface = FakeSurface::new()
            .with(FakeNode::new(1, REFRESH_BTN).on_click(Effect::Reveal(3)))
            .with(FakeNode::new(2, MENU_SPAN).text("Schedule refresh").hidden())
            .with(FakeNode::new(3, MENU_SPAN).text(" Refresh  now ").hidden());
        let ctx = fast_context();

        let start = Instant::now();
        let outcome = refresh_semantic_model(&surface, &ctx).await.unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(surface.clicks(), vec![1, 3]);
        assert!(start.elapsed() >= Duration::from_millis(61_500));
    }

    #[tokio::test(start_paused = true)]
    async fn chinese_menu_label_is_accepted() {
        let surface = FakeSurface::new()
            .with(FakeNode::new(1, REFRESH_BTN))
            .with(FakeNode::new(2, MENU_SPAN).text("立即刷新"));
        let ctx = fast_context();

        refresh_semantic_model(&surface, &ctx).await.unwrap();
        assert_eq!(surface.clicks(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_refresh_now_is_reported_without_clicking() {
        let surface = FakeSurface::new()
            .with(FakeNode::new(1, REFRESH_BTN))
            .with(FakeNode::new(2, MENU_SPAN).text("Refresh now").disabled());
        let ctx = fast_context();

        let err = refresh_semantic_model(&surface, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            AutomationError::Disabled { control: Control::RefreshNow }
        ));
        assert_eq!(surface.clicks(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn label_inside_disabled_button_counts_as_disabled() {
        let surface = FakeSurface::new()
            .with(FakeNode::new(1, REFRESH_BTN))
            .with(FakeNode::new(2, "button.menu-item").disabled())
            .with(FakeNode::new(3, MENU_SPAN).text("Refresh now").child_of(2));
        let ctx = fast_context();

        let err = refresh_semantic_model(&surface, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            AutomationError::Disabled { control: Control::RefreshNow }
        ));
        assert_eq!(surface.clicks(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_refresh_button_abandons_cycle() {
        let surface = FakeSurface::new().with(FakeNode::new(2, MENU_SPAN).text("Refresh now"));
        let ctx = fast_context();

        let start = Instant::now();
        let err = refresh_semantic_model(&surface, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            AutomationError::NotFound { control: Control::ModelRefresh, .. }
        ));
        assert!(surface.clicks().is_empty());
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
