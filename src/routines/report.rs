use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{AutomationError, Outcome, RoutineContext, enter_full_screen};
use crate::locator::Control;
use crate::surface::Surface;
use crate::utils::constants::FULLSCREEN_EXIT_SETTLE;

const REFRESH_VISUALS_TIMEOUT: Duration = Duration::from_secs(3);

/// Leave full-screen, refresh the report's visuals, then return to full-screen
pub async fn refresh_report<S: Surface>(
    surface: &S,
    ctx: &RoutineContext,
) -> Result<Outcome, AutomationError> {
    info!("Refreshing report visuals");

    leave_full_screen(surface, ctx).await?;

    match ctx
        .locator
        .locate(surface, Control::RefreshVisuals, REFRESH_VISUALS_TIMEOUT)
        .await
    {
        Some(button) => {
            surface.click(&button).await?;
            info!("Clicked {}", Control::RefreshVisuals);
        }
        None => {
            info!("{} not on the app bar, trying {}", Control::RefreshVisuals, Control::MoreOptions);
            ctx.click_control(surface, Control::MoreOptions, ctx.timing.element_timeout())
                .await?;
            sleep(ctx.timing.menu_expand_wait()).await;
            ctx.click_control(surface, Control::RefreshVisualsMenuItem, ctx.timing.element_timeout())
                .await?;
        }
    }
    info!(target: "notice", "Report visuals refreshing");

    sleep(ctx.timing.report_refresh_wait()).await;
    enter_full_screen(surface, ctx).await?;
    Ok(Outcome::Completed)
}

/// The app bar is hidden in full-screen, so refreshing starts by leaving it
async fn leave_full_screen<S: Surface>(
    surface: &S,
    ctx: &RoutineContext,
) -> Result<(), AutomationError> {
    let mut left = false;

    if surface.document_fullscreen().await? {
        surface.exit_document_fullscreen().await?;
        left = true;
    }
    if let Some(exit) = ctx.locator.probe(surface, Control::ExitFullScreen).await {
        surface.click(&exit).await?;
        left = true;
    }
    if !left {
        return Ok(());
    }

    info!("Left full-screen to reach the refresh controls");
    if ctx.window_fullscreen {
        if let Err(e) = surface.set_window_fullscreen(false).await {
            warn!("Could not restore the browser window: {}", e);
        }
    }
    ctx.latch.release();
    sleep(FULLSCREEN_EXIT_SETTLE).await;
    Ok(())
}
