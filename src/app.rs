//! The running automation: browser, routines, schedules and the control loop
//!
//! [`Automation`] binds the routines to the live tab owned by the
//! [`BrowserManager`]. [`Daemon`] adds the per-page-kind schedules, the
//! full-screen watcher, the countdown status line and stdin commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserError;
use crate::control::{Command, HELP};
use crate::indicator::Indicator;
use crate::manager::BrowserManager;
use crate::routines::{
    self, AutomationError, Outcome, PageKind, RoutineContext, SkipReason, detect_page_kind,
    run_for_kind,
};
use crate::schedule::{BusyFlag, BusyGuard, Cycle, Interval, RefreshScheduler, format_countdown};
use crate::settings::{AUTO_REFRESH_ENABLED, INDICATOR_VISIBLE, SettingsStore};
use crate::surface::{CdpSurface, Surface};
use crate::utils::{WaitOptions, validate_wait_timeout, wait_for_element};
use crate::Config;

/// Routines bound to the browser tab, one at a time
pub struct Automation {
    manager: BrowserManager,
    ctx: RoutineContext,
    busy: BusyFlag,
}

impl Automation {
    pub fn new(config: &Config) -> Self {
        Self {
            manager: BrowserManager::new(
                config.browser.clone(),
                config.target_url.clone(),
                config.timing.navigation_timeout(),
            ),
            ctx: RoutineContext::new(config.timing.clone(), config.browser.window_fullscreen),
            busy: BusyFlag::default(),
        }
    }

    pub fn manager(&self) -> &BrowserManager {
        &self.manager
    }

    pub fn context(&self) -> &RoutineContext {
        &self.ctx
    }

    pub fn busy(&self) -> &BusyFlag {
        &self.busy
    }

    async fn surface(&self) -> Result<CdpSurface> {
        Ok(CdpSurface::new(self.manager.target_page().await?))
    }

    /// Run the routine for whatever page the tab shows
    ///
    /// With `expected` set (a scheduled tick), pages of another kind are
    /// skipped rather than refreshed.
    pub async fn run_cycle(&self, expected: Option<PageKind>) -> Result<Outcome> {
        let Some(guard) = self.busy.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };
        let surface = self.surface().await?;
        Ok(cycle_on(&surface, expected, &self.ctx, &guard).await?)
    }

    pub async fn enter_full_screen(&self) -> Result<Outcome> {
        let Some(_guard) = self.busy.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };
        let surface = self.surface().await?;
        Ok(routines::enter_full_screen(&surface, &self.ctx).await?)
    }

    /// Scheduled full-screen upkeep: only acts on report pages
    pub async fn keep_full_screen(&self) -> Result<Outcome> {
        let Some(_guard) = self.busy.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };
        let surface = self.surface().await?;
        Ok(routines::keep_full_screen(&surface, &self.ctx).await?)
    }

    /// Current full-screen state; `None` while a routine owns the tab
    pub async fn observe_full_screen(&self) -> Result<Option<bool>> {
        if self.busy.is_busy() {
            return Ok(None);
        }
        let surface = self.surface().await?;
        Ok(Some(routines::is_full_screen(&surface, &self.ctx).await?))
    }

    /// Wait for `selector` to be visible and return its text
    pub async fn probe(&self, selector: &str, timeout_ms: u64) -> Result<Option<String>> {
        let timeout = validate_wait_timeout(timeout_ms).context("Invalid wait timeout")?;
        let surface = self.surface().await?;
        let options = WaitOptions::new(timeout).with_poll(self.ctx.timing.poll_interval());
        let Some(found) = wait_for_element(&surface, selector, None, options).await else {
            return Ok(None);
        };
        let text = found
            .element()
            .inner_text()
            .await
            .map_err(|e| BrowserError::Cdp(e.to_string()))?
            .unwrap_or_default();
        Ok(Some(text))
    }
}

/// One cycle on an already resolved surface, holding `busy`
pub async fn cycle_on<S: Surface>(
    surface: &S,
    expected: Option<PageKind>,
    ctx: &RoutineContext,
    busy: &BusyGuard,
) -> Result<Outcome, AutomationError> {
    let actual = detect_page_kind(surface).await?;
    if let Some(expected) = expected {
        if expected != actual {
            return Ok(Outcome::Skipped(SkipReason::PageMismatch { expected, actual }));
        }
    }
    busy.working_on(actual);
    run_for_kind(surface, actual, ctx).await
}

/// Whether `run` starts the schedules, and if so whether it keeps the stored
/// countdown phase
///
/// Only `--autostart` on the command line restarts countdowns from a full
/// interval. The config flag and a schedule left running both resume.
fn startup_mode(cli_autostart: bool, config_autostart: bool, left_running: bool) -> Option<bool> {
    if cli_autostart {
        Some(false)
    } else if config_autostart || left_running {
        Some(true)
    } else {
        None
    }
}

/// Log how a routine ended; nothing here is fatal to the caller
pub fn report_outcome(what: &str, result: Result<Outcome>) {
    match result {
        Ok(Outcome::Completed) => info!(target: "notice", "{} finished", what),
        Ok(Outcome::Skipped(reason @ SkipReason::PageMismatch { .. })) => {
            debug!("{} skipped: {}", what, reason)
        }
        Ok(Outcome::Skipped(reason)) => info!(target: "notice", "{} skipped: {}", what, reason),
        Err(e) => match e.downcast_ref::<AutomationError>() {
            Some(not_found @ AutomationError::NotFound { .. }) => {
                warn!(target: "notice", "{} abandoned: {}", what, not_found)
            }
            _ => error!(target: "notice", "{} failed: {:#}", what, e),
        },
    }
}

/// Instant matching a persisted wall-clock start, clamped to `now`
fn anchor_from(started_at: DateTime<Utc>, now_utc: DateTime<Utc>, now: Instant) -> Instant {
    let elapsed = (now_utc - started_at).to_std().unwrap_or_default();
    now.checked_sub(elapsed).unwrap_or(now)
}

fn status_entry(kind: PageKind, interval: Interval, remaining: Option<Duration>, busy: bool) -> String {
    format!("{} {} (every {})", kind, format_countdown(remaining, busy), interval)
}

/// Long-running controller
pub struct Daemon {
    config: Config,
    automation: Arc<Automation>,
    store: Arc<SettingsStore>,
    schedulers: Mutex<HashMap<PageKind, RefreshScheduler>>,
    /// Puts report tabs back into full-screen between refreshes
    upkeep: Mutex<RefreshScheduler>,
    indicator: Arc<Mutex<Indicator>>,
}

impl Daemon {
    pub fn new(config: Config, store: SettingsStore) -> Result<Self> {
        let store = Arc::new(store);
        let mut schedulers = HashMap::new();
        for kind in PageKind::SCHEDULED {
            let default = Interval::from_secs(config.default_interval_secs(kind))
                .with_context(|| format!("Invalid default interval for {kind}"))?;
            let interval = store.interval_for(kind, default);
            schedulers.insert(kind, RefreshScheduler::new(kind, interval));
        }
        let upkeep_default = Interval::from_secs(config.schedule.full_screen_interval_secs)
            .context("Invalid default full-screen interval")?;
        let upkeep = RefreshScheduler::new(PageKind::Report, store.full_screen_interval(upkeep_default))
            .with_label("full-screen upkeep");
        let indicator = Indicator::new(store.get_or(INDICATOR_VISIBLE, true));

        Ok(Self {
            automation: Arc::new(Automation::new(&config)),
            config,
            store,
            schedulers: Mutex::new(schedulers),
            upkeep: Mutex::new(upkeep),
            indicator: Arc::new(Mutex::new(indicator)),
        })
    }

    pub fn automation(&self) -> &Arc<Automation> {
        &self.automation
    }

    fn cycle(&self) -> Cycle {
        let automation = self.automation.clone();
        Arc::new(move |kind| {
            let automation = automation.clone();
            async move {
                let what = format!("Scheduled {kind} refresh");
                report_outcome(&what, automation.run_cycle(Some(kind)).await);
            }
            .boxed()
        })
    }

    fn upkeep_cycle(&self) -> Cycle {
        let automation = self.automation.clone();
        Arc::new(move |_kind| {
            let automation = automation.clone();
            async move {
                report_outcome("Scheduled full-screen", automation.keep_full_screen().await);
            }
            .boxed()
        })
    }

    fn persist<T: serde::Serialize>(&self, key: &str, value: T) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to save {}: {}", key, e);
        }
    }

    /// Start every schedule
    ///
    /// With `resume`, a stored start time keeps the countdown phase from the
    /// previous run; otherwise countdowns restart from a full interval.
    pub fn start_schedules(&self, resume: bool) {
        let now = Instant::now();
        let now_utc = Utc::now();
        let mut schedulers = self.schedulers.lock();
        for (kind, scheduler) in schedulers.iter_mut() {
            let stored = resume.then(|| self.store.started_at_for(*kind)).flatten();
            let anchor = match stored {
                Some(at) => anchor_from(at, now_utc, now),
                None => {
                    if let Err(e) = self.store.set_started_at_for(*kind, Some(now_utc)) {
                        warn!("Failed to save {} start time: {}", kind, e);
                    }
                    now
                }
            };
            scheduler.start_at(anchor, self.cycle());
        }
        drop(schedulers);
        self.upkeep.lock().start(self.upkeep_cycle());
        self.persist(AUTO_REFRESH_ENABLED, true);
        info!(target: "notice", "Auto-refresh started");
    }

    /// Stop every schedule at the user's request
    pub fn stop_schedules(&self) {
        self.halt_timers();
        for kind in PageKind::SCHEDULED {
            if let Err(e) = self.store.set_started_at_for(kind, None) {
                warn!("Failed to clear {} start time: {}", kind, e);
            }
        }
        self.persist(AUTO_REFRESH_ENABLED, false);
        info!(target: "notice", "Auto-refresh stopped");
    }

    /// Cancel timers without touching persisted state, for shutdown
    fn halt_timers(&self) {
        for scheduler in self.schedulers.lock().values_mut() {
            scheduler.stop();
        }
        self.upkeep.lock().stop();
    }

    pub fn set_interval(&self, kind: PageKind, interval: Interval) {
        if let Err(e) = self.store.set_interval_for(kind, interval) {
            warn!("Failed to save {} interval: {}", kind, e);
        }
        let mut schedulers = self.schedulers.lock();
        let Some(scheduler) = schedulers.get_mut(&kind) else {
            return;
        };
        scheduler.set_interval(interval, self.cycle());
        if scheduler.is_running() {
            if let Err(e) = self.store.set_started_at_for(kind, Some(Utc::now())) {
                warn!("Failed to save {} start time: {}", kind, e);
            }
        }
        info!(target: "notice", "{} refresh interval set to {}", kind, interval);
    }

    pub fn set_full_screen_interval(&self, interval: Interval) {
        if let Err(e) = self.store.set_full_screen_interval(interval) {
            warn!("Failed to save full-screen interval: {}", e);
        }
        self.upkeep.lock().set_interval(interval, self.upkeep_cycle());
        info!(target: "notice", "Full-screen upkeep interval set to {}", interval);
    }

    /// Countdown per refresh schedule; only the kind being refreshed reads
    /// "refreshing"
    pub fn status_line(&self) -> String {
        let now = Instant::now();
        let refreshing = self.automation.busy().current();
        let schedulers = self.schedulers.lock();
        PageKind::SCHEDULED
            .iter()
            .filter_map(|kind| schedulers.get(kind))
            .map(|s| {
                let busy = refreshing == Some(s.kind());
                status_entry(s.kind(), s.interval(), s.remaining(now), busy)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn toggle_indicator(&self) {
        let visible = self.indicator.lock().toggle();
        self.persist(INDICATOR_VISIBLE, visible);
        info!("Status line {}", if visible { "shown" } else { "hidden" });
    }

    fn handle(&self, command: Command) {
        match command {
            Command::Start => self.start_schedules(false),
            Command::Stop => self.stop_schedules(),
            Command::RunNow => {
                let automation = self.automation.clone();
                tokio::spawn(async move {
                    report_outcome("Manual refresh", automation.run_cycle(None).await);
                });
            }
            Command::FullScreen => {
                let automation = self.automation.clone();
                tokio::spawn(async move {
                    report_outcome("Full-screen", automation.enter_full_screen().await);
                });
            }
            Command::SetInterval { kind, interval } => self.set_interval(kind, interval),
            Command::SetFullScreenInterval(interval) => self.set_full_screen_interval(interval),
            Command::ToggleIndicator => self.toggle_indicator(),
            Command::Status => println!("{}", self.status_line()),
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    /// Run until `quit` or Ctrl+C, then shut the browser down
    ///
    /// `autostart` is the command-line flag; it starts every countdown afresh.
    pub async fn run(self, autostart: bool) -> Result<()> {
        self.automation
            .manager()
            .target_page()
            .await
            .context("Failed to open the target page")?;

        let left_running = self.store.get_or(AUTO_REFRESH_ENABLED, false);
        if let Some(resume) = startup_mode(autostart, self.config.schedule.autostart, left_running) {
            self.start_schedules(resume);
        } else {
            info!("Auto-refresh is off; type 'start' to begin");
        }

        let token = CancellationToken::new();
        let watcher = tokio::spawn(watch_full_screen(
            self.automation.clone(),
            self.indicator.clone(),
            self.config.timing.fullscreen_check(),
            token.child_token(),
        ));

        let mut status = tokio::time::interval(Duration::from_secs(self.config.status_every_secs.max(1)));
        status.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        info!("Type 'help' for commands");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
                _ = status.tick() => {
                    if self.indicator.lock().displayed() {
                        info!(target: "status", "{}", self.status_line());
                    }
                }
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<Command>() {
                        Ok(Command::Quit) => break,
                        Ok(command) => self.handle(command),
                        Err(e) => warn!("{}", e),
                    },
                    Ok(None) => {
                        debug!("stdin closed, commands disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                },
            }
        }

        token.cancel();
        self.halt_timers();
        if let Err(e) = watcher.await {
            debug!("Full-screen watcher ended abnormally: {}", e);
        }
        self.automation.manager().shutdown().await
    }
}

/// Track full-screen changes: hide the status line while full-screen and
/// release the latch when the user leaves full-screen
async fn watch_full_screen(
    automation: Arc<Automation>,
    indicator: Arc<Mutex<Indicator>>,
    every: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let fullscreen = match automation.observe_full_screen().await {
            Ok(Some(state)) => state,
            Ok(None) => continue,
            Err(e) => {
                debug!("Full-screen check failed: {:#}", e);
                continue;
            }
        };
        let changed = indicator.lock().set_fullscreen(fullscreen);
        if changed && !fullscreen {
            automation.context().latch.release();
        }
        if changed {
            debug!("Full-screen {}, status line {}", fullscreen, if fullscreen { "hidden" } else { "shown" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::test_support::fast_context;
    use crate::surface::fake::{FakeNode, FakeSurface};
    use chrono::TimeZone;

    const REPORT_URL: &str = "https://app.powerbi.com/groups/me/reports/42/ReportSection";
    const MODEL_URL: &str = "https://app.powerbi.com/groups/me/datasets/7/details";

    #[tokio::test(start_paused = true)]
    async fn scheduled_tick_on_other_page_kind_is_skipped() {
        let surface = FakeSurface::new()
            .at_url(REPORT_URL)
            .with(FakeNode::new(1, "#reportAppBarRefreshBtn"));
        let ctx = fast_context();
        let busy = BusyFlag::default();
        let guard = busy.try_acquire().unwrap();

        let outcome = cycle_on(&surface, Some(PageKind::SemanticModel), &ctx, &guard)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::PageMismatch {
                expected: PageKind::SemanticModel,
                actual: PageKind::Report,
            })
        );
        assert!(surface.clicks().is_empty());
        assert_eq!(busy.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_cycle_runs_routine_for_detected_kind() {
        let surface = FakeSurface::new()
            .at_url(MODEL_URL)
            .with(FakeNode::new(1, "#model-actionbar-refresh"))
            .with(FakeNode::new(2, "span.dropDown-displayName").text("Refresh now"));
        let ctx = fast_context();
        let busy = BusyFlag::default();
        let guard = busy.try_acquire().unwrap();

        let outcome = cycle_on(&surface, None, &ctx, &guard).await.unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(surface.clicks(), vec![1, 2]);
        assert_eq!(busy.current(), Some(PageKind::SemanticModel));
    }

    #[test]
    fn only_command_line_autostart_resets_countdowns() {
        assert_eq!(startup_mode(true, false, false), Some(false));
        assert_eq!(startup_mode(true, true, true), Some(false));
        assert_eq!(startup_mode(false, true, false), Some(true));
        assert_eq!(startup_mode(false, false, true), Some(true));
        assert_eq!(startup_mode(false, false, false), None);
    }

    #[tokio::test]
    async fn out_of_range_wait_timeout_fails_before_browser_starts() {
        let automation = Automation::new(&Config::default());

        assert!(automation.probe("#reportAppBarRefreshBtn", 0).await.is_err());
        assert!(automation.probe("#reportAppBarRefreshBtn", 600_000).await.is_err());
    }

    #[test]
    fn anchor_keeps_elapsed_phase() {
        let now = Instant::now();
        let now_utc = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let started = Utc.with_ymd_and_hms(2026, 5, 1, 11, 50, 0).unwrap();

        let anchor = anchor_from(started, now_utc, now);
        assert_eq!(now - anchor, Duration::from_secs(600));

        // A start time in the future (clock change) is treated as now
        let later = Utc.with_ymd_and_hms(2026, 5, 1, 13, 0, 0).unwrap();
        assert_eq!(anchor_from(later, now_utc, now), now);
    }

    #[test]
    fn status_entry_shows_countdown_and_period() {
        let hourly = Interval::from_secs(3600).unwrap();
        assert_eq!(
            status_entry(PageKind::Report, hourly, Some(Duration::from_secs(125)), false),
            "report 02:05 (every 1h)"
        );
        assert_eq!(
            status_entry(PageKind::SemanticModel, hourly, None, false),
            "semantic-model disabled (every 1h)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn daemon_restores_intervals_and_persists_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(&path).unwrap();
        store
            .set_interval_for(PageKind::Report, Interval::from_secs(600).unwrap())
            .unwrap();

        let daemon = Daemon::new(Config::default(), store).unwrap();
        assert_eq!(
            daemon.status_line(),
            "semantic-model disabled (every 1h) | report disabled (every 10m)"
        );

        daemon.start_schedules(false);
        daemon.set_interval(PageKind::SemanticModel, Interval::from_secs(120).unwrap());
        assert_eq!(
            daemon.status_line(),
            "semantic-model 02:00 (every 2m) | report 10:00 (every 10m)"
        );

        daemon.stop_schedules();
        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get::<bool>(AUTO_REFRESH_ENABLED), Some(false));
        assert_eq!(reopened.get::<u64>("semantic_model_interval_secs"), Some(120));
        assert!(reopened.started_at_for(PageKind::Report).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn status_marks_only_the_kind_being_refreshed() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json")).unwrap();
        let daemon = Daemon::new(Config::default(), store).unwrap();
        daemon.start_schedules(false);

        let guard = daemon.automation().busy().try_acquire().unwrap();
        guard.working_on(PageKind::Report);
        assert_eq!(
            daemon.status_line(),
            "semantic-model 60:00 (every 1h) | report refreshing (every 30m)"
        );

        drop(guard);
        assert_eq!(
            daemon.status_line(),
            "semantic-model 60:00 (every 1h) | report 30:00 (every 30m)"
        );
        daemon.halt_timers();
    }

    #[tokio::test(start_paused = true)]
    async fn full_screen_upkeep_follows_schedules_and_keeps_its_interval() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let daemon = Daemon::new(Config::default(), SettingsStore::open(&path).unwrap()).unwrap();
        assert_eq!(daemon.upkeep.lock().interval().as_secs(), 3_600);

        daemon.start_schedules(false);
        assert!(daemon.upkeep.lock().is_running());

        daemon.set_full_screen_interval(Interval::from_secs(900).unwrap());
        let now = Instant::now();
        assert_eq!(daemon.upkeep.lock().remaining(now), Some(Duration::from_secs(900)));

        daemon.stop_schedules();
        assert!(!daemon.upkeep.lock().is_running());

        let reopened = Daemon::new(Config::default(), SettingsStore::open(&path).unwrap()).unwrap();
        assert_eq!(reopened.upkeep.lock().interval().as_secs(), 900);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_persists_indicator_preference() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let daemon = Daemon::new(Config::default(), SettingsStore::open(&path).unwrap()).unwrap();

        daemon.toggle_indicator();

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get::<bool>(INDICATOR_VISIBLE), Some(false));
        assert!(!daemon.indicator.lock().displayed());
    }
}
