//! Per-page-kind refresh timers
//!
//! A [`RefreshScheduler`] owns one tokio task that ticks every interval and
//! hands the tick to a cycle callback. The [`BusyFlag`] shared by all
//! schedulers and manual triggers guarantees at most one routine runs at a
//! time.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::routines::PageKind;

pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("interval must be at least 1 second")]
    TooShort,

    #[error("interval of {0}s exceeds the maximum of 86400s (24h)")]
    TooLong(u64),

    #[error("invalid duration '{0}', expected a number of seconds or a value like 90s, 30m, 1h")]
    Malformed(String),
}

/// A validated refresh period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval(Duration);

impl Interval {
    pub fn from_secs(secs: u64) -> Result<Self, IntervalError> {
        if secs < MIN_INTERVAL_SECS {
            return Err(IntervalError::TooShort);
        }
        if secs > MAX_INTERVAL_SECS {
            return Err(IntervalError::TooLong(secs));
        }
        Ok(Self(Duration::from_secs(secs)))
    }

    pub fn as_secs(self) -> u64 {
        self.0.as_secs()
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_secs() {
            s if s % 3600 == 0 => write!(f, "{}h", s / 3600),
            s if s % 60 == 0 => write!(f, "{}m", s / 60),
            s => write!(f, "{s}s"),
        }
    }
}

/// Parse `90`, `90s`, `30m` or `1h`
pub fn parse_interval(text: &str) -> Result<Interval, IntervalError> {
    let text = text.trim().to_ascii_lowercase();
    let malformed = || IntervalError::Malformed(text.clone());

    let (digits, unit) = match text.char_indices().last() {
        Some((i, 's')) => (&text[..i], 1),
        Some((i, 'm')) => (&text[..i], 60),
        Some((i, 'h')) => (&text[..i], 3600),
        Some(_) => (text.as_str(), 1),
        None => return Err(malformed()),
    };
    let value: u64 = digits.trim().parse().map_err(|_| malformed())?;
    let secs = value.checked_mul(unit).ok_or_else(malformed)?;
    Interval::from_secs(secs)
}

/// Shared "a routine is running" flag, with the page kind being worked on
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<BusyState>);

#[derive(Debug, Default)]
struct BusyState {
    held: AtomicBool,
    kind: Mutex<Option<PageKind>>,
}

impl BusyFlag {
    /// Claim the flag, or `None` if a routine already holds it
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.0.clone()))
    }

    pub fn is_busy(&self) -> bool {
        self.0.held.load(Ordering::Acquire)
    }

    /// Page kind the current holder is refreshing, once it knows
    pub fn current(&self) -> Option<PageKind> {
        *self.0.kind.lock()
    }
}

/// Clears the busy flag when dropped
#[derive(Debug)]
pub struct BusyGuard(Arc<BusyState>);

impl BusyGuard {
    /// Record which page kind this holder is refreshing
    pub fn working_on(&self, kind: PageKind) {
        *self.0.kind.lock() = Some(kind);
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self.0.kind.lock() = None;
        self.0.held.store(false, Ordering::Release);
    }
}

/// Work run on every tick
pub type Cycle = Arc<dyn Fn(PageKind) -> BoxFuture<'static, ()> + Send + Sync>;

struct Running {
    anchor: Instant,
    token: CancellationToken,
    _task: JoinHandle<()>,
}

/// Repeating timer for one page kind
pub struct RefreshScheduler {
    kind: PageKind,
    label: &'static str,
    interval: Interval,
    running: Option<Running>,
}

impl RefreshScheduler {
    pub fn new(kind: PageKind, interval: Interval) -> Self {
        Self {
            kind,
            label: "auto-refresh",
            interval,
            running: None,
        }
    }

    /// Name used in log lines, `auto-refresh` unless set
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// When the current countdown phase started
    pub fn started_at(&self) -> Option<Instant> {
        self.running.as_ref().map(|r| r.anchor)
    }

    /// Start ticking one interval from now
    pub fn start(&mut self, cycle: Cycle) {
        self.start_at(Instant::now(), cycle);
    }

    /// Start ticking in phase with `anchor`, so a restarted daemon keeps the
    /// countdown it had before
    ///
    /// The first tick is the first multiple of the interval after `anchor`
    /// that lies in the future. Deadlines missed while a cycle runs collapse
    /// into one late tick.
    pub fn start_at(&mut self, anchor: Instant, cycle: Cycle) {
        self.stop();

        let now = Instant::now();
        let anchor = anchor.min(now);
        let period = self.interval.as_duration();
        let first = now + remaining_in_phase(anchor, now, period);

        let token = CancellationToken::new();
        let child = token.clone();
        let kind = self.kind;
        let label = self.label;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                debug!("{} {} tick", kind, label);
                cycle(kind).await;
            }
            debug!("{} {} stopped", kind, label);
        });

        info!(
            "{} {} every {}s, next in {}s",
            self.kind,
            self.label,
            self.interval.as_secs(),
            (first - now).as_secs()
        );
        self.running = Some(Running {
            anchor,
            token,
            _task: task,
        });
    }

    /// Cancel the timer; a cycle already running is left to finish
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            info!("{} {} stopped", self.kind, self.label);
        }
    }

    /// Change the period, restarting the timer if it was running
    pub fn set_interval(&mut self, interval: Interval, cycle: Cycle) {
        self.interval = interval;
        if self.running.is_some() {
            self.start(cycle);
        }
    }

    /// Time until the next tick, `None` while stopped
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.running
            .as_ref()
            .map(|r| remaining_in_phase(r.anchor, now, self.interval.as_duration()))
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
        }
    }
}

fn remaining_in_phase(anchor: Instant, now: Instant, period: Duration) -> Duration {
    let period_ms = period.as_millis().max(1);
    let elapsed_ms = now.saturating_duration_since(anchor).as_millis() % period_ms;
    Duration::from_millis((period_ms - elapsed_ms) as u64)
}

/// Status text for a countdown: `MM:SS`, or what the timer is doing instead
pub fn format_countdown(remaining: Option<Duration>, busy: bool) -> String {
    if busy {
        return "refreshing".to_string();
    }
    match remaining {
        None => "disabled".to_string(),
        Some(left) => {
            let secs = left.as_millis().div_ceil(1000);
            format!("{:02}:{:02}", secs / 60, secs % 60)
        }
    }
}
