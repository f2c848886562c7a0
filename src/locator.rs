//! Locating the target application's controls
//!
//! The application's markup is an unversioned contract that changes without
//! notice. Each [`Control`] therefore maps to an ordered list of
//! [`Strategy`]s: the stable `data-testid`/id selector first, then label text,
//! then localized label text. Routines only ever ask for a `Control`.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::surface::{Surface, TextMatcher};
use crate::utils::{WaitOptions, wait_for};

/// A UI control the routines interact with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Semantic model action bar "Refresh" button
    ModelRefresh,
    /// "Refresh now" item of the semantic model refresh menu
    RefreshNow,
    /// Report app bar "Refresh visuals" button
    RefreshVisuals,
    /// Report app bar overflow ("More options") button
    MoreOptions,
    /// "Refresh visuals" inside the overflow menu
    RefreshVisualsMenuItem,
    /// Report "View" menu button
    ViewMenu,
    OpenFullScreen,
    ExitFullScreen,
}

impl Control {
    pub fn label(self) -> &'static str {
        match self {
            Control::ModelRefresh => "Refresh",
            Control::RefreshNow => "Refresh now",
            Control::RefreshVisuals => "Refresh visuals",
            Control::MoreOptions => "More options",
            Control::RefreshVisualsMenuItem => "Refresh visuals (menu)",
            Control::ViewMenu => "View",
            Control::OpenFullScreen => "Full screen",
            Control::ExitFullScreen => "Exit full screen",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One way of finding a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Selector(String),
    /// Visible element matching `scope` whose label satisfies `matcher`
    Text { scope: String, matcher: TextMatcher },
}

impl Strategy {
    pub fn selector(css: impl Into<String>) -> Self {
        Strategy::Selector(css.into())
    }

    pub fn text(scope: impl Into<String>, matcher: TextMatcher) -> Self {
        Strategy::Text {
            scope: scope.into(),
            matcher,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Selector(css) => write!(f, "{css}"),
            Strategy::Text { scope, matcher } => write!(f, "{scope} {matcher}"),
        }
    }
}

const MENU_ITEMS: &str = r#"button,[role="menuitem"]"#;

/// Control → strategies table
#[derive(Debug, Clone)]
pub struct ControlLocator {
    strategies: HashMap<Control, Vec<Strategy>>,
    poll: Duration,
}

impl Default for ControlLocator {
    fn default() -> Self {
        Self::power_bi()
    }
}

impl ControlLocator {
    /// An empty table; every control is unlocatable until strategies are added
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            poll: crate::utils::constants::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Selectors and labels of the Power BI service UI (English and Chinese)
    pub fn power_bi() -> Self {
        let refresh_now = ["Refresh now", "立即刷新"];
        Self::empty()
            .with(Control::ModelRefresh, Strategy::selector("#model-actionbar-refresh"))
            .with(Control::RefreshNow, Strategy::selector(r#"button[title="Refresh now"]"#))
            .with(Control::RefreshNow, Strategy::selector(r#"button[title="立即刷新"]"#))
            .with(
                Control::RefreshNow,
                Strategy::text("span.dropDown-displayName", TextMatcher::exact(refresh_now)),
            )
            .with(Control::RefreshNow, Strategy::text(MENU_ITEMS, TextMatcher::exact(refresh_now)))
            .with(Control::RefreshVisuals, Strategy::selector("#reportAppBarRefreshBtn"))
            .with(
                Control::MoreOptions,
                Strategy::selector(r#"button[data-testid="appbar-right-more-options"]"#),
            )
            .with(
                Control::RefreshVisualsMenuItem,
                Strategy::selector(r#"button[data-testid="appbar-right-refresh-button"]"#),
            )
            .with(
                Control::RefreshVisualsMenuItem,
                Strategy::text(MENU_ITEMS, TextMatcher::contains(["refresh visuals", "刷新视觉对象"])),
            )
            .with(
                Control::ViewMenu,
                Strategy::selector(r#"button[data-testid="app-bar-view-menu-btn"]"#),
            )
            .with(Control::ViewMenu, Strategy::text("button", TextMatcher::exact(["View", "视图"])))
            .with(
                Control::OpenFullScreen,
                Strategy::selector(r#"button[data-testid="open-in-full-screen-btn"]"#),
            )
            .with(
                Control::OpenFullScreen,
                Strategy::text(
                    MENU_ITEMS,
                    TextMatcher::contains(["full screen", "全屏"]).excluding(["exit", "退出"]),
                ),
            )
            .with(
                Control::ExitFullScreen,
                Strategy::selector(r#"button[data-testid="exit-full-screen-btn"]"#),
            )
            .with(
                Control::ExitFullScreen,
                Strategy::text(MENU_ITEMS, TextMatcher::contains(["exit full screen", "退出全屏"])),
            )
    }

    /// Append a fallback strategy for `control`
    pub fn with(mut self, control: Control, strategy: Strategy) -> Self {
        self.strategies.entry(control).or_default().push(strategy);
        self
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn strategies(&self, control: Control) -> &[Strategy] {
        self.strategies.get(&control).map(Vec::as_slice).unwrap_or(&[])
    }

    /// One pass over the strategies, in order; first visible hit wins
    pub async fn probe<S: Surface>(&self, surface: &S, control: Control) -> Option<S::Element> {
        for strategy in self.strategies(control) {
            let result = match strategy {
                Strategy::Selector(css) => surface.find_visible(css, None).await,
                Strategy::Text { scope, matcher } => {
                    surface.find_visible_by_text(scope, matcher, None).await
                }
            };
            match result {
                Ok(Some(element)) => {
                    debug!("Located {} via {}", control, strategy);
                    return Some(element);
                }
                Ok(None) => {}
                Err(e) => debug!("Strategy {} for {} failed: {}", strategy, control, e),
            }
        }
        None
    }

    /// Wait up to `timeout` for any strategy to find `control`
    pub async fn locate<S: Surface>(
        &self,
        surface: &S,
        control: Control,
        timeout: Duration,
    ) -> Option<S::Element> {
        let options = WaitOptions::new(timeout).with_poll(self.poll);
        let found = wait_for(options, || self.probe(surface, control)).await;
        if found.is_none() {
            debug!("{} not found within {}ms", control, timeout.as_millis());
        }
        found
    }
}
