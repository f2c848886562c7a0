//! The page as the automation routines see it
//!
//! Routines never touch chromiumoxide directly; they go through [`Surface`],
//! which covers exactly the host capabilities the routines need:
//! element queries with a visibility filter, label text, clicks, the
//! Fullscreen API and the current URL.

mod cdp;
#[cfg(test)]
pub(crate) mod fake;

pub use cdp::{CdpElement, CdpSurface};

use async_trait::async_trait;
use std::fmt;

use crate::browser::BrowserResult;

/// Host page capabilities used by the element waiter and the routines
#[async_trait]
pub trait Surface: Send + Sync {
    /// Handle to a DOM node; equal handles refer to the same node
    type Element: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// First visible element matching `selector`, in document order
    async fn find_visible(
        &self,
        selector: &str,
        root: Option<&Self::Element>,
    ) -> BrowserResult<Option<Self::Element>>;

    /// First visible element matching `scope` whose trimmed inner text
    /// satisfies `matcher`
    async fn find_visible_by_text(
        &self,
        scope: &str,
        matcher: &TextMatcher,
        root: Option<&Self::Element>,
    ) -> BrowserResult<Option<Self::Element>>;

    /// `false` for `disabled` or `aria-disabled="true"` controls
    async fn is_enabled(&self, element: &Self::Element) -> BrowserResult<bool>;

    async fn click(&self, element: &Self::Element) -> BrowserResult<()>;

    /// Whether `document.fullscreenElement` is set
    async fn document_fullscreen(&self) -> BrowserResult<bool>;

    async fn exit_document_fullscreen(&self) -> BrowserResult<()>;

    async fn request_document_fullscreen(&self) -> BrowserResult<()>;

    /// Browser window full-screen state (what F11 toggles)
    async fn set_window_fullscreen(&self, fullscreen: bool) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<Option<String>>;
}

/// How a label has to relate to a needle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Exact,
    Contains,
}

/// Label text predicate, tolerant to spacing and case
///
/// Both sides are normalised by dropping whitespace and lower-casing, so
/// "Exit  Full Screen" matches "exit full screen" and "exitfullscreen".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatcher {
    pub needles: Vec<String>,
    pub exclude: Vec<String>,
    pub mode: TextMode,
}

impl TextMatcher {
    pub fn exact<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            mode: TextMode::Exact,
        }
    }

    pub fn contains<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            mode: TextMode::Contains,
        }
    }

    /// Reject labels containing any of these, whatever the needles say
    pub fn excluding<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = normalize(text);
        if text.is_empty() {
            return false;
        }
        if self
            .exclude
            .iter()
            .any(|ex| text.contains(normalize(ex).as_str()))
        {
            return false;
        }
        self.needles.iter().any(|needle| {
            let needle = normalize(needle);
            match self.mode {
                TextMode::Exact => text == needle,
                TextMode::Contains => text.contains(needle.as_str()),
            }
        })
    }
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            TextMode::Exact => "=",
            TextMode::Contains => "~",
        };
        write!(f, "text{}{:?}", mode, self.needles)
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ignores_spacing_and_case() {
        let m = TextMatcher::exact(["Refresh now"]);
        assert!(m.matches("  Refresh now "));
        assert!(m.matches("REFRESH\u{a0}NOW"));
        assert!(!m.matches("Refresh now and later"));
    }

    #[test]
    fn contains_handles_localized_variants() {
        let m = TextMatcher::contains(["exit full screen", "退出全屏"]);
        assert!(m.matches("Exit Full screen"));
        assert!(m.matches("exitfullscreen"));
        assert!(m.matches("退出 全屏"));
        assert!(!m.matches("Full screen"));
    }

    #[test]
    fn exclusion_wins_over_needles() {
        let m = TextMatcher::contains(["full screen", "全屏"]).excluding(["exit", "退出"]);
        assert!(m.matches("Full screen"));
        assert!(m.matches("全屏"));
        assert!(!m.matches("Exit full screen"));
        assert!(!m.matches("退出全屏"));
    }

    #[test]
    fn empty_label_never_matches() {
        assert!(!TextMatcher::contains([""]).matches("   "));
    }
}
