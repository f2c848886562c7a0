//! chromiumoxide-backed [`Surface`]

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, GetWindowForTargetParams, SetWindowBoundsParams, WindowState,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{Surface, TextMatcher};
use crate::browser::{BrowserError, BrowserResult};

/// Visibility as the page itself computes it
const IS_VISIBLE_FN: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const cs = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && cs.display !== 'none' && cs.visibility !== 'hidden'; \
}";

/// Checked on the enclosing button or menu item, not on a matched label span
const IS_ENABLED_FN: &str = "function() { \
    const el = this.closest('button,[role=\"menuitem\"]') || this; \
    return !el.disabled && el.getAttribute('aria-disabled') !== 'true'; \
}";

/// Same event sequence a user click produces, for nodes without a clickable point
const DISPATCH_CLICK_FN: &str = "function() { \
    for (const type of ['pointerdown', 'mousedown', 'mouseup']) { \
        this.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window })); \
    } \
    this.click(); \
    return true; \
}";

const DOCUMENT_FULLSCREEN_JS: &str = "!!document.fullscreenElement";

const EXIT_FULLSCREEN_JS: &str = "document.fullscreenElement \
    ? document.exitFullscreen().then(() => true, () => false) \
    : Promise.resolve(false)";

const REQUEST_FULLSCREEN_JS: &str = "document.fullscreenElement \
    ? Promise.resolve(true) \
    : document.documentElement.requestFullscreen().then(() => true, () => false)";

/// Shared handle to a remote DOM node
///
/// Equality is by backend node id, which is stable for the lifetime of the node.
#[derive(Clone)]
pub struct CdpElement(Arc<Element>);

impl CdpElement {
    pub fn element(&self) -> &Element {
        &self.0
    }
}

impl PartialEq for CdpElement {
    fn eq(&self, other: &Self) -> bool {
        self.0.backend_node_id == other.0.backend_node_id
    }
}

impl fmt::Debug for CdpElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CdpElement")
            .field(&self.0.backend_node_id)
            .finish()
    }
}

/// A single tab driven over CDP
#[derive(Clone)]
pub struct CdpSurface {
    page: Page,
}

impl CdpSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Candidates for `selector`; a failed query is an empty result since the
    /// subtree may be mid-render
    async fn candidates(&self, selector: &str, root: Option<&CdpElement>) -> Vec<Element> {
        let result = match root {
            Some(root) => root.0.find_elements(selector).await,
            None => self.page.find_elements(selector).await,
        };
        match result {
            Ok(elements) => elements,
            Err(e) => {
                trace!("No match for '{}': {}", selector, e);
                Vec::new()
            }
        }
    }

    async fn js_bool(element: &Element, function: &str) -> BrowserResult<bool> {
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn is_visible(element: &Element) -> bool {
        // Detached nodes throw; treat them as invisible
        Self::js_bool(element, IS_VISIBLE_FN).await.unwrap_or(false)
    }

    async fn eval_bool(&self, expression: &str) -> BrowserResult<bool> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .user_gesture(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Script)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        result
            .into_value::<bool>()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }
}

#[async_trait]
impl Surface for CdpSurface {
    type Element = CdpElement;

    async fn find_visible(
        &self,
        selector: &str,
        root: Option<&CdpElement>,
    ) -> BrowserResult<Option<CdpElement>> {
        for element in self.candidates(selector, root).await {
            if Self::is_visible(&element).await {
                return Ok(Some(CdpElement(Arc::new(element))));
            }
        }
        Ok(None)
    }

    async fn find_visible_by_text(
        &self,
        scope: &str,
        matcher: &TextMatcher,
        root: Option<&CdpElement>,
    ) -> BrowserResult<Option<CdpElement>> {
        for element in self.candidates(scope, root).await {
            let text = element.inner_text().await.ok().flatten().unwrap_or_default();
            if matcher.matches(&text) && Self::is_visible(&element).await {
                return Ok(Some(CdpElement(Arc::new(element))));
            }
        }
        Ok(None)
    }

    async fn is_enabled(&self, element: &CdpElement) -> BrowserResult<bool> {
        Self::js_bool(&element.0, IS_ENABLED_FN).await
    }

    async fn click(&self, element: &CdpElement) -> BrowserResult<()> {
        let element = &element.0;

        // Scroll element into view to ensure it's visible (pattern from chromiumoxide element.rs:269)
        element
            .scroll_into_view()
            .await
            .map_err(|e| BrowserError::Cdp(format!("Failed to scroll element into view: {e}")))?;

        // Menu labels inside flyouts sometimes have no hit-testable point
        match element.clickable_point().await {
            Ok(point) => {
                self.page
                    .click(point)
                    .await
                    .map_err(|e| BrowserError::Cdp(format!("Click failed: {e}")))?;
            }
            Err(e) => {
                debug!("No clickable point ({}), dispatching click from script", e);
                Self::js_bool(element, DISPATCH_CLICK_FN).await?;
            }
        }
        Ok(())
    }

    async fn document_fullscreen(&self) -> BrowserResult<bool> {
        self.eval_bool(DOCUMENT_FULLSCREEN_JS).await
    }

    async fn exit_document_fullscreen(&self) -> BrowserResult<()> {
        self.eval_bool(EXIT_FULLSCREEN_JS).await.map(|_| ())
    }

    async fn request_document_fullscreen(&self) -> BrowserResult<()> {
        if self.eval_bool(REQUEST_FULLSCREEN_JS).await? {
            Ok(())
        } else {
            Err(BrowserError::Script("Fullscreen request was rejected".into()))
        }
    }

    async fn set_window_fullscreen(&self, fullscreen: bool) -> BrowserResult<()> {
        let window = self
            .page
            .execute(GetWindowForTargetParams::default())
            .await
            .map_err(|e| BrowserError::Cdp(format!("Failed to get window: {e}")))?;

        let state = if fullscreen {
            WindowState::Fullscreen
        } else {
            WindowState::Normal
        };
        let bounds = Bounds::builder().window_state(state).build();

        self.page
            .execute(SetWindowBoundsParams::new(window.result.window_id.clone(), bounds))
            .await
            .map_err(|e| BrowserError::Cdp(format!("Failed to set window state: {e}")))?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<Option<String>> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::Cdp(format!("Failed to get URL: {e}")))
    }
}
