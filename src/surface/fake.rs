//! Scripted in-memory page for tests
//!
//! Nodes are matched by exact selector string, appear after a delay measured
//! on the tokio clock (so `start_paused` tests are deterministic) and can
//! reveal or hide other nodes when clicked.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{Surface, TextMatcher};
use crate::browser::{BrowserError, BrowserResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Reveal(u32),
    Hide(u32),
    EnterFullscreen,
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    id: u32,
    selector: String,
    text: String,
    visible: bool,
    enabled: bool,
    appears_after: Duration,
    parent: Option<u32>,
    on_click: Vec<Effect>,
}

impl FakeNode {
    pub fn new(id: u32, selector: &str) -> Self {
        Self {
            id,
            selector: selector.to_string(),
            text: String::new(),
            visible: true,
            enabled: true,
            appears_after: Duration::ZERO,
            parent: None,
            on_click: Vec::new(),
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Present in the DOM but `display: none`
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn child_of(mut self, parent: u32) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }
}

#[derive(Debug, Default)]
struct FakeDom {
    nodes: Vec<FakeNode>,
    clicks: Vec<u32>,
    document_fullscreen: bool,
    window_fullscreen: bool,
    url: Option<String>,
}

pub struct FakeSurface {
    origin: Instant,
    fail_until: Option<Duration>,
    dom: Mutex<FakeDom>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            fail_until: None,
            dom: Mutex::new(FakeDom::default()),
        }
    }

    pub fn with(self, node: FakeNode) -> Self {
        self.dom.lock().nodes.push(node);
        self
    }

    pub fn at_url(self, url: &str) -> Self {
        self.dom.lock().url = Some(url.to_string());
        self
    }

    pub fn in_fullscreen(self) -> Self {
        self.dom.lock().document_fullscreen = true;
        self
    }

    /// Every query errors until `delay` has passed
    pub fn failing_queries_until(mut self, delay: Duration) -> Self {
        self.fail_until = Some(delay);
        self
    }

    pub fn element(&self, id: u32) -> FakeId {
        FakeId(id)
    }

    pub fn clicks(&self) -> Vec<u32> {
        self.dom.lock().clicks.clone()
    }

    pub fn is_document_fullscreen(&self) -> bool {
        self.dom.lock().document_fullscreen
    }

    pub fn is_window_fullscreen(&self) -> bool {
        self.dom.lock().window_fullscreen
    }

    fn check_failure(&self) -> BrowserResult<()> {
        match self.fail_until {
            Some(until) if self.origin.elapsed() < until => {
                Err(BrowserError::Cdp("Target closed".into()))
            }
            _ => Ok(()),
        }
    }

    fn is_shown(&self, node: &FakeNode) -> bool {
        node.visible && self.origin.elapsed() >= node.appears_after
    }

    fn find<F>(&self, selector: &str, root: Option<&FakeId>, extra: F) -> BrowserResult<Option<FakeId>>
    where
        F: Fn(&FakeNode) -> bool,
    {
        self.check_failure()?;
        let dom = self.dom.lock();
        Ok(dom
            .nodes
            .iter()
            .filter(|n| n.selector == selector)
            .filter(|n| root.is_none_or(|r| n.parent == Some(r.0)))
            .filter(|n| self.is_shown(n))
            .find(|n| extra(n))
            .map(|n| FakeId(n.id)))
    }
}

#[async_trait]
impl Surface for FakeSurface {
    type Element = FakeId;

    async fn find_visible(
        &self,
        selector: &str,
        root: Option<&FakeId>,
    ) -> BrowserResult<Option<FakeId>> {
        self.find(selector, root, |_| true)
    }

    async fn find_visible_by_text(
        &self,
        scope: &str,
        matcher: &TextMatcher,
        root: Option<&FakeId>,
    ) -> BrowserResult<Option<FakeId>> {
        self.find(scope, root, |n| matcher.matches(&n.text))
    }

    /// A node inside a disabled ancestor is disabled too
    async fn is_enabled(&self, element: &FakeId) -> BrowserResult<bool> {
        let dom = self.dom.lock();
        let lookup = |id: u32| dom.nodes.iter().find(|n| n.id == id);
        let mut node =
            lookup(element.0).ok_or_else(|| BrowserError::Cdp("No node with given id".into()))?;
        loop {
            if !node.enabled {
                return Ok(false);
            }
            match node.parent.and_then(lookup) {
                Some(parent) => node = parent,
                None => return Ok(true),
            }
        }
    }

    async fn click(&self, element: &FakeId) -> BrowserResult<()> {
        let mut dom = self.dom.lock();
        let node = dom
            .nodes
            .iter()
            .find(|n| n.id == element.0)
            .cloned()
            .ok_or_else(|| BrowserError::Cdp("No node with given id".into()))?;
        if !self.is_shown(&node) {
            return Err(BrowserError::Cdp("Node is not visible".into()));
        }
        dom.clicks.push(node.id);
        for effect in node.on_click {
            match effect {
                Effect::Reveal(id) | Effect::Hide(id) => {
                    let shown = matches!(effect, Effect::Reveal(_));
                    if let Some(target) = dom.nodes.iter_mut().find(|n| n.id == id) {
                        target.visible = shown;
                    }
                }
                Effect::EnterFullscreen => dom.document_fullscreen = true,
            }
        }
        Ok(())
    }

    async fn document_fullscreen(&self) -> BrowserResult<bool> {
        Ok(self.dom.lock().document_fullscreen)
    }

    async fn exit_document_fullscreen(&self) -> BrowserResult<()> {
        self.dom.lock().document_fullscreen = false;
        Ok(())
    }

    async fn request_document_fullscreen(&self) -> BrowserResult<()> {
        self.dom.lock().document_fullscreen = true;
        Ok(())
    }

    async fn set_window_fullscreen(&self, fullscreen: bool) -> BrowserResult<()> {
        self.dom.lock().window_fullscreen = fullscreen;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<Option<String>> {
        Ok(self.dom.lock().url.clone())
    }
}
