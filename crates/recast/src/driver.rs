//! BrowserDriver - the browser capability the engine consumes
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  BrowserDriver (async trait, one session, exclusively owned)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐      ┌────────────────────────┐  │
//! │  │  ChromiumDriver        │      │  MockDriver            │  │
//! │  │  (feature "browser")   │      │  virtual page + clock  │  │
//! │  │  CDP via chromiumoxide │      │  scripted click effects│  │
//! │  └────────────────────────┘      └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Selectors are CSS, plus two engines understood by every driver:
//! `text="..."` (visible text contains) and `role=...` (ARIA role).

use crate::auth::{Cookie, StorageArea, StorageEntry};
use crate::result::StepError;
use crate::scenario::FrameRef;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result type for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by a browser driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Element is detached, hidden, covered or disabled
    #[error("Element not interactable: {message}")]
    NotInteractable {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// The page/browser is gone
    #[error("Session closed: {message}")]
    SessionClosed {
        /// Error message
        message: String,
    },

    /// Driver-level timeout
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Any other protocol failure
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },
}

impl DriverError {
    /// Map to the step error taxonomy; `target` names the selector or URL involved.
    #[must_use]
    pub fn into_step_error(self, target: &str) -> StepError {
        match self {
            Self::NotInteractable { message } | Self::Protocol { message } => {
                StepError::NotInteractable {
                    selector: target.to_string(),
                    message,
                }
            }
            Self::Navigation { url, message } => StepError::NavigationError { url, message },
            Self::SessionClosed { message } => StepError::SessionDead { message },
            Self::Timeout { ms } => StepError::Timeout {
                ms,
                what: target.to_string(),
            },
        }
    }
}

/// Element handle for DOM interactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Driver-scoped identifier
    pub id: String,
    /// Selector the handle was resolved from
    pub selector: String,
    /// Element tag name
    pub tag_name: String,
    /// Element text content
    pub text_content: Option<String>,
    /// Whether the element was visible when resolved
    pub visible: bool,
}

impl ElementHandle {
    /// Create a new visible element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selector: String::new(),
            tag_name: tag_name.into(),
            text_content: None,
            visible: true,
        }
    }

    /// Check if element is visible
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Parsed selector engine prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorEngine<'a> {
    /// `text="..."` / `text=...`
    Text(&'a str),
    /// `role=...`
    Role(&'a str),
    /// Plain CSS
    Css(&'a str),
}

impl<'a> SelectorEngine<'a> {
    /// Split a selector into engine and body
    #[must_use]
    pub fn parse(selector: &'a str) -> Self {
        if let Some(rest) = selector.strip_prefix("text=") {
            let unquoted = rest
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .unwrap_or(rest);
            Self::Text(unquoted)
        } else if let Some(role) = selector.strip_prefix("role=") {
            Self::Role(role.trim())
        } else {
            Self::Css(selector)
        }
    }
}

/// Abstract driver trait for browser automation.
///
/// A driver is one browser session (context + active page). It is owned by a
/// single worker for the lifetime of a run or case, hence `&mut self`.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Navigate the active page
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// All elements matching `selector`, scoped to `frame` when given
    async fn resolve(
        &mut self,
        selector: &str,
        frame: Option<&FrameRef>,
    ) -> DriverResult<Vec<ElementHandle>>;

    /// Scroll an element into the viewport
    async fn scroll_into_view(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Move the pointer over an element
    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Whether the element is visible, enabled and not covered
    async fn is_interactable(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// Real pointer click at the element's center
    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Synthetic `element.click()`
    async fn dispatch_click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Focus, set value, dispatch `input` and `change`
    async fn fill(&mut self, element: &ElementHandle, value: &str) -> DriverResult<()>;

    /// Visible text of an element
    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    /// Whether the element is currently visible
    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// URL of the active page
    async fn current_url(&mut self) -> DriverResult<String>;

    /// Number of open pages in the context
    async fn page_count(&mut self) -> DriverResult<usize>;

    /// Child frames of the active page, as references `resolve` accepts
    async fn frames(&mut self) -> DriverResult<Vec<FrameRef>>;

    /// HTML of the active page
    async fn page_content(&mut self) -> DriverResult<String>;

    /// PNG screenshot of the active page
    async fn screenshot(&mut self) -> DriverResult<Vec<u8>>;

    /// Install cookies in the context
    async fn set_cookies(&mut self, cookies: &[Cookie]) -> DriverResult<()>;

    /// Write web storage entries for `origin` (active page must be on it)
    async fn set_storage(
        &mut self,
        origin: &str,
        area: StorageArea,
        entries: &[StorageEntry],
    ) -> DriverResult<()>;

    /// Close the session
    async fn close(&mut self) -> DriverResult<()>;
}

/// Opens fresh, isolated browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a new session
    async fn open(&self) -> DriverResult<Box<dyn BrowserDriver>>;
}

// =============================================================================
// MockDriver
// =============================================================================

/// Element on the mock page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    /// Unique id
    pub id: String,
    /// Tag name
    pub tag: String,
    /// CSS selectors this element answers to
    pub selectors: Vec<String>,
    /// Visible text
    pub text: String,
    /// ARIA role
    pub role: Option<String>,
    /// Visible flag
    pub visible: bool,
    /// Interactable flag (false = covered/disabled)
    pub interactable: bool,
    /// Frame name this element lives in (`None` = top document)
    pub frame: Option<String>,
}

impl MockElement {
    /// Visible, interactable element
    #[must_use]
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            selectors: Vec::new(),
            text: String::new(),
            role: None,
            visible: true,
            interactable: true,
            frame: None,
        }
    }

    /// Answer to an additional CSS selector
    #[must_use]
    pub fn matching(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    /// Set visible text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set ARIA role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Mark hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark covered/disabled for pointer input
    #[must_use]
    pub const fn not_interactable(mut self) -> Self {
        self.interactable = false;
        self
    }

    /// Place inside a named frame
    #[must_use]
    pub fn in_frame(mut self, name: impl Into<String>) -> Self {
        self.frame = Some(name.into());
        self
    }

    fn matches(&self, selector: &str) -> bool {
        match SelectorEngine::parse(selector) {
            SelectorEngine::Text(needle) => !needle.is_empty() && self.text.contains(needle),
            SelectorEngine::Role(role) => self.role.as_deref() == Some(role),
            SelectorEngine::Css(css) => self.selectors.iter().any(|s| s == css),
        }
    }

    fn in_scope(&self, frame: Option<&FrameRef>) -> bool {
        match frame.filter(|f| !f.is_main()) {
            None => self.frame.is_none(),
            Some(f) => self.frame.as_deref().is_some_and(|name| {
                f.name.as_deref() == Some(name)
                    || f.href.as_deref().is_some_and(|href| href.contains(name))
            }),
        }
    }

    fn handle(&self, selector: &str) -> ElementHandle {
        ElementHandle {
            id: self.id.clone(),
            selector: selector.to_string(),
            tag_name: self.tag.clone(),
            text_content: Some(self.text.clone()),
            visible: self.visible,
        }
    }
}

/// Side effect of clicking a mock element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    /// Add (or replace) an element
    Reveal(MockElement),
    /// Change the page URL
    Navigate(String),
    /// Open another page
    OpenPopup,
    /// Remove an element by id
    Remove(String),
}

#[derive(Debug, Clone)]
struct Reaction {
    element_id: String,
    after: Duration,
    effect: ClickEffect,
}

#[derive(Debug, Clone)]
struct Scheduled {
    due: Instant,
    effect: ClickEffect,
}

/// Mock driver for unit testing.
///
/// Click effects are scheduled on the tokio clock, so tests running with a
/// paused clock observe deterministic timings.
#[derive(Debug, Clone)]
pub struct MockDriver {
    /// Current URL
    pub current_url: String,
    /// Elements on the page
    pub elements: Vec<MockElement>,
    /// Open pages
    pub pages: usize,
    /// Call history for verification
    pub call_history: Vec<String>,
    /// Installed cookies
    pub cookies: Vec<Cookie>,
    /// Storage writes in order
    pub storage: Vec<(String, StorageArea, Vec<StorageEntry>)>,
    /// Filled values by element id
    pub values: BTreeMap<String, String>,
    /// Screenshot bytes
    pub screenshot_data: Vec<u8>,
    /// Page HTML
    pub page_html: String,
    /// URLs whose navigation fails
    pub failing_urls: BTreeSet<String>,
    /// Whether the session is gone
    pub closed: bool,
    reactions: Vec<Reaction>,
    pending: Vec<Scheduled>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            current_url: "about:blank".to_string(),
            elements: Vec::new(),
            pages: 1,
            call_history: Vec::new(),
            cookies: Vec::new(),
            storage: Vec::new(),
            values: BTreeMap::new(),
            screenshot_data: b"\x89PNG\r\n\x1a\n".to_vec(),
            page_html: "<html><body></body></html>".to_string(),
            failing_urls: BTreeSet::new(),
            closed: false,
            reactions: Vec::new(),
            pending: Vec::new(),
        }
    }
}

impl MockDriver {
    /// Create new mock driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock element
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Schedule `effect` to happen `after` each click on `element_id`
    #[must_use]
    pub fn on_click(mut self, element_id: impl Into<String>, after: Duration, effect: ClickEffect) -> Self {
        self.reactions.push(Reaction {
            element_id: element_id.into(),
            after,
            effect,
        });
        self
    }

    /// Make navigation to `url` fail
    #[must_use]
    pub fn failing_navigation(mut self, url: impl Into<String>) -> Self {
        self.failing_urls.insert(url.into());
        self
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.call_history
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history.iter().any(|c| c.starts_with(method))
    }

    /// Number of recorded calls starting with `prefix`
    #[must_use]
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.call_history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn alive(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::SessionClosed {
                message: "mock session closed".to_string(),
            });
        }
        Ok(())
    }

    fn settle(&mut self) {
        let now = Instant::now();
        let mut due: Vec<Scheduled> = Vec::new();
        self.pending.retain(|s| {
            if s.due <= now {
                due.push(s.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|s| s.due);
        for scheduled in due {
            match scheduled.effect {
                ClickEffect::Reveal(element) => {
                    self.elements.retain(|e| e.id != element.id);
                    self.elements.push(element);
                }
                ClickEffect::Navigate(url) => self.current_url = url,
                ClickEffect::OpenPopup => self.pages += 1,
                ClickEffect::Remove(id) => self.elements.retain(|e| e.id != id),
            }
        }
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<&MockElement> {
        self.elements
            .iter()
            .find(|e| e.id == handle.id)
            .ok_or_else(|| DriverError::NotInteractable {
                message: format!("element {} is detached", handle.id),
            })
    }

    fn trigger(&mut self, element_id: &str) {
        let now = Instant::now();
        let scheduled: Vec<Scheduled> = self
            .reactions
            .iter()
            .filter(|r| r.element_id == element_id)
            .map(|r| Scheduled {
                due: now + r.after,
                effect: r.effect.clone(),
            })
            .collect();
        self.pending.extend(scheduled);
        self.settle();
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("navigate:{url}"));
        if self.failing_urls.contains(url) {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        self.current_url = url.to_string();
        Ok(())
    }

    async fn resolve(
        &mut self,
        selector: &str,
        frame: Option<&FrameRef>,
    ) -> DriverResult<Vec<ElementHandle>> {
        self.alive()?;
        self.settle();
        Ok(self
            .elements
            .iter()
            .filter(|e| e.in_scope(frame) && e.matches(selector))
            .map(|e| e.handle(selector))
            .collect())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("scroll:{}", element.id));
        let el = self.element(element)?;
        if !el.visible {
            return Err(DriverError::NotInteractable {
                message: format!("element {} is hidden", el.id),
            });
        }
        Ok(())
    }

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("hover:{}", element.id));
        let el = self.element(element)?;
        if !el.interactable {
            return Err(DriverError::NotInteractable {
                message: format!("element {} is covered", el.id),
            });
        }
        Ok(())
    }

    async fn is_interactable(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.alive()?;
        let el = self.element(element)?;
        Ok(el.visible && el.interactable)
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("click:{}", element.id));
        let el = self.element(element)?;
        if !el.visible || !el.interactable {
            return Err(DriverError::NotInteractable {
                message: format!("element {} does not receive pointer events", el.id),
            });
        }
        let id = el.id.clone();
        self.trigger(&id);
        Ok(())
    }

    async fn dispatch_click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("dispatch_click:{}", element.id));
        let id = self.element(element)?.id.clone();
        self.trigger(&id);
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("fill:{}", element.id));
        let el = self.element(element)?;
        if !el.interactable {
            return Err(DriverError::NotInteractable {
                message: format!("element {} is disabled", el.id),
            });
        }
        let id = el.id.clone();
        self.values.insert(id, value.to_string());
        Ok(())
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.alive()?;
        self.settle();
        Ok(self.element(element)?.text.clone())
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.alive()?;
        self.settle();
        Ok(self.element(element).map(|e| e.visible).unwrap_or(false))
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.alive()?;
        self.settle();
        Ok(self.current_url.clone())
    }

    async fn page_count(&mut self) -> DriverResult<usize> {
        self.alive()?;
        self.settle();
        Ok(self.pages)
    }

    async fn frames(&mut self) -> DriverResult<Vec<FrameRef>> {
        self.alive()?;
        self.settle();
        let mut names: Vec<&str> = self.elements.iter().filter_map(|e| e.frame.as_deref()).collect();
        names.sort_unstable();
        names.dedup();
        Ok(names
            .into_iter()
            .map(|name| FrameRef {
                name: Some(name.to_string()),
                ..FrameRef::default()
            })
            .collect())
    }

    async fn page_content(&mut self) -> DriverResult<String> {
        self.alive()?;
        Ok(self.page_html.clone())
    }

    async fn screenshot(&mut self) -> DriverResult<Vec<u8>> {
        self.alive()?;
        self.call_history.push("screenshot".to_string());
        Ok(self.screenshot_data.clone())
    }

    async fn set_cookies(&mut self, cookies: &[Cookie]) -> DriverResult<()> {
        self.alive()?;
        self.call_history.push(format!("set_cookies:{}", cookies.len()));
        self.cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn set_storage(
        &mut self,
        origin: &str,
        area: StorageArea,
        entries: &[StorageEntry],
    ) -> DriverResult<()> {
        self.alive()?;
        self.call_history
            .push(format!("set_storage:{origin}:{}", area.as_str()));
        self.storage
            .push((origin.to_string(), area, entries.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.call_history.push("close".to_string());
        self.closed = true;
        Ok(())
    }
}

/// Factory handing out clones of a template [`MockDriver`].
#[derive(Debug)]
pub struct MockDriverFactory {
    template: MockDriver,
    opened: AtomicUsize,
    failing_sessions: BTreeSet<usize>,
}

impl MockDriverFactory {
    /// Factory cloning `template` for every session
    #[must_use]
    pub fn new(template: MockDriver) -> Self {
        Self {
            template,
            opened: AtomicUsize::new(0),
            failing_sessions: BTreeSet::new(),
        }
    }

    /// Make the `n`-th opened session (0-based) fail to launch
    #[must_use]
    pub fn failing_session(mut self, n: usize) -> Self {
        self.failing_sessions.insert(n);
        self
    }

    /// Number of sessions opened so far
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    async fn open(&self) -> DriverResult<Box<dyn BrowserDriver>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        if self.failing_sessions.contains(&n) {
            return Err(DriverError::SessionClosed {
                message: format!("mock session {n} failed to launch"),
            });
        }
        Ok(Box::new(self.template.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod selector_engine_tests {
        use super::*;

        #[test]
        fn test_parse_engines() {
            assert_eq!(SelectorEngine::parse("text=\"Log in\""), SelectorEngine::Text("Log in"));
            assert_eq!(SelectorEngine::parse("text=Log"), SelectorEngine::Text("Log"));
            assert_eq!(SelectorEngine::parse("role=dialog"), SelectorEngine::Role("dialog"));
            assert_eq!(SelectorEngine::parse("#buy"), SelectorEngine::Css("#buy"));
        }
    }

    mod driver_error_tests {
        use super::*;

        #[test]
        fn test_step_error_mapping() {
            let err = DriverError::SessionClosed {
                message: "target crashed".into(),
            };
            assert!(err.into_step_error("#a").is_session_fatal());

            let err = DriverError::NotInteractable {
                message: "covered".into(),
            };
            assert_eq!(
                err.into_step_error("#a"),
                StepError::NotInteractable {
                    selector: "#a".into(),
                    message: "covered".into()
                }
            );

            let err = DriverError::Navigation {
                url: "https://x.test".into(),
                message: "dns".into(),
            };
            assert!(matches!(
                err.into_step_error("https://x.test"),
                StepError::NavigationError { .. }
            ));
        }
    }

    mod mock_driver_tests {
        use super::*;

        fn page() -> MockDriver {
            MockDriver::new()
                .with_element(
                    MockElement::new("buy", "button")
                        .matching("#buy")
                        .with_text("Buy now"),
                )
                .with_element(
                    MockElement::new("cover", "button")
                        .matching("#covered")
                        .not_interactable(),
                )
                .with_element(
                    MockElement::new("inner", "a")
                        .matching("#inner")
                        .in_frame("checkout"),
                )
        }

        #[tokio::test]
        async fn test_resolve_css_text_and_role() {
            let mut d = page().with_element(MockElement::new("dlg", "div").with_role("dialog"));
            assert_eq!(d.resolve("#buy", None).await.unwrap().len(), 1);
            assert_eq!(d.resolve("text=\"Buy\"", None).await.unwrap()[0].id, "buy");
            assert_eq!(d.resolve("role=dialog", None).await.unwrap()[0].id, "dlg");
            assert!(d.resolve("#nope", None).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_frame_scoping() {
            let mut d = page();
            assert!(d.resolve("#inner", None).await.unwrap().is_empty());
            let frame = FrameRef {
                name: Some("checkout".into()),
                ..FrameRef::default()
            };
            assert_eq!(d.resolve("#inner", Some(&frame)).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_native_click_rejected_when_covered() {
            let mut d = page();
            let el = d.resolve("#covered", None).await.unwrap().remove(0);
            assert!(matches!(
                d.click(&el).await,
                Err(DriverError::NotInteractable { .. })
            ));
            assert!(d.dispatch_click(&el).await.is_ok());
        }

        #[tokio::test(start_paused = true)]
        async fn test_click_effects_follow_the_clock() {
            let mut d = page().on_click(
                "buy",
                Duration::from_millis(500),
                ClickEffect::Navigate("https://shop.test/cart".into()),
            );
            let el = d.resolve("#buy", None).await.unwrap().remove(0);
            d.click(&el).await.unwrap();
            assert_eq!(d.current_url().await.unwrap(), "about:blank");
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(d.current_url().await.unwrap(), "https://shop.test/cart");
        }

        #[tokio::test]
        async fn test_closed_session_errors() {
            let mut d = page();
            d.close().await.unwrap();
            assert!(matches!(
                d.current_url().await,
                Err(DriverError::SessionClosed { .. })
            ));
        }

        #[tokio::test]
        async fn test_failing_navigation() {
            let mut d = MockDriver::new().failing_navigation("https://down.test/");
            assert!(d.navigate("https://down.test/").await.is_err());
            assert!(d.navigate("https://up.test/").await.is_ok());
            assert_eq!(d.count_calls("navigate:"), 2);
        }
    }

    mod factory_tests {
        use super::*;

        #[tokio::test]
        async fn test_factory_opens_fresh_clones() {
            let factory = MockDriverFactory::new(MockDriver::new()).failing_session(1);
            let mut first = factory.open().await.unwrap();
            first.navigate("https://a.test").await.unwrap();
            assert!(factory.open().await.is_err());
            let mut third = factory.open().await.unwrap();
            assert_eq!(third.current_url().await.unwrap(), "about:blank");
            assert_eq!(factory.opened(), 3);
        }
    }
}
