//! Chromium implementation of [`BrowserDriver`] over CDP.
//!
//! Every session is its own browser process, so cases never share cookies
//! or storage. Resolved elements are tagged with a `data-recast-id`
//! attribute; later calls find them again through that tag, including
//! inside same-origin frames.

use crate::auth::{Cookie, SameSite, StorageArea, StorageEntry};
use crate::config::EngineConfig;
use crate::driver::{BrowserDriver, DriverError, DriverFactory, DriverResult, ElementHandle, SelectorEngine};
use crate::result::{RecastError, RecastResult};
use crate::scenario::FrameRef;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Helpers shared by every injected script
const PRELUDE: &str = r#"
const __find = (id) => {
  const q = `[data-recast-id="${id}"]`;
  const hit = document.querySelector(q);
  if (hit) return hit;
  for (const f of document.querySelectorAll('iframe,frame')) {
    try {
      const el = f.contentDocument && f.contentDocument.querySelector(q);
      if (el) return el;
    } catch (_) {}
  }
  return null;
};
const __visible = (el) => {
  const s = el.ownerDocument.defaultView.getComputedStyle(el);
  const r = el.getBoundingClientRect();
  return s.visibility !== 'hidden' && s.display !== 'none' && r.width > 0 && r.height > 0;
};
const __center = (el) => {
  const r = el.getBoundingClientRect();
  let x = r.left + r.width / 2, y = r.top + r.height / 2;
  let w = el.ownerDocument.defaultView;
  while (w.frameElement) {
    const fr = w.frameElement.getBoundingClientRect();
    x += fr.left; y += fr.top; w = w.parent;
  }
  return { x, y };
};
const __interactable = (el) => {
  if (el.disabled || !__visible(el)) return false;
  const r = el.getBoundingClientRect();
  const top = el.ownerDocument.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
  return !!top && (top === el || el.contains(top));
};
const __roles = { button: 'button', a: 'link', select: 'combobox', textarea: 'textbox', dialog: 'dialog', nav: 'navigation' };
"#;

const RESOLVE: &str = r#"
const __doc = (frame) => {
  if (!frame) return document;
  const f = [...document.querySelectorAll('iframe,frame')].find((e) =>
    (frame.name && e.name === frame.name) || (frame.href && (e.src || '').includes(frame.href)));
  if (!f) return null;
  try { return f.contentDocument; } catch (_) { return null; }
};
const doc = __doc(__frame);
if (!doc) return [];
let found;
if (__engine === 'text') {
  found = [...doc.querySelectorAll('body *')].filter((e) =>
    (e.innerText || '').includes(__body) &&
    ![...e.children].some((c) => (c.innerText || '').includes(__body)));
} else if (__engine === 'role') {
  found = [...doc.querySelectorAll('*')].filter((e) =>
    (e.getAttribute('role') || __roles[e.tagName.toLowerCase()]) === __body);
} else {
  try { found = [...doc.querySelectorAll(__body)]; } catch (_) { return []; }
}
return found.map((e) => {
  if (!e.hasAttribute('data-recast-id')) {
    window.__recastSeq = (window.__recastSeq || 0) + 1;
    e.setAttribute('data-recast-id', String(window.__recastSeq));
  }
  return {
    id: e.getAttribute('data-recast-id'),
    tag: e.tagName.toLowerCase(),
    text: (e.innerText || '').trim().slice(0, 200),
    visible: __visible(e),
  };
});
"#;

#[derive(Debug, Deserialize)]
struct Resolved {
    id: String,
    tag: String,
    text: String,
    visible: bool,
}

const FRAMES: &str = r#"
return [...document.querySelectorAll('iframe,frame')]
  .map((f) => ({ name: f.name || null, href: f.getAttribute('src') || null }))
  .filter((f) => f.name || f.href);
"#;

#[derive(Debug, Deserialize)]
struct ChildFrame {
    name: Option<String>,
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

fn cdp_error(e: CdpError) -> DriverError {
    match e {
        CdpError::NoResponse | CdpError::ChannelSendError(_) => DriverError::SessionClosed {
            message: e.to_string(),
        },
        other => DriverError::Protocol {
            message: other.to_string(),
        },
    }
}

fn protocol(message: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol {
        message: message.to_string(),
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// One Chromium session with a single active page.
///
/// Popups opened by the page are counted by `page_count` but never become
/// the active page; every other operation keeps targeting the opener.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver").finish_non_exhaustive()
    }
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be launched
    pub async fn launch(config: &EngineConfig) -> RecastResult<Self> {
        let mut builder = BrowserConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| RecastError::BrowserLaunchError { message })?;

        let (browser, mut handler) =
            Browser::launch(cdp_config)
                .await
                .map_err(|e| RecastError::BrowserLaunchError {
                    message: e.to_string(),
                })?;
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RecastError::BrowserLaunchError {
                message: e.to_string(),
            })?;
        info!(headless = config.headless, "chromium session started");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, body: &str) -> DriverResult<T> {
        let expr = format!("(() => {{ {PRELUDE}\n{body} }})()");
        let result = self.page.evaluate_expression(expr).await.map_err(cdp_error)?;
        result.into_value().map_err(protocol)
    }

    async fn on_element<T: DeserializeOwned>(
        &self,
        element: &ElementHandle,
        body: &str,
    ) -> DriverResult<T> {
        let script = format!(
            "const el = __find({});\nif (!el) return {{ detached: true }};\nreturn {{ detached: false, value: (() => {{ {body} }})() }};",
            js_string(&element.id)
        );
        let reply: serde_json::Value = self.eval(&script).await?;
        if reply["detached"].as_bool().unwrap_or(true) {
            return Err(DriverError::NotInteractable {
                message: format!("element {} is detached", element.id),
            });
        }
        serde_json::from_value(reply["value"].clone()).map_err(protocol)
    }

    async fn mouse(&self, kind: DispatchMouseEventType, at: &Point) -> DriverResult<()> {
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind.clone())
            .x(at.x)
            .y(at.y);
        if kind != DispatchMouseEventType::MouseMoved {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder.build().map_err(protocol)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        debug!(url, "navigate");
        self.page.goto(url).await.map_err(|e| match cdp_error(e) {
            DriverError::Protocol { message } => DriverError::Navigation {
                url: url.to_string(),
                message,
            },
            other => other,
        })?;
        Ok(())
    }

    async fn resolve(
        &mut self,
        selector: &str,
        frame: Option<&FrameRef>,
    ) -> DriverResult<Vec<ElementHandle>> {
        let (engine, body) = match SelectorEngine::parse(selector) {
            SelectorEngine::Text(t) => ("text", t),
            SelectorEngine::Role(r) => ("role", r),
            SelectorEngine::Css(c) => ("css", c),
        };
        let frame = frame
            .filter(|f| !f.is_main())
            .map_or(serde_json::Value::Null, |f| json!({"name": f.name, "href": f.href}));
        let script = format!(
            "const __engine = {}; const __body = {}; const __frame = {};\n{RESOLVE}",
            js_string(engine),
            js_string(body),
            frame
        );
        let found: Vec<Resolved> = self.eval(&script).await?;
        Ok(found
            .into_iter()
            .map(|r| ElementHandle {
                id: r.id,
                selector: selector.to_string(),
                tag_name: r.tag,
                text_content: Some(r.text),
                visible: r.visible,
            })
            .collect())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.on_element::<bool>(element, "el.scrollIntoView({ block: 'center', inline: 'center' }); return true;")
            .await?;
        Ok(())
    }

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let at: Point = self.on_element(element, "return __center(el);").await?;
        self.mouse(DispatchMouseEventType::MouseMoved, &at).await
    }

    async fn is_interactable(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.on_element(element, "return __interactable(el);").await
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        if !self.is_interactable(element).await? {
            return Err(DriverError::NotInteractable {
                message: format!("{} is covered, hidden or disabled", element.selector),
            });
        }
        let at: Point = self.on_element(element, "return __center(el);").await?;
        self.mouse(DispatchMouseEventType::MousePressed, &at).await?;
        self.mouse(DispatchMouseEventType::MouseReleased, &at).await
    }

    async fn dispatch_click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.on_element::<bool>(element, "el.click(); return true;").await?;
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> DriverResult<()> {
        let body = format!(
            "if (el.disabled || el.readOnly) return false;\n\
             el.focus();\n\
             el.value = {};\n\
             el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));\n\
             return true;",
            js_string(value)
        );
        if self.on_element::<bool>(element, &body).await? {
            Ok(())
        } else {
            Err(DriverError::NotInteractable {
                message: format!("{} is disabled or read-only", element.selector),
            })
        }
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.on_element(element, "return el.innerText || el.textContent || '';")
            .await
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        match self.on_element(element, "return __visible(el);").await {
            Err(DriverError::NotInteractable { .. }) => Ok(false),
            other => other,
        }
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(cdp_error)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_count(&mut self) -> DriverResult<usize> {
        Ok(self.browser.pages().await.map_err(cdp_error)?.len())
    }

    async fn frames(&mut self) -> DriverResult<Vec<FrameRef>> {
        let found: Vec<ChildFrame> = self.eval(FRAMES).await?;
        Ok(found
            .into_iter()
            .map(|f| FrameRef {
                name: f.name,
                href: f.href,
                is_top: false,
            })
            .collect())
    }

    async fn page_content(&mut self) -> DriverResult<String> {
        self.page.content().await.map_err(cdp_error)
    }

    async fn screenshot(&mut self) -> DriverResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let screenshot = self.page.execute(params).await.map_err(cdp_error)?;

        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(protocol)
    }

    async fn set_cookies(&mut self, cookies: &[Cookie]) -> DriverResult<()> {
        let params = cookies
            .iter()
            .map(|c| {
                let mut builder = CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .http_only(c.http_only)
                    .secure(c.secure)
                    .same_site(match c.same_site {
                        SameSite::Strict => CookieSameSite::Strict,
                        SameSite::Lax => CookieSameSite::Lax,
                        SameSite::None => CookieSameSite::None,
                    });
                if let Some(expires) = c.expires_at() {
                    builder = builder.expires(TimeSinceEpoch::new(expires));
                }
                builder.build().map_err(protocol)
            })
            .collect::<DriverResult<Vec<_>>>()?;
        self.page.set_cookies(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn set_storage(
        &mut self,
        origin: &str,
        area: StorageArea,
        entries: &[StorageEntry],
    ) -> DriverResult<()> {
        let pairs: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_str()))
            .collect();
        let script = format!(
            "if (location.origin !== {}) return false;\n\
             for (const [k, v] of {}) window.{}.setItem(k, v);\n\
             return true;",
            js_string(origin),
            serde_json::to_string(&pairs).map_err(protocol)?,
            area.as_str()
        );
        if self.eval::<bool>(&script).await? {
            Ok(())
        } else {
            Err(protocol(format!("page is not on origin {origin}")))
        }
    }

    async fn close(&mut self) -> DriverResult<()> {
        let closed = self.browser.close().await.map(|_| ());
        self.handler.abort();
        closed.map_err(cdp_error)
    }
}

/// Opens a fresh Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    config: EngineConfig,
    launch_timeout: Duration,
}

impl ChromiumFactory {
    /// Factory launching browsers with `config`
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self {
            config,
            launch_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn open(&self) -> DriverResult<Box<dyn BrowserDriver>> {
        let launch = ChromiumDriver::launch(&self.config);
        match tokio::time::timeout(self.launch_timeout, launch).await {
            Ok(Ok(driver)) => Ok(Box::new(driver)),
            Ok(Err(e)) => Err(DriverError::SessionClosed {
                message: e.to_string(),
            }),
            #[allow(clippy::cast_possible_truncation)]
            Err(_) => Err(DriverError::Timeout {
                ms: self.launch_timeout.as_millis() as u64,
            }),
        }
    }
}
