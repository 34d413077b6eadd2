//! Step execution.
//!
//! [`StepExecutor`] runs one step against a [`BrowserDriver`]: selector
//! resolution, click fallbacks, bounded retry and post-click success
//! evaluation. Every wait is a poll loop on the tokio clock.

mod state;

pub use state::{StepLog, StepState};

use crate::auth::AuthStateInjector;
use crate::config::EngineConfig;
use crate::driver::{BrowserDriver, DriverError, ElementHandle};
use crate::result::StepError;
use crate::scenario::{
    ClickStrategy, ConditionKind, FrameRef, RetryPolicy, SelectorSet, Step, StepAction, StepKind,
    SuccessCondition, DEFAULT_EXPECT_TEXT_TIMEOUT_MS, DEFAULT_EXPECT_TIMEOUT_MS,
    DEFAULT_LOGGED_OUT_TEXT, DEFAULT_LOGIN_SELECTOR, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_WAIT_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Selectors probed for a modal when no text is expected
pub const DIALOG_SELECTORS: [&str; 3] = ["[role=\"dialog\"]", "dialog[open]", ".modal.show"];

/// A named binary artifact collected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Step that produced it
    pub step_index: usize,
    /// Artifact name
    pub name: String,
    /// Raw bytes (PNG for screenshots)
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Size of `data`
    pub size_bytes: usize,
}

impl Artifact {
    /// Create an artifact
    #[must_use]
    pub fn new(step_index: usize, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            step_index,
            name: name.into(),
            size_bytes: data.len(),
            data,
        }
    }
}

/// Mutable state shared by the steps of one run or case.
#[derive(Debug, Default)]
pub struct RunContext {
    base_url: Option<Url>,
    injector: Option<AuthStateInjector>,
    artifacts: Vec<Artifact>,
}

impl RunContext {
    /// Context joining relative URLs onto `base_url`
    #[must_use]
    pub fn new(base_url: Option<&str>) -> Self {
        let base_url = base_url.filter(|u| !u.trim().is_empty()).and_then(|u| {
            Url::parse(u)
                .map_err(|e| warn!(base_url = u, error = %e, "ignoring unparsable base_url"))
                .ok()
        });
        Self {
            base_url,
            injector: None,
            artifacts: Vec::new(),
        }
    }

    /// Attach the session artifact injector
    #[must_use]
    pub fn with_injector(mut self, injector: AuthStateInjector) -> Self {
        self.injector = Some(injector);
        self
    }

    /// The injector, if any
    #[must_use]
    pub const fn injector(&self) -> Option<&AuthStateInjector> {
        self.injector.as_ref()
    }

    /// Artifacts collected so far
    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Take the collected artifacts
    pub fn take_artifacts(&mut self) -> Vec<Artifact> {
        std::mem::take(&mut self.artifacts)
    }

    /// Replay storage for the origin the page is on now, if not done yet.
    pub async fn sync_origin(&mut self, driver: &mut dyn BrowserDriver) -> Result<(), DriverError> {
        let Some(injector) = self.injector.as_mut() else {
            return Ok(());
        };
        let current = driver.current_url().await?;
        injector.after_navigation(driver, &current).await
    }

    /// Join a relative URL (or `*` pattern) onto the base URL.
    #[must_use]
    pub fn resolve_url(&self, url: &str) -> String {
        let (body, wildcard) = match url.strip_suffix('*') {
            Some(body) => (body, "*"),
            None => (url, ""),
        };
        if Url::parse(body).is_ok() {
            return url.to_string();
        }
        match self.base_url.as_ref().and_then(|base| base.join(body).ok()) {
            Some(joined) => format!("{joined}{wildcard}"),
            None => url.to_string(),
        }
    }
}

/// Exact match, or prefix match when `pattern` ends with `*`
#[must_use]
pub fn url_matches(pattern: &str, actual: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => actual.starts_with(prefix),
        None => actual == pattern,
    }
}

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Log entry
    pub log: StepLog,
    /// Error of the failed step
    pub error: Option<StepError>,
}

impl StepOutcome {
    /// Whether the step succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.log.status == StepState::Succeeded
    }
}

/// What the last attempt touched, for the log
#[derive(Debug, Default)]
struct Trace {
    selector_used: Option<String>,
    strategy_used: Option<ClickStrategy>,
    matched_condition: Option<ConditionKind>,
}

/// URL and page count captured just before a click
#[derive(Debug)]
struct Baseline {
    url: String,
    pages: usize,
}

/// Bounded poll loop on the tokio clock
struct Poller {
    start: Instant,
    timeout: Duration,
    interval: Duration,
}

impl Poller {
    fn new(timeout_ms: u64, interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout: Duration::from_millis(timeout_ms),
            interval,
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleep one interval; false once the timeout has passed
    async fn tick(&self) -> bool {
        let elapsed = self.start.elapsed();
        if elapsed >= self.timeout {
            return false;
        }
        tokio::time::sleep(self.interval.min(self.timeout - elapsed)).await;
        true
    }
}

fn session_or(err: DriverError, f: impl FnOnce(DriverError) -> StepError) -> StepError {
    match err {
        DriverError::SessionClosed { message } => StepError::SessionDead { message },
        other => f(other),
    }
}

/// Executes single steps.
#[derive(Debug, Clone, Default)]
pub struct StepExecutor {
    config: EngineConfig,
}

impl StepExecutor {
    /// Executor with the given tunables
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Attempt budget for `step`
    #[must_use]
    pub fn max_attempts(step: &Step) -> u32 {
        match &step.action {
            StepAction::Click { retry, .. } => retry
                .as_ref()
                .map_or(DEFAULT_MAX_ATTEMPTS, |r| r.max_attempts)
                .max(1),
            StepAction::Fill { .. } => DEFAULT_MAX_ATTEMPTS,
            _ => 1,
        }
    }

    /// Run `step` to a terminal state, then apply its delay.
    pub async fn execute(
        &self,
        driver: &mut dyn BrowserDriver,
        index: usize,
        step: &Step,
        ctx: &mut RunContext,
    ) -> StepOutcome {
        let started = Instant::now();
        let max_attempts = Self::max_attempts(step);
        let mut trace = Trace::default();
        let mut state = StepState::Pending.start();
        let mut attempt_count = 0;
        let mut error = None;

        while let StepState::Attempting(n) = state {
            attempt_count = n;
            debug!(step = index, kind = %step.kind(), attempt = n, max_attempts, "attempt");
            let result = self.attempt(driver, index, step, ctx, &mut trace).await;
            state = state.advance(result.as_ref().map(|_| ()), max_attempts);
            match result {
                Ok(()) => error = None,
                Err(e) => {
                    if matches!(state, StepState::Attempting(_)) {
                        warn!(step = index, attempt = n, error = %e, "attempt failed, retrying");
                        tokio::time::sleep(self.config.retry_backoff()).await;
                    }
                    error = Some(e);
                }
            }
        }

        // Clicks and redirects can land on a new origin without a go step.
        if state == StepState::Succeeded && step.kind() != StepKind::Go {
            match ctx.sync_origin(driver).await {
                Ok(()) => {}
                Err(DriverError::SessionClosed { message }) => {
                    state = StepState::Failed;
                    error = Some(StepError::SessionDead { message });
                }
                Err(e) => warn!(step = index, error = %e, "storage replay after navigation failed"),
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        let mut log = StepLog {
            step_index: index,
            kind: step.kind(),
            status: state,
            attempt_count,
            strategy_used: trace.strategy_used,
            selector_used: trace.selector_used,
            matched_condition: trace.matched_condition,
            duration_ms,
            error: None,
            error_kind: None,
        };
        if let Some(e) = &error {
            log.set_error(e);
            warn!(step = index, kind = %step.kind(), attempts = attempt_count, error = %e, "step failed");
        } else {
            info!(step = index, kind = %step.kind(), duration_ms, "step succeeded");
            if self.config.apply_delays {
                let delay = step.effective_delay_ms();
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
        StepOutcome { log, error }
    }

    async fn attempt(
        &self,
        driver: &mut dyn BrowserDriver,
        index: usize,
        step: &Step,
        ctx: &mut RunContext,
        trace: &mut Trace,
    ) -> Result<(), StepError> {
        let frame = step.frame.as_ref();
        match &step.action {
            StepAction::Go { url } => self.go(driver, url, ctx).await,
            StepAction::Click {
                success_conditions,
                retry,
                ..
            } => {
                let selectors = step.action.selector_set();
                self.click(driver, &selectors, frame, success_conditions, retry.as_ref(), ctx, trace)
                    .await
            }
            StepAction::Fill { value, .. } => {
                let selectors = step.action.selector_set();
                let target = resolve_target(driver, &selectors, frame).await?;
                trace.selector_used = Some(target.selector.clone());
                driver
                    .fill(&target, value)
                    .await
                    .map_err(|e| e.into_step_error(&target.selector))
            }
            StepAction::ExpectText { text, timeout, .. } => {
                let selectors = step.action.selector_set();
                let timeout = timeout.unwrap_or(DEFAULT_EXPECT_TEXT_TIMEOUT_MS);
                self.expect_text(driver, text, &selectors, frame, timeout, trace)
                    .await
            }
            StepAction::ExpectVisible { timeout, .. } => {
                let selectors = step.action.selector_set();
                let timeout = timeout.unwrap_or(DEFAULT_EXPECT_TIMEOUT_MS);
                match self.poll_visible(driver, selectors.as_slice(), frame, timeout).await? {
                    Some(found) => {
                        trace.selector_used = Some(found.selector);
                        Ok(())
                    }
                    None => Err(StepError::Timeout {
                        ms: timeout,
                        what: format!("visible element [{}]", selectors.as_slice().join(", ")),
                    }),
                }
            }
            StepAction::ExpectUrl { url, timeout } => {
                let pattern = ctx.resolve_url(url);
                let timeout = timeout.unwrap_or(DEFAULT_EXPECT_TIMEOUT_MS);
                match self.poll_url(driver, &pattern, timeout).await? {
                    Ok(()) => Ok(()),
                    Err(actual) => Err(StepError::AssertionMismatch {
                        expected: pattern,
                        actual,
                    }),
                }
            }
            StepAction::WaitVisible {
                text,
                role,
                timeout,
                ..
            } => {
                let mut probes = Vec::new();
                if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
                    probes.push(format!("text=\"{text}\""));
                }
                if let Some(role) = role.as_deref().filter(|r| !r.trim().is_empty()) {
                    probes.push(format!("role={role}"));
                }
                probes.extend(step.action.selector_set().iter().map(str::to_string));
                let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
                match self.poll_visible(driver, &probes, frame, timeout).await? {
                    Some(found) => {
                        trace.selector_used = Some(found.selector);
                        Ok(())
                    }
                    None => Err(StepError::Timeout {
                        ms: timeout,
                        what: format!("any of [{}]", probes.join(", ")),
                    }),
                }
            }
            StepAction::WaitUrl { url, timeout } => {
                let pattern = ctx.resolve_url(url);
                let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
                match self.poll_url(driver, &pattern, timeout).await? {
                    Ok(()) => Ok(()),
                    Err(_) => Err(StepError::Timeout {
                        ms: timeout,
                        what: format!("url {pattern}"),
                    }),
                }
            }
            StepAction::Screenshot { name } => {
                match driver.screenshot().await {
                    Ok(data) => {
                        let name = name.clone().unwrap_or_else(|| format!("step_{index:03}"));
                        debug!(step = index, name = %name, bytes = data.len(), "screenshot captured");
                        ctx.artifacts.push(Artifact::new(index, name, data));
                    }
                    Err(DriverError::SessionClosed { message }) => {
                        return Err(StepError::SessionDead { message });
                    }
                    Err(e) => warn!(step = index, error = %e, "screenshot failed"),
                }
                Ok(())
            }
            StepAction::EnsureLoggedIn {
                logged_out_text, ..
            }
            | StepAction::EnsureLoggedOut {
                logged_out_text, ..
            } => {
                let mut selectors = step.action.selector_set();
                if selectors.is_empty() {
                    selectors.push(DEFAULT_LOGIN_SELECTOR);
                }
                let marker = logged_out_text
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or(DEFAULT_LOGGED_OUT_TEXT);
                let want_logged_in = matches!(step.action, StepAction::EnsureLoggedIn { .. });
                self.login_guard(driver, &selectors, frame, marker, want_logged_in, trace)
                    .await
            }
        }
    }

    async fn go(
        &self,
        driver: &mut dyn BrowserDriver,
        url: &str,
        ctx: &mut RunContext,
    ) -> Result<(), StepError> {
        let target = ctx.resolve_url(url);
        let nav_error = |e: DriverError| {
            session_or(e, |other| StepError::NavigationError {
                url: target.clone(),
                message: other.to_string(),
            })
        };
        if let Some(injector) = ctx.injector.as_mut() {
            injector.before_navigation(driver).await.map_err(nav_error)?;
        }
        driver.navigate(&target).await.map_err(|e| match e {
            DriverError::Navigation { url, message } => StepError::NavigationError { url, message },
            other => nav_error(other),
        })?;
        if let Some(injector) = ctx.injector.as_mut() {
            let current = driver.current_url().await.map_err(nav_error)?;
            injector
                .after_navigation(driver, &current)
                .await
                .map_err(nav_error)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn click(
        &self,
        driver: &mut dyn BrowserDriver,
        selectors: &SelectorSet,
        frame: Option<&FrameRef>,
        conditions: &[SuccessCondition],
        retry: Option<&RetryPolicy>,
        ctx: &RunContext,
        trace: &mut Trace,
    ) -> Result<(), StepError> {
        let target = resolve_target(driver, selectors, frame).await?;
        trace.selector_used = Some(target.selector.clone());
        let session = |e: DriverError| session_or(e, |other| other.into_step_error("page"));

        let baseline = if conditions.is_empty() {
            None
        } else {
            Some(Baseline {
                url: driver.current_url().await.map_err(session)?,
                pages: driver.page_count().await.map_err(session)?,
            })
        };

        let default_policy = RetryPolicy::default();
        let strategies = match retry {
            Some(policy) if !policy.strategies.is_empty() => &policy.strategies,
            _ => &default_policy.strategies,
        };
        let mut last_error = None;
        // A covered element rejects every pointer click the same way.
        let mut pointer_blocked = false;
        for &strategy in strategies {
            if pointer_blocked && strategy == ClickStrategy::NativeClick {
                debug!(strategy = %strategy, "skipping pointer click on covered element");
                continue;
            }
            trace.strategy_used = Some(strategy);
            match self.click_with(driver, &target, strategy).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e @ (DriverError::NotInteractable { .. } | DriverError::Protocol { .. })) => {
                    debug!(strategy = %strategy, error = %e, "click strategy rejected");
                    pointer_blocked |= strategy != ClickStrategy::JsClick
                        && matches!(e, DriverError::NotInteractable { .. });
                    last_error = Some(e);
                }
                Err(e) => return Err(session_or(e, |other| other.into_step_error(&target.selector))),
            }
        }
        if let Some(e) = last_error {
            return Err(e.into_step_error(&target.selector));
        }

        if let Some(baseline) = baseline {
            let matched = self
                .await_conditions(driver, conditions, &baseline, frame, ctx)
                .await?;
            trace.matched_condition = Some(matched);
        }
        Ok(())
    }

    async fn click_with(
        &self,
        driver: &mut dyn BrowserDriver,
        target: &ElementHandle,
        strategy: ClickStrategy,
    ) -> Result<(), DriverError> {
        match strategy {
            ClickStrategy::HoverThenNativeClick => {
                driver.scroll_into_view(target).await?;
                match tokio::time::timeout(self.config.hover_timeout(), driver.hover(target)).await {
                    Ok(Err(e @ DriverError::SessionClosed { .. })) => return Err(e),
                    Ok(Err(e)) => debug!(error = %e, "hover failed, clicking anyway"),
                    Err(_) => debug!("hover timed out, clicking anyway"),
                    Ok(Ok(())) => {}
                }
                driver.click(target).await
            }
            ClickStrategy::NativeClick => {
                driver.scroll_into_view(target).await?;
                driver.click(target).await
            }
            ClickStrategy::JsClick => driver.dispatch_click(target).await,
        }
    }

    /// Poll all conditions until one holds; the first satisfied wins.
    async fn await_conditions(
        &self,
        driver: &mut dyn BrowserDriver,
        conditions: &[SuccessCondition],
        baseline: &Baseline,
        frame: Option<&FrameRef>,
        ctx: &RunContext,
    ) -> Result<ConditionKind, StepError> {
        let max_timeout = conditions.iter().map(|c| c.timeout_ms).max().unwrap_or(0);
        let patterns: Vec<Option<String>> = conditions
            .iter()
            .map(|c| match c.kind {
                ConditionKind::UrlChanged => c.expected.as_deref().map(|p| ctx.resolve_url(p)),
                _ => c.expected.clone(),
            })
            .collect();
        let poll = Poller::new(max_timeout, self.config.poll_interval());
        loop {
            let elapsed = poll.elapsed();
            for (condition, expected) in conditions.iter().zip(&patterns) {
                if elapsed > Duration::from_millis(condition.timeout_ms) {
                    continue;
                }
                if check_condition(driver, condition.kind, expected.as_deref(), baseline, frame).await? {
                    #[allow(clippy::cast_possible_truncation)]
                    let after_ms = elapsed.as_millis() as u64;
                    debug!(condition = %condition.kind, after_ms, "success condition met");
                    return Ok(condition.kind);
                }
            }
            if !poll.tick().await {
                let kinds: Vec<String> = conditions.iter().map(|c| c.kind.to_string()).collect();
                return Err(StepError::Timeout {
                    ms: max_timeout,
                    what: format!("success conditions [{}]", kinds.join(", ")),
                });
            }
        }
    }

    async fn expect_text(
        &self,
        driver: &mut dyn BrowserDriver,
        text: &str,
        selectors: &SelectorSet,
        frame: Option<&FrameRef>,
        timeout: u64,
        trace: &mut Trace,
    ) -> Result<(), StepError> {
        if selectors.is_empty() {
            let probe = [format!("text=\"{text}\"")];
            return match self.poll_visible(driver, &probe, frame, timeout).await? {
                Some(_) => Ok(()),
                None => Err(StepError::Timeout {
                    ms: timeout,
                    what: format!("text {text:?}"),
                }),
            };
        }
        let Some(found) = self
            .poll_visible(driver, selectors.as_slice(), frame, timeout)
            .await?
        else {
            return Err(StepError::Timeout {
                ms: timeout,
                what: format!("element [{}]", selectors.as_slice().join(", ")),
            });
        };
        trace.selector_used = Some(found.selector.clone());
        let actual = driver
            .text(&found)
            .await
            .map_err(|e| session_or(e, |other| other.into_step_error(&found.selector)))?;
        if actual.contains(text) {
            Ok(())
        } else {
            Err(StepError::AssertionMismatch {
                expected: text.to_string(),
                actual,
            })
        }
    }

    async fn login_guard(
        &self,
        driver: &mut dyn BrowserDriver,
        selectors: &SelectorSet,
        frame: Option<&FrameRef>,
        logged_out_text: &str,
        want_logged_in: bool,
        trace: &mut Trace,
    ) -> Result<(), StepError> {
        let Some(found) = self
            .poll_visible(driver, selectors.as_slice(), frame, DEFAULT_EXPECT_TIMEOUT_MS)
            .await?
        else {
            return Err(StepError::ElementNotFound {
                selectors: selectors.as_slice().to_vec(),
            });
        };
        trace.selector_used = Some(found.selector.clone());
        let actual = driver
            .text(&found)
            .await
            .map_err(|e| session_or(e, |other| other.into_step_error(&found.selector)))?;
        let logged_out = actual.contains(logged_out_text);
        match (want_logged_in, logged_out) {
            (true, true) => Err(StepError::AssertionMismatch {
                expected: format!("login indicator without {logged_out_text:?}"),
                actual,
            }),
            (false, false) => Err(StepError::AssertionMismatch {
                expected: logged_out_text.to_string(),
                actual,
            }),
            _ => Ok(()),
        }
    }

    /// First visible element of any probe, polled until `timeout_ms`.
    async fn poll_visible(
        &self,
        driver: &mut dyn BrowserDriver,
        probes: &[String],
        frame: Option<&FrameRef>,
        timeout_ms: u64,
    ) -> Result<Option<ElementHandle>, StepError> {
        let poll = Poller::new(timeout_ms, self.config.poll_interval());
        loop {
            for probe in probes {
                if let Some(found) = first_visible(driver, probe, frame).await? {
                    return Ok(Some(found));
                }
            }
            if !poll.tick().await {
                return Ok(None);
            }
        }
    }

    /// `Ok(Ok(()))` on match, `Ok(Err(last_url))` on timeout.
    async fn poll_url(
        &self,
        driver: &mut dyn BrowserDriver,
        pattern: &str,
        timeout_ms: u64,
    ) -> Result<Result<(), String>, StepError> {
        let poll = Poller::new(timeout_ms, self.config.poll_interval());
        loop {
            let current = driver
                .current_url()
                .await
                .map_err(|e| session_or(e, |other| other.into_step_error(pattern)))?;
            if url_matches(pattern, &current) {
                return Ok(Ok(()));
            }
            if !poll.tick().await {
                return Ok(Err(current));
            }
        }
    }
}

/// Resolve the element a click or fill acts on.
///
/// The first selector matching exactly one visible, interactable element
/// wins. A selector matching exactly one visible element that is not
/// interactable is kept as a fallback for the synthetic click.
async fn resolve_target(
    driver: &mut dyn BrowserDriver,
    selectors: &SelectorSet,
    frame: Option<&FrameRef>,
) -> Result<ElementHandle, StepError> {
    let mut fallback = None;
    for selector in selectors.iter() {
        let found = match driver.resolve(selector, frame).await {
            Ok(found) => found,
            Err(DriverError::SessionClosed { message }) => {
                return Err(StepError::SessionDead { message });
            }
            Err(e) => {
                debug!(selector, error = %e, "selector did not resolve");
                continue;
            }
        };
        let mut visible: Vec<ElementHandle> = found.into_iter().filter(ElementHandle::is_visible).collect();
        if visible.len() != 1 {
            debug!(selector, matches = visible.len(), "selector is not unique");
            continue;
        }
        let Some(element) = visible.pop() else {
            continue;
        };
        match driver.is_interactable(&element).await {
            Ok(true) => return Ok(element),
            Ok(false) => {
                if fallback.is_none() {
                    fallback = Some(element);
                }
            }
            Err(DriverError::SessionClosed { message }) => {
                return Err(StepError::SessionDead { message });
            }
            Err(e) => debug!(selector, error = %e, "interactability check failed"),
        }
    }
    fallback.ok_or_else(|| StepError::ElementNotFound {
        selectors: selectors.as_slice().to_vec(),
    })
}

async fn first_visible(
    driver: &mut dyn BrowserDriver,
    selector: &str,
    frame: Option<&FrameRef>,
) -> Result<Option<ElementHandle>, StepError> {
    match driver.resolve(selector, frame).await {
        Ok(found) => Ok(found.into_iter().find(ElementHandle::is_visible)),
        Err(DriverError::SessionClosed { message }) => Err(StepError::SessionDead { message }),
        Err(e) => {
            debug!(selector, error = %e, "probe failed");
            Ok(None)
        }
    }
}

/// Where a modal may render: the step's own frame, the top document, then
/// every other child frame.
async fn modal_scopes(
    driver: &mut dyn BrowserDriver,
    frame: Option<&FrameRef>,
) -> Result<Vec<Option<FrameRef>>, StepError> {
    let own = frame.filter(|f| !f.is_main()).cloned();
    let children = match driver.frames().await {
        Ok(children) => children,
        Err(DriverError::SessionClosed { message }) => return Err(StepError::SessionDead { message }),
        Err(e) => {
            debug!(error = %e, "frame listing failed");
            Vec::new()
        }
    };
    let mut scopes = Vec::with_capacity(children.len() + 2);
    if own.is_some() {
        scopes.push(own.clone());
    }
    scopes.push(None);
    scopes.extend(
        children
            .into_iter()
            .filter(|c| own.as_ref() != Some(c))
            .map(Some),
    );
    Ok(scopes)
}

async fn check_condition(
    driver: &mut dyn BrowserDriver,
    kind: ConditionKind,
    expected: Option<&str>,
    baseline: &Baseline,
    frame: Option<&FrameRef>,
) -> Result<bool, StepError> {
    let session = |e: DriverError| session_or(e, |other| other.into_step_error("page"));
    match kind {
        ConditionKind::ModalVisible => {
            let text = expected.filter(|t| !t.is_empty()).map(|t| format!("text=\"{t}\""));
            for scope in modal_scopes(driver, frame).await? {
                if let Some(selector) = &text {
                    if first_visible(driver, selector, scope.as_ref()).await?.is_some() {
                        return Ok(true);
                    }
                    continue;
                }
                for selector in DIALOG_SELECTORS {
                    if first_visible(driver, selector, scope.as_ref()).await?.is_some() {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        ConditionKind::UrlChanged => {
            let current = driver.current_url().await.map_err(session)?;
            Ok(current != baseline.url
                && expected.map_or(true, |pattern| url_matches(pattern, &current)))
        }
        ConditionKind::PopupOpened => {
            Ok(driver.page_count().await.map_err(session)? > baseline.pages)
        }
    }
}
