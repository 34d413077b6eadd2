//! Executable scenario schema.
//!
//! The JSON/YAML shape is additive-only: new optional fields may appear in
//! later schema versions, existing fields never change meaning.

use crate::auth::StorageState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current executable scenario schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Delay after a successful step when none is given
pub const DEFAULT_STEP_DELAY_MS: u64 = 1500;

/// Delay after a successful click when none is given
pub const DEFAULT_CLICK_DELAY_MS: u64 = 1700;

/// Default timeout for `wait_visible` / `wait_url`
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 15_000;

/// Default presence timeout for `expect_text`
pub const DEFAULT_EXPECT_TEXT_TIMEOUT_MS: u64 = 15_000;

/// Default presence timeout for `expect_visible`, `expect_url` and login guards
pub const DEFAULT_EXPECT_TIMEOUT_MS: u64 = 8_000;

/// Timeout attached to an inferred `modal_visible` condition
pub const MODAL_TIMEOUT_MS: u64 = 15_000;

/// Timeout attached to an inferred `url_changed` condition
pub const URL_CHANGE_TIMEOUT_MS: u64 = 15_000;

/// Timeout attached to an inferred `popup_opened` condition
pub const POPUP_TIMEOUT_MS: u64 = 10_000;

/// Default attempts for clicks and fills
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Login indicator used by the login guards when a step names none
pub const DEFAULT_LOGIN_SELECTOR: &str = "#btnUser";

/// Text shown by the login indicator while logged out
pub const DEFAULT_LOGGED_OUT_TEXT: &str = "로그인";

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// An executable scenario: ordered steps plus run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Schema version the document was written against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    /// Base URL relative `go` targets are joined onto
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Whether a session artifact must be injected before running
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_auth: bool,
    /// Path to a storageState file, relative to the scenario file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_state_path: Option<String>,
    /// Inline storageState payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<StorageState>,
    /// Ordered steps
    pub steps: Vec<Step>,
    /// Free-form metadata carried through compilation
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Scenario {
    /// Create a scenario from steps
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            base_url: None,
            requires_auth: false,
            storage_state_path: None,
            storage_state: None,
            steps,
            meta: None,
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Mark the scenario as requiring a session artifact
    #[must_use]
    pub const fn with_requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    /// Attach an inline storage state
    #[must_use]
    pub fn with_storage_state(mut self, state: StorageState) -> Self {
        self.storage_state = Some(state);
        self
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the scenario has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One atomic browser action or assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Kind-specific payload, tagged by `type`
    #[serde(flatten)]
    pub action: StepAction,
    /// Delay applied after the step succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Frame the step's selectors are scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameRef>,
}

impl Step {
    /// Wrap an action with default delay and no frame
    #[must_use]
    pub const fn new(action: StepAction) -> Self {
        Self {
            action,
            delay_ms: None,
            frame: None,
        }
    }

    /// Set the post-step delay
    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Scope the step to a frame
    #[must_use]
    pub fn with_frame(mut self, frame: FrameRef) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Step kind
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        self.action.kind()
    }

    /// Delay to apply after success
    #[must_use]
    pub fn effective_delay_ms(&self) -> u64 {
        self.delay_ms.unwrap_or(match self.action {
            StepAction::Click { .. } => DEFAULT_CLICK_DELAY_MS,
            _ => DEFAULT_STEP_DELAY_MS,
        })
    }
}

/// Frame reference as captured by the recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
    /// Frame document URL (substring match)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Frame name attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether this is the top-level document
    #[serde(rename = "isTop", default)]
    pub is_top: bool,
}

impl FrameRef {
    /// Whether the reference points at the top document
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.is_top || (self.href.is_none() && self.name.is_none())
    }
}

/// Step payloads, one variant per step kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Navigate to a URL
    Go {
        /// Absolute URL or path relative to `base_url`
        url: String,
    },
    /// Click an element
    Click {
        /// Single recorded selector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Ordered selector candidates
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// OR-set of post-click success conditions
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        success_conditions: Vec<SuccessCondition>,
        /// Retry policy override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
    },
    /// Type a value into an input
    Fill {
        /// Single recorded selector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Ordered selector candidates
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// Value to set
        value: String,
    },
    /// Assert that text is shown
    ExpectText {
        /// Text that must be contained
        text: String,
        /// Element the text must be in
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Candidate elements the text must be in
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// Presence timeout override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    /// Assert that an element is visible
    ExpectVisible {
        /// Single selector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Ordered selector candidates
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// Presence timeout override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    /// Assert the current URL
    ExpectUrl {
        /// Exact URL, or prefix with trailing `*`
        url: String,
        /// Timeout override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    /// Wait until something is visible
    WaitVisible {
        /// Single selector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Ordered selector candidates
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// Visible text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// ARIA role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Timeout override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    /// Wait until the URL matches
    WaitUrl {
        /// Exact URL, or prefix with trailing `*`
        url: String,
        /// Timeout override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    /// Capture a screenshot artifact
    Screenshot {
        /// Artifact name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Guard: the login indicator must not show the logged-out text
    EnsureLoggedIn {
        /// Login indicator selector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Login indicator candidates
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// Text shown while logged out
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logged_out_text: Option<String>,
    },
    /// Guard: the login indicator must show the logged-out text
    EnsureLoggedOut {
        /// Login indicator selector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Login indicator candidates
        #[serde(default, skip_serializing_if = "SelectorSet::is_empty")]
        selectors: SelectorSet,
        /// Text shown while logged out
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logged_out_text: Option<String>,
    },
}

impl StepAction {
    /// Step kind
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        match self {
            Self::Go { .. } => StepKind::Go,
            Self::Click { .. } => StepKind::Click,
            Self::Fill { .. } => StepKind::Fill,
            Self::ExpectText { .. } => StepKind::ExpectText,
            Self::ExpectVisible { .. } => StepKind::ExpectVisible,
            Self::ExpectUrl { .. } => StepKind::ExpectUrl,
            Self::WaitVisible { .. } => StepKind::WaitVisible,
            Self::WaitUrl { .. } => StepKind::WaitUrl,
            Self::Screenshot { .. } => StepKind::Screenshot,
            Self::EnsureLoggedIn { .. } => StepKind::EnsureLoggedIn,
            Self::EnsureLoggedOut { .. } => StepKind::EnsureLoggedOut,
        }
    }

    /// Merged selector candidates: `selectors` first, then `selector`.
    #[must_use]
    pub fn selector_set(&self) -> SelectorSet {
        let (single, many) = match self {
            Self::Click {
                selector,
                selectors,
                ..
            }
            | Self::Fill {
                selector,
                selectors,
                ..
            }
            | Self::ExpectText {
                selector,
                selectors,
                ..
            }
            | Self::ExpectVisible {
                selector,
                selectors,
                ..
            }
            | Self::WaitVisible {
                selector,
                selectors,
                ..
            }
            | Self::EnsureLoggedIn {
                selector,
                selectors,
                ..
            }
            | Self::EnsureLoggedOut {
                selector,
                selectors,
                ..
            } => (selector.as_deref(), selectors),
            Self::Go { .. }
            | Self::ExpectUrl { .. }
            | Self::WaitUrl { .. }
            | Self::Screenshot { .. } => return SelectorSet::new(),
        };
        let mut set = many.clone();
        if let Some(single) = single {
            set.push(single);
        }
        set
    }
}

/// Closed set of step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// `go`
    Go,
    /// `click`
    Click,
    /// `fill`
    Fill,
    /// `expect_text`
    ExpectText,
    /// `expect_visible`
    ExpectVisible,
    /// `expect_url`
    ExpectUrl,
    /// `wait_visible`
    WaitVisible,
    /// `wait_url`
    WaitUrl,
    /// `screenshot`
    Screenshot,
    /// `ensure_logged_in`
    EnsureLoggedIn,
    /// `ensure_logged_out`
    EnsureLoggedOut,
}

impl StepKind {
    /// All kinds in schema order
    pub const ALL: [Self; 11] = [
        Self::Go,
        Self::Click,
        Self::Fill,
        Self::ExpectText,
        Self::ExpectVisible,
        Self::ExpectUrl,
        Self::WaitVisible,
        Self::WaitUrl,
        Self::Screenshot,
        Self::EnsureLoggedIn,
        Self::EnsureLoggedOut,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Click => "click",
            Self::Fill => "fill",
            Self::ExpectText => "expect_text",
            Self::ExpectVisible => "expect_visible",
            Self::ExpectUrl => "expect_url",
            Self::WaitVisible => "wait_visible",
            Self::WaitUrl => "wait_url",
            Self::Screenshot => "screenshot",
            Self::EnsureLoggedIn => "ensure_logged_in",
            Self::EnsureLoggedOut => "ensure_logged_out",
        }
    }

    /// Parse a wire name, accepting common recorder aliases
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "navigate" | "goto" => Some(Self::Go),
            "type" | "input" => Some(Self::Fill),
            other => Self::ALL.into_iter().find(|k| k.as_str() == other),
        }
    }

    /// Whether the kind acts on the page (as opposed to asserting or waiting)
    #[must_use]
    pub const fn is_action(self) -> bool {
        matches!(self, Self::Click | Self::Fill)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, deduplicated locator candidates for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorSet(Vec<String>);

impl SelectorSet {
    /// Create an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a selector unless blank or already present. Returns whether it was added.
    pub fn push(&mut self, selector: impl Into<String>) -> bool {
        let selector = selector.into();
        let trimmed = selector.trim();
        if trimmed.is_empty() || self.0.iter().any(|s| s == trimmed) {
            return false;
        }
        self.0.push(trimmed.to_string());
        true
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest-priority candidate
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Candidates in priority order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Candidates as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for SelectorSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for selector in iter {
            set.push(selector);
        }
        set
    }
}

/// Kind of post-click side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// A modal/dialog containing the expected text appeared
    ModalVisible,
    /// The URL changed (optionally to the expected pattern)
    UrlChanged,
    /// A new page/popup opened
    PopupOpened,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ModalVisible => "modal_visible",
            Self::UrlChanged => "url_changed",
            Self::PopupOpened => "popup_opened",
        })
    }
}

/// OR-combinable post-click check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessCondition {
    /// What to look for
    #[serde(alias = "type")]
    pub kind: ConditionKind,
    /// Modal text or URL pattern (trailing `*` = prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// How long this condition may take to become true
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,
}

impl SuccessCondition {
    /// Modal showing `text`
    #[must_use]
    pub fn modal_visible(text: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::ModalVisible,
            expected: Some(text.into()),
            timeout_ms: MODAL_TIMEOUT_MS,
        }
    }

    /// URL change, to `pattern` when given
    #[must_use]
    pub fn url_changed(pattern: Option<String>) -> Self {
        Self {
            kind: ConditionKind::UrlChanged,
            expected: pattern,
            timeout_ms: URL_CHANGE_TIMEOUT_MS,
        }
    }

    /// New page opened
    #[must_use]
    pub const fn popup_opened() -> Self {
        Self {
            kind: ConditionKind::PopupOpened,
            expected: None,
            timeout_ms: POPUP_TIMEOUT_MS,
        }
    }

    /// Override the timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Click fallback strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickStrategy {
    /// Scroll, hover (bounded), then a real pointer click
    HoverThenNativeClick,
    /// Scroll, then a real pointer click
    NativeClick,
    /// Synthetic `element.click()`
    JsClick,
}

impl fmt::Display for ClickStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HoverThenNativeClick => "hover_then_native_click",
            Self::NativeClick => "native_click",
            Self::JsClick => "js_click",
        })
    }
}

/// Bounded retry with ordered click fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Click strategies tried in order within one attempt
    #[serde(default = "default_strategies")]
    pub strategies: Vec<ClickStrategy>,
}

fn default_strategies() -> Vec<ClickStrategy> {
    vec![
        ClickStrategy::HoverThenNativeClick,
        ClickStrategy::NativeClick,
        ClickStrategy::JsClick,
    ]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategies: default_strategies(),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom attempt budget and default strategies
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}
