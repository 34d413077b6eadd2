//! Result and error types for Recast.

use thiserror::Error;

/// Result type for Recast operations
pub type RecastResult<T> = Result<T, RecastError>;

/// Errors raised while loading, compiling or preparing scenarios
#[derive(Debug, Error)]
pub enum RecastError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunchError {
        /// Error message
        message: String,
    },

    /// Scenario failed validation
    #[error("Invalid scenario: {message}")]
    InvalidScenario {
        /// Joined validation issues
        message: String,
    },

    /// Recording could not be interpreted at all
    #[error("Invalid recording: {message}")]
    InvalidRecording {
        /// Error message
        message: String,
    },

    /// Storage state artifact is malformed
    #[error("Invalid storage state: {message}")]
    InvalidStorageState {
        /// Error message
        message: String,
    },

    /// Engine or suite configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker error: {message}")]
    Worker {
        /// Error message
        message: String,
    },

    /// File extension is not json/yaml/yml
    #[error("Unsupported file format: {path}")]
    UnsupportedFormat {
        /// Offending path
        path: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Base64 decoding error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl RecastError {
    /// Create an invalid scenario error
    #[must_use]
    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }

    /// Create an invalid recording error
    #[must_use]
    pub fn invalid_recording(message: impl Into<String>) -> Self {
        Self::InvalidRecording {
            message: message.into(),
        }
    }

    /// Create an invalid storage state error
    #[must_use]
    pub fn invalid_storage_state(message: impl Into<String>) -> Self {
        Self::InvalidStorageState {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Failure of a single step attempt.
///
/// `ElementNotFound`, `NotInteractable` and `Timeout` are transient and go
/// through the retry policy. Everything else escalates immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// No selector in the set resolved to exactly one visible element
    #[error("No element found for selectors [{}]", .selectors.join(", "))]
    ElementNotFound {
        /// Selectors tried, in order
        selectors: Vec<String>,
    },

    /// Element resolved but could not be interacted with
    #[error("Element {selector} is not interactable: {message}")]
    NotInteractable {
        /// Selector that resolved the element
        selector: String,
        /// Error message
        message: String,
    },

    /// Deterministic assertion failure
    #[error("Assertion failed: expected {expected:?}, got {actual:?}")]
    AssertionMismatch {
        /// Expected value
        expected: String,
        /// Observed value
        actual: String,
    },

    /// A bounded wait expired
    #[error("Timed out after {ms}ms waiting for {what}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// What was being waited for
        what: String,
    },

    /// Scenario requires a session artifact that was not supplied
    #[error("Scenario requires auth but no storage state was supplied")]
    AuthStateMissing,

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Browser session is gone
    #[error("Browser session is dead: {message}")]
    SessionDead {
        /// Error message
        message: String,
    },
}

impl StepError {
    /// Whether the retry policy may attempt the step again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound { .. } | Self::NotInteractable { .. } | Self::Timeout { .. }
        )
    }

    /// Whether the browser session can no longer be used
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionDead { .. })
    }

    /// Stable machine-readable name of the error kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ElementNotFound { .. } => "element_not_found",
            Self::NotInteractable { .. } => "not_interactable",
            Self::AssertionMismatch { .. } => "assertion_mismatch",
            Self::Timeout { .. } => "timeout",
            Self::AuthStateMissing => "auth_state_missing",
            Self::NavigationError { .. } => "navigation_error",
            Self::SessionDead { .. } => "session_dead",
        }
    }
}
