//! Per-step retry state machine and execution log.

use crate::result::StepError;
use crate::scenario::{ClickStrategy, ConditionKind, StepKind};
use serde::{Deserialize, Serialize};

/// Step execution state.
///
/// ```text
/// Pending ──► Attempting(1) ──► Attempting(n) ──► Succeeded
///                   │                 │
///                   └────────┬────────┴──────────► Failed
/// Skipped (terminal, set by the runner when the case aborts)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not started
    Pending,
    /// Running attempt `n` (1-based)
    Attempting(u32),
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Never ran because an earlier step failed
    Skipped,
}

impl StepState {
    /// Begin the first attempt
    #[must_use]
    pub const fn start(self) -> Self {
        match self {
            Self::Pending => Self::Attempting(1),
            other => other,
        }
    }

    /// Transition after an attempt finished.
    ///
    /// Retryable errors move to the next attempt while the budget lasts;
    /// everything else is terminal.
    #[must_use]
    pub fn advance(self, outcome: Result<(), &StepError>, max_attempts: u32) -> Self {
        match self {
            Self::Attempting(n) => match outcome {
                Ok(()) => Self::Succeeded,
                Err(e) if e.is_retryable() && n < max_attempts => Self::Attempting(n + 1),
                Err(_) => Self::Failed,
            },
            other => other,
        }
    }

    /// Whether no further transition can happen
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Attempts made so far
    #[must_use]
    pub const fn attempt(self) -> u32 {
        match self {
            Self::Attempting(n) => n,
            _ => 0,
        }
    }
}

/// One line of the step execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    /// Position in the (merged) scenario
    pub step_index: usize,
    /// Step kind
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Terminal state
    pub status: StepState,
    /// Attempts made
    pub attempt_count: u32,
    /// Click strategy of the last attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<ClickStrategy>,
    /// Selector of the last resolved element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_used: Option<String>,
    /// Success condition that fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_condition: Option<ConditionKind>,
    /// Time spent, excluding the post-step delay
    pub duration_ms: u64,
    /// Literal error of the failed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl StepLog {
    /// Log entry for a step that never ran
    #[must_use]
    pub const fn skipped(step_index: usize, kind: StepKind) -> Self {
        Self {
            step_index,
            kind,
            status: StepState::Skipped,
            attempt_count: 0,
            strategy_used: None,
            selector_used: None,
            matched_condition: None,
            duration_ms: 0,
            error: None,
            error_kind: None,
        }
    }

    /// Record `error` on the entry
    pub fn set_error(&mut self, error: &StepError) {
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind().to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn not_found() -> StepError {
        StepError::ElementNotFound {
            selectors: vec!["#missing".into()],
        }
    }

    #[test]
    fn test_retryable_error_consumes_budget() {
        let err = not_found();
        let mut state = StepState::Pending.start();
        assert_eq!(state, StepState::Attempting(1));
        state = state.advance(Err(&err), 3);
        assert_eq!(state, StepState::Attempting(2));
        state = state.advance(Err(&err), 3);
        assert_eq!(state, StepState::Attempting(3));
        state = state.advance(Err(&err), 3);
        assert_eq!(state, StepState::Failed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_assertion_is_not_retried() {
        let err = StepError::AssertionMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        let state = StepState::Attempting(1).advance(Err(&err), 3);
        assert_eq!(state, StepState::Failed);
    }

    #[test]
    fn test_success_is_terminal() {
        let state = StepState::Attempting(2).advance(Ok(()), 3);
        assert_eq!(state, StepState::Succeeded);
        assert_eq!(state.advance(Err(&not_found()), 3), StepState::Succeeded);
        assert_eq!(StepState::Skipped.start(), StepState::Skipped);
    }

    #[test]
    fn test_log_serializes_type_key() {
        let mut log = StepLog::skipped(4, StepKind::Click);
        log.set_error(&not_found());
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["type"], "click");
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["error_kind"], "element_not_found");
        assert!(value.get("strategy_used").is_none());
    }
}
