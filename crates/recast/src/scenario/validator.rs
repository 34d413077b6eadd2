//! Structural validation of executable scenarios.
//!
//! Validation runs on the raw document first so that problems serde would
//! reject with a single opaque message (negative delays, unknown step types,
//! missing required fields) are reported per step.

use super::schema::{Scenario, StepAction, StepKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Offending step, if the issue is step-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    fn document(message: impl Into<String>) -> Self {
        Self {
            step_index: None,
            message: message.into(),
        }
    }

    fn step(index: usize, message: impl Into<String>) -> Self {
        Self {
            step_index: Some(index),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_index {
            Some(i) => write!(f, "steps[{i}]: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Join issues into one line for error messages
#[must_use]
pub fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn non_empty_str(step: &Value, key: &str) -> bool {
    step.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn non_empty_array(step: &Value, key: &str) -> bool {
    step.get(key)
        .and_then(Value::as_array)
        .is_some_and(|a| a.iter().any(|v| v.as_str().is_some_and(|s| !s.trim().is_empty())))
}

fn has_target(step: &Value) -> bool {
    non_empty_str(step, "selector") || non_empty_array(step, "selectors")
}

fn check_non_negative(step: &Value, key: &str, index: usize, issues: &mut Vec<ValidationIssue>) {
    if let Some(v) = step.get(key) {
        if !v.is_u64() {
            issues.push(ValidationIssue::step(
                index,
                format!("{key} must be a non-negative integer"),
            ));
        }
    }
}

fn validate_step_value(index: usize, step: &Value, issues: &mut Vec<ValidationIssue>) {
    if !step.is_object() {
        issues.push(ValidationIssue::step(index, "step must be an object"));
        return;
    }
    let Some(type_name) = step.get("type").and_then(Value::as_str) else {
        issues.push(ValidationIssue::step(index, "missing step type"));
        return;
    };
    let Some(kind) = StepKind::ALL.into_iter().find(|k| k.as_str() == type_name) else {
        issues.push(ValidationIssue::step(
            index,
            format!("unknown step type '{type_name}'"),
        ));
        return;
    };

    check_non_negative(step, "delay_ms", index, issues);
    check_non_negative(step, "timeout", index, issues);

    let missing = match kind {
        StepKind::Go => (!non_empty_str(step, "url")).then_some("go requires 'url'"),
        StepKind::Click => (!has_target(step)).then_some("click requires 'selector' or 'selectors'"),
        StepKind::Fill => {
            if !has_target(step) {
                Some("fill requires 'selector' or 'selectors'")
            } else if step.get("value").and_then(Value::as_str).is_none() {
                Some("fill requires 'value'")
            } else {
                None
            }
        }
        StepKind::ExpectText => (!non_empty_str(step, "text")).then_some("expect_text requires 'text'"),
        StepKind::ExpectVisible => {
            (!has_target(step)).then_some("expect_visible requires 'selector' or 'selectors'")
        }
        StepKind::ExpectUrl => (!non_empty_str(step, "url")).then_some("expect_url requires 'url'"),
        StepKind::WaitUrl => (!non_empty_str(step, "url")).then_some("wait_url requires 'url'"),
        StepKind::WaitVisible => (!has_target(step)
            && !non_empty_str(step, "text")
            && !non_empty_str(step, "role"))
        .then_some("wait_visible requires one of 'selector', 'selectors', 'text', 'role'"),
        StepKind::Screenshot | StepKind::EnsureLoggedIn | StepKind::EnsureLoggedOut => None,
    };
    if let Some(message) = missing {
        issues.push(ValidationIssue::step(index, message));
    }
}

/// Validate a raw scenario document.
///
/// Returns every issue found; an empty list means the document deserializes
/// into a [`Scenario`] and passes [`validate_scenario`].
#[must_use]
pub fn validate_document(doc: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if !doc.is_object() {
        issues.push(ValidationIssue::document("scenario must be an object"));
        return issues;
    }

    if let Some(base_url) = doc.get("base_url") {
        match base_url.as_str() {
            Some(url) if url.is_empty() || is_http_url(url) => {}
            Some(url) => issues.push(ValidationIssue::document(format!(
                "base_url must start with http:// or https:// (got '{url}')"
            ))),
            None if base_url.is_null() => {}
            None => issues.push(ValidationIssue::document("base_url must be a string")),
        }
    }

    match doc.get("steps").and_then(Value::as_array) {
        None => issues.push(ValidationIssue::document("'steps' must be an array")),
        Some(steps) if steps.is_empty() => {
            issues.push(ValidationIssue::document("'steps' must not be empty"));
        }
        Some(steps) => {
            for (i, step) in steps.iter().enumerate() {
                validate_step_value(i, step, &mut issues);
            }
        }
    }

    if !issues.is_empty() {
        return issues;
    }

    match serde_json::from_value::<Scenario>(doc.clone()) {
        Ok(scenario) => validate_scenario(&scenario),
        Err(e) => vec![ValidationIssue::document(e.to_string())],
    }
}

/// Semantic checks on an already-typed scenario.
#[must_use]
pub fn validate_scenario(scenario: &Scenario) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if scenario.steps.is_empty() {
        issues.push(ValidationIssue::document("'steps' must not be empty"));
    }
    if let Some(url) = scenario.base_url.as_deref() {
        if !url.is_empty() && !is_http_url(url) {
            issues.push(ValidationIssue::document(format!(
                "base_url must start with http:// or https:// (got '{url}')"
            )));
        }
    }

    for (i, step) in scenario.steps.iter().enumerate() {
        match &step.action {
            StepAction::Click {
                success_conditions,
                retry,
                ..
            } => {
                if step.action.selector_set().is_empty() {
                    issues.push(ValidationIssue::step(i, "click requires at least one selector"));
                }
                if success_conditions.iter().any(|c| c.timeout_ms == 0) {
                    issues.push(ValidationIssue::step(
                        i,
                        "success condition timeout must be positive",
                    ));
                }
                if retry.as_ref().is_some_and(|r| r.max_attempts == 0) {
                    issues.push(ValidationIssue::step(i, "retry.max_attempts must be at least 1"));
                }
            }
            StepAction::Fill { .. } | StepAction::ExpectVisible { .. } => {
                if step.action.selector_set().is_empty() {
                    issues.push(ValidationIssue::step(
                        i,
                        format!("{} requires at least one selector", step.kind()),
                    ));
                }
            }
            StepAction::Go { url } | StepAction::ExpectUrl { url, .. } | StepAction::WaitUrl { url, .. } => {
                if url.trim().is_empty() {
                    issues.push(ValidationIssue::step(i, format!("{} requires 'url'", step.kind())));
                }
            }
            StepAction::ExpectText { text, .. } => {
                if text.trim().is_empty() {
                    issues.push(ValidationIssue::step(i, "expect_text requires 'text'"));
                }
            }
            StepAction::WaitVisible { text, role, .. } => {
                let has_text = text.as_deref().is_some_and(|t| !t.trim().is_empty());
                let has_role = role.as_deref().is_some_and(|r| !r.trim().is_empty());
                if !has_text && !has_role && step.action.selector_set().is_empty() {
                    issues.push(ValidationIssue::step(
                        i,
                        "wait_visible requires one of 'selector', 'selectors', 'text', 'role'",
                    ));
                }
            }
            StepAction::Screenshot { .. }
            | StepAction::EnsureLoggedIn { .. }
            | StepAction::EnsureLoggedOut { .. } => {}
        }
    }
    issues
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
