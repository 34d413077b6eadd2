//! Recording compiler.
//!
//! ```text
//! raw events ──► normalize ──► selector candidates ──► outcome inference ──► Scenario
//!   (groups)      (flatten)      (per element)          (per click)          (schema v1)
//! ```
//!
//! Compilation is best-effort: an event that cannot be compiled is skipped
//! with a [`CompileWarning`] and the rest of the recording still compiles.
//! Output is deterministic for a given input.

pub mod outcome;
pub mod raw;
pub mod selector;

pub use outcome::{Inference, ObservedOutcome, OutcomeInferencer};
pub use raw::{normalize, EventOrigin, Normalized, NormalizedEvent, RawAction, RawEvent};
pub use selector::{
    AncestorNode, DomSnapshot, ElementDescriptor, SelectorCandidateBuilder, SelectorCandidates,
};

use crate::result::{RecastError, RecastResult};
use crate::scenario::{
    validate_document, RetryPolicy, Scenario, SelectorSet, Step, StepAction, StepKind,
    SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version stamped into `_meta.compiler_version`
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A recorded event that was skipped or only partly compiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileWarning {
    /// Dotted index of the event in the recording
    pub path: String,
    /// Event type, when readable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// What went wrong
    pub message: String,
}

impl CompileWarning {
    /// Create a warning
    #[must_use]
    pub fn new(path: &str, event_type: Option<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            event_type,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event_type {
            Some(t) => write!(f, "events[{}] ({t}): {}", self.path, self.message),
            None => write!(f, "events[{}]: {}", self.path, self.message),
        }
    }
}

/// A raw recording as produced by the recorder
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recording {
    /// Base URL of the recorded site
    #[serde(default)]
    pub base_url: Option<String>,
    /// Whether the recording was made logged in
    #[serde(default)]
    pub requires_auth: bool,
    /// Session artifact reference
    #[serde(default)]
    pub storage_state_path: Option<String>,
    /// Raw event tree
    #[serde(default, alias = "steps")]
    pub events: Vec<Value>,
    /// Recorder metadata
    #[serde(rename = "_meta", default)]
    pub meta: Option<Map<String, Value>>,
}

/// Output of one compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    /// Typed scenario
    pub scenario: Scenario,
    /// Serialized scenario, or the input itself on passthrough
    pub document: Value,
    /// Events that were skipped
    pub warnings: Vec<CompileWarning>,
    /// Input was already a valid scenario and was returned unchanged
    pub passthrough: bool,
}

/// Compiles recordings into executable scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioCompiler {
    retry: RetryPolicy,
}

impl Default for ScenarioCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioCompiler {
    /// Compiler attaching the default retry policy to clicks
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy attached to compiled clicks
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Compile a recording, or pass a valid scenario through unchanged.
    ///
    /// # Errors
    ///
    /// Fails only when the input is not a recording at all, or when no
    /// event survives compilation.
    pub fn compile_value(&self, input: &Value) -> RecastResult<CompileOutput> {
        if !input.is_object() {
            return Err(RecastError::invalid_recording("recording must be an object"));
        }
        if is_authored_scenario(input) {
            let scenario: Scenario = serde_json::from_value(input.clone())?;
            tracing::debug!(steps = scenario.len(), "input is already a valid scenario");
            return Ok(CompileOutput {
                scenario,
                document: input.clone(),
                warnings: Vec::new(),
                passthrough: true,
            });
        }

        let recording: Recording = serde_json::from_value(input.clone())
            .map_err(|e| RecastError::invalid_recording(e.to_string()))?;
        if recording.events.is_empty() {
            return Err(RecastError::invalid_recording("recording has no events"));
        }

        let normalized = normalize(&recording.events);
        let mut warnings = normalized.warnings;
        let mut steps = Vec::with_capacity(normalized.events.len());
        let mut needs_review = Vec::new();

        for (i, event) in normalized.events.iter().enumerate() {
            let event_type = Some(event.action.action_type.clone());
            match self.compile_event(event, &normalized.events[i + 1..]) {
                Ok(compiled) => {
                    for message in compiled.warnings {
                        warnings.push(CompileWarning::new(&event.path, event_type.clone(), message));
                    }
                    if compiled.needs_review {
                        needs_review.push(Value::from(steps.len()));
                    }
                    steps.push(compiled.step);
                }
                Err(message) => {
                    warnings.push(CompileWarning::new(&event.path, event_type, message));
                }
            }
        }

        for warning in &warnings {
            tracing::warn!(path = %warning.path, event_type = ?warning.event_type, "{}", warning.message);
        }
        if steps.is_empty() {
            return Err(RecastError::invalid_recording(format!(
                "no compilable events ({} skipped)",
                warnings.len()
            )));
        }

        let mut meta = recording.meta.unwrap_or_default();
        meta.insert("compiled".into(), Value::Bool(true));
        meta.insert("compiler_version".into(), Value::from(COMPILER_VERSION));
        meta.insert("source_sha256".into(), Value::from(source_digest(input)?));
        if !needs_review.is_empty() {
            meta.insert("needs_review".into(), Value::Array(needs_review));
        }

        let scenario = Scenario {
            schema_version: Some(SCHEMA_VERSION),
            base_url: recording.base_url.filter(|u| !u.trim().is_empty()),
            requires_auth: recording.requires_auth,
            storage_state_path: recording.storage_state_path,
            storage_state: None,
            steps,
            meta: Some(meta),
        };
        let document = serde_json::to_value(&scenario)?;
        tracing::info!(
            steps = scenario.len(),
            warnings = warnings.len(),
            "compiled recording"
        );
        Ok(CompileOutput {
            scenario,
            document,
            warnings,
            passthrough: false,
        })
    }

    /// Compile each recording independently.
    #[must_use]
    pub fn compile_batch(&self, inputs: &[Value]) -> Vec<RecastResult<CompileOutput>> {
        inputs.iter().map(|input| self.compile_value(input)).collect()
    }

    fn compile_event(
        &self,
        event: &NormalizedEvent,
        lookahead: &[NormalizedEvent],
    ) -> Result<CompiledStep, String> {
        let raw = &event.action;
        let kind = raw
            .kind()
            .ok_or_else(|| format!("unknown event type '{}'", raw.action_type))?;
        let mut warnings = Vec::new();
        let candidates = selector_candidates(raw);
        let needs_review = candidates.needs_review
            && !candidates.selectors.is_empty()
            && !selectors_unused_by(kind);
        let selectors = candidates.selectors;

        let action = match kind {
            StepKind::Go => StepAction::Go {
                url: required(raw.url.as_deref(), "url")?,
            },
            StepKind::Click => {
                require_selectors(&selectors)?;
                let success_conditions = match &raw.outcome {
                    Some(outcome) => {
                        let inference = OutcomeInferencer::infer(outcome, lookahead);
                        warnings.extend(inference.warnings);
                        inference.conditions
                    }
                    None => Vec::new(),
                };
                StepAction::Click {
                    selector: None,
                    selectors,
                    success_conditions,
                    retry: Some(self.retry.clone()),
                }
            }
            StepKind::Fill => {
                require_selectors(&selectors)?;
                StepAction::Fill {
                    selector: None,
                    selectors,
                    value: raw.value.clone().ok_or("fill has no value")?,
                }
            }
            StepKind::ExpectText => StepAction::ExpectText {
                text: required(raw.text.as_deref(), "text")?,
                selector: None,
                selectors,
                timeout: raw.timeout,
            },
            StepKind::ExpectVisible => {
                require_selectors(&selectors)?;
                StepAction::ExpectVisible {
                    selector: None,
                    selectors,
                    timeout: raw.timeout,
                }
            }
            StepKind::ExpectUrl => StepAction::ExpectUrl {
                url: required(raw.url.as_deref(), "url")?,
                timeout: raw.timeout,
            },
            StepKind::WaitVisible => {
                let text = raw.text.clone().filter(|t| !t.trim().is_empty());
                let role = raw.role.clone().filter(|r| !r.trim().is_empty());
                if selectors.is_empty() && text.is_none() && role.is_none() {
                    return Err("wait_visible needs a selector, text or role".to_string());
                }
                StepAction::WaitVisible {
                    selector: None,
                    selectors,
                    text,
                    role,
                    timeout: raw.timeout,
                }
            }
            StepKind::WaitUrl => StepAction::WaitUrl {
                url: required(raw.url.as_deref(), "url")?,
                timeout: raw.timeout,
            },
            StepKind::Screenshot => StepAction::Screenshot {
                name: raw.name.clone(),
            },
            StepKind::EnsureLoggedIn => StepAction::EnsureLoggedIn {
                selector: None,
                selectors,
                logged_out_text: raw.logged_out_text.clone(),
            },
            StepKind::EnsureLoggedOut => StepAction::EnsureLoggedOut {
                selector: None,
                selectors,
                logged_out_text: raw.logged_out_text.clone(),
            },
        };

        if needs_review {
            warnings.push("selector candidates could not be verified; review recommended".into());
        }
        Ok(CompiledStep {
            step: Step {
                action,
                delay_ms: raw.delay,
                frame: raw.frame.clone(),
            },
            warnings,
            needs_review,
        })
    }
}

struct CompiledStep {
    step: Step,
    warnings: Vec<String>,
    needs_review: bool,
}

/// Kinds that never carry selectors
const fn selectors_unused_by(kind: StepKind) -> bool {
    matches!(
        kind,
        StepKind::Go | StepKind::ExpectUrl | StepKind::WaitUrl | StepKind::Screenshot
    )
}

fn selector_candidates(raw: &RawAction) -> SelectorCandidates {
    let recorded = raw.selector.as_deref();
    match &raw.element {
        Some(element) if raw.dom_counts.is_empty() => {
            SelectorCandidateBuilder::new().build(element, recorded)
        }
        Some(element) => SelectorCandidateBuilder::with_snapshot(&raw.dom_counts).build(element, recorded),
        None => SelectorCandidates {
            selectors: recorded.into_iter().collect(),
            needs_review: false,
        },
    }
}

fn required(value: Option<&str>, field: &str) -> Result<String, String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing '{field}'"))
}

fn require_selectors(selectors: &SelectorSet) -> Result<(), String> {
    if selectors.is_empty() {
        Err("no usable selector".to_string())
    } else {
        Ok(())
    }
}

/// Keys only the recorder emits
const RAW_ONLY_KEYS: [&str; 4] = ["kind", "element", "outcome", "events"];

/// A document with `steps`, no raw recorder nodes, that validates cleanly.
fn is_authored_scenario(input: &Value) -> bool {
    let Some(steps) = input.get("steps").and_then(Value::as_array) else {
        return false;
    };
    input.get("events").is_none()
        && !steps
            .iter()
            .any(|s| RAW_ONLY_KEYS.iter().any(|k| s.get(k).is_some()))
        && validate_document(input).is_empty()
}

fn source_digest(input: &Value) -> RecastResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(input)?);
    let result = hasher.finalize();
    Ok(format!("{result:x}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scenario::{ConditionKind, SuccessCondition};
    use proptest::prelude::*;
    use serde_json::json;

    fn recording() -> Value {
        json!({
            "base_url": "https://shop.test",
            "_meta": {"recorder": "ext-2.1"},
            "events": [
                {"kind": "action", "type": "go", "url": "/", "delay": 800},
                {"kind": "group", "label": "login", "events": [
                    {"kind": "action", "type": "fill", "selector": "#email", "value": "a@b.c",
                     "element": {"tag": "input", "name": "email"}},
                    {"kind": "action", "type": "click", "selector": "button.primary",
                     "element": {"tag": "button", "data-testid": "login", "text": "Sign in"},
                     "outcome": {"modal_detected": true, "url_changed": true}},
                    {"kind": "assert", "type": "expect_text", "text": "Welcome back"},
                    {"kind": "action", "type": "wait_url", "url": "https://shop.test/home"}
                ]},
                {"kind": "action", "type": "screenshot", "name": "home"}
            ]
        })
    }

    mod pipeline_tests {
        use super::*;

        #[test]
        fn test_compiles_grouped_recording() {
            let out = ScenarioCompiler::new().compile_value(&recording()).unwrap();
            assert!(!out.passthrough);
            assert!(out.warnings.is_empty(), "{:?}", out.warnings);
            let kinds: Vec<_> = out.scenario.steps.iter().map(Step::kind).collect();
            assert_eq!(
                kinds,
                [
                    StepKind::Go,
                    StepKind::Fill,
                    StepKind::Click,
                    StepKind::ExpectText,
                    StepKind::WaitUrl,
                    StepKind::Screenshot
                ]
            );
            assert_eq!(out.scenario.steps[0].delay_ms, Some(800));
            assert_eq!(out.scenario.schema_version, Some(SCHEMA_VERSION));
        }

        #[test]
        fn test_click_gets_candidates_conditions_and_retry() {
            let out = ScenarioCompiler::new().compile_value(&recording()).unwrap();
            let StepAction::Click {
                selectors,
                success_conditions,
                retry,
                ..
            } = &out.scenario.steps[2].action
            else {
                panic!("expected click");
            };
            assert_eq!(selectors.first(), Some("[data-testid=\"login\"]"));
            assert_eq!(selectors.as_slice().last().unwrap(), "button.primary");
            assert_eq!(
                success_conditions,
                &vec![
                    SuccessCondition::modal_visible("Welcome back"),
                    SuccessCondition::url_changed(Some("https://shop.test/home*".into())),
                ]
            );
            assert_eq!(retry, &Some(RetryPolicy::default()));
        }

        #[test]
        fn test_meta_is_stamped() {
            let out = ScenarioCompiler::new().compile_value(&recording()).unwrap();
            let meta = &out.document["_meta"];
            assert_eq!(meta["compiled"], true);
            assert_eq!(meta["compiler_version"], COMPILER_VERSION);
            assert_eq!(meta["recorder"], "ext-2.1");
            assert_eq!(meta["source_sha256"].as_str().unwrap().len(), 64);
        }

        #[test]
        fn test_output_validates_and_reloads() {
            let out = ScenarioCompiler::new().compile_value(&recording()).unwrap();
            let reloaded = Scenario::from_value(&out.document).unwrap();
            assert_eq!(reloaded, out.scenario);
        }
    }

    mod warning_tests {
        use super::*;

        #[test]
        fn test_bad_events_are_skipped_not_fatal() {
            let input = json!({"events": [
                {"kind": "action", "type": "go", "url": "https://a.test"},
                {"kind": "action", "type": "hover", "selector": "#menu"},
                {"kind": "action", "type": "click"},
                {"kind": "action", "type": "fill", "selector": "#q"},
                {"kind": "action", "type": "click", "selector": "#search"}
            ]});
            let out = ScenarioCompiler::new().compile_value(&input).unwrap();
            assert_eq!(out.scenario.len(), 2);
            let paths: Vec<_> = out.warnings.iter().map(|w| w.path.as_str()).collect();
            assert_eq!(paths, ["1", "2", "3"]);
            assert!(out.warnings[0].message.contains("hover"));
        }

        #[test]
        fn test_modal_without_text_warns() {
            let input = json!({"events": [
                {"kind": "action", "type": "click", "selector": "#open",
                 "outcome": {"modal_detected": true}}
            ]});
            let out = ScenarioCompiler::new().compile_value(&input).unwrap();
            let StepAction::Click {
                success_conditions, ..
            } = &out.scenario.steps[0].action
            else {
                panic!("expected click");
            };
            assert!(success_conditions.is_empty());
            assert!(out.warnings.iter().any(|w| w.message.contains("modal")));
        }

        #[test]
        fn test_unverified_selectors_are_flagged() {
            let input = json!({"events": [
                {"kind": "action", "type": "click",
                 "element": {"tag": "div", "text": "Next"}}
            ]});
            let out = ScenarioCompiler::new().compile_value(&input).unwrap();
            assert_eq!(out.document["_meta"]["needs_review"], json!([0]));
            assert!(out.warnings.iter().any(|w| w.message.contains("review")));
        }

        #[test]
        fn test_nothing_compilable_is_an_error() {
            let input = json!({"events": [{"kind": "action", "type": "drag"}]});
            let err = ScenarioCompiler::new().compile_value(&input).unwrap_err();
            assert!(matches!(err, RecastError::InvalidRecording { .. }));
            assert!(ScenarioCompiler::new().compile_value(&json!([])).is_err());
        }

        #[test]
        fn test_batch_isolates_failures() {
            let results = ScenarioCompiler::new().compile_batch(&[
                recording(),
                json!({"events": []}),
                json!("nope"),
            ]);
            assert!(results[0].is_ok());
            assert!(results[1].is_err());
            assert!(results[2].is_err());
        }
    }

    mod idempotence_tests {
        use super::*;

        #[test]
        fn test_valid_scenario_passes_through_unchanged() {
            let authored = json!({
                "base_url": "https://shop.test",
                "steps": [
                    {"type": "go", "url": "/"},
                    {"type": "click", "selector": "#buy",
                     "success_conditions": [{"kind": "popup_opened", "timeout_ms": 10000}]}
                ],
                "_meta": {"owner": "qa"}
            });
            let out = ScenarioCompiler::new().compile_value(&authored).unwrap();
            assert!(out.passthrough);
            assert_eq!(out.document, authored);
            assert_eq!(
                out.scenario.steps[1].action.selector_set().first(),
                Some("#buy")
            );
        }

        #[test]
        fn test_compiled_output_recompiles_as_passthrough() {
            let compiler = ScenarioCompiler::new();
            let first = compiler.compile_value(&recording()).unwrap();
            let second = compiler.compile_value(&first.document).unwrap();
            assert!(second.passthrough);
            assert_eq!(second.document, first.document);
        }

        #[test]
        fn test_flat_steps_recording_is_compiled() {
            let input = json!({"steps": [
                {"type": "go", "url": "https://a.test"},
                {"type": "click", "selector": "#go", "outcome": {"popup_opened": true}}
            ]});
            let out = ScenarioCompiler::new().compile_value(&input).unwrap();
            assert!(!out.passthrough);
            let StepAction::Click {
                success_conditions, ..
            } = &out.scenario.steps[1].action
            else {
                panic!("expected click");
            };
            assert_eq!(success_conditions[0].kind, ConditionKind::PopupOpened);
        }

        #[test]
        fn test_recompile_is_byte_identical() {
            let compiler = ScenarioCompiler::new();
            let a = serde_json::to_string(&compiler.compile_value(&recording()).unwrap().document)
                .unwrap();
            let b = serde_json::to_string(&compiler.compile_value(&recording()).unwrap().document)
                .unwrap();
            assert_eq!(a, b);
        }
    }

    fn arb_event() -> impl Strategy<Value = Value> {
        let selector = prop::option::of("#[a-z]{1,8}");
        (
            prop::sample::select(vec!["go", "click", "fill", "expect_text", "screenshot", "zap"]),
            selector,
            prop::option::of("[a-z ]{1,12}"),
            any::<bool>(),
        )
            .prop_map(|(kind, selector, text, modal)| {
                json!({
                    "kind": "action",
                    "type": kind,
                    "selector": selector,
                    "url": "https://a.test/x",
                    "text": text,
                    "value": "v",
                    "outcome": {"modal_detected": modal}
                })
            })
    }

    proptest! {
        #[test]
        fn prop_compile_is_deterministic(events in prop::collection::vec(arb_event(), 1..12)) {
            let input = json!({"events": events});
            let compiler = ScenarioCompiler::new();
            let first = compiler.compile_value(&input);
            let second = compiler.compile_value(&input);
            match (first, second) {
                (Ok(a), Ok(b)) => {
                    prop_assert_eq!(
                        serde_json::to_string(&a.document).unwrap(),
                        serde_json::to_string(&b.document).unwrap()
                    );
                    prop_assert_eq!(a.warnings, b.warnings);
                }
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "compile outcome differed between runs"),
            }
        }
    }
}
