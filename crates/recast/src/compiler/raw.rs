//! Raw recorder events and their normalization into a flat action list.

use super::outcome::ObservedOutcome;
use super::selector::ElementDescriptor;
use super::CompileWarning;
use crate::scenario::{FrameRef, StepKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Group nesting deeper than this is reported and skipped
pub const MAX_GROUP_DEPTH: usize = 32;

/// One node of a recording.
///
/// Group children stay untyped until visited so one malformed child cannot
/// take its siblings down with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvent {
    /// A user action (click, fill, navigation...)
    Action(RawAction),
    /// An assertion captured by the recorder
    Assert(RawAction),
    /// A named group of nested events
    Group {
        /// Group label
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        /// Nested events, in order
        #[serde(default)]
        events: Vec<Value>,
    },
}

/// Payload of an action or assertion event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    /// Step type (`click`, `fill`, `expect_text`, ...)
    #[serde(rename = "type")]
    pub action_type: String,
    /// Recorded selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Target URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Text (assertions, waits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Filled value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Recorded post-step delay
    #[serde(default, alias = "delay_ms", skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Frame the event happened in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameRef>,
    /// Recorder event id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Recorder timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
    /// Target element metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementDescriptor>,
    /// Side effects observed after the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ObservedOutcome>,
    /// ARIA role (waits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Timeout (waits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Login guard text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_out_text: Option<String>,
    /// Screenshot name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Match counts per selector in the DOM at record time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dom_counts: BTreeMap<String, usize>,
}

impl RawAction {
    /// Step kind of this action, if known
    #[must_use]
    pub fn kind(&self) -> Option<StepKind> {
        StepKind::parse(self.action_type.trim())
    }
}

/// Whether a raw node came from an action or an assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// `kind: action` (or kind omitted)
    Action,
    /// `kind: assert`
    Assert,
}

/// A leaf event with its position in the original tree
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// Dotted path of indices, e.g. `3.0.1`
    pub path: String,
    /// Action or assertion
    pub origin: EventOrigin,
    /// Payload
    pub action: RawAction,
}

/// Flattened recording
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Leaf events in depth-first order
    pub events: Vec<NormalizedEvent>,
    /// Nodes that were skipped
    pub warnings: Vec<CompileWarning>,
}

/// Depth-first flatten of group nodes. The input is not modified.
///
/// Nodes without a `kind` are treated as actions, which accepts the flat
/// `steps` lists older recorders emit.
#[must_use]
pub fn normalize(events: &[Value]) -> Normalized {
    let mut out = Normalized::default();
    visit(events, "", 0, &mut out);
    out
}

fn visit(nodes: &[Value], prefix: &str, depth: usize, out: &mut Normalized) {
    for (i, node) in nodes.iter().enumerate() {
        let path = if prefix.is_empty() {
            i.to_string()
        } else {
            format!("{prefix}.{i}")
        };
        match parse_node(node) {
            Ok(RawEvent::Group { events, .. }) => {
                if depth + 1 > MAX_GROUP_DEPTH {
                    out.warnings.push(CompileWarning::new(
                        &path,
                        None,
                        format!("group nesting exceeds {MAX_GROUP_DEPTH} levels"),
                    ));
                    continue;
                }
                visit(&events, &path, depth + 1, out);
            }
            Ok(RawEvent::Action(action)) => out.events.push(NormalizedEvent {
                path,
                origin: EventOrigin::Action,
                action,
            }),
            Ok(RawEvent::Assert(action)) => out.events.push(NormalizedEvent {
                path,
                origin: EventOrigin::Assert,
                action,
            }),
            Err(message) => {
                let event_type = node.get("type").and_then(Value::as_str).map(str::to_string);
                out.warnings
                    .push(CompileWarning::new(&path, event_type, message));
            }
        }
    }
}

fn parse_node(node: &Value) -> Result<RawEvent, String> {
    if !node.is_object() {
        return Err("event must be an object".to_string());
    }
    if node.get("kind").is_some() {
        serde_json::from_value(node.clone()).map_err(|e| format!("malformed event: {e}"))
    } else {
        serde_json::from_value(node.clone())
            .map(RawEvent::Action)
            .map_err(|e| format!("malformed event: {e}"))
    }
}
