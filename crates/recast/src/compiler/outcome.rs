//! Success-condition inference for recorded clicks.

use super::raw::NormalizedEvent;
use crate::scenario::{StepKind, SuccessCondition};
use serde::{Deserialize, Serialize};

/// Side effects the recorder saw after a click.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedOutcome {
    /// A modal or dialog appeared
    #[serde(default, alias = "modalDetected")]
    pub modal_detected: bool,
    /// The page URL changed
    #[serde(default, alias = "urlChanged")]
    pub url_changed: bool,
    /// A new page or popup opened
    #[serde(default, alias = "popupOpened")]
    pub popup_opened: bool,
    /// An iframe was inserted
    #[serde(default, alias = "iframeAdded")]
    pub iframe_added: bool,
}

impl ObservedOutcome {
    /// Whether any signal was observed
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.modal_detected || self.url_changed || self.popup_opened || self.iframe_added)
    }
}

/// Conditions bound for one click
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inference {
    /// OR-set, in modal, url, popup order
    pub conditions: Vec<SuccessCondition>,
    /// Signals that could not be turned into a condition
    pub warnings: Vec<String>,
}

/// Binds observed outcomes to the events that follow the click.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeInferencer;

impl OutcomeInferencer {
    /// Infer conditions for a click whose following events are `lookahead`.
    ///
    /// The window ends at the next click or fill.
    #[must_use]
    pub fn infer(outcome: &ObservedOutcome, lookahead: &[NormalizedEvent]) -> Inference {
        let window = lookahead_window(lookahead);
        let mut inference = Inference::default();

        if outcome.modal_detected {
            match next_text(window) {
                Some(text) => inference
                    .conditions
                    .push(SuccessCondition::modal_visible(text)),
                None => inference
                    .warnings
                    .push("modal detected but no following expect_text to bind".to_string()),
            }
        }
        if outcome.url_changed {
            let pattern = next_url(window).map(|url| {
                if url.ends_with('*') {
                    url.to_string()
                } else {
                    format!("{url}*")
                }
            });
            inference
                .conditions
                .push(SuccessCondition::url_changed(pattern));
        }
        if outcome.popup_opened {
            inference.conditions.push(SuccessCondition::popup_opened());
        }
        inference
    }
}

fn lookahead_window(events: &[NormalizedEvent]) -> &[NormalizedEvent] {
    let end = events
        .iter()
        .position(|e| e.action.kind().is_some_and(StepKind::is_action))
        .unwrap_or(events.len());
    &events[..end]
}

fn next_text(window: &[NormalizedEvent]) -> Option<&str> {
    window
        .iter()
        .filter(|e| e.action.kind() == Some(StepKind::ExpectText))
        .find_map(|e| e.action.text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn next_url(window: &[NormalizedEvent]) -> Option<&str> {
    window
        .iter()
        .filter(|e| {
            matches!(
                e.action.kind(),
                Some(StepKind::Go | StepKind::ExpectUrl | StepKind::WaitUrl)
            )
        })
        .find_map(|e| e.action.url.as_deref())
        .map(str::trim)
        .filter(|u| !u.is_empty())
}
