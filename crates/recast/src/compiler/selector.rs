//! Selector candidate generation.
//!
//! Turns recorder element metadata into an ordered locator list, most
//! specific first:
//!
//! ```text
//! data-testid > #id > role+aria-label > tag[name] > tag[aria-label] > text > ancestor path
//! ```
//!
//! The recorded selector, when present, is appended last.

use crate::scenario::SelectorSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Longest text emitted as a `text=` candidate
pub const MAX_TEXT_LEN: usize = 50;

/// Deepest structural path emitted
pub const MAX_ANCESTOR_DEPTH: usize = 6;

/// Match counts in a DOM captured at record time.
pub trait DomSnapshot {
    /// Number of elements `selector` matches
    fn count(&self, selector: &str) -> usize;
}

impl DomSnapshot for BTreeMap<String, usize> {
    fn count(&self, selector: &str) -> usize {
        self.get(selector).copied().unwrap_or(0)
    }
}

/// Recorder metadata for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Lowercase tag name
    #[serde(default, alias = "tagName", skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `data-testid` attribute
    #[serde(
        rename = "data-testid",
        alias = "testId",
        alias = "test_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub test_id: Option<String>,
    /// `id` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// ARIA role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// `aria-label` attribute
    #[serde(
        rename = "aria-label",
        alias = "ariaLabel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub aria_label: Option<String>,
    /// `name` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Visible text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Class tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// 1-based position among same-tag siblings
    #[serde(
        default,
        alias = "nthOfType",
        skip_serializing_if = "Option::is_none"
    )]
    pub nth_of_type: Option<usize>,
    /// Ancestors, nearest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<AncestorNode>,
}

/// One ancestor in an element's path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorNode {
    /// Lowercase tag name
    #[serde(alias = "tagName")]
    pub tag: String,
    /// `id` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Class tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// 1-based position among same-tag siblings
    #[serde(
        default,
        alias = "nthOfType",
        skip_serializing_if = "Option::is_none"
    )]
    pub nth_of_type: Option<usize>,
}

/// Result of candidate generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorCandidates {
    /// Ordered candidates
    pub selectors: SelectorSet,
    /// No candidate could be confirmed as a strong, unique locator
    pub needs_review: bool,
}

/// Builds [`SelectorSet`]s from element metadata.
///
/// # Example
///
/// ```
/// use recast::compiler::{ElementDescriptor, SelectorCandidateBuilder};
///
/// let element = ElementDescriptor {
///     tag: Some("button".into()),
///     test_id: Some("checkout".into()),
///     ..ElementDescriptor::default()
/// };
/// let built = SelectorCandidateBuilder::new().build(&element, None);
/// assert_eq!(built.selectors.first(), Some("[data-testid=\"checkout\"]"));
/// ```
#[derive(Default)]
pub struct SelectorCandidateBuilder<'a> {
    snapshot: Option<&'a dyn DomSnapshot>,
}

impl std::fmt::Debug for SelectorCandidateBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorCandidateBuilder")
            .field("snapshot", &self.snapshot.is_some())
            .finish()
    }
}

impl<'a> SelectorCandidateBuilder<'a> {
    /// Builder without a DOM snapshot; uniqueness is not verified
    #[must_use]
    pub const fn new() -> Self {
        Self { snapshot: None }
    }

    /// Verify uniqueness against `snapshot`
    #[must_use]
    pub fn with_snapshot(snapshot: &'a dyn DomSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    fn unique(&self, selector: &str) -> Option<bool> {
        self.snapshot.map(|s| s.count(selector) == 1)
    }

    /// Build candidates for `element`, keeping `recorded` as the last one.
    #[must_use]
    pub fn build(&self, element: &ElementDescriptor, recorded: Option<&str>) -> SelectorCandidates {
        let mut set = SelectorSet::new();
        let mut strong = false;
        let mut verified = false;
        let tag = non_empty(element.tag.as_deref()).map(str::to_ascii_lowercase);

        let mut strong_candidate = |set: &mut SelectorSet, selector: String, required_unique: bool| {
            match self.unique(&selector) {
                Some(true) => {
                    verified = true;
                    strong = true;
                    set.push(selector);
                }
                Some(false) if required_unique => {}
                Some(false) => {
                    set.push(selector);
                }
                None => {
                    strong = true;
                    set.push(selector);
                }
            }
        };

        if let Some(test_id) = non_empty(element.test_id.as_deref()) {
            strong_candidate(&mut set, format!("[data-testid=\"{}\"]", escape(test_id)), false);
        }
        if let Some(id) = non_empty(element.id.as_deref()) {
            let selector = if is_css_ident(id) {
                format!("#{id}")
            } else {
                format!("[id=\"{}\"]", escape(id))
            };
            strong_candidate(&mut set, selector, true);
        }
        let aria = non_empty(element.aria_label.as_deref());
        if let (Some(role), Some(label)) = (non_empty(element.role.as_deref()), aria) {
            strong_candidate(
                &mut set,
                format!("[role=\"{}\"][aria-label=\"{}\"]", escape(role), escape(label)),
                false,
            );
        }
        if let Some(name) = non_empty(element.name.as_deref()) {
            let selector = match &tag {
                Some(tag) => format!("{tag}[name=\"{}\"]", escape(name)),
                None => format!("[name=\"{}\"]", escape(name)),
            };
            strong_candidate(&mut set, selector, false);
        }
        if let Some(label) = aria {
            let selector = match &tag {
                Some(tag) => format!("{tag}[aria-label=\"{}\"]", escape(label)),
                None => format!("[aria-label=\"{}\"]", escape(label)),
            };
            strong_candidate(&mut set, selector, false);
        }

        let text = element
            .text
            .as_deref()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .map(|t| text_selector(&t));
        let structural = self.structural_paths(element, tag.as_deref());

        // Text leads only when the sole structural path is a bare tag.
        if set.is_empty() && text.is_some() {
            if let Some((path, unique)) = structural.first() {
                if *unique || has_context(path) {
                    verified |= *unique;
                    set.push(path.clone());
                }
            }
        }
        if let Some(text) = text {
            if self.unique(&text) == Some(true) {
                verified = true;
            }
            set.push(text);
        }
        for (path, unique) in structural {
            verified |= unique;
            set.push(path);
        }

        if let Some(recorded) = recorded {
            set.push(recorded);
        }

        if set.is_empty() {
            if let Some(fallback) = fallback_attribute(element) {
                set.push(fallback);
            }
        }

        let needs_review = if self.snapshot.is_some() {
            !verified
        } else {
            !strong
        };
        SelectorCandidates {
            selectors: set,
            needs_review,
        }
    }

    /// Structural ancestor paths, each with whether it was verified unique.
    fn structural_paths(&self, element: &ElementDescriptor, tag: Option<&str>) -> Vec<(String, bool)> {
        let Some(tag) = tag else {
            return Vec::new();
        };
        let depth = element.ancestors.len().min(MAX_ANCESTOR_DEPTH - 1);
        let ancestors: Vec<&AncestorNode> = element.ancestors[..depth].iter().rev().collect();

        let mut class_parts: Vec<String> = ancestors
            .iter()
            .map(|a| class_segment(&a.tag, &a.classes))
            .collect();
        class_parts.push(class_segment(tag, &element.classes));
        let class_path = class_parts.join(" > ");

        let mut nth_parts: Vec<String> = ancestors
            .iter()
            .map(|a| nth_segment(&a.tag, a.nth_of_type))
            .collect();
        nth_parts.push(nth_segment(tag, element.nth_of_type));
        let nth_path = nth_parts.join(" > ");

        match self.snapshot {
            Some(_) => {
                if self.unique(&class_path) == Some(true) {
                    vec![(class_path, true)]
                } else if self.unique(&nth_path) == Some(true) {
                    vec![(nth_path, true)]
                } else {
                    vec![(nth_path, false)]
                }
            }
            None => vec![(class_path, false), (nth_path, false)],
        }
    }
}

/// Whether a structural path carries an ancestor or class segment
fn has_context(path: &str) -> bool {
    path.contains(" > ") || path.contains('.')
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_selector(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_LEN {
        format!("text=\"{}\"", escape(text))
    } else {
        let prefix: String = text.chars().take(MAX_TEXT_LEN).collect();
        format!("text={}", prefix.trim_end())
    }
}

fn hash_class() -> &'static Regex {
    static HASH: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // literal pattern
    HASH.get_or_init(|| Regex::new(r"\d{4,}").unwrap())
}

fn class_segment(tag: &str, classes: &[String]) -> String {
    let mut segment = tag.to_ascii_lowercase();
    for class in classes {
        let class = class.trim();
        if class.is_empty() || hash_class().is_match(class) || !is_css_ident(class) {
            continue;
        }
        segment.push('.');
        segment.push_str(class);
    }
    segment
}

fn nth_segment(tag: &str, nth: Option<usize>) -> String {
    format!("{}:nth-of-type({})", tag.to_ascii_lowercase(), nth.unwrap_or(1).max(1))
}

/// Whether `value` can be used verbatim after `#` or `.`
fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let first_ok = match first {
        '-' => value[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_'),
        c => c.is_ascii_alphabetic() || c == '_',
    };
    first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn fallback_attribute(element: &ElementDescriptor) -> Option<String> {
    non_empty(element.test_id.as_deref())
        .map(|v| format!("[data-testid=\"{}\"]", escape(v)))
        .or_else(|| non_empty(element.id.as_deref()).map(|v| format!("[id=\"{}\"]", escape(v))))
        .or_else(|| non_empty(element.name.as_deref()).map(|v| format!("[name=\"{}\"]", escape(v))))
        .or_else(|| {
            non_empty(element.aria_label.as_deref())
                .map(|v| format!("[aria-label=\"{}\"]", escape(v)))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn button() -> ElementDescriptor {
        ElementDescriptor {
            tag: Some("button".into()),
            ..ElementDescriptor::default()
        }
    }

    mod priority_tests {
        use super::*;

        #[test]
        fn test_full_priority_order() {
            let element = ElementDescriptor {
                test_id: Some("buy".into()),
                id: Some("buy-btn".into()),
                role: Some("button".into()),
                aria_label: Some("Buy now".into()),
                name: Some("buy".into()),
                text: Some("  Buy\n now ".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::new().build(&element, Some("button.cta"));
            let got: Vec<&str> = built.selectors.iter().collect();
            assert_eq!(
                got,
                [
                    "[data-testid=\"buy\"]",
                    "#buy-btn",
                    "[role=\"button\"][aria-label=\"Buy now\"]",
                    "button[name=\"buy\"]",
                    "button[aria-label=\"Buy now\"]",
                    "text=\"Buy now\"",
                    "button",
                    "button:nth-of-type(1)",
                    "button.cta",
                ]
            );
            assert!(!built.needs_review);
        }

        #[test]
        fn test_non_ident_id_uses_attribute_form() {
            let element = ElementDescriptor {
                id: Some("1st".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::new().build(&element, None);
            assert_eq!(built.selectors.first(), Some("[id=\"1st\"]"));
        }

        #[test]
        fn test_text_leads_a_bare_tag_path() {
            let element = ElementDescriptor {
                text: Some("Continue".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::new().build(&element, None);
            assert_eq!(built.selectors.first(), Some("text=\"Continue\""));
            assert!(built.selectors.iter().any(|s| s == "button"));
            assert!(built.needs_review);
        }

        #[test]
        fn test_classed_path_precedes_text() {
            let element = ElementDescriptor {
                text: Some("Continue".into()),
                classes: vec!["primary".into()],
                ..button()
            };
            let built = SelectorCandidateBuilder::new().build(&element, None);
            assert_eq!(built.selectors.first(), Some("button.primary"));
            assert_eq!(built.selectors.as_slice()[1], "text=\"Continue\"");
        }

        #[test]
        fn test_unique_bare_tag_precedes_text() {
            let mut dom = BTreeMap::new();
            dom.insert("button".to_string(), 1);
            let element = ElementDescriptor {
                text: Some("Continue".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::with_snapshot(&dom).build(&element, None);
            assert_eq!(built.selectors.first(), Some("button"));
            assert!(!built.needs_review);
        }

        #[test]
        fn test_long_text_is_truncated() {
            let long = "a".repeat(80);
            let element = ElementDescriptor {
                text: Some(long),
                ..button()
            };
            let built = SelectorCandidateBuilder::new().build(&element, None);
            assert!(built
                .selectors
                .iter()
                .any(|s| s == format!("text={}", "a".repeat(MAX_TEXT_LEN))));
        }

        #[test]
        fn test_quotes_are_escaped() {
            let element = ElementDescriptor {
                test_id: Some("say \"hi\"".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::new().build(&element, None);
            assert_eq!(built.selectors.first(), Some("[data-testid=\"say \\\"hi\\\"\"]"));
        }
    }

    mod structural_tests {
        use super::*;

        fn nested() -> ElementDescriptor {
            ElementDescriptor {
                classes: vec!["btn".into(), "sc-48213".into()],
                nth_of_type: Some(2),
                ancestors: vec![
                    AncestorNode {
                        tag: "div".into(),
                        classes: vec!["actions".into()],
                        nth_of_type: Some(1),
                        ..AncestorNode::default()
                    },
                    AncestorNode {
                        tag: "form".into(),
                        nth_of_type: Some(3),
                        ..AncestorNode::default()
                    },
                ],
                ..button()
            }
        }

        #[test]
        fn test_hash_classes_are_excluded() {
            let built = SelectorCandidateBuilder::new().build(&nested(), None);
            let got: Vec<&str> = built.selectors.iter().collect();
            assert_eq!(
                got,
                [
                    "form > div.actions > button.btn",
                    "form:nth-of-type(3) > div:nth-of-type(1) > button:nth-of-type(2)",
                ]
            );
            assert!(built.needs_review);
        }

        #[test]
        fn test_path_is_capped() {
            let mut element = button();
            element.ancestors = (0..10)
                .map(|_| AncestorNode {
                    tag: "div".into(),
                    ..AncestorNode::default()
                })
                .collect();
            let built = SelectorCandidateBuilder::new().build(&element, None);
            let levels = built.selectors.first().unwrap().split(" > ").count();
            assert_eq!(levels, MAX_ANCESTOR_DEPTH);
        }

        #[test]
        fn test_snapshot_prefers_unique_class_path() {
            let mut dom = BTreeMap::new();
            dom.insert("form > div.actions > button.btn".to_string(), 1);
            let built = SelectorCandidateBuilder::with_snapshot(&dom).build(&nested(), None);
            assert_eq!(built.selectors.as_slice(), ["form > div.actions > button.btn".to_string()]);
            assert!(!built.needs_review);
        }

        #[test]
        fn test_snapshot_degrades_to_nth_chain() {
            let mut dom = BTreeMap::new();
            dom.insert("form > div.actions > button.btn".to_string(), 4);
            dom.insert(
                "form:nth-of-type(3) > div:nth-of-type(1) > button:nth-of-type(2)".to_string(),
                1,
            );
            let built = SelectorCandidateBuilder::with_snapshot(&dom).build(&nested(), None);
            assert_eq!(
                built.selectors.first(),
                Some("form:nth-of-type(3) > div:nth-of-type(1) > button:nth-of-type(2)")
            );
            assert!(!built.needs_review);
        }
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn test_duplicate_id_is_dropped() {
            let mut dom = BTreeMap::new();
            dom.insert("#row".to_string(), 3);
            let element = ElementDescriptor {
                id: Some("row".into()),
                name: Some("row".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::with_snapshot(&dom).build(&element, None);
            assert!(!built.selectors.iter().any(|s| s == "#row"));
            assert_eq!(built.selectors.first(), Some("button[name=\"row\"]"));
            assert!(built.needs_review);
        }

        #[test]
        fn test_unique_id_is_verified() {
            let mut dom = BTreeMap::new();
            dom.insert("#login".to_string(), 1);
            let element = ElementDescriptor {
                id: Some("login".into()),
                ..button()
            };
            let built = SelectorCandidateBuilder::with_snapshot(&dom).build(&element, None);
            assert_eq!(built.selectors.first(), Some("#login"));
            assert!(!built.needs_review);
        }

        #[test]
        fn test_only_duplicates_falls_back_to_attribute() {
            let mut dom = BTreeMap::new();
            dom.insert("#dup".to_string(), 2);
            let element = ElementDescriptor {
                id: Some("dup".into()),
                ..ElementDescriptor::default()
            };
            let built = SelectorCandidateBuilder::with_snapshot(&dom).build(&element, None);
            assert_eq!(built.selectors.as_slice(), ["[id=\"dup\"]".to_string()]);
            assert!(built.needs_review);
        }
    }

    #[test]
    fn test_descriptor_accepts_recorder_keys() {
        let element: ElementDescriptor = serde_json::from_value(serde_json::json!({
            "tagName": "input",
            "testId": "email",
            "aria-label": "Email",
            "classes": ["field"]
        }))
        .unwrap();
        assert_eq!(element.tag.as_deref(), Some("input"));
        assert_eq!(element.test_id.as_deref(), Some("email"));
        assert_eq!(element.aria_label.as_deref(), Some("Email"));
    }

    fn attr() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[a-zA-Z0-9 _\"-]{0,12}")
    }

    proptest! {
        #[test]
        fn prop_identifying_attribute_yields_candidates(
            test_id in attr(),
            id in attr(),
            name in attr(),
            aria_label in attr(),
            text in attr(),
            tag in prop::option::of("[a-z]{1,6}"),
        ) {
            let element = ElementDescriptor {
                tag,
                test_id,
                id,
                name,
                aria_label,
                text,
                ..ElementDescriptor::default()
            };
            let has_identity = [
                &element.test_id,
                &element.id,
                &element.name,
                &element.aria_label,
                &element.text,
            ]
            .iter()
            .any(|v| v.as_deref().is_some_and(|v| !v.trim().is_empty()));
            let built = SelectorCandidateBuilder::new().build(&element, None);
            if has_identity {
                prop_assert!(!built.selectors.is_empty());
            }
            let again = SelectorCandidateBuilder::new().build(&element, None);
            prop_assert_eq!(built, again);
        }
    }
}
