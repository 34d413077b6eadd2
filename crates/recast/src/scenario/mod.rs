//! Executable scenarios: schema, validation and file I/O.
//!
//! Scenarios are stored as JSON or YAML. Loading always validates; a scenario
//! that loads is safe to hand to the runner.

mod schema;
mod validator;

pub use schema::{
    ClickStrategy, ConditionKind, FrameRef, RetryPolicy, Scenario, SelectorSet, Step, StepAction,
    StepKind, SuccessCondition, DEFAULT_CLICK_DELAY_MS, DEFAULT_EXPECT_TEXT_TIMEOUT_MS,
    DEFAULT_EXPECT_TIMEOUT_MS, DEFAULT_LOGGED_OUT_TEXT, DEFAULT_LOGIN_SELECTOR,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_STEP_DELAY_MS, DEFAULT_WAIT_TIMEOUT_MS, MODAL_TIMEOUT_MS,
    POPUP_TIMEOUT_MS, SCHEMA_VERSION, URL_CHANGE_TIMEOUT_MS,
};
pub use validator::{join_issues, validate_document, validate_scenario, ValidationIssue};

use crate::result::{RecastError, RecastResult};
use serde_json::Value;
use std::path::Path;

/// Note added to `_meta` when a storage state path is injected
pub const AUTH_NOTE: &str = "storageState injected (auth state reference)";

/// Serialization format of a scenario file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
}

impl DocumentFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> RecastResult<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => Err(RecastError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// Parse text in this format into a JSON value
    pub fn parse(self, text: &str) -> RecastResult<Value> {
        Ok(match self {
            Self::Json => serde_json::from_str(text)?,
            Self::Yaml => serde_yaml_ng::from_str(text)?,
        })
    }

    /// Render a JSON value in this format
    pub fn render(self, value: &Value) -> RecastResult<String> {
        Ok(match self {
            Self::Json => {
                let mut text = serde_json::to_string_pretty(value)?;
                text.push('\n');
                text
            }
            Self::Yaml => serde_yaml_ng::to_string(value)?,
        })
    }
}

/// Read a JSON/YAML document from disk
pub fn read_document(path: &Path) -> RecastResult<Value> {
    let format = DocumentFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    format.parse(&text)
}

impl Scenario {
    /// Validate and convert a raw document
    pub fn from_value(doc: &Value) -> RecastResult<Self> {
        let issues = validate_document(doc);
        if !issues.is_empty() {
            return Err(RecastError::invalid_scenario(join_issues(&issues)));
        }
        Ok(serde_json::from_value(doc.clone())?)
    }

    /// Parse and validate JSON text
    pub fn from_json_str(text: &str) -> RecastResult<Self> {
        Self::from_value(&serde_json::from_str(text)?)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(text: &str) -> RecastResult<Self> {
        Self::from_value(&serde_yaml_ng::from_str(text)?)
    }

    /// Load and validate a scenario file
    pub fn load(path: &Path) -> RecastResult<Self> {
        Self::from_value(&read_document(path)?)
    }

    /// Pretty JSON rendering
    pub fn to_json_pretty(&self) -> RecastResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Rewrite a scenario file so it requires auth from `storage_state_path`.
///
/// Existing `_meta` entries are kept; `_meta.auth_note` is only added when absent.
pub fn inject_storage_state_path(scenario_path: &Path, storage_state_path: &str) -> RecastResult<()> {
    let format = DocumentFormat::from_path(scenario_path)?;
    let text = std::fs::read_to_string(scenario_path)?;
    let mut doc = format.parse(&text)?;
    if !doc.is_object() {
        doc = serde_json::json!({ "steps": [] });
    }
    if let Value::Object(map) = &mut doc {
        map.insert("requires_auth".into(), Value::Bool(true));
        map.insert(
            "storage_state_path".into(),
            Value::String(storage_state_path.to_string()),
        );
        let meta = map
            .entry("_meta")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(meta) = meta {
            meta.entry("auth_note")
                .or_insert_with(|| Value::String(AUTH_NOTE.to_string()));
        }
    }
    std::fs::write(scenario_path, format.render(&doc)?)?;
    tracing::info!(
        path = %scenario_path.display(),
        storage_state = storage_state_path,
        "injected storage state reference"
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.JSON")).unwrap(),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.yml")).unwrap(),
            DocumentFormat::Yaml
        );
        assert!(DocumentFormat::from_path(Path::new("a.txt")).is_err());
    }

    #[test]
    fn test_load_yaml_scenario() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("login.yaml");
        std::fs::write(
            &path,
            "base_url: https://shop.test\nsteps:\n  - type: go\n    url: /login\n",
        )
        .unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.base_url.as_deref(), Some("https://shop.test"));
        assert_eq!(scenario.len(), 1);
    }

    #[test]
    fn test_load_rejects_invalid_scenario() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"steps": [{"type": "click"}]}"#).unwrap();
        let err = Scenario::load(&path).unwrap_err();
        assert!(matches!(err, RecastError::InvalidScenario { .. }));
        assert!(err.to_string().contains("steps[0]"));
    }

    #[test]
    fn test_inject_storage_state_path_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkout.json");
        std::fs::write(
            &path,
            r#"{"steps": [{"type": "go", "url": "https://a.test"}], "_meta": {"auth_note": "keep"}}"#,
        )
        .unwrap();
        inject_storage_state_path(&path, "states/user.json").unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert!(scenario.requires_auth);
        assert_eq!(
            scenario.storage_state_path.as_deref(),
            Some("states/user.json")
        );
        let meta = scenario.meta.unwrap();
        assert_eq!(meta["auth_note"], "keep");
    }

    #[test]
    fn test_inject_storage_state_path_yaml_adds_note() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkout.yml");
        std::fs::write(&path, "steps:\n  - type: go\n    url: https://a.test\n").unwrap();
        inject_storage_state_path(&path, "user.json").unwrap();
        let doc = read_document(&path).unwrap();
        assert_eq!(doc["requires_auth"], true);
        assert_eq!(doc["_meta"]["auth_note"], AUTH_NOTE);
    }
}
