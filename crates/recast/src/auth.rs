//! Session artifacts (Playwright-style `storageState`) and their injection.
//!
//! Cookies are written once, before the first navigation of a session.
//! Origin storage can only be written once a document for that origin is
//! loaded, so each origin is replayed right after the first navigation to it.

use crate::driver::{BrowserDriver, DriverResult};
use crate::result::{RecastError, RecastResult};
use crate::scenario::Scenario;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Environment variable holding a base64 storageState payload
pub const ENV_STORAGE_STATE_B64: &str = "RECAST_STORAGE_STATE_B64";

/// Environment variable holding a storageState file path
pub const ENV_STORAGE_STATE_PATH: &str = "RECAST_STORAGE_STATE_PATH";

/// Serialized cookies plus per-origin web storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Cookies to install in the browser context
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Per-origin storage
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

/// A browser cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain
    pub domain: String,
    /// Path
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Expiration (seconds since epoch, -1 for session cookies)
    #[serde(default = "session_expiry")]
    pub expires: f64,
    /// HTTP only flag
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag
    #[serde(default)]
    pub secure: bool,
    /// Same site setting
    #[serde(default)]
    pub same_site: SameSite,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

const fn session_expiry() -> f64 {
    -1.0
}

impl Cookie {
    /// Create a session cookie for `domain`
    #[must_use]
    pub fn new(name: &str, value: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: default_cookie_path(),
            expires: session_expiry(),
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    /// Set expiration
    #[must_use]
    pub const fn with_expires(mut self, expires: f64) -> Self {
        self.expires = expires;
        self
    }

    /// Set secure flag
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Expiration, or `None` for session cookies
    #[must_use]
    pub fn expires_at(&self) -> Option<f64> {
        (self.expires >= 0.0).then_some(self.expires)
    }
}

/// Same site cookie setting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Strict same site
    Strict,
    /// Lax same site
    #[default]
    Lax,
    /// No same site restriction
    None,
}

/// Web storage of one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    /// Origin, e.g. `https://shop.test`
    pub origin: String,
    /// `localStorage` entries
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
    /// `sessionStorage` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_storage: Vec<StorageEntry>,
}

/// One key/value pair of web storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Key
    pub name: String,
    /// Value
    pub value: String,
}

impl StorageEntry {
    /// Create an entry
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Which web storage area to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// `window.localStorage`
    Local,
    /// `window.sessionStorage`
    Session,
}

impl StorageArea {
    /// JavaScript global name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "localStorage",
            Self::Session => "sessionStorage",
        }
    }
}

/// Structural checks on a raw storageState document.
pub fn validate_storage_state(doc: &Value) -> RecastResult<()> {
    let Some(obj) = doc.as_object() else {
        return Err(RecastError::invalid_storage_state("must be a JSON object"));
    };
    if !obj.get("cookies").is_some_and(Value::is_array) {
        return Err(RecastError::invalid_storage_state("'cookies' must be an array"));
    }
    let Some(origins) = obj.get("origins").and_then(Value::as_array) else {
        return Err(RecastError::invalid_storage_state("'origins' must be an array"));
    };
    for (i, origin) in origins.iter().enumerate() {
        if !origin.get("origin").is_some_and(Value::is_string) {
            return Err(RecastError::invalid_storage_state(format!(
                "origins[{i}] is missing 'origin'"
            )));
        }
        for key in ["localStorage", "sessionStorage"] {
            if origin.get(key).is_some_and(|v| !v.is_array()) {
                return Err(RecastError::invalid_storage_state(format!(
                    "origins[{i}].{key} must be an array"
                )));
            }
        }
    }
    Ok(())
}

impl StorageState {
    /// Create empty storage state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Add a localStorage item for `origin`
    #[must_use]
    pub fn with_local_storage(mut self, origin: &str, key: &str, value: &str) -> Self {
        self.origin_mut(origin)
            .local_storage
            .push(StorageEntry::new(key, value));
        self
    }

    /// Add a sessionStorage item for `origin`
    #[must_use]
    pub fn with_session_storage(mut self, origin: &str, key: &str, value: &str) -> Self {
        self.origin_mut(origin)
            .session_storage
            .push(StorageEntry::new(key, value));
        self
    }

    fn origin_mut(&mut self, origin: &str) -> &mut OriginStorage {
        let pos = match self.origins.iter().position(|o| o.origin == origin) {
            Some(pos) => pos,
            None => {
                self.origins.push(OriginStorage {
                    origin: origin.to_string(),
                    local_storage: Vec::new(),
                    session_storage: Vec::new(),
                });
                self.origins.len() - 1
            }
        };
        &mut self.origins[pos]
    }

    /// Check if storage is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }

    /// Validate and convert a raw document
    pub fn from_value(doc: Value) -> RecastResult<Self> {
        validate_storage_state(&doc)?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Parse and validate JSON bytes
    pub fn from_json_slice(bytes: &[u8]) -> RecastResult<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Decode a base64 payload (whitespace tolerated)
    pub fn from_base64(payload: &str) -> RecastResult<Self> {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
        Self::from_json_slice(&bytes)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> RecastResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RecastError::invalid_storage_state(format!("{}: {e}", path.display()))
        })?;
        Self::from_json_slice(&bytes)
    }

    /// Encode as a base64 payload
    pub fn to_base64(&self) -> RecastResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }
}

/// Normalize an origin string or URL to `scheme://host[:port]`
#[must_use]
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Where a scenario's session artifact comes from.
///
/// Priority: inline base64 override, path override, the scenario's
/// `storage_state_path` (relative to the scenario file), the scenario's
/// inline `storage_state`.
#[derive(Debug, Clone, Default)]
pub struct AuthResolver {
    base64_override: Option<String>,
    path_override: Option<PathBuf>,
}

impl AuthResolver {
    /// Resolver with no overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver reading overrides from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base64_override: std::env::var(ENV_STORAGE_STATE_B64)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            path_override: std::env::var_os(ENV_STORAGE_STATE_PATH)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Set the base64 override
    #[must_use]
    pub fn with_base64(mut self, payload: impl Into<String>) -> Self {
        self.base64_override = Some(payload.into());
        self
    }

    /// Set the path override
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path_override = Some(path.into());
        self
    }

    /// Resolve the artifact for `scenario`; `Ok(None)` when none is configured.
    pub fn resolve(
        &self,
        scenario: &Scenario,
        scenario_dir: Option<&Path>,
    ) -> RecastResult<Option<StorageState>> {
        if let Some(payload) = &self.base64_override {
            debug!("storage state from base64 override");
            return StorageState::from_base64(payload).map(Some);
        }
        if let Some(path) = &self.path_override {
            debug!(path = %path.display(), "storage state from path override");
            return StorageState::load(path).map(Some);
        }
        if let Some(rel) = scenario.storage_state_path.as_deref().filter(|p| !p.is_empty()) {
            let path = match scenario_dir {
                Some(dir) if Path::new(rel).is_relative() => dir.join(rel),
                _ => PathBuf::from(rel),
            };
            debug!(path = %path.display(), "storage state from scenario path");
            return StorageState::load(&path).map(Some);
        }
        Ok(scenario.storage_state.clone())
    }
}

/// Applies a session artifact to one browser session.
#[derive(Debug, Clone)]
pub struct AuthStateInjector {
    state: StorageState,
    cookies_applied: bool,
    replayed: BTreeSet<String>,
}

impl AuthStateInjector {
    /// Create an injector for a fresh session
    #[must_use]
    pub const fn new(state: StorageState) -> Self {
        Self {
            state,
            cookies_applied: false,
            replayed: BTreeSet::new(),
        }
    }

    /// Whether cookies have been written
    #[must_use]
    pub const fn cookies_applied(&self) -> bool {
        self.cookies_applied
    }

    /// Origins whose storage has been replayed
    pub fn replayed_origins(&self) -> impl Iterator<Item = &str> {
        self.replayed.iter().map(String::as_str)
    }

    /// Write all cookies. No-op after the first call.
    pub async fn before_navigation(&mut self, driver: &mut dyn BrowserDriver) -> DriverResult<()> {
        if self.cookies_applied {
            return Ok(());
        }
        if !self.state.cookies.is_empty() {
            driver.set_cookies(&self.state.cookies).await?;
        }
        self.cookies_applied = true;
        info!(cookies = self.state.cookies.len(), "applied session cookies");
        Ok(())
    }

    /// Replay storage for the origin of `url`, once per origin.
    pub async fn after_navigation(
        &mut self,
        driver: &mut dyn BrowserDriver,
        url: &str,
    ) -> DriverResult<()> {
        let Some(current) = origin_of(url) else {
            return Ok(());
        };
        if self.replayed.contains(&current) {
            return Ok(());
        }
        let Some(entry) = self
            .state
            .origins
            .iter()
            .find(|o| origin_of(&o.origin).as_deref().unwrap_or(o.origin.trim_end_matches('/')) == current)
        else {
            return Ok(());
        };
        if !entry.local_storage.is_empty() {
            driver
                .set_storage(&current, StorageArea::Local, &entry.local_storage)
                .await?;
        }
        if !entry.session_storage.is_empty() {
            driver
                .set_storage(&current, StorageArea::Session, &entry.session_storage)
                .await?;
        }
        info!(
            origin = %current,
            local = entry.local_storage.len(),
            session = entry.session_storage.len(),
            "replayed origin storage"
        );
        self.replayed.insert(current);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use serde_json::json;
    use tempfile::TempDir;

    fn playwright_state() -> Value {
        json!({
            "cookies": [{
                "name": "sid", "value": "abc", "domain": ".shop.test", "path": "/",
                "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax"
            }],
            "origins": [{
                "origin": "https://shop.test",
                "localStorage": [{"name": "token", "value": "t1"}]
            }]
        })
    }

    mod storage_state_tests {
        use super::*;

        #[test]
        fn test_parses_playwright_shape() {
            let state = StorageState::from_value(playwright_state()).unwrap();
            assert_eq!(state.cookies.len(), 1);
            assert!(state.cookies[0].http_only);
            assert_eq!(state.cookies[0].expires_at(), None);
            assert_eq!(state.origins[0].local_storage[0].name, "token");
            assert!(state.origins[0].session_storage.is_empty());
        }

        #[test]
        fn test_rejects_missing_origins() {
            let err = StorageState::from_value(json!({"cookies": []})).unwrap_err();
            assert!(err.to_string().contains("'origins'"));
        }

        #[test]
        fn test_rejects_origin_without_name() {
            let err = StorageState::from_value(json!({
                "cookies": [], "origins": [{"localStorage": []}]
            }))
            .unwrap_err();
            assert!(err.to_string().contains("origins[0]"));
        }

        #[test]
        fn test_rejects_non_array_storage() {
            let err = StorageState::from_value(json!({
                "cookies": [], "origins": [{"origin": "https://a.test", "localStorage": {}}]
            }))
            .unwrap_err();
            assert!(err.to_string().contains("localStorage"));
        }

        #[test]
        fn test_base64_equals_file_content() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("state.json");
            let raw = serde_json::to_vec(&playwright_state()).unwrap();
            std::fs::write(&path, &raw).unwrap();
            let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);
            assert_eq!(
                StorageState::load(&path).unwrap(),
                StorageState::from_base64(&encoded).unwrap()
            );
        }

        #[test]
        fn test_builder_groups_by_origin() {
            let state = StorageState::new()
                .with_local_storage("https://a.test", "k1", "v1")
                .with_session_storage("https://a.test", "k2", "v2")
                .with_local_storage("https://b.test", "k3", "v3");
            assert_eq!(state.origins.len(), 2);
            assert_eq!(state.origins[0].session_storage.len(), 1);
        }
    }

    mod resolver_tests {
        use super::*;

        fn scenario() -> Scenario {
            Scenario::from_value(&json!({"steps": [{"type": "go", "url": "https://shop.test"}]}))
                .unwrap()
        }

        #[test]
        fn test_none_when_nothing_configured() {
            assert!(AuthResolver::new().resolve(&scenario(), None).unwrap().is_none());
        }

        #[test]
        fn test_scenario_path_is_relative_to_scenario_dir() {
            let dir = TempDir::new().unwrap();
            std::fs::write(
                dir.path().join("user.json"),
                serde_json::to_vec(&playwright_state()).unwrap(),
            )
            .unwrap();
            let mut s = scenario();
            s.storage_state_path = Some("user.json".into());
            let state = AuthResolver::new()
                .resolve(&s, Some(dir.path()))
                .unwrap()
                .unwrap();
            assert_eq!(state.cookies[0].name, "sid");
        }

        #[test]
        fn test_base64_override_wins() {
            let other = StorageState::new().with_cookie(Cookie::new("override", "1", "a.test"));
            let mut s = scenario().with_storage_state(StorageState::new());
            s.storage_state_path = Some("does-not-exist.json".into());
            let state = AuthResolver::new()
                .with_base64(other.to_base64().unwrap())
                .resolve(&s, None)
                .unwrap()
                .unwrap();
            assert_eq!(state.cookies[0].name, "override");
        }

        #[test]
        fn test_missing_file_is_an_error() {
            let result = AuthResolver::new()
                .with_path("/nonexistent/recast/state.json")
                .resolve(&scenario(), None);
            assert!(matches!(result, Err(RecastError::InvalidStorageState { .. })));
        }

        #[test]
        fn test_inline_state_used_last() {
            let inline = StorageState::new().with_cookie(Cookie::new("inline", "1", "a.test"));
            let s = scenario().with_storage_state(inline.clone());
            assert_eq!(AuthResolver::new().resolve(&s, None).unwrap(), Some(inline));
        }
    }

    mod injector_tests {
        use super::*;

        #[tokio::test]
        async fn test_cookies_applied_once() {
            let state = StorageState::from_value(playwright_state()).unwrap();
            let mut injector = AuthStateInjector::new(state);
            let mut driver = MockDriver::new();
            injector.before_navigation(&mut driver).await.unwrap();
            injector.before_navigation(&mut driver).await.unwrap();
            assert!(injector.cookies_applied());
            assert_eq!(driver.cookies.len(), 1);
            assert_eq!(
                driver.history().iter().filter(|c| c.starts_with("set_cookies")).count(),
                1
            );
        }

        #[tokio::test]
        async fn test_storage_replayed_once_per_matching_origin() {
            let state = StorageState::from_value(playwright_state())
                .unwrap()
                .with_session_storage("https://shop.test", "cart", "3");
            let mut injector = AuthStateInjector::new(state);
            let mut driver = MockDriver::new();

            injector
                .after_navigation(&mut driver, "https://other.test/")
                .await
                .unwrap();
            assert!(driver.storage.is_empty());

            injector
                .after_navigation(&mut driver, "https://shop.test/account?tab=1")
                .await
                .unwrap();
            injector
                .after_navigation(&mut driver, "https://shop.test/cart")
                .await
                .unwrap();
            assert_eq!(driver.storage.len(), 2);
            assert_eq!(driver.storage[0].0, "https://shop.test");
            assert_eq!(driver.storage[0].1, StorageArea::Local);
            assert_eq!(driver.storage[1].1, StorageArea::Session);
            assert_eq!(injector.replayed_origins().collect::<Vec<_>>(), ["https://shop.test"]);
        }

        #[test]
        fn test_origin_of() {
            assert_eq!(
                origin_of("https://shop.test:8443/a/b?c").as_deref(),
                Some("https://shop.test:8443")
            );
            assert_eq!(origin_of("http://shop.test/").as_deref(), Some("http://shop.test"));
            assert_eq!(origin_of("about:blank"), None);
        }
    }
}
