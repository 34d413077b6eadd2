//! Engine configuration.

use crate::result::RecastResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default poll interval for waits and success conditions
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default fixed backoff between retry attempts
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default bound on the pre-click hover
pub const DEFAULT_HOVER_TIMEOUT_MS: u64 = 2000;

/// Tunables shared by the executor, runner and worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Poll interval for waits and success conditions (ms)
    pub poll_interval_ms: u64,
    /// Fixed backoff between retry attempts (ms)
    pub retry_backoff_ms: u64,
    /// Bound on the pre-click hover (ms)
    pub hover_timeout_ms: u64,
    /// Apply per-step `delay_ms` after success
    pub apply_delays: bool,
    /// Parallel workers for independent runs (0 = auto-detect)
    pub workers: usize,
    /// Run the browser headless
    pub headless: bool,
    /// Chromium executable override
    pub chromium_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            hover_timeout_ms: DEFAULT_HOVER_TIMEOUT_MS,
            apply_delays: true,
            workers: 1,
            headless: true,
            chromium_path: None,
        }
    }
}

impl EngineConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set poll interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set retry backoff
    #[must_use]
    pub const fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Set hover timeout
    #[must_use]
    pub const fn with_hover_timeout_ms(mut self, ms: u64) -> Self {
        self.hover_timeout_ms = ms;
        self
    }

    /// Enable or disable post-step delays
    #[must_use]
    pub const fn with_delays(mut self, apply: bool) -> Self {
        self.apply_delays = apply;
        self
    }

    /// Set worker count
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the chromium executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Poll interval as a duration (never zero)
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Retry backoff as a duration
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Hover timeout as a duration
    #[must_use]
    pub const fn hover_timeout(&self) -> Duration {
        Duration::from_millis(self.hover_timeout_ms)
    }

    /// Get effective number of workers
    #[must_use]
    #[allow(clippy::redundant_closure_for_method_calls)] // Cannot use NonZero::get directly due to MSRV 1.75 (stable in 1.79)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        }
    }

    /// Parse YAML; missing keys take defaults
    pub fn from_yaml_str(text: &str) -> RecastResult<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> RecastResult<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.hover_timeout(), Duration::from_millis(2000));
        assert!(config.apply_delays);
        assert!(config.headless);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_delays(false)
            .with_workers(4)
            .with_poll_interval_ms(0)
            .with_chromium_path("/usr/bin/chromium");
        assert!(!config.apply_delays);
        assert_eq!(config.effective_workers(), 4);
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
    }

    #[test]
    fn test_auto_workers() {
        assert!(EngineConfig::new().with_workers(0).effective_workers() >= 1);
    }

    #[test]
    fn test_partial_yaml() {
        let config = EngineConfig::from_yaml_str("retry_backoff_ms: 250\nworkers: 2\n").unwrap();
        assert_eq!(config.retry_backoff_ms, 250);
        assert_eq!(config.workers, 2);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recast.yaml");
        std::fs::write(&path, "headless: false\n").unwrap();
        assert!(!EngineConfig::load(&path).unwrap().headless);
    }
}
