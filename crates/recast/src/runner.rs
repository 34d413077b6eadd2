//! Scenario runs: one scenario, one session, top to bottom.

use crate::auth::{AuthStateInjector, StorageState};
use crate::config::EngineConfig;
use crate::driver::BrowserDriver;
use crate::executor::{Artifact, RunContext, StepExecutor, StepLog};
use crate::result::StepError;
use crate::scenario::Scenario;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Terminal (or in-flight) status of a run, case or suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Not started
    Pending,
    /// In progress
    Running,
    /// Every step succeeded
    Passed,
    /// A step failed or the run could not start
    Failed,
}

impl ExecutionStatus {
    /// Whether the status is final
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

/// Page state captured when a step fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureArtifacts {
    /// Failed step
    pub step_index: usize,
    /// Literal error
    pub error: String,
    /// URL at failure time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Open pages at failure time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    /// PNG screenshot
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    /// Page HTML
    #[serde(skip)]
    pub html: Option<String>,
}

/// Outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id
    pub run_id: Uuid,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Terminal status
    pub status: ExecutionStatus,
    /// One entry per step, in order
    pub steps: Vec<StepLog>,
    /// Error that ended the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable kind of `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Index of the failed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    /// Screenshots taken by screenshot steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    /// Page state at the failed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureArtifacts>,
    /// Total run time
    pub duration_ms: u64,
}

impl RunReport {
    fn new(steps: Vec<StepLog>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            status: ExecutionStatus::Running,
            steps,
            error: None,
            error_kind: None,
            failed_step: None,
            artifacts: Vec::new(),
            failure: None,
            duration_ms: 0,
        }
    }

    /// Report for a run that fails before touching the browser
    #[must_use]
    pub fn aborted(scenario: &Scenario, error: &StepError) -> Self {
        let steps = scenario
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepLog::skipped(i, s.kind()))
            .collect();
        let mut report = Self::new(steps);
        report.status = ExecutionStatus::Failed;
        report.error = Some(error.to_string());
        report.error_kind = Some(error.kind().to_string());
        report
    }

    /// Report for a case whose scenarios could not be loaded
    #[must_use]
    pub fn load_failed(message: &str) -> Self {
        let mut report = Self::new(Vec::new());
        report.status = ExecutionStatus::Failed;
        report.error = Some(message.to_string());
        report.error_kind = Some("load_error".to_string());
        report
    }

    /// Whether the run passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == ExecutionStatus::Passed
    }
}

/// Runs scenarios against one browser session.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    executor: StepExecutor,
}

impl ScenarioRunner {
    /// Runner with the given tunables
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self {
            executor: StepExecutor::new(config),
        }
    }

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        self.executor.config()
    }

    /// Checks that need no browser. `Some` is the failed report.
    #[must_use]
    pub fn preflight(&self, scenario: &Scenario, auth: Option<&StorageState>) -> Option<RunReport> {
        if scenario.requires_auth && auth.is_none() {
            warn!(steps = scenario.len(), "scenario requires auth but no storage state was supplied");
            return Some(RunReport::aborted(scenario, &StepError::AuthStateMissing));
        }
        None
    }

    /// Execute every step in order.
    ///
    /// The first failed step ends the run; the remaining steps are marked
    /// skipped. The scenario is not modified.
    pub async fn run(
        &self,
        driver: &mut dyn BrowserDriver,
        scenario: &Scenario,
        auth: Option<StorageState>,
    ) -> RunReport {
        if let Some(report) = self.preflight(scenario, auth.as_ref()) {
            return report;
        }
        let started = Instant::now();
        let mut report = RunReport::new(Vec::with_capacity(scenario.len()));
        let mut ctx = RunContext::new(scenario.base_url.as_deref());
        if let Some(state) = auth {
            ctx = ctx.with_injector(AuthStateInjector::new(state));
        }
        info!(run_id = %report.run_id, steps = scenario.len(), "run started");

        for (index, step) in scenario.steps.iter().enumerate() {
            if report.failed_step.is_some() {
                report.steps.push(StepLog::skipped(index, step.kind()));
                continue;
            }
            let outcome = self.executor.execute(driver, index, step, &mut ctx).await;
            report.steps.push(outcome.log);
            if let Some(error) = outcome.error {
                report.failed_step = Some(index);
                report.error = Some(error.to_string());
                report.error_kind = Some(error.kind().to_string());
                if !error.is_session_fatal() {
                    report.failure = Some(capture_failure(driver, index, &error).await);
                }
            }
        }

        report.artifacts = ctx.take_artifacts();
        report.status = if report.failed_step.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Passed
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            report.duration_ms = started.elapsed().as_millis() as u64;
        }
        info!(
            run_id = %report.run_id,
            status = ?report.status,
            failed_step = ?report.failed_step,
            duration_ms = report.duration_ms,
            "run finished"
        );
        report
    }
}

/// Best-effort snapshot of the page after a failure
async fn capture_failure(
    driver: &mut dyn BrowserDriver,
    step_index: usize,
    error: &StepError,
) -> FailureArtifacts {
    FailureArtifacts {
        step_index,
        error: error.to_string(),
        url: driver.current_url().await.ok(),
        page_count: driver.page_count().await.ok(),
        screenshot: driver.screenshot().await.ok(),
        html: driver.page_content().await.ok(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Cookie;
    use crate::driver::{MockDriver, MockElement};
    use crate::executor::StepState;
    use serde_json::json;

    fn scenario(value: serde_json::Value) -> Scenario {
        Scenario::from_value(&value).unwrap()
    }

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(EngineConfig::default().with_delays(false))
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_missing_fails_before_navigation() {
        let s = scenario(json!({
            "requires_auth": true,
            "steps": [{"type": "go", "url": "https://a.test"}, {"type": "screenshot"}]
        }));
        let mut driver = MockDriver::new();
        let report = runner().run(&mut driver, &s, None).await;
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.error_kind.as_deref(), Some("auth_state_missing"));
        assert!(report.steps.iter().all(|l| l.status == StepState::Skipped));
        assert!(driver.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_applied_before_first_go() {
        let s = scenario(json!({
            "requires_auth": true,
            "steps": [{"type": "go", "url": "https://a.test/"}]
        }));
        let state = StorageState::new().with_cookie(Cookie::new("sid", "1", "a.test"));
        let mut driver = MockDriver::new();
        let report = runner().run(&mut driver, &s, Some(state)).await;
        assert!(report.passed());
        assert_eq!(driver.history()[0], "set_cookies:1");
        assert_eq!(driver.cookies.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_rest_and_captures_page() {
        let s = scenario(json!({
            "base_url": "https://shop.test",
            "steps": [
                {"type": "go", "url": "/"},
                {"type": "expect_text", "selector": "h1", "text": "Welcome"},
                {"type": "click", "selector": "#buy"},
                {"type": "screenshot"}
            ]
        }));
        let mut driver = MockDriver::new()
            .with_element(MockElement::new("h", "h1").matching("h1").with_text("Error 500"));
        let report = runner().run(&mut driver, &s, None).await;
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.failed_step, Some(1));
        let statuses: Vec<_> = report.steps.iter().map(|l| l.status).collect();
        assert_eq!(
            statuses,
            [
                StepState::Succeeded,
                StepState::Failed,
                StepState::Skipped,
                StepState::Skipped
            ]
        );
        let failure = report.failure.unwrap();
        assert_eq!(failure.step_index, 1);
        assert_eq!(failure.url.as_deref(), Some("https://shop.test/"));
        assert_eq!(failure.page_count, Some(1));
        assert!(failure.screenshot.is_some());
        assert!(failure.html.unwrap().contains("<html>"));
        assert!(!driver.was_called("click"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_passing_run_collects_screenshots() {
        let s = scenario(json!({"steps": [
            {"type": "go", "url": "https://a.test/"},
            {"type": "screenshot", "name": "landing"}
        ]}));
        let mut driver = MockDriver::new();
        let report = runner().run(&mut driver, &s, None).await;
        assert!(report.passed());
        assert_eq!(report.artifacts.len(), 1);
        assert!(report.failure.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "PASSED");
        assert_eq!(json["artifacts"][0]["name"], "landing");
        assert!(json["artifacts"][0].get("data").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_session_skips_capture() {
        let s = scenario(json!({"steps": [{"type": "go", "url": "https://a.test/"}]}));
        let mut driver = MockDriver::new();
        driver.closed = true;
        let report = runner().run(&mut driver, &s, None).await;
        assert_eq!(report.error_kind.as_deref(), Some("session_dead"));
        assert!(report.failure.is_none());
    }
}
