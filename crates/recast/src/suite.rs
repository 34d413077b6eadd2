//! Suites: named cases of concatenated scenarios, run one after another.
//!
//! ```text
//! SuiteFile ─► Case ─► merge_case ─► MergedCase ─► fresh session ─► RunReport
//!                                                                      │
//!                                          SuiteReport ◄── CaseReport ◄┘
//! ```

use crate::auth::AuthResolver;
use crate::config::EngineConfig;
use crate::driver::DriverFactory;
use crate::result::{RecastError, RecastResult, StepError};
use crate::runner::{ExecutionStatus, RunReport, ScenarioRunner};
use crate::scenario::{read_document, Scenario};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A scenario with the name it is reported under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedScenario {
    /// Display name, usually the file stem
    pub name: String,
    /// The scenario
    pub scenario: Scenario,
    /// Directory relative storage state paths resolve against
    pub source_dir: Option<PathBuf>,
}

impl NamedScenario {
    /// Wrap a scenario under `name`
    #[must_use]
    pub fn new(name: impl Into<String>, scenario: Scenario) -> Self {
        Self {
            name: name.into(),
            scenario,
            source_dir: None,
        }
    }

    /// Load and validate a scenario file, named after its stem
    pub fn load(path: &Path) -> RecastResult<Self> {
        let scenario = Scenario::load(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("scenario")
            .to_string();
        Ok(Self {
            name,
            scenario,
            source_dir: path.parent().map(Path::to_path_buf),
        })
    }
}

/// Steps `[start, end)` of a merged case that came from one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRange {
    /// Source scenario name
    pub name: String,
    /// First step index
    pub start: usize,
    /// One past the last step index
    pub end: usize,
}

impl ScenarioRange {
    /// Whether `step_index` falls in the range
    #[must_use]
    pub const fn contains(&self, step_index: usize) -> bool {
        self.start <= step_index && step_index < self.end
    }
}

/// Scenarios of one case concatenated into a single scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCase {
    /// Case name
    pub name: String,
    /// Concatenated scenario
    pub scenario: Scenario,
    /// Where each source scenario's steps landed
    pub ranges: Vec<ScenarioRange>,
    /// Directory the merged storage state path resolves against
    pub base_dir: Option<PathBuf>,
}

/// Concatenate `sources` in order into one scenario.
///
/// Steps are never reordered or deduplicated. The first defined `base_url`
/// and storage state reference win; `requires_auth` is true if any source
/// requires it.
pub fn merge_case(name: &str, sources: &[NamedScenario]) -> RecastResult<MergedCase> {
    let Some(first) = sources.first() else {
        return Err(RecastError::config(format!("case '{name}' has no scenarios")));
    };
    let mut steps = Vec::new();
    let mut ranges = Vec::with_capacity(sources.len());
    for source in sources {
        let start = steps.len();
        steps.extend(source.scenario.steps.iter().cloned());
        ranges.push(ScenarioRange {
            name: source.name.clone(),
            start,
            end: steps.len(),
        });
    }

    let mut scenario = Scenario::new(steps);
    scenario.schema_version = first.scenario.schema_version;
    scenario.base_url = sources.iter().find_map(|s| s.scenario.base_url.clone());
    scenario.requires_auth = sources.iter().any(|s| s.scenario.requires_auth);

    let auth_source = sources.iter().find(|s| {
        s.scenario
            .storage_state_path
            .as_deref()
            .is_some_and(|p| !p.is_empty())
            || s.scenario.storage_state.is_some()
    });
    if let Some(source) = auth_source {
        scenario.storage_state_path = source.scenario.storage_state_path.clone();
        scenario.storage_state = source.scenario.storage_state.clone();
    }
    let base_dir = auth_source.unwrap_or(first).source_dir.clone();

    let mut meta = Map::new();
    meta.insert("case".into(), Value::String(name.to_string()));
    meta.insert("merged_from".into(), json!(ranges));
    scenario.meta = Some(meta);

    debug!(case = name, sources = sources.len(), steps = scenario.len(), "merged case");
    Ok(MergedCase {
        name: name.to_string(),
        scenario,
        ranges,
        base_dir,
    })
}

/// One case of a suite file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFile {
    /// Case name
    pub name: String,
    /// Scenario paths, relative to the suite file
    pub scenarios: Vec<String>,
}

/// Suite file: `{name?, cases: [{name, scenarios: [paths]}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteFile {
    /// Suite name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Cases in execution order
    pub cases: Vec<CaseFile>,
}

impl SuiteFile {
    /// Read a JSON/YAML suite file
    pub fn load(path: &Path) -> RecastResult<Self> {
        Ok(serde_json::from_value(read_document(path)?)?)
    }

    /// Load and merge every case; scenario paths resolve against `suite_dir`.
    ///
    /// Each case loads on its own: a case with a missing or invalid scenario
    /// becomes [`SuiteCase::Unloadable`] and the others are unaffected.
    #[must_use]
    pub fn resolve(&self, suite_dir: &Path) -> Vec<SuiteCase> {
        self.cases
            .iter()
            .map(|case| match load_case(case, suite_dir) {
                Ok(merged) => SuiteCase::Ready(merged),
                Err(e) => {
                    warn!(case = %case.name, error = %e, "case could not be loaded");
                    SuiteCase::Unloadable(CaseLoadError {
                        name: case.name.clone(),
                        message: e.to_string(),
                    })
                }
            })
            .collect()
    }
}

fn load_case(case: &CaseFile, suite_dir: &Path) -> RecastResult<MergedCase> {
    let sources = case
        .scenarios
        .iter()
        .map(|p| NamedScenario::load(&suite_dir.join(p)))
        .collect::<RecastResult<Vec<_>>>()?;
    merge_case(&case.name, &sources)
}

/// A case whose scenarios could not be loaded or merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseLoadError {
    /// Case name
    pub name: String,
    /// Literal load error
    pub message: String,
}

/// One entry of a suite: a runnable case, or one that failed to load
#[derive(Debug, Clone, PartialEq)]
pub enum SuiteCase {
    /// Merged and ready to run
    Ready(MergedCase),
    /// Reported FAILED without opening a session
    Unloadable(CaseLoadError),
}

impl SuiteCase {
    /// Case name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(case) => &case.name,
            Self::Unloadable(error) => &error.name,
        }
    }
}

impl From<MergedCase> for SuiteCase {
    fn from(case: MergedCase) -> Self {
        Self::Ready(case)
    }
}

/// Outcome of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Case name
    pub name: String,
    /// Terminal status
    pub status: ExecutionStatus,
    /// Source scenario step ranges
    pub ranges: Vec<ScenarioRange>,
    /// Scenario the failed step belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_scenario: Option<String>,
    /// The merged run
    pub run: RunReport,
}

impl CaseReport {
    fn unloadable(error: &CaseLoadError) -> Self {
        Self {
            name: error.name.clone(),
            status: ExecutionStatus::Failed,
            ranges: Vec::new(),
            failed_scenario: None,
            run: RunReport::load_failed(&error.message),
        }
    }

    fn new(case: &MergedCase, run: RunReport) -> Self {
        let failed_scenario = run.failed_step.and_then(|i| {
            case.ranges
                .iter()
                .find(|r| r.contains(i))
                .map(|r| r.name.clone())
        });
        Self {
            name: case.name.clone(),
            status: run.status,
            ranges: case.ranges.clone(),
            failed_scenario,
            run,
        }
    }
}

/// Aggregate outcome of a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Unique suite run id
    pub suite_id: Uuid,
    /// Suite name
    pub name: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// PASSED iff at least one case ran and none failed
    pub status: ExecutionStatus,
    /// Per-case reports in execution order
    pub cases: Vec<CaseReport>,
    /// Number of cases
    pub case_count: usize,
    /// Passed cases
    pub passed_count: usize,
    /// Failed cases
    pub failed_count: usize,
    /// Total suite time
    pub duration_ms: u64,
}

impl SuiteReport {
    /// Aggregate finished case reports
    #[must_use]
    pub fn finalize(name: impl Into<String>, started_at: DateTime<Utc>, cases: Vec<CaseReport>) -> Self {
        let case_count = cases.len();
        let passed_count = cases
            .iter()
            .filter(|c| c.status == ExecutionStatus::Passed)
            .count();
        let failed_count = case_count - passed_count;
        let status = if case_count > 0 && failed_count == 0 {
            ExecutionStatus::Passed
        } else {
            ExecutionStatus::Failed
        };
        Self {
            suite_id: Uuid::new_v4(),
            name: name.into(),
            started_at,
            status,
            cases,
            case_count,
            passed_count,
            failed_count,
            duration_ms: 0,
        }
    }

    /// Whether the suite passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == ExecutionStatus::Passed
    }
}

/// Runs cases sequentially, each in a fresh browser session.
pub struct SuiteOrchestrator {
    factory: Arc<dyn DriverFactory>,
    runner: ScenarioRunner,
    resolver: AuthResolver,
}

impl std::fmt::Debug for SuiteOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteOrchestrator")
            .field("runner", &self.runner)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl SuiteOrchestrator {
    /// Orchestrator opening sessions from `factory`
    #[must_use]
    pub fn new(factory: Arc<dyn DriverFactory>, config: EngineConfig) -> Self {
        Self {
            factory,
            runner: ScenarioRunner::new(config),
            resolver: AuthResolver::new(),
        }
    }

    /// Use `resolver` to find session artifacts
    #[must_use]
    pub fn with_resolver(mut self, resolver: AuthResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run one case end-to-end in its own session
    pub async fn run_case(&self, case: &MergedCase) -> CaseReport {
        let auth = match self.resolver.resolve(&case.scenario, case.base_dir.as_deref()) {
            Ok(auth) => auth,
            Err(e) => {
                warn!(case = %case.name, error = %e, "storage state could not be loaded");
                let mut run = RunReport::aborted(&case.scenario, &StepError::AuthStateMissing);
                run.error = Some(e.to_string());
                return CaseReport::new(case, run);
            }
        };
        if let Some(run) = self.runner.preflight(&case.scenario, auth.as_ref()) {
            return CaseReport::new(case, run);
        }

        let mut driver = match self.factory.open().await {
            Ok(driver) => driver,
            Err(e) => {
                warn!(case = %case.name, error = %e, "browser session could not be opened");
                let run = RunReport::aborted(
                    &case.scenario,
                    &StepError::SessionDead {
                        message: e.to_string(),
                    },
                );
                return CaseReport::new(case, run);
            }
        };
        let run = self.runner.run(driver.as_mut(), &case.scenario, auth).await;
        if let Err(e) = driver.close().await {
            debug!(case = %case.name, error = %e, "session close failed");
        }
        let report = CaseReport::new(case, run);
        info!(case = %report.name, status = ?report.status, "case finished");
        report
    }

    /// Run every case in order. A failed or unloadable case never stops the next one.
    pub async fn run(&self, name: impl Into<String>, cases: &[SuiteCase]) -> SuiteReport {
        let name = name.into();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(suite = %name, cases = cases.len(), "suite started");

        let mut reports = Vec::with_capacity(cases.len());
        for case in cases {
            let report = match case {
                SuiteCase::Ready(case) => self.run_case(case).await,
                SuiteCase::Unloadable(error) => CaseReport::unloadable(error),
            };
            reports.push(report);
        }

        let mut report = SuiteReport::finalize(name, started_at, reports);
        #[allow(clippy::cast_possible_truncation)]
        {
            report.duration_ms = started.elapsed().as_millis() as u64;
        }
        info!(
            suite = %report.name,
            status = ?report.status,
            passed = report.passed_count,
            failed = report.failed_count,
            "suite finished"
        );
        report
    }
}
