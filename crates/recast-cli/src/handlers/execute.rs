//! Run and suite command handlers

use super::artifacts::{sanitize_file_name, write_run_artifacts, write_suite_artifacts};
use crate::commands::{RunArgs, SuiteArgs};
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use recast::suite::SuiteFile;
use recast::{
    merge_case, AuthResolver, CaseReport, DriverFactory, EngineConfig, MergedCase, NamedScenario,
    SuiteOrchestrator, SuiteReport, WorkerPool,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Driver factory for real runs
#[cfg(feature = "browser")]
pub fn browser_factory(engine: &EngineConfig) -> CliResult<Arc<dyn DriverFactory>> {
    Ok(Arc::new(recast::ChromiumFactory::new(engine.clone())))
}

/// Driver factory for real runs
#[cfg(not(feature = "browser"))]
pub fn browser_factory(_engine: &EngineConfig) -> CliResult<Arc<dyn DriverFactory>> {
    Err(CliError::config(
        "this build has no browser support; rebuild with --features browser",
    ))
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::execution(format!("failed to start async runtime: {e}")))
}

fn resolver(storage_state: Option<&Path>) -> AuthResolver {
    let resolver = AuthResolver::from_env();
    match storage_state {
        Some(path) => resolver.with_path(path),
        None => resolver,
    }
}

/// Run every case in its own session, at most `engine.effective_workers()` at once.
///
/// Reports come back in the order of `cases`.
pub async fn run_cases(
    factory: Arc<dyn DriverFactory>,
    engine: EngineConfig,
    resolver: AuthResolver,
    cases: Vec<MergedCase>,
    progress: Option<indicatif::ProgressBar>,
) -> CliResult<Vec<CaseReport>> {
    let pool = WorkerPool::new(engine.effective_workers());
    let orchestrator = Arc::new(SuiteOrchestrator::new(factory, engine).with_resolver(resolver));
    let reports = pool
        .run(cases, move |case| {
            let orchestrator = Arc::clone(&orchestrator);
            let progress = progress.clone();
            async move {
                let report = orchestrator.run_case(&case).await;
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                report
            }
        })
        .await?;
    Ok(reports)
}

/// One output directory name per report, suffixed when names repeat
#[must_use]
pub fn output_dirs(out: &Path, reports: &[CaseReport]) -> Vec<PathBuf> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    reports
        .iter()
        .map(|r| {
            let base = sanitize_file_name(&r.name);
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            if *n == 1 {
                out.join(base)
            } else {
                out.join(format!("{base}-{n}"))
            }
        })
        .collect()
}

fn describe_failure(report: &CaseReport) -> Option<String> {
    let error = report.run.error.as_deref()?;
    Some(match (report.run.failed_step, report.failed_scenario.as_deref()) {
        (Some(step), Some(scenario)) => format!("step {step} ({scenario}): {error}"),
        (Some(step), None) => format!("step {step}: {error}"),
        _ => error.to_string(),
    })
}

fn print_case(reporter: &ProgressReporter, report: &CaseReport) {
    for step in &report.run.steps {
        reporter.step(step);
    }
    reporter.run_result(&report.name, report.status, describe_failure(report).as_deref());
}

/// Execute the run command
pub fn execute_run(args: &RunArgs, engine: EngineConfig, reporter: &mut ProgressReporter) -> CliResult<Vec<CaseReport>> {
    let factory = browser_factory(&engine)?;
    execute_run_with(factory, args, engine, reporter)
}

/// Execute the run command against `factory`
pub fn execute_run_with(
    factory: Arc<dyn DriverFactory>,
    args: &RunArgs,
    engine: EngineConfig,
    reporter: &mut ProgressReporter,
) -> CliResult<Vec<CaseReport>> {
    let started = Instant::now();
    let cases = args
        .scenarios
        .iter()
        .map(|path| {
            let scenario = NamedScenario::load(path)?;
            merge_case(&scenario.name.clone(), &[scenario])
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(scenarios = cases.len(), workers = engine.effective_workers(), "run started");

    reporter.header("Running scenarios");
    reporter.start_progress(cases.len() as u64, "scenarios");
    let progress = reporter.progress_handle();
    let resolver = resolver(args.storage_state.as_deref());
    let reports = runtime()?.block_on(run_cases(factory, engine, resolver, cases, progress))?;
    reporter.finish();

    for (report, dir) in reports.iter().zip(output_dirs(&args.engine.out, &reports)) {
        let written = write_run_artifacts(&dir, &report.run)?;
        debug!(case = %report.name, files = written.len(), dir = %dir.display(), "artifacts written");
        print_case(reporter, report);
    }

    let failed = reports.iter().filter(|r| !r.run.passed()).count();
    reporter.summary(reports.len() - failed, failed, started.elapsed());
    if failed > 0 {
        return Err(CliError::execution(format!(
            "{failed} of {} scenario(s) failed",
            reports.len()
        )));
    }
    Ok(reports)
}

/// Execute the suite command
pub fn execute_suite(args: &SuiteArgs, engine: EngineConfig, reporter: &ProgressReporter) -> CliResult<SuiteReport> {
    let factory = browser_factory(&engine)?;
    execute_suite_with(factory, args, engine, reporter)
}

/// Execute the suite command against `factory`
pub fn execute_suite_with(
    factory: Arc<dyn DriverFactory>,
    args: &SuiteArgs,
    engine: EngineConfig,
    reporter: &ProgressReporter,
) -> CliResult<SuiteReport> {
    let file = SuiteFile::load(&args.suite)?;
    let suite_dir = args.suite.parent().unwrap_or_else(|| Path::new("."));
    let cases = file.resolve(suite_dir);
    let name = file.name.clone().unwrap_or_else(|| {
        args.suite
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("suite")
            .to_string()
    });

    reporter.header(&format!("Suite {name}"));
    let orchestrator =
        SuiteOrchestrator::new(factory, engine).with_resolver(resolver(args.storage_state.as_deref()));
    let report = runtime()?.block_on(orchestrator.run(name, &cases));

    write_suite_artifacts(&args.engine.out.join(sanitize_file_name(&report.name)), &report)?;
    for case in &report.cases {
        print_case(reporter, case);
    }
    reporter.summary(
        report.passed_count,
        report.failed_count,
        std::time::Duration::from_millis(report.duration_ms),
    );
    if !report.passed() {
        return Err(CliError::execution(format!(
            "{} of {} case(s) failed",
            report.failed_count, report.case_count
        )));
    }
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::EngineArgs;
    use recast::driver::MockElement;
    use recast::{ExecutionStatus, MockDriver, MockDriverFactory};

    fn engine() -> EngineConfig {
        EngineConfig::default()
            .with_delays(false)
            .with_poll_interval_ms(10)
            .with_workers(2)
    }

    fn engine_args(out: &Path) -> EngineArgs {
        EngineArgs {
            config: None,
            out: out.to_path_buf(),
            headed: false,
            no_delays: true,
        }
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn factory() -> Arc<dyn DriverFactory> {
        let template = MockDriver::new()
            .with_element(MockElement::new("buy", "button").matching("#buy").with_text("Buy"));
        Arc::new(MockDriverFactory::new(template))
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_run_writes_artifacts_per_scenario() {
            let dir = tempfile::tempdir().unwrap();
            let a = write(
                dir.path(),
                "home.json",
                r#"{"steps":[{"type":"go","url":"https://a.test/"},{"type":"screenshot","name":"home"}]}"#,
            );
            let b = write(
                dir.path(),
                "buy.yaml",
                "steps:\n  - type: go\n    url: https://a.test/\n  - type: click\n    selector: '#buy'\n",
            );
            let out = dir.path().join("out");
            let args = RunArgs {
                scenarios: vec![a, b],
                storage_state: None,
                workers: 2,
                engine: engine_args(&out),
            };
            let mut reporter = ProgressReporter::new(false, true);
            let reports = execute_run_with(factory(), &args, engine(), &mut reporter).unwrap();
            assert_eq!(reports.len(), 2);
            assert_eq!(reports[0].name, "home");
            assert!(reports.iter().all(|r| r.status == ExecutionStatus::Passed));
            assert!(out.join("home/step_log.jsonl").exists());
            assert!(out.join("home/home.png").exists());
            assert!(out.join("buy/report.json").exists());
        }

        #[test]
        fn test_run_reports_failure() {
            let dir = tempfile::tempdir().unwrap();
            let a = write(
                dir.path(),
                "missing.json",
                r##"{"steps":[{"type":"click","selector":"#nope","retry":{"max_attempts":1}}]}"##,
            );
            let args = RunArgs {
                scenarios: vec![a],
                storage_state: None,
                workers: 1,
                engine: engine_args(&dir.path().join("out")),
            };
            let mut reporter = ProgressReporter::new(false, true);
            let err = execute_run_with(factory(), &args, engine(), &mut reporter).unwrap_err();
            assert!(err.to_string().contains("1 of 1 scenario(s) failed"));
            assert!(dir.path().join("out/missing/failure_step_000_metadata.json").exists());
        }

        #[test]
        fn test_output_dirs_deduplicate() {
            let run = recast::RunReport::aborted(
                &recast::Scenario::from_value(
                    &serde_json::json!({"steps": [{"type": "go", "url": "https://a.test/"}]}),
                )
                .unwrap(),
                &recast::StepError::AuthStateMissing,
            );
            let report = CaseReport {
                name: "same".into(),
                status: ExecutionStatus::Failed,
                ranges: Vec::new(),
                failed_scenario: None,
                run,
            };
            let dirs = output_dirs(Path::new("out"), &[report.clone(), report]);
            assert_eq!(dirs, vec![PathBuf::from("out/same"), PathBuf::from("out/same-2")]);
        }
    }

    mod suite_tests {
        use super::*;

        #[test]
        fn test_suite_continues_after_failed_case() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "ok.json", r#"{"steps":[{"type":"go","url":"https://a.test/"}]}"#);
            write(
                dir.path(),
                "auth.json",
                r#"{"requires_auth":true,"steps":[{"type":"go","url":"https://a.test/"}]}"#,
            );
            let suite = write(
                dir.path(),
                "nightly.yaml",
                "cases:\n  - name: needs-login\n    scenarios: [auth.json, ok.json]\n  - name: broken\n    scenarios: [missing.json]\n  - name: public\n    scenarios: [ok.json]\n",
            );
            let out = dir.path().join("out");
            let args = SuiteArgs {
                suite,
                storage_state: None,
                engine: engine_args(&out),
            };
            let err = execute_suite_with(factory(), &args, engine(), &ProgressReporter::new(false, true))
                .unwrap_err();
            assert!(err.to_string().contains("2 of 3 case(s) failed"));

            let report: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(out.join("nightly/suite_report.json")).unwrap(),
            )
            .unwrap();
            assert_eq!(report["cases"][0]["run"]["error_kind"], "auth_state_missing");
            assert_eq!(report["cases"][1]["run"]["error_kind"], "load_error");
            assert_eq!(report["cases"][2]["status"], "PASSED");
            assert!(out.join("nightly/public/step_log.jsonl").exists());
        }
    }
}
