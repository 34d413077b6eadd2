//! Run artifacts on disk
//!
//! Layout per run directory:
//!
//! ```text
//! <dir>/report.json
//! <dir>/step_log.jsonl
//! <dir>/<screenshot name>.png
//! <dir>/failure_step_NNN.png
//! <dir>/failure_step_NNN.html
//! <dir>/failure_step_NNN_metadata.json
//! ```

use crate::error::{CliError, CliResult};
use recast::{RunReport, SuiteReport};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Replace path separators and other awkward characters in a file name
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Step logs as JSON lines, one per step
pub fn step_log_lines(report: &RunReport) -> CliResult<String> {
    let mut out = String::new();
    for step in &report.steps {
        let line = serde_json::to_string(step)?;
        let _ = writeln!(out, "{line}");
    }
    Ok(out)
}

/// Write a run's report, step log and captured artifacts into `dir`.
///
/// Returns the paths written.
pub fn write_run_artifacts(dir: &Path, report: &RunReport) -> CliResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CliError::report_generation(format!("cannot create {}: {e}", dir.display()))
    })?;
    let mut written = Vec::new();

    let report_path = dir.join("report.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(report)?)?;
    written.push(report_path);

    let log_path = dir.join("step_log.jsonl");
    std::fs::write(&log_path, step_log_lines(report)?)?;
    written.push(log_path);

    for artifact in &report.artifacts {
        let path = dir.join(format!("{}.png", sanitize_file_name(&artifact.name)));
        std::fs::write(&path, &artifact.data)?;
        written.push(path);
    }

    if let Some(ref failure) = report.failure {
        let stem = format!("failure_step_{:03}", failure.step_index);
        if let Some(ref png) = failure.screenshot {
            let path = dir.join(format!("{stem}.png"));
            std::fs::write(&path, png)?;
            written.push(path);
        }
        if let Some(ref html) = failure.html {
            let path = dir.join(format!("{stem}.html"));
            std::fs::write(&path, html)?;
            written.push(path);
        }
        let path = dir.join(format!("{stem}_metadata.json"));
        std::fs::write(&path, serde_json::to_string_pretty(failure)?)?;
        written.push(path);
    }

    Ok(written)
}

/// Write `suite_report.json` plus one run directory per case under `dir`
pub fn write_suite_artifacts(dir: &Path, report: &SuiteReport) -> CliResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for case in &report.cases {
        written.extend(write_run_artifacts(
            &dir.join(sanitize_file_name(&case.name)),
            &case.run,
        )?);
    }
    let path = dir.join("suite_report.json");
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    written.push(path);
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use recast::executor::Artifact;
    use recast::{ExecutionStatus, FailureArtifacts, Scenario, StepError};
    use serde_json::json;

    fn failed_report() -> RunReport {
        let scenario = Scenario::from_value(&json!({"steps": [
            {"type": "go", "url": "https://a.test/"},
            {"type": "click", "selector": "#buy"}
        ]}))
        .unwrap();
        let mut report = RunReport::aborted(
            &scenario,
            &StepError::ElementNotFound {
                selectors: vec!["#buy".into()],
            },
        );
        report.failed_step = Some(1);
        report.artifacts.push(Artifact::new(0, "home/page", vec![1, 2, 3]));
        report.failure = Some(FailureArtifacts {
            step_index: 1,
            error: "No element found".into(),
            url: Some("https://a.test/".into()),
            page_count: Some(1),
            screenshot: Some(vec![0x89, b'P', b'N', b'G']),
            html: Some("<html></html>".into()),
        });
        report
    }

    mod file_name_tests {
        use super::*;

        #[test]
        fn test_sanitize_file_name() {
            assert_eq!(sanitize_file_name("login flow/2"), "login_flow_2");
            assert_eq!(sanitize_file_name("ok-name_1.v2"), "ok-name_1.v2");
            assert_eq!(sanitize_file_name(".."), "unnamed");
        }
    }

    mod writer_tests {
        use super::*;

        #[test]
        fn test_failed_run_layout() {
            let dir = tempfile::tempdir().unwrap();
            let report = failed_report();
            let written = write_run_artifacts(dir.path(), &report).unwrap();
            assert_eq!(written.len(), 6);

            for name in [
                "report.json",
                "step_log.jsonl",
                "home_page.png",
                "failure_step_001.png",
                "failure_step_001.html",
                "failure_step_001_metadata.json",
            ] {
                assert!(dir.path().join(name).exists(), "{name} missing");
            }

            let log = std::fs::read_to_string(dir.path().join("step_log.jsonl")).unwrap();
            let lines: Vec<serde_json::Value> = log
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            assert_eq!(lines.len(), 2);
            assert_eq!(lines[1]["type"], "click");

            let meta: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(dir.path().join("failure_step_001_metadata.json")).unwrap(),
            )
            .unwrap();
            assert_eq!(meta["url"], "https://a.test/");
            assert!(meta.get("html").is_none());
        }

        #[test]
        fn test_suite_layout() {
            let dir = tempfile::tempdir().unwrap();
            let run = failed_report();
            let case = recast::CaseReport {
                name: "checkout flow".into(),
                status: ExecutionStatus::Failed,
                ranges: Vec::new(),
                failed_scenario: None,
                run,
            };
            let suite = SuiteReport::finalize("nightly", chrono::Utc::now(), vec![case]);
            write_suite_artifacts(dir.path(), &suite).unwrap();
            assert!(dir.path().join("suite_report.json").exists());
            assert!(dir.path().join("checkout_flow/report.json").exists());
        }
    }
}
