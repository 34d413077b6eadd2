//! Compile command handler

use crate::commands::CompileArgs;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use recast::scenario::{read_document, DocumentFormat};
use recast::ScenarioCompiler;
use std::path::Path;

/// What a compile produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSummary {
    /// Steps in the scenario
    pub steps: usize,
    /// Events skipped with a warning
    pub warnings: usize,
    /// Input was already a scenario
    pub passthrough: bool,
}

/// Execute the compile command
pub fn execute_compile(args: &CompileArgs, reporter: &ProgressReporter) -> CliResult<CompileSummary> {
    let input = read_document(&args.recording)?;
    let output = ScenarioCompiler::new().compile_value(&input)?;
    for warning in &output.warnings {
        reporter.warning(&warning.to_string());
    }

    let rendered = render_for(args.output.as_deref(), &output.document)?;
    match args.output {
        Some(ref path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, rendered)?;
            reporter.success(&format!(
                "{} -> {} ({} steps)",
                args.recording.display(),
                path.display(),
                output.scenario.len()
            ));
        }
        None => print!("{rendered}"),
    }
    if output.passthrough {
        reporter.info("input is already an executable scenario; written unchanged");
    }

    let summary = CompileSummary {
        steps: output.scenario.len(),
        warnings: output.warnings.len(),
        passthrough: output.passthrough,
    };
    if args.strict && summary.warnings > 0 {
        return Err(CliError::validation(format!(
            "{} event(s) skipped during compilation",
            summary.warnings
        )));
    }
    Ok(summary)
}

/// Render `doc` in the format of `path`, JSON when there is none
pub fn render_for(path: Option<&Path>, doc: &serde_json::Value) -> CliResult<String> {
    let format = match path {
        Some(p) => DocumentFormat::from_path(p)?,
        None => DocumentFormat::Json,
    };
    Ok(format.render(doc)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn quiet() -> ProgressReporter {
        ProgressReporter::new(false, true)
    }

    fn args(recording: PathBuf, output: Option<PathBuf>, strict: bool) -> CompileArgs {
        CompileArgs {
            recording,
            output,
            strict,
        }
    }

    #[test]
    fn test_compile_to_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let rec = dir.path().join("rec.json");
        std::fs::write(
            &rec,
            r##"{"events":[{"kind":"action","type":"go","url":"https://a.test/"},
                          {"kind":"action","type":"click","selector":"#buy"}]}"##,
        )
        .unwrap();
        let out = dir.path().join("out/scenario.yaml");
        let summary = execute_compile(&args(rec, Some(out.clone()), false), &quiet()).unwrap();
        assert_eq!(summary.steps, 2);
        assert!(!summary.passthrough);
        let reloaded = recast::Scenario::load(&out).unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_strict_fails_on_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let rec = dir.path().join("rec.json");
        std::fs::write(
            &rec,
            r#"{"events":[{"kind":"action","type":"go","url":"https://a.test/"},
                          {"kind":"action","type":"teleport"}]}"#,
        )
        .unwrap();
        let out = dir.path().join("s.json");
        let err = execute_compile(&args(rec.clone(), Some(out.clone()), true), &quiet()).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
        let summary = execute_compile(&args(rec, Some(out), false), &quiet()).unwrap();
        assert_eq!(summary.warnings, 1);
    }

    #[test]
    fn test_render_for_unknown_extension() {
        let doc = serde_json::json!({"steps": []});
        assert!(render_for(Some(Path::new("x.txt")), &doc).is_err());
        assert!(render_for(None, &doc).unwrap().ends_with('\n'));
    }
}
