//! Merge command handler

use super::compile::render_for;
use crate::commands::MergeArgs;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use recast::suite::{merge_case, MergedCase, NamedScenario};

/// Execute the merge command
pub fn execute_merge(args: &MergeArgs, reporter: &ProgressReporter) -> CliResult<MergedCase> {
    let sources = args
        .scenarios
        .iter()
        .map(|p| NamedScenario::load(p))
        .collect::<Result<Vec<_>, _>>()?;
    let merged = merge_case(&args.name, &sources)?;
    let doc = serde_json::to_value(&merged.scenario)?;
    let rendered = render_for(args.output.as_deref(), &doc)?;
    match args.output {
        Some(ref path) => {
            std::fs::write(path, rendered)?;
            for range in &merged.ranges {
                reporter.info(&format!("{}: steps {}..{}", range.name, range.start, range.end));
            }
            reporter.success(&format!(
                "merged {} scenario(s) into {} ({} steps)",
                sources.len(),
                path.display(),
                merged.scenario.len()
            ));
        }
        None => print!("{rendered}"),
    }
    Ok(merged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_writes_loadable_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("login.json");
        std::fs::write(
            &a,
            r#"{"base_url":"https://a.test","steps":[{"type":"go","url":"/login"}]}"#,
        )
        .unwrap();
        let b = dir.path().join("search.yaml");
        std::fs::write(&b, "requires_auth: true\nstorage_state_path: auth.json\nsteps:\n  - type: screenshot\n").unwrap();
        let out = dir.path().join("merged.json");
        let args = MergeArgs {
            scenarios: vec![a, b],
            name: "flow".into(),
            output: Some(out.clone()),
        };
        let merged = execute_merge(&args, &ProgressReporter::new(false, true)).unwrap();
        assert_eq!(merged.ranges.len(), 2);

        let reloaded = recast::Scenario::load(&out).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.requires_auth);
        assert_eq!(reloaded.base_url.as_deref(), Some("https://a.test"));
        assert_eq!(reloaded.meta.unwrap()["case"], "flow");
    }
}
