//! Inject-auth command handler

use crate::commands::InjectAuthArgs;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use recast::scenario::inject_storage_state_path;

/// Execute the inject-auth command
pub fn execute_inject_auth(args: &InjectAuthArgs, reporter: &ProgressReporter) -> CliResult<()> {
    inject_storage_state_path(&args.scenario, &args.state_path)?;
    reporter.success(&format!(
        "{} now requires auth from {}",
        args.scenario.display(),
        args.state_path
    ));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_scenario_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, r#"{"steps":[{"type":"go","url":"https://a.test/"}]}"#).unwrap();
        let args = InjectAuthArgs {
            scenario: path.clone(),
            state_path: "auth/state.json".into(),
        };
        execute_inject_auth(&args, &ProgressReporter::new(false, true)).unwrap();
        let scenario = recast::Scenario::load(&path).unwrap();
        assert!(scenario.requires_auth);
        assert_eq!(scenario.storage_state_path.as_deref(), Some("auth/state.json"));
    }
}
