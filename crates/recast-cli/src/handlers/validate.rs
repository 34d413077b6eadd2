//! Validate command handler

use crate::commands::{FormatArg, ValidateArgs};
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use recast::scenario::{read_document, validate_document, ValidationIssue};
use serde::Serialize;
use std::path::PathBuf;

/// Validation result of one file
#[derive(Debug, Clone, Serialize)]
pub struct FileValidation {
    /// Scenario path
    pub path: PathBuf,
    /// Issues found; empty when valid
    pub issues: Vec<ValidationIssue>,
}

impl FileValidation {
    /// Whether the file is valid
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validate one scenario file. Unreadable files become a single issue.
#[must_use]
pub fn validate_file(path: PathBuf) -> FileValidation {
    let issues = match read_document(&path) {
        Ok(doc) => validate_document(&doc),
        Err(e) => vec![ValidationIssue {
            step_index: None,
            message: e.to_string(),
        }],
    };
    FileValidation { path, issues }
}

/// Execute the validate command
pub fn execute_validate(args: &ValidateArgs, reporter: &ProgressReporter) -> CliResult<Vec<FileValidation>> {
    let results: Vec<FileValidation> = args.scenarios.iter().cloned().map(validate_file).collect();

    match args.format {
        FormatArg::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        FormatArg::Text => {
            for result in &results {
                if result.is_valid() {
                    reporter.success(&result.path.display().to_string());
                } else {
                    reporter.failure(&result.path.display().to_string());
                    for issue in &result.issues {
                        reporter.failure(&format!("  {issue}"));
                    }
                }
            }
        }
    }

    let invalid = results.iter().filter(|r| !r.is_valid()).count();
    if invalid > 0 {
        return Err(CliError::validation(format!(
            "{invalid} of {} scenario(s) invalid",
            results.len()
        )));
    }
    Ok(results)
}
