//! Command handlers, kept out of main.rs so they can be tested directly

pub mod artifacts;
pub mod compile;
pub mod execute;
pub mod inject_auth;
pub mod merge;
pub mod validate;

pub use artifacts::{sanitize_file_name, step_log_lines, write_run_artifacts, write_suite_artifacts};
pub use compile::{execute_compile, CompileSummary};
pub use execute::{
    browser_factory, execute_run, execute_run_with, execute_suite, execute_suite_with, run_cases,
};
pub use inject_auth::execute_inject_auth;
pub use merge::execute_merge;
pub use validate::{execute_validate, validate_file, FileValidation};
