//! Recast CLI library
//!
//! Command-line front end for the recast engine: compile recordings,
//! validate and merge scenarios, and run them in a browser.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, CompileArgs, EngineArgs, FormatArg, InjectAuthArgs, MergeArgs,
    RunArgs, SuiteArgs, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{step_line, ProgressReporter};
