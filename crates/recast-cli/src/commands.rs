//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Recast: compile recorded browser sessions into resilient e2e scenarios and run them
#[derive(Parser, Debug)]
#[command(name = "recast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a recording into an executable scenario
    Compile(CompileArgs),

    /// Validate an executable scenario
    Validate(ValidateArgs),

    /// Concatenate scenarios into one
    Merge(MergeArgs),

    /// Point a scenario at a storage state file
    InjectAuth(InjectAuthArgs),

    /// Run scenarios in a browser
    Run(RunArgs),

    /// Run a suite of cases in a browser
    Suite(SuiteArgs),
}

/// Arguments for the compile command
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Recording file (.json, .yaml, .yml)
    pub recording: PathBuf,

    /// Output file; format follows the extension. Prints JSON when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fail when any event was skipped
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario files
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Scenario files, in execution order
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,

    /// Case name recorded in `_meta`
    #[arg(short, long, default_value = "merged")]
    pub name: String,

    /// Output file; format follows the extension. Prints JSON when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the inject-auth command
#[derive(Parser, Debug)]
pub struct InjectAuthArgs {
    /// Scenario file to rewrite in place
    pub scenario: PathBuf,

    /// Storage state path written into the scenario
    pub state_path: String,
}

/// Options shared by run and suite
#[derive(Parser, Debug, Clone)]
pub struct EngineArgs {
    /// Engine config file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for reports and artifacts
    #[arg(long, default_value = "target/recast")]
    pub out: PathBuf,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Skip post-step delays
    #[arg(long)]
    pub no_delays: bool,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario files; each runs in its own browser session
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,

    /// Storage state file for every scenario
    #[arg(long)]
    pub storage_state: Option<PathBuf>,

    /// Number of scenarios run in parallel (0 = engine config)
    #[arg(short = 'j', long, default_value = "0")]
    pub workers: usize,

    /// Engine options
    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Arguments for the suite command
#[derive(Parser, Debug)]
pub struct SuiteArgs {
    /// Suite file: `{name?, cases: [{name, scenarios: [paths]}]}`
    pub suite: PathBuf,

    /// Storage state file for every case
    #[arg(long)]
    pub storage_state: Option<PathBuf>,

    /// Engine options
    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Report format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

/// Color output argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
