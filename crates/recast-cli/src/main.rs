//! Recast CLI: compile recorded browser sessions and run them
//!
//! ## Usage
//!
//! ```bash
//! recast compile recording.json -o login.yaml
//! recast validate login.yaml
//! recast merge login.yaml search.yaml -n search-flow -o flow.json
//! recast inject-auth flow.json auth/state.json
//! recast run flow.json -j 4
//! recast suite nightly.yaml --storage-state auth/state.json
//! ```

use clap::Parser;
use recast_cli::{
    handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, EngineArgs, ProgressReporter,
    Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(config.verbosity);

    let mut reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
        .with_verbose(config.verbosity.is_verbose());

    match cli.command {
        Commands::Compile(args) => handlers::execute_compile(&args, &reporter).map(|_| ()),
        Commands::Validate(args) => handlers::execute_validate(&args, &reporter).map(|_| ()),
        Commands::Merge(args) => handlers::execute_merge(&args, &reporter).map(|_| ()),
        Commands::InjectAuth(args) => handlers::execute_inject_auth(&args, &reporter),
        Commands::Run(args) => {
            let engine = engine_config(config.with_workers(args.workers), &args.engine)?;
            handlers::execute_run(&args, engine, &mut reporter).map(|_| ())
        }
        Commands::Suite(args) => {
            let engine = engine_config(config, &args.engine)?;
            handlers::execute_suite(&args, engine, &reporter).map(|_| ())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

fn engine_config(config: CliConfig, args: &EngineArgs) -> CliResult<recast::EngineConfig> {
    let mut config = config.with_headed(args.headed).with_no_delays(args.no_delays);
    if let Some(ref path) = args.config {
        config = config.with_engine_config(path);
    }
    config.engine()
}

fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
