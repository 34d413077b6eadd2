//! CLI configuration

use crate::error::CliResult;
use recast::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Check if debug mode
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// `tracing` filter used when `RUST_LOG` is unset
    #[must_use]
    pub const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Engine config file (YAML)
    pub engine_config: Option<PathBuf>,
    /// Parallel runs (0 = take the engine config value)
    pub workers: usize,
    /// Show the browser window
    pub headed: bool,
    /// Skip post-step delays
    pub no_delays: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            engine_config: None,
            workers: 0,
            headed: false,
            no_delays: false,
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set the engine config file
    #[must_use]
    pub fn with_engine_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_config = Some(path.into());
        self
    }

    /// Set parallel runs
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Show the browser window
    #[must_use]
    pub const fn with_headed(mut self, headed: bool) -> Self {
        self.headed = headed;
        self
    }

    /// Skip post-step delays
    #[must_use]
    pub const fn with_no_delays(mut self, no_delays: bool) -> Self {
        self.no_delays = no_delays;
        self
    }

    /// Engine config from file (or defaults) with CLI flags applied on top
    pub fn engine(&self) -> CliResult<EngineConfig> {
        let mut engine = match self.engine_config.as_deref() {
            Some(path) => load_engine(path)?,
            None => EngineConfig::default(),
        };
        if self.workers > 0 {
            engine = engine.with_workers(self.workers);
        }
        if self.headed {
            engine = engine.with_headless(false);
        }
        if self.no_delays {
            engine = engine.with_delays(false);
        }
        Ok(engine)
    }
}

fn load_engine(path: &Path) -> CliResult<EngineConfig> {
    Ok(EngineConfig::load(path)?)
}
