//! Recast: compiles recorded browser sessions into resilient e2e scenarios
//! and executes them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    RECAST Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Recording  │    │ Scenario   │    │ Executable │            │
//! │   │ (raw event │───►│ Compiler   │───►│ Scenario   │            │
//! │   │  tree)     │    │            │    │ JSON/YAML  │            │
//! │   └────────────┘    └────────────┘    └─────┬──────┘            │
//! │                                             │                   │
//! │   ┌────────────┐    ┌────────────┐    ┌─────▼──────┐            │
//! │   │ Suite      │───►│ Scenario   │───►│ Step       │──► Browser │
//! │   │ Orchestr.  │    │ Runner     │    │ Executor   │    Driver  │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The compiler is pure and deterministic. Everything after it talks to a
//! [`BrowserDriver`]: [`MockDriver`] for tests, `ChromiumDriver` with the
//! `browser` feature.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Session artifacts: storage state loading and injection
pub mod auth;

/// Recording compiler: normalization, selector candidates, outcome inference
pub mod compiler;

/// Engine configuration
pub mod config;

/// Browser capability trait and the in-memory mock driver
pub mod driver;

/// Step execution state machine
pub mod executor;

/// Worker pool for independent runs
pub mod pool;

/// Scenario runs and run reports
pub mod runner;

/// Executable scenario schema, validation and file I/O
pub mod scenario;

/// Suites, cases and the sequential orchestrator
pub mod suite;

/// Chromium driver over CDP
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod cdp;

mod result;

pub use auth::{AuthResolver, AuthStateInjector, Cookie, OriginStorage, StorageEntry, StorageState};
pub use compiler::{CompileOutput, CompileWarning, Recording, ScenarioCompiler, SelectorCandidateBuilder};
pub use config::EngineConfig;
pub use driver::{BrowserDriver, DriverError, DriverFactory, ElementHandle, MockDriver, MockDriverFactory};
pub use executor::{StepExecutor, StepLog, StepState};
pub use pool::WorkerPool;
pub use result::{RecastError, RecastResult, StepError};
pub use runner::{ExecutionStatus, FailureArtifacts, RunReport, ScenarioRunner};
pub use scenario::{Scenario, Step, StepAction, StepKind, SuccessCondition};
pub use suite::{
    merge_case, CaseLoadError, CaseReport, MergedCase, NamedScenario, SuiteCase, SuiteFile,
    SuiteOrchestrator, SuiteReport,
};

#[cfg(feature = "browser")]
pub use cdp::{ChromiumDriver, ChromiumFactory};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::auth::*;
    pub use super::compiler::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::executor::*;
    pub use super::pool::*;
    pub use super::result::*;
    pub use super::runner::*;
    pub use super::scenario::*;
    pub use super::suite::*;

    #[cfg(feature = "browser")]
    pub use super::cdp::*;
}
