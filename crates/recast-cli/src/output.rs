//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use recast::{ExecutionStatus, StepLog, StepState};
use std::time::Duration;

/// Progress reporter for compile, validate and run output
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print every step
    pub verbose: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Print every step of every run
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Start a progress bar over runs or cases
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Handle for bumping the progress bar from worker tasks
    #[must_use]
    pub fn progress_handle(&self) -> Option<ProgressBar> {
        self.progress_bar.clone()
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, prefix: &str, message: &str) {
        let line = format!("{prefix} {message}");
        match self.progress_bar {
            Some(ref pb) if !pb.is_finished() => pb.println(line),
            _ => {
                let _ = self.term.write_line(&line);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };
        self.line(&prefix, message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        self.line(&prefix, message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        self.line(&prefix, message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };
        self.line(&prefix, message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print one step log line (verbose mode, or any failed step)
    pub fn step(&self, log: &StepLog) {
        let failed = log.status == StepState::Failed;
        if !(self.verbose || failed) || (self.quiet && !failed) {
            return;
        }
        let message = step_line(log);
        match log.status {
            StepState::Succeeded => self.success(&message),
            StepState::Failed => self.failure(&message),
            _ => self.info(&message),
        }
    }

    /// Print the outcome of a run or case
    pub fn run_result(&self, name: &str, status: ExecutionStatus, error: Option<&str>) {
        match (status, error) {
            (ExecutionStatus::Passed, _) => self.success(name),
            (_, Some(error)) => self.failure(&format!("{name}: {error}")),
            _ => self.failure(name),
        }
    }

    /// Print the final summary
    pub fn summary(&self, passed: usize, failed: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");
        let total = passed + failed;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let status = if failed > 0 || total == 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };
            let _ = self.term.write_line(&format!(
                "{} {} runs in {:.2}s ({} passed, {} failed)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
            ));
        } else {
            let status = if failed > 0 || total == 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} runs in {duration_secs:.2}s ({passed} passed, {failed} failed)"
            ));
        }
    }
}

/// One-line rendering of a step log entry
#[must_use]
pub fn step_line(log: &StepLog) -> String {
    let mut line = format!(
        "step {:>3} {:<16} {:?} attempts={} {}ms",
        log.step_index,
        log.kind.as_str(),
        log.status,
        log.attempt_count,
        log.duration_ms
    );
    if let Some(ref selector) = log.selector_used {
        line.push_str(&format!(" selector={selector}"));
    }
    if let Some(strategy) = log.strategy_used {
        line.push_str(&format!(" strategy={strategy}"));
    }
    if let Some(condition) = log.matched_condition {
        line.push_str(&format!(" matched={condition}"));
    }
    if let Some(ref error) = log.error {
        line.push_str(&format!(" error={error}"));
    }
    line
}
