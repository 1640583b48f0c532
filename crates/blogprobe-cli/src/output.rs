//! Output formatting and progress reporting

use blogprobe::reporter::{render_junit, render_summary};
use blogprobe::{ScenarioReport, ScenarioStatus, SuiteReport};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format for stored reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// The JSON report, pretty-printed
    Json,
    /// `JUnit` XML
    Junit,
}

impl OutputFormat {
    /// Render `report` in this format
    pub fn render(self, report: &SuiteReport) -> serde_json::Result<String> {
        match self {
            Self::Text => Ok(render_summary(report)),
            Self::Json => serde_json::to_string_pretty(report),
            Self::Junit => Ok(render_junit(report)),
        }
    }
}

/// Progress reporter for suite execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
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
        }
    }

    /// Start a progress bar over `total` scenarios
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

    /// Start an indeterminate spinner
    pub fn start_spinner(&mut self, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&mut self) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }

    fn line(&self, symbol: &str, plain: &str, paint: fn(&str) -> String, message: &str) {
        let prefix = if self.use_color {
            paint(symbol)
        } else {
            plain.to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line("✓", "PASS", |s| style(s).green().bold().to_string(), message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        self.line("✗", "FAIL", |s| style(s).red().bold().to_string(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line("⚠", "WARN", |s| style(s).yellow().bold().to_string(), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line("ℹ", "INFO", |s| style(s).blue().bold().to_string(), message);
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

    /// One line per scenario, plus the failing step and capture path
    pub fn scenario(&self, report: &ScenarioReport) {
        let label = format!("{} ({}ms)", report.name, report.elapsed_ms);
        match report.status {
            ScenarioStatus::Passed => self.success(&label),
            ScenarioStatus::Skipped => self.warning(&format!("{label} skipped")),
            ScenarioStatus::Failed | ScenarioStatus::SetupFailed => {
                let detail = report.error.as_ref().map_or_else(String::new, |e| {
                    e.step.as_ref().map_or_else(
                        || format!(": {}", e.message),
                        |step| format!(": step {step:?}: {}", e.message),
                    )
                });
                self.failure(&format!("{label}{detail}"));
                if let Some(path) = report
                    .diagnostic
                    .as_ref()
                    .and_then(|d| d.capture_path.as_deref())
                {
                    self.info(&format!("capture: {path}"));
                }
            }
        }
    }

    /// Print the suite summary
    pub fn summary(&self, report: &SuiteReport) {
        let (passed, failed, skipped) = (report.passed(), report.failed(), report.skipped());
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");

        let total = report.scenarios.len();
        let duration_secs = Duration::from_millis(report.elapsed_ms).as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} {} scenarios in {:.2}s ({} passed, {} failed, {} skipped)",
                status,
                report.suite,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {} {total} scenarios in {duration_secs:.2}s ({passed} passed, {failed} failed, {skipped} skipped)",
                report.suite
            ));
        }
    }
}
