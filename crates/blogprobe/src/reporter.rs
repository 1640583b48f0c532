//! Report artifacts.
//!
//! Everything a run produces lands in one tree under the output directory:
//!
//! ```text
//! <output_dir>/
//! ├── reports/<suite>-<MMDDYYYY_HHMMSS>.json   suite report
//! ├── reports/<suite>-<MMDDYYYY_HHMMSS>.xml    JUnit, when requested
//! ├── captures/<suite>/<scenario>.png|html     failure captures
//! └── traces/<suite>/<scenario>.json           step traces
//! ```

use crate::driver::CaptureFormat;
use crate::result::ProbeResult;
use crate::scenario::{ScenarioReport, ScenarioStatus, StepStatus, SuiteReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Timestamp format used in report file names
pub const TIMESTAMP_FORMAT: &str = "%m%d%Y_%H%M%S";

/// What a suite does after a failing scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Skip the remaining scenarios
    StopOnFirst,
    /// Run everything and report all failures
    #[default]
    CollectAll,
}

/// When step traces are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceMode {
    /// Never
    Off,
    /// For every scenario
    On,
    /// Only for failed scenarios
    #[default]
    RetainOnFailure,
}

impl TraceMode {
    fn keeps(self, report: &ScenarioReport) -> bool {
        match self {
            Self::Off => false,
            Self::On => report.status != ScenarioStatus::Skipped,
            Self::RetainOnFailure => report.status.is_failure(),
        }
    }
}

/// Where files were written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenArtifacts {
    /// Suite JSON report
    pub report: PathBuf,
    /// JUnit XML, if requested
    pub junit: Option<PathBuf>,
    /// Failure captures
    pub captures: Vec<PathBuf>,
    /// Step traces
    pub traces: Vec<PathBuf>,
}

/// Lower-case file-name-safe form of a suite or scenario name
#[must_use]
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes reports, captures and traces under a root directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    capture_on_failure: bool,
    trace: TraceMode,
    junit: bool,
}

impl ArtifactStore {
    /// Store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            capture_on_failure: true,
            trace: TraceMode::default(),
            junit: false,
        }
    }

    /// Persist failure captures
    #[must_use]
    pub const fn capture_on_failure(mut self, enabled: bool) -> Self {
        self.capture_on_failure = enabled;
        self
    }

    /// Trace retention
    #[must_use]
    pub const fn trace(mut self, mode: TraceMode) -> Self {
        self.trace = mode;
        self
    }

    /// Also write JUnit XML next to the JSON report
    #[must_use]
    pub const fn junit(mut self, enabled: bool) -> Self {
        self.junit = enabled;
        self
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `reports/<suite>-<timestamp>.json`
    #[must_use]
    pub fn report_path(&self, suite: &str, at: DateTime<Utc>) -> PathBuf {
        self.root.join("reports").join(format!(
            "{}-{}.json",
            slug(suite),
            at.format(TIMESTAMP_FORMAT)
        ))
    }

    /// `captures/<suite>/<scenario>.<ext>`
    #[must_use]
    pub fn capture_path(&self, suite: &str, scenario: &str, format: CaptureFormat) -> PathBuf {
        self.root
            .join("captures")
            .join(slug(suite))
            .join(format!("{}.{}", slug(scenario), format.extension()))
    }

    /// `traces/<suite>/<scenario>.json`
    #[must_use]
    pub fn trace_path(&self, suite: &str, scenario: &str) -> PathBuf {
        self.root
            .join("traces")
            .join(slug(suite))
            .join(format!("{}.json", slug(scenario)))
    }

    /// Persist a suite run. Capture paths are filled into the report before
    /// it is serialized.
    pub fn write(&self, report: &mut SuiteReport) -> ProbeResult<WrittenArtifacts> {
        let mut written = WrittenArtifacts::default();
        let suite = report.suite.clone();

        for scenario in &mut report.scenarios {
            if self.capture_on_failure {
                if let Some(diagnostic) = scenario.diagnostic.as_mut() {
                    if let Some(capture) = diagnostic.capture.as_ref().filter(|c| c.is_valid()) {
                        let path = self.capture_path(&suite, &scenario.name, capture.format);
                        write_file(&path, &capture.data)?;
                        diagnostic.capture_path = Some(path.display().to_string());
                        written.captures.push(path);
                    }
                }
            }
            if self.trace.keeps(scenario) {
                let path = self.trace_path(&suite, &scenario.name);
                write_file(&path, serde_json::to_string_pretty(scenario)?.as_bytes())?;
                written.traces.push(path);
            }
        }

        let path = self.report_path(&suite, report.started_at);
        write_file(&path, report.to_json()?.as_bytes())?;
        if self.junit {
            let xml = path.with_extension("xml");
            write_file(&xml, render_junit(report).as_bytes())?;
            written.junit = Some(xml);
        }
        tracing::info!(path = %path.display(), "report written");
        written.report = path;
        Ok(written)
    }
}

fn write_file(path: &Path, data: &[u8]) -> ProbeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

/// Read a stored suite report
pub fn load_report(path: &Path) -> ProbeResult<SuiteReport> {
    SuiteReport::from_json(&std::fs::read_to_string(path)?)
}

/// Plain-text summary of a suite run
#[must_use]
pub fn render_summary(report: &SuiteReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} passed, {} failed, {} skipped ({}ms)",
        report.suite,
        report.passed(),
        report.failed(),
        report.skipped(),
        report.elapsed_ms
    );
    for seed in &report.seeds {
        let _ = writeln!(out, "  seeded {} in {}ms", seed.store, seed.elapsed_ms);
    }
    for scenario in &report.scenarios {
        let label = match scenario.status {
            ScenarioStatus::Passed => "PASS ",
            ScenarioStatus::Failed => "FAIL ",
            ScenarioStatus::SetupFailed => "SETUP",
            ScenarioStatus::Skipped => "SKIP ",
        };
        let _ = writeln!(out, "  {label} {} ({}ms)", scenario.name, scenario.elapsed_ms);
        if let Some(error) = &scenario.error {
            match &error.step {
                Some(step) => {
                    let _ = writeln!(out, "        step {step:?} [{}]: {}", error.kind, error.message);
                }
                None => {
                    let _ = writeln!(out, "        [{}]: {}", error.kind, error.message);
                }
            }
        }
        if let Some(path) = scenario
            .diagnostic
            .as_ref()
            .and_then(|d| d.capture_path.as_deref())
        {
            let _ = writeln!(out, "        capture: {path}");
        }
        for failure in &scenario.teardown_failures {
            let _ = writeln!(out, "        teardown {:?} failed: {}", failure.name, failure.message);
        }
    }
    out
}

/// JUnit XML for CI
#[must_use]
pub fn render_junit(report: &SuiteReport) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    let _ = writeln!(
        xml,
        r#"<testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}">"#,
        escape_xml(&report.suite),
        report.scenarios.len(),
        report.failed(),
        report.skipped(),
        report.elapsed_ms as f64 / 1000.0
    );
    for scenario in &report.scenarios {
        let _ = writeln!(
            xml,
            r#"  <testcase name="{}" time="{:.3}">"#,
            escape_xml(&scenario.name),
            scenario.elapsed_ms as f64 / 1000.0
        );
        if let Some(error) = &scenario.error {
            let _ = writeln!(
                xml,
                r#"    <failure type="{}" message="{}">{}</failure>"#,
                error.kind,
                escape_xml(&error.message),
                escape_xml(&step_trace(scenario))
            );
        } else if scenario.status == ScenarioStatus::Skipped {
            xml.push_str("    <skipped/>\n");
        }
        xml.push_str("  </testcase>\n");
    }
    xml.push_str("</testsuite>\n");
    xml
}

fn step_trace(scenario: &ScenarioReport) -> String {
    scenario
        .steps
        .iter()
        .map(|s| {
            let mark = match s.status {
                StepStatus::Passed => "ok",
                StepStatus::Failed => "FAILED",
                StepStatus::Skipped => "skipped",
            };
            format!("{} ... {mark} ({}ms)", s.name, s.elapsed_ms)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
