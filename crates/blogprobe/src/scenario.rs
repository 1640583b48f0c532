//! Scenario orchestration.
//!
//! ```text
//! ┌─────────────┐  seed ok   ┌─────────┐  all steps ok  ┌────────┐
//! │ Initialized │──────────▶│ Running │──────────────▶│ Passed │──┐
//! └─────────────┘            └─────────┘                └────────┘  │ teardown
//!        │ seed failed            │ first step error    ┌────────┐  ├────────▶ TornDown
//!        └────────────────────────┴───────────────────▶│ Failed │──┘
//!                                                       └────────┘
//! ```
//!
//! Steps run strictly in order and the first error halts the scenario. A
//! failure captures diagnostics before any teardown runs. Teardowns run in
//! reverse registration order and each one is isolated: an error or panic in
//! one is recorded and the rest still run.

use crate::driver::Capture;
use crate::fixture::{SeedReport, SeedScope, SharedSeeder};
use crate::page::Page;
use crate::reporter::FailureMode;
use crate::result::{ErrorKind, ProbeError, ProbeResult};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;
use tracing::Instrument;

/// Lifecycle of a single scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    /// Created, nothing has run
    Initialized,
    /// Steps executing
    Running,
    /// Every step succeeded
    Passed,
    /// A step or the setup failed
    Failed,
    /// Teardowns have run
    TornDown,
}

impl ScenarioState {
    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initialized, Self::Running | Self::Failed)
                | (Self::Running, Self::Passed | Self::Failed)
                | (Self::Passed | Self::Failed, Self::TornDown)
        )
    }
}

/// Transition history of a scenario
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: Vec<ScenarioState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            history: vec![ScenarioState::Initialized],
        }
    }
}

impl Lifecycle {
    /// Start in `Initialized`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ScenarioState {
        self.history
            .last()
            .copied()
            .unwrap_or(ScenarioState::Initialized)
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: ScenarioState) -> ProbeResult<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(ProbeError::invalid_state(format!(
                "illegal scenario transition {current:?} -> {next:?}"
            )));
        }
        self.history.push(next);
        Ok(())
    }

    /// States visited, in order
    #[must_use]
    pub fn history(&self) -> &[ScenarioState] {
        &self.history
    }
}

// =============================================================================
// Context
// =============================================================================

type Teardown = Box<dyn FnOnce() -> BoxFuture<'static, ProbeResult<()>> + Send>;

#[derive(Default)]
struct Shared {
    teardowns: Vec<(String, Teardown)>,
    vars: HashMap<String, serde_json::Value>,
}

/// State shared by the steps of one scenario run.
///
/// Cloning is cheap; clones share the teardown stack and variables.
#[derive(Clone, Default)]
pub struct ScenarioContext {
    page: Option<Page>,
    shared: Arc<Mutex<Shared>>,
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.lock();
        f.debug_struct("ScenarioContext")
            .field("page", &self.page.as_ref().map(Page::base_url))
            .field("teardowns", &shared.teardowns.len())
            .field("vars", &shared.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScenarioContext {
    /// Context without a page (API-only scenarios)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driving `page`
    #[must_use]
    pub fn with_page(page: Page) -> Self {
        Self {
            page: Some(page),
            shared: Arc::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The page, or `InvalidState` for page-less contexts
    pub fn page(&self) -> ProbeResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ProbeError::invalid_state("scenario context has no page"))
    }

    /// Register a cleanup action; cleanups run in reverse order
    pub fn defer<F, Fut>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ProbeResult<()>> + Send + 'static,
    {
        let teardown: Teardown = Box::new(move || action().boxed());
        self.lock().teardowns.push((name.into(), teardown));
    }

    /// Pending cleanup count
    #[must_use]
    pub fn pending_teardowns(&self) -> usize {
        self.lock().teardowns.len()
    }

    fn take_teardowns(&self) -> Vec<(String, Teardown)> {
        std::mem::take(&mut self.lock().teardowns)
    }

    /// Store a value for later steps
    pub fn remember<T: Serialize>(&self, key: &str, value: &T) -> ProbeResult<()> {
        let value = serde_json::to_value(value)?;
        let _ = self.lock().vars.insert(key.to_string(), value);
        Ok(())
    }

    /// Value stored by an earlier step
    pub fn recall<T: DeserializeOwned>(&self, key: &str) -> ProbeResult<T> {
        let value = self
            .lock()
            .vars
            .get(key)
            .cloned()
            .ok_or_else(|| ProbeError::invalid_state(format!("no scenario value named {key:?}")))?;
        Ok(serde_json::from_value(value)?)
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// All steps passed
    Passed,
    /// A step failed
    Failed,
    /// Seeding or context creation failed; no step ran
    SetupFailed,
    /// Not run because an earlier scenario failed
    Skipped,
}

impl ScenarioStatus {
    /// Failed or setup-failed
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::SetupFailed)
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Succeeded
    Passed,
    /// Returned an error
    Failed,
    /// Not run
    Skipped,
}

/// Timing and result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step name
    pub name: String,
    /// Outcome
    pub status: StepStatus,
    /// Wall time
    pub elapsed_ms: u64,
    /// Error message for failed steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a scenario failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Error category
    pub kind: ErrorKind,
    /// Rendered error
    pub message: String,
    /// Failing step, absent for setup failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Seed command exit code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Seed command output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl FailureReport {
    /// Build from an error
    #[must_use]
    pub fn from_error(step: Option<&str>, err: &ProbeError) -> Self {
        let (exit_code, output) = match err {
            ProbeError::SeedFailed {
                exit_code, output, ..
            } => (*exit_code, Some(output.clone())),
            _ => (None, None),
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            step: step.map(str::to_string),
            exit_code,
            output,
        }
    }
}

/// State captured at the moment a scenario failed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Failing step
    pub step: String,
    /// Rendered error
    pub message: String,
    /// Page URL when captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Where the capture was written, once persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<String>,
    /// Raw capture, persisted by the reporter
    #[serde(skip)]
    pub capture: Option<Capture>,
}

/// A cleanup that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownFailure {
    /// Cleanup name
    pub name: String,
    /// Rendered error or panic message
    pub message: String,
}

/// Full record of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Outcome
    pub status: ScenarioStatus,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall time including teardown
    pub elapsed_ms: u64,
    /// Per-step results
    pub steps: Vec<StepReport>,
    /// Primary failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
    /// Captured on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    /// Cleanups that failed; never replaces `error`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown_failures: Vec<TeardownFailure>,
    /// Lifecycle states visited
    pub states: Vec<ScenarioState>,
}

impl ScenarioReport {
    fn not_run(name: &str, status: ScenarioStatus, error: Option<FailureReport>) -> Self {
        let states = if status == ScenarioStatus::SetupFailed {
            vec![
                ScenarioState::Initialized,
                ScenarioState::Failed,
                ScenarioState::TornDown,
            ]
        } else {
            vec![ScenarioState::Initialized]
        };
        Self {
            name: name.to_string(),
            status,
            started_at: Utc::now(),
            elapsed_ms: 0,
            steps: Vec::new(),
            error,
            diagnostic: None,
            teardown_failures: Vec::new(),
            states,
        }
    }

    /// Report for a scenario whose setup failed
    #[must_use]
    pub fn setup_failed(name: &str, err: &ProbeError) -> Self {
        Self::not_run(
            name,
            ScenarioStatus::SetupFailed,
            Some(FailureReport::from_error(None, err)),
        )
    }

    /// Report for a scenario that never ran
    #[must_use]
    pub fn skipped(name: &str) -> Self {
        Self::not_run(name, ScenarioStatus::Skipped, None)
    }

    /// Whether the scenario passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

// =============================================================================
// Scenario
// =============================================================================

type StepFn = Arc<dyn Fn(ScenarioContext) -> BoxFuture<'static, ProbeResult<()>> + Send + Sync>;

/// Named, ordered list of async steps
#[derive(Clone)]
pub struct Scenario {
    name: String,
    steps: Vec<(String, StepFn)>,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

async fn isolated(what: &str, fut: BoxFuture<'static, ProbeResult<()>>) -> ProbeResult<()> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ProbeError::invalid_state(format!(
            "{what} panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

impl Scenario {
    /// Empty scenario
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    #[must_use]
    pub fn step<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ScenarioContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult<()>> + Send + 'static,
    {
        let step: StepFn = Arc::new(move |ctx| f(ctx).boxed());
        self.steps.push((name.into(), step));
        self
    }

    /// Scenario name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in order
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every step against `ctx`, then the teardowns it registered
    pub async fn run(&self, ctx: ScenarioContext) -> ScenarioReport {
        let span = tracing::info_span!("scenario", name = %self.name);
        let started_at = Utc::now();
        match self.execute(ctx, started_at).instrument(span).await {
            Ok(report) => report,
            Err(e) => {
                let mut report = ScenarioReport::not_run(
                    &self.name,
                    ScenarioStatus::Failed,
                    Some(FailureReport::from_error(None, &e)),
                );
                report.started_at = started_at;
                report
            }
        }
    }

    async fn execute(
        &self,
        ctx: ScenarioContext,
        started_at: DateTime<Utc>,
    ) -> ProbeResult<ScenarioReport> {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new();
        lifecycle.advance(ScenarioState::Running)?;
        tracing::info!(steps = self.steps.len(), "scenario started");

        let mut steps = Vec::with_capacity(self.steps.len());
        let mut failure: Option<(String, ProbeError)> = None;
        for (name, f) in &self.steps {
            if failure.is_some() {
                steps.push(StepReport {
                    name: name.clone(),
                    status: StepStatus::Skipped,
                    elapsed_ms: 0,
                    error: None,
                });
                continue;
            }
            let step_start = Instant::now();
            let span = tracing::info_span!("step", step = %name);
            let result = isolated(name, f(ctx.clone())).instrument(span).await;
            let elapsed_ms = step_start.elapsed().as_millis() as u64;
            match result {
                Ok(()) => steps.push(StepReport {
                    name: name.clone(),
                    status: StepStatus::Passed,
                    elapsed_ms,
                    error: None,
                }),
                Err(e) => {
                    tracing::error!(step = %name, error = %e, "step failed");
                    steps.push(StepReport {
                        name: name.clone(),
                        status: StepStatus::Failed,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    });
                    failure = Some((name.clone(), e));
                }
            }
        }

        let (status, error, diagnostic) = match &failure {
            Some((step, err)) => {
                lifecycle.advance(ScenarioState::Failed)?;
                let diagnostic = capture_diagnostic(&ctx, step, err).await;
                (
                    ScenarioStatus::Failed,
                    Some(FailureReport::from_error(Some(step), err)),
                    Some(diagnostic),
                )
            }
            None => {
                lifecycle.advance(ScenarioState::Passed)?;
                (ScenarioStatus::Passed, None, None)
            }
        };

        let teardown_failures = run_teardowns(&ctx).await;
        lifecycle.advance(ScenarioState::TornDown)?;
        tracing::info!(?status, "scenario finished");

        Ok(ScenarioReport {
            name: self.name.clone(),
            status,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
            steps,
            error,
            diagnostic,
            teardown_failures,
            states: lifecycle.history().to_vec(),
        })
    }
}

async fn capture_diagnostic(ctx: &ScenarioContext, step: &str, err: &ProbeError) -> Diagnostic {
    let mut diagnostic = Diagnostic {
        step: step.to_string(),
        message: err.to_string(),
        ..Diagnostic::default()
    };
    let Ok(page) = ctx.page() else {
        return diagnostic;
    };
    match page.url().await {
        Ok(url) => diagnostic.url = Some(url),
        Err(e) => tracing::warn!(error = %e, "could not read url for diagnostics"),
    }
    match page.capture().await {
        Ok(capture) => diagnostic.capture = Some(capture),
        Err(e) => tracing::warn!(error = %e, "capture failed"),
    }
    diagnostic
}

async fn run_teardowns(ctx: &ScenarioContext) -> Vec<TeardownFailure> {
    let mut failures = Vec::new();
    for (name, teardown) in ctx.take_teardowns().into_iter().rev() {
        match isolated(&name, teardown()).await {
            Ok(()) => tracing::debug!(teardown = %name, "teardown done"),
            Err(e) => {
                tracing::warn!(teardown = %name, error = %e, "teardown failed");
                failures.push(TeardownFailure {
                    name,
                    message: e.to_string(),
                });
            }
        }
    }
    failures
}

// =============================================================================
// Suite
// =============================================================================

/// Results of a suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Suite name
    pub suite: String,
    /// Identifies this run in logs and artifacts
    #[serde(default)]
    pub run_id: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall time
    pub elapsed_ms: u64,
    /// Seeds performed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seeds: Vec<SeedReport>,
    /// Scenario results, in declaration order
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    fn count(&self, pred: impl Fn(ScenarioStatus) -> bool) -> usize {
        self.scenarios.iter().filter(|s| pred(s.status)).count()
    }

    /// Scenarios that passed
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|s| s == ScenarioStatus::Passed)
    }

    /// Scenarios that failed, setup failures included
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ScenarioStatus::is_failure)
    }

    /// Scenarios not run
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| s == ScenarioStatus::Skipped)
    }

    /// No failures
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Look up a scenario result
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Pretty JSON
    pub fn to_json(&self) -> ProbeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a stored report
    pub fn from_json(json: &str) -> ProbeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Named list of scenarios sharing a seeder
#[derive(Debug, Clone)]
pub struct Suite {
    name: String,
    scenarios: Vec<Scenario>,
    seeder: Option<SharedSeeder>,
    scope: SeedScope,
    failure_mode: FailureMode,
}

impl Suite {
    /// Empty suite; collects all failures by default
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenarios: Vec::new(),
            seeder: None,
            scope: SeedScope::PerSuite,
            failure_mode: FailureMode::CollectAll,
        }
    }

    /// Append a scenario
    #[must_use]
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Seed with `seeder` at `scope`
    #[must_use]
    pub fn seeder(mut self, seeder: SharedSeeder, scope: SeedScope) -> Self {
        self.seeder = Some(seeder);
        self.scope = scope;
        self
    }

    /// Stop after the first failing scenario or run them all
    #[must_use]
    pub const fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scenarios in order
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    async fn seed(&self) -> ProbeResult<Option<SeedReport>> {
        match &self.seeder {
            Some(seeder) => {
                let report = seeder.seed().await?;
                tracing::info!(store = %report.store, elapsed_ms = report.elapsed_ms, "seeded");
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    /// Run every scenario, each with a fresh context from `make_context`
    pub async fn run<F, Fut>(&self, make_context: F) -> SuiteReport
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProbeResult<ScenarioContext>>,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("suite", name = %self.name, run_id = %run_id);
        self.run_all(run_id, make_context).instrument(span).await
    }

    async fn run_all<F, Fut>(&self, run_id: String, make_context: F) -> SuiteReport
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProbeResult<ScenarioContext>>,
    {
        let start = Instant::now();
        let mut report = SuiteReport {
            suite: self.name.clone(),
            run_id,
            started_at: Utc::now(),
            elapsed_ms: 0,
            seeds: Vec::new(),
            scenarios: Vec::with_capacity(self.scenarios.len()),
        };

        if self.scope == SeedScope::PerSuite {
            match self.seed().await {
                Ok(seed) => report.seeds.extend(seed),
                Err(e) => {
                    tracing::error!(error = %e, "suite seed failed");
                    self.fail_remaining(&mut report, 0, &e);
                    report.elapsed_ms = start.elapsed().as_millis() as u64;
                    return report;
                }
            }
        }

        for (index, scenario) in self.scenarios.iter().enumerate() {
            if self.scope == SeedScope::PerScenario {
                match self.seed().await {
                    Ok(seed) => report.seeds.extend(seed),
                    Err(e) => {
                        tracing::error!(scenario = scenario.name(), error = %e, "seed failed");
                        self.fail_remaining(&mut report, index, &e);
                        break;
                    }
                }
            }

            let result = match make_context().await {
                Ok(ctx) => scenario.run(ctx).await,
                Err(e) => ScenarioReport::setup_failed(scenario.name(), &e),
            };
            let failed = result.status.is_failure();
            report.scenarios.push(result);

            if failed && self.failure_mode == FailureMode::StopOnFirst {
                for rest in &self.scenarios[index + 1..] {
                    report.scenarios.push(ScenarioReport::skipped(rest.name()));
                }
                break;
            }
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "suite finished"
        );
        report
    }

    fn fail_remaining(&self, report: &mut SuiteReport, from: usize, err: &ProbeError) {
        for scenario in &self.scenarios[from..] {
            report
                .scenarios
                .push(ScenarioReport::setup_failed(scenario.name(), err));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixture::{Dataset, FakeStore, InMemorySeeder, Seeder};
    use async_trait::async_trait;

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_legal_path() {
            let mut lc = Lifecycle::new();
            lc.advance(ScenarioState::Running).unwrap();
            lc.advance(ScenarioState::Failed).unwrap();
            lc.advance(ScenarioState::TornDown).unwrap();
            assert_eq!(lc.state(), ScenarioState::TornDown);
            assert_eq!(lc.history().len(), 4);
        }

        #[test]
        fn test_illegal_transitions() {
            let mut lc = Lifecycle::new();
            assert!(lc.advance(ScenarioState::Passed).is_err());
            assert!(lc.advance(ScenarioState::TornDown).is_err());
            lc.advance(ScenarioState::Running).unwrap();
            assert!(lc.advance(ScenarioState::Running).is_err());
            assert!(!ScenarioState::TornDown.can_transition_to(ScenarioState::Running));
        }
    }

    mod context_tests {
        use super::*;

        #[test]
        fn test_page_less_context() {
            let ctx = ScenarioContext::new();
            assert!(matches!(
                ctx.page().unwrap_err(),
                ProbeError::InvalidState { .. }
            ));
        }

        #[test]
        fn test_remember_and_recall() {
            let ctx = ScenarioContext::new();
            ctx.remember("baseline", &5_i64).unwrap();
            let shared = ctx.clone();
            assert_eq!(shared.recall::<i64>("baseline").unwrap(), 5);
            assert!(ctx.recall::<i64>("missing").is_err());
        }
    }

    mod scenario_tests {
        use super::*;

        #[tokio::test]
        async fn test_steps_run_in_order() {
            let events = log();
            let (a, b) = (events.clone(), events.clone());
            let scenario = Scenario::new("ordered")
                .step("one", move |_| {
                    let a = a.clone();
                    async move {
                        push(&a, "one");
                        Ok(())
                    }
                })
                .step("two", move |_| {
                    let b = b.clone();
                    async move {
                        push(&b, "two");
                        Ok(())
                    }
                });

            let report = scenario.run(ScenarioContext::new()).await;
            assert!(report.passed());
            assert_eq!(*events.lock().unwrap(), vec!["one", "two"]);
            assert_eq!(
                report.states,
                vec![
                    ScenarioState::Initialized,
                    ScenarioState::Running,
                    ScenarioState::Passed,
                    ScenarioState::TornDown
                ]
            );
        }

        #[tokio::test]
        async fn test_first_error_halts_and_teardowns_run_in_reverse() {
            let events = log();
            let (a, c) = (events.clone(), events.clone());
            let scenario = Scenario::new("halts")
                .step("register cleanups", move |ctx| {
                    let a = a.clone();
                    async move {
                        for name in ["first", "second", "third"] {
                            let a = a.clone();
                            ctx.defer(name, move || async move {
                                push(&a, name);
                                if name == "second" {
                                    return Err(ProbeError::driver("cleanup broke"));
                                }
                                Ok(())
                            });
                        }
                        Ok(())
                    }
                })
                .step("boom", |_| async {
                    Err(ProbeError::AssertionMismatch {
                        target: "likes".into(),
                        expected: "6".into(),
                        actual: "7".into(),
                    })
                })
                .step("never", move |_| {
                    let c = c.clone();
                    async move {
                        push(&c, "never");
                        Ok(())
                    }
                });

            let report = scenario.run(ScenarioContext::new()).await;
            assert_eq!(report.status, ScenarioStatus::Failed);
            assert_eq!(*events.lock().unwrap(), vec!["third", "second", "first"]);

            let error = report.error.unwrap();
            assert_eq!(error.kind, ErrorKind::Assertion);
            assert_eq!(error.step.as_deref(), Some("boom"));
            assert_eq!(report.teardown_failures.len(), 1);
            assert_eq!(report.teardown_failures[0].name, "second");
            assert_eq!(report.steps[2].status, StepStatus::Skipped);
            assert_eq!(report.diagnostic.unwrap().step, "boom");
        }

        #[tokio::test]
        async fn test_panicking_step_still_tears_down() {
            let events = log();
            let a = events.clone();
            let scenario = Scenario::new("panics")
                .step("setup", move |ctx| {
                    let a = a.clone();
                    async move {
                        ctx.defer("cleanup", move || async move {
                            push(&a, "cleanup");
                            Ok(())
                        });
                        Ok(())
                    }
                })
                .step("explode", |_| async {
                    let fuse: Option<()> = None;
                    if fuse.is_none() {
                        panic!("kaboom");
                    }
                    Ok(())
                });

            let report = scenario.run(ScenarioContext::new()).await;
            assert_eq!(report.status, ScenarioStatus::Failed);
            assert!(report.error.unwrap().message.contains("kaboom"));
            assert_eq!(*events.lock().unwrap(), vec!["cleanup"]);
        }

        #[tokio::test]
        async fn test_teardown_failure_does_not_fail_passing_scenario() {
            let scenario = Scenario::new("dirty").step("ok", |ctx| async move {
                ctx.defer("bad", || async { Err(ProbeError::driver("nope")) });
                Ok(())
            });
            let report = scenario.run(ScenarioContext::new()).await;
            assert!(report.passed());
            assert_eq!(report.teardown_failures.len(), 1);
        }
    }

    mod suite_tests {
        use super::*;

        #[derive(Debug)]
        struct BrokenSeeder;

        #[async_trait]
        impl Seeder for BrokenSeeder {
            fn store(&self) -> &str {
                "broken"
            }

            async fn seed(&self) -> ProbeResult<SeedReport> {
                Err(ProbeError::SeedFailed {
                    command: "npm run seed --workspace=server".into(),
                    exit_code: Some(2),
                    output: "ECONNREFUSED".into(),
                })
            }
        }

        fn passing(name: &str) -> Scenario {
            Scenario::new(name).step("ok", |_| async { Ok(()) })
        }

        fn failing(name: &str) -> Scenario {
            Scenario::new(name).step("fail", |_| async { Err(ProbeError::driver("down")) })
        }

        #[tokio::test]
        async fn test_seed_failure_marks_every_scenario() {
            let ran = log();
            let r = ran.clone();
            let suite = Suite::new("seeded")
                .seeder(Arc::new(BrokenSeeder), SeedScope::PerSuite)
                .scenario(Scenario::new("a").step("s", move |_| {
                    let r = r.clone();
                    async move {
                        push(&r, "ran");
                        Ok(())
                    }
                }))
                .scenario(passing("b"));

            let report = suite.run(|| async { Ok(ScenarioContext::new()) }).await;
            assert_eq!(report.failed(), 2);
            assert!(ran.lock().unwrap().is_empty());
            for scenario in &report.scenarios {
                assert_eq!(scenario.status, ScenarioStatus::SetupFailed);
                let error = scenario.error.as_ref().unwrap();
                assert_eq!(error.kind, ErrorKind::ExternalProcess);
                assert_eq!(error.exit_code, Some(2));
                assert_eq!(error.output.as_deref(), Some("ECONNREFUSED"));
            }
        }

        #[tokio::test]
        async fn test_per_scenario_seeding() {
            let store = FakeStore::new("suite-per-scenario");
            let seeder = InMemorySeeder::new(store.clone(), Dataset::blog_baseline());
            let s = store.clone();
            let suite = Suite::new("reseed")
                .seeder(Arc::new(seeder), SeedScope::PerScenario)
                .scenario(Scenario::new("dirty").step("mutate", move |_| {
                    let s = s.clone();
                    async move {
                        s.with(|d| d.blogs.clear());
                        Ok(())
                    }
                }))
                .scenario(passing("clean"));

            let report = suite.run(|| async { Ok(ScenarioContext::new()) }).await;
            assert!(report.is_success());
            assert_eq!(report.seeds.len(), 2);
            assert_eq!(report.seeds[0].fingerprint, report.seeds[1].fingerprint);
            assert_eq!(store.snapshot().blogs.len(), 9);
        }

        #[tokio::test]
        async fn test_failure_modes() {
            let suite = Suite::new("modes")
                .scenario(failing("first"))
                .scenario(passing("second"));

            let all = suite.run(|| async { Ok(ScenarioContext::new()) }).await;
            assert_eq!((all.passed(), all.failed(), all.skipped()), (1, 1, 0));

            let stop = suite
                .clone()
                .failure_mode(FailureMode::StopOnFirst)
                .run(|| async { Ok(ScenarioContext::new()) })
                .await;
            assert_eq!((stop.passed(), stop.failed(), stop.skipped()), (0, 1, 1));
        }

        #[tokio::test]
        async fn test_report_json_round_trip() {
            let suite = Suite::new("json").scenario(failing("x"));
            let report = suite.run(|| async { Ok(ScenarioContext::new()) }).await;
            let parsed = SuiteReport::from_json(&report.to_json().unwrap()).unwrap();
            assert_eq!(parsed.suite, "json");
            assert_eq!(parsed.run_id, report.run_id);
            assert_eq!(report.run_id.len(), 36);
            assert_eq!(parsed.scenarios[0].status, ScenarioStatus::Failed);
            assert_eq!(parsed.scenarios[0].steps[0].name, "fail");
        }
    }
}
