//! Suite runner: wires configuration, seeding and reporting around a suite

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use blogprobe::contract;
use blogprobe::reporter::load_report;
use blogprobe::{
    BlogApi, ProbeConfig, ProbeResult, ScenarioContext, Seeder, Suite, SuiteReport,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Outcome of `blogprobe seed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOutcome {
    /// Commands run per seed
    pub commands: usize,
    /// Listing fingerprint, when verified
    pub fingerprint: Option<String>,
}

/// Runs blogprobe suites against the configured application
#[derive(Debug)]
pub struct SuiteRunner {
    probe: ProbeConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a runner from CLI flags; loads the effective configuration
    pub fn new(config: &CliConfig) -> CliResult<Self> {
        let probe = config.load_probe_config()?;
        Ok(Self::with_probe_config(config, probe))
    }

    /// Create a runner with an already-loaded configuration
    #[must_use]
    pub fn with_probe_config(config: &CliConfig, probe: ProbeConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { probe, reporter }
    }

    /// Effective configuration
    #[must_use]
    pub const fn probe_config(&self) -> &ProbeConfig {
        &self.probe
    }

    /// Get the reporter (for testing)
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Effective configuration as YAML
    pub fn show_config(&self) -> CliResult<String> {
        Ok(self.probe.to_yaml()?)
    }

    /// Render a stored report
    pub fn show_report(path: &Path, format: OutputFormat) -> CliResult<String> {
        if !path.exists() {
            return Err(CliError::invalid_argument(format!(
                "report {} does not exist",
                path.display()
            )));
        }
        let report = load_report(path)?;
        format.render(&report).map_err(|e| CliError::Probe(e.into()))
    }

    fn api(&self) -> CliResult<BlogApi> {
        Ok(BlogApi::new(self.probe.api_url.clone(), self.probe.timeout())?)
    }

    /// Reset and seed the application store.
    ///
    /// With `verify`, seeds twice and compares the API listing fingerprint
    /// taken after each seed.
    pub async fn run_seed(&mut self, verify: bool) -> CliResult<SeedOutcome> {
        let seeder = self.probe.command_seeder();
        if seeder.commands().is_empty() {
            return Err(CliError::config("seed.commands is empty"));
        }

        self.reporter.start_spinner(&format!("seeding {}", seeder.store()));
        let result = self.seed_with(&seeder, verify).await;
        self.reporter.finish();

        let outcome = result?;
        match &outcome.fingerprint {
            Some(fingerprint) => self
                .reporter
                .success(&format!("seeding is idempotent ({fingerprint})")),
            None => self.reporter.success(&format!(
                "seeded {} ({} commands)",
                seeder.store(),
                outcome.commands
            )),
        }
        Ok(outcome)
    }

    async fn seed_with(&self, seeder: &dyn Seeder, verify: bool) -> CliResult<SeedOutcome> {
        let report = seeder.seed().await?;
        let commands = report.commands.len();
        if !verify {
            return Ok(SeedOutcome {
                commands,
                fingerprint: None,
            });
        }

        let api = self.api()?;
        let first = api.dataset_fingerprint().await?;
        let _ = seeder.seed().await?;
        let second = api.dataset_fingerprint().await?;
        tracing::info!(%first, %second, "seed fingerprints");
        if first != second {
            return Err(CliError::NotIdempotent { first, second });
        }
        Ok(SeedOutcome {
            commands,
            fingerprint: Some(first),
        })
    }

    fn prepare(&self, suite: Suite) -> Suite {
        let suite = suite.failure_mode(self.probe.failure_mode);
        if self.probe.seed.commands.is_empty() {
            return suite;
        }
        suite.seeder(Arc::new(self.probe.command_seeder()), self.probe.seed.scope)
    }

    async fn execute<F, Fut>(&mut self, suite: Suite, make_context: F) -> CliResult<SuiteReport>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProbeResult<ScenarioContext>>,
    {
        let suite = self.prepare(suite);
        self.reporter.header(&format!("Suite {}", suite.name()));
        self.reporter.start_spinner(&format!(
            "running {} scenarios",
            suite.scenarios().len()
        ));
        let mut report = suite.run(make_context).await;
        self.reporter.finish();

        let written = self.probe.artifact_store().write(&mut report)?;
        for scenario in &report.scenarios {
            self.reporter.scenario(scenario);
        }
        self.reporter.summary(&report);
        self.reporter
            .info(&format!("report: {}", written.report.display()));
        if let Some(junit) = &written.junit {
            self.reporter.info(&format!("junit: {}", junit.display()));
        }

        if report.is_success() {
            Ok(report)
        } else {
            Err(CliError::SuiteFailed {
                suite: report.suite.clone(),
                failed: report.failed(),
                total: report.scenarios.len(),
            })
        }
    }

    /// Run the API contract suite and write its report
    pub async fn run_contract(&mut self) -> CliResult<SuiteReport> {
        let api = self.api()?;
        let suite = contract::contract_suite(&api, &self.probe.credentials);
        self.execute(suite, || async { Ok(ScenarioContext::new()) })
            .await
    }

    /// Run the UI suite in Chromium, one browser per scenario
    #[cfg(feature = "browser")]
    pub async fn run_ui(&mut self) -> CliResult<SuiteReport> {
        use blogprobe::{browser, suites, Driver, Page};

        let suite = suites::ui_suite(&self.probe.credentials);
        let driver_config = self.probe.driver_config();
        let base_url = self.probe.base_url.clone();
        let options = self.probe.locator_options();
        self.execute(suite, move || {
            let driver_config = driver_config.clone();
            let base_url = base_url.clone();
            let options = options.clone();
            async move {
                let driver = browser::launch(driver_config).await?;
                let page = Page::new(Arc::clone(&driver), base_url).with_options(options);
                let ctx = ScenarioContext::with_page(page);
                ctx.defer("close browser", move || async move { driver.close().await });
                Ok(ctx)
            }
        })
        .await
    }
}
