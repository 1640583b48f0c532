//! Run configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `BLOGPROBE_*` environment variables.

use crate::driver::DriverConfig;
use crate::fixture::{CommandSeeder, SeedScope, DEFAULT_RESET_COMMAND, DEFAULT_SEED_COMMAND};
use crate::locator::LocatorOptions;
use crate::poll::{Backoff, PollOptions, DEFAULT_TIMEOUT_MS};
use crate::reporter::{ArtifactStore, FailureMode, TraceMode};
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "BLOGPROBE_BASE_URL";
/// Environment variable overriding `api_url`
pub const ENV_API_URL: &str = "BLOGPROBE_API_URL";
/// Environment variable overriding `timeout_ms`
pub const ENV_TIMEOUT_MS: &str = "BLOGPROBE_TIMEOUT_MS";
/// Environment variable overriding `output_dir`
pub const ENV_OUTPUT_DIR: &str = "BLOGPROBE_OUTPUT_DIR";

/// Browser viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Login used by UI and contract scenarios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin123".to_string(),
        }
    }
}

/// How the application's store is reset before runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Lock name for the store
    pub store: String,
    /// Commands, run in order
    pub commands: Vec<String>,
    /// Working directory for the commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    /// Append command output here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Per-command time limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_ms: Option<u64>,
    /// When to seed
    pub scope: SeedScope,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            store: "blog-server".to_string(),
            commands: vec![
                DEFAULT_RESET_COMMAND.to_string(),
                DEFAULT_SEED_COMMAND.to_string(),
            ],
            workdir: None,
            log_file: Some(PathBuf::from("test-setup.log")),
            command_timeout_ms: None,
            scope: SeedScope::PerSuite,
        }
    }
}

/// Everything a run needs to know about its target and outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Blog client origin
    pub base_url: String,
    /// Blog API origin
    pub api_url: String,
    /// Browser viewport
    pub viewport: Viewport,
    /// Run the browser without a window
    pub headless: bool,
    /// Default wait deadline
    pub timeout_ms: u64,
    /// Delay schedule between attempts
    pub backoff: Backoff,
    /// Root of the artifact tree
    pub output_dir: PathBuf,
    /// Write a capture when a scenario fails
    pub capture_on_failure: bool,
    /// Step trace retention
    pub trace: TraceMode,
    /// Behaviour after a failing scenario
    pub failure_mode: FailureMode,
    /// Also write JUnit XML
    pub junit: bool,
    /// Store reset
    pub seed: SeedConfig,
    /// Login
    pub credentials: Credentials,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:3001".to_string(),
            viewport: Viewport::default(),
            headless: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            backoff: Backoff::default(),
            output_dir: PathBuf::from("target/blogprobe"),
            capture_on_failure: true,
            trace: TraceMode::RetainOnFailure,
            failure_mode: FailureMode::CollectAll,
            junit: false,
            seed: SeedConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

impl ProbeConfig {
    /// Parse YAML; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> ProbeResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> ProbeResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ProbeError::config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_yaml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        tracing::debug!(base_url = %config.base_url, api_url = %config.api_url, "configuration loaded");
        Ok(config)
    }

    /// Apply `BLOGPROBE_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ProbeResult<()> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw.trim().parse().map_err(|_| {
                ProbeError::config(format!("{ENV_TIMEOUT_MS} must be milliseconds, got {raw:?}"))
            })?;
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        self.validate()
    }

    /// Reject values no run could use
    pub fn validate(&self) -> ProbeResult<()> {
        for (key, url) in [("base_url", &self.base_url), ("api_url", &self.api_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ProbeError::config(format!(
                    "{key} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.timeout_ms == 0 {
            return Err(ProbeError::config("timeout_ms must be positive"));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ProbeError::config("viewport must be non-empty"));
        }
        if let Backoff::Stepped { steps_ms } = &self.backoff {
            if steps_ms.is_empty() {
                return Err(ProbeError::config("backoff steps must not be empty"));
            }
        }
        Ok(())
    }

    /// Default wait deadline
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Locator defaults
    #[must_use]
    pub fn locator_options(&self) -> LocatorOptions {
        LocatorOptions {
            timeout: self.timeout(),
            backoff: self.backoff.clone(),
            strict: true,
        }
    }

    /// Poll defaults for non-locator waits
    #[must_use]
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::new()
            .with_timeout(self.timeout())
            .with_backoff(self.backoff.clone())
    }

    /// Browser launch settings
    #[must_use]
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig::new()
            .headless(self.headless)
            .viewport(self.viewport.width, self.viewport.height)
    }

    /// Subprocess seeder from the `seed` section
    #[must_use]
    pub fn command_seeder(&self) -> CommandSeeder {
        let mut seeder = CommandSeeder::new(self.seed.store.clone(), self.seed.commands.clone());
        if let Some(dir) = &self.seed.workdir {
            seeder = seeder.workdir(dir);
        }
        if let Some(log) = &self.seed.log_file {
            seeder = seeder.log_file(self.seed.workdir.as_ref().map_or_else(|| log.clone(), |d| d.join(log)));
        }
        if let Some(ms) = self.seed.command_timeout_ms {
            seeder = seeder.command_timeout(Duration::from_millis(ms));
        }
        seeder
    }

    /// Artifact writer rooted at `output_dir`
    #[must_use]
    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.output_dir)
            .capture_on_failure(self.capture_on_failure)
            .trace(self.trace)
            .junit(self.junit)
    }
}
