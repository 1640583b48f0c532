//! External fixture seeding.
//!
//! A [`Seeder`] puts the application's backing store into a known baseline
//! before a suite or scenario starts. Two implementations ship here:
//!
//! - [`CommandSeeder`] runs the application's own reset and seed scripts as
//!   subprocesses, in order, stopping at the first failure.
//! - [`InMemorySeeder`] replaces the contents of a [`FakeStore`] with a fixed
//!   [`Dataset`], for tests that run against an in-process fake.
//!
//! Seeding the same store from two places at once would interleave resets and
//! inserts, so every seeder takes a process-wide lock keyed by store name.

use crate::result::{ProbeError, ProbeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

/// Default reset command for the blog server workspace
pub const DEFAULT_RESET_COMMAND: &str = "npm run reset --workspace=server";

/// Default seed command for the blog server workspace
pub const DEFAULT_SEED_COMMAND: &str = "npm run seed --workspace=server";

/// When seeding happens relative to scenarios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedScope {
    /// Once before the first scenario of a suite
    #[default]
    PerSuite,
    /// Before every scenario
    PerScenario,
}

/// One command a seeder ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRun {
    /// Command line
    pub command: String,
    /// Exit code
    pub exit_code: Option<i32>,
    /// Wall time
    pub elapsed_ms: u64,
}

/// Outcome of a successful seed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Store that was seeded
    pub store: String,
    /// Commands run, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRun>,
    /// Fingerprint of the resulting dataset, when the seeder can compute one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Total wall time including time spent waiting for the store lock
    pub elapsed_ms: u64,
}

/// Puts a backing store into its baseline state
#[async_trait]
pub trait Seeder: Send + Sync + Debug {
    /// Name of the store this seeder owns; seeds of the same store never overlap
    fn store(&self) -> &str;

    /// Reset and seed. Idempotent: two consecutive calls leave the same data.
    async fn seed(&self) -> ProbeResult<SeedReport>;
}

/// Shared seeder handle
pub type SharedSeeder = Arc<dyn Seeder>;

fn store_locks() -> &'static Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Acquire the process-wide lock for `store`
pub async fn lock_store(store: &str) -> OwnedMutexGuard<()> {
    let lock = {
        let mut locks = store_locks().lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(store.to_string()).or_default())
    };
    lock.lock_owned().await
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// =============================================================================
// Subprocess seeding
// =============================================================================

/// Runs reset/seed scripts as subprocesses.
///
/// Each command line runs through the platform shell (`sh -c`, or `cmd /C`
/// on Windows), so `&&` chains and redirects behave as typed. Each command
/// must exit 0; the first that does not aborts the seed
/// with [`ProbeError::SeedFailed`] and later commands are skipped.
#[derive(Debug, Clone)]
pub struct CommandSeeder {
    store: String,
    commands: Vec<String>,
    workdir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    command_timeout: Option<Duration>,
}

impl Default for CommandSeeder {
    fn default() -> Self {
        Self::new(
            "blog-server",
            vec![DEFAULT_RESET_COMMAND.to_string(), DEFAULT_SEED_COMMAND.to_string()],
        )
    }
}

impl CommandSeeder {
    /// Seeder for `store` running `commands` in order
    #[must_use]
    pub fn new(store: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            store: store.into(),
            commands,
            workdir: None,
            log_file: None,
            command_timeout: None,
        }
    }

    /// Working directory for every command
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Append command output to this file
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Kill a command that runs longer than `timeout`
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Configured command lines
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    async fn append_log(&self, command: &str, exit_code: Option<i32>, output: &str) -> ProbeResult<()> {
        let Some(path) = &self.log_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let entry = format!(
            "[{}] $ {command} (exit {})\n{output}\n",
            chrono::Utc::now().to_rfc3339(),
            exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
        );
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn run_one(&self, line: &str) -> ProbeResult<CommandRun> {
        let failed = |exit_code, output: String| ProbeError::SeedFailed {
            command: line.to_string(),
            exit_code,
            output,
        };
        if line.trim().is_empty() {
            return Err(failed(None, "empty command line".to_string()));
        }

        let mut cmd = shell_command(line);
        let _ = cmd.kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            let _ = cmd.current_dir(dir);
        }

        let start = Instant::now();
        tracing::info!(command = line, "running seed command");
        let run = cmd.output();
        let result = match self.command_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    let message = format!("killed after {}ms", limit.as_millis());
                    self.append_log(line, None, &message).await?;
                    return Err(failed(None, message));
                }
            },
            None => run.await,
        };
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let message = format!("could not start shell: {e}");
                self.append_log(line, None, &message).await?;
                return Err(failed(None, message));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code();
        self.append_log(line, exit_code, &text).await?;

        if !output.status.success() {
            tracing::error!(command = line, ?exit_code, "seed command failed");
            return Err(failed(exit_code, text));
        }
        Ok(CommandRun {
            command: line.to_string(),
            exit_code,
            elapsed_ms: elapsed_ms(start),
        })
    }
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    let _ = cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    let _ = cmd.arg("/C").arg(line);
    cmd
}

#[async_trait]
impl Seeder for CommandSeeder {
    fn store(&self) -> &str {
        &self.store
    }

    async fn seed(&self) -> ProbeResult<SeedReport> {
        let start = Instant::now();
        let _guard = lock_store(&self.store).await;
        let mut commands = Vec::with_capacity(self.commands.len());
        for line in &self.commands {
            commands.push(self.run_one(line).await?);
        }
        Ok(SeedReport {
            store: self.store.clone(),
            commands,
            fingerprint: None,
            elapsed_ms: elapsed_ms(start),
        })
    }
}

// =============================================================================
// In-memory seeding
// =============================================================================

/// A seeded account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUser {
    /// Login name
    pub username: String,
    /// Plain-text password the fake backend compares against
    pub password: String,
    /// `admin` or `user`
    pub role: String,
}

/// A seeded blog post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedBlog {
    /// Numeric id
    pub id: u64,
    /// Title
    pub title: String,
    /// Body
    pub content: String,
    /// Teaser
    pub excerpt: String,
    /// Category name
    pub category: String,
    /// Like counter
    pub likes: i64,
    /// View counter
    pub views: i64,
    /// Visible on the public listing
    pub published: bool,
}

/// A seeded comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedComment {
    /// Owning blog
    pub blog_id: u64,
    /// Display name
    pub author: String,
    /// Body
    pub content: String,
}

/// Contents of a blog store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Accounts
    pub users: Vec<SeedUser>,
    /// Posts
    pub blogs: Vec<SeedBlog>,
    /// Comments
    pub comments: Vec<SeedComment>,
}

impl Dataset {
    /// The baseline the blog server's seed script produces: one admin and
    /// nine published posts, enough to span two pages of eight.
    #[must_use]
    pub fn blog_baseline() -> Self {
        let categories = ["Technology", "Travel", "Food"];
        let blogs = (1..=9)
            .map(|id| SeedBlog {
                id,
                title: format!("Seeded Post {id}"),
                content: format!("Body of seeded post {id}."),
                excerpt: format!("Excerpt {id}"),
                category: categories[(id as usize - 1) % categories.len()].to_string(),
                likes: 0,
                views: 0,
                published: true,
            })
            .collect();
        Self {
            users: vec![SeedUser {
                username: "admin".into(),
                password: "admin123".into(),
                role: "admin".into(),
            }],
            blogs,
            comments: vec![SeedComment {
                blog_id: 1,
                author: "Reader".into(),
                content: "First!".into(),
            }],
        }
    }

    /// SHA-256 over the canonical JSON encoding, hex encoded
    pub fn fingerprint(&self) -> ProbeResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Look up a blog
    #[must_use]
    pub fn blog(&self, id: u64) -> Option<&SeedBlog> {
        self.blogs.iter().find(|b| b.id == id)
    }

    /// Look up a blog for mutation
    pub fn blog_mut(&mut self, id: u64) -> Option<&mut SeedBlog> {
        self.blogs.iter_mut().find(|b| b.id == id)
    }
}

/// Shared in-memory store a fake backend reads and writes
#[derive(Debug, Clone)]
pub struct FakeStore {
    name: String,
    data: Arc<Mutex<Dataset>>,
}

impl FakeStore {
    /// Empty store
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(Mutex::new(Dataset::default())),
        }
    }

    /// Store name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Dataset {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Mutate under the lock
    pub fn with<R>(&self, f: impl FnOnce(&mut Dataset) -> R) -> R {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data)
    }

    /// Replace the contents
    pub fn replace(&self, dataset: Dataset) {
        self.with(|data| *data = dataset);
    }

    /// Fingerprint of the current contents
    pub fn fingerprint(&self) -> ProbeResult<String> {
        self.snapshot().fingerprint()
    }
}

/// Seeds a [`FakeStore`] with a fixed baseline
#[derive(Debug, Clone)]
pub struct InMemorySeeder {
    store: FakeStore,
    baseline: Dataset,
    latency: Duration,
}

impl InMemorySeeder {
    /// Seeder restoring `baseline` into `store`
    #[must_use]
    pub fn new(store: FakeStore, baseline: Dataset) -> Self {
        Self {
            store,
            baseline,
            latency: Duration::ZERO,
        }
    }

    /// Simulated time a seed takes
    #[must_use]
    pub const fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl Seeder for InMemorySeeder {
    fn store(&self) -> &str {
        self.store.name()
    }

    async fn seed(&self) -> ProbeResult<SeedReport> {
        let start = Instant::now();
        let _guard = lock_store(self.store.name()).await;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.store.replace(self.baseline.clone());
        let fingerprint = self.store.fingerprint()?;
        tracing::debug!(store = self.store.name(), %fingerprint, "store seeded");
        Ok(SeedReport {
            store: self.store.name().to_string(),
            commands: Vec::new(),
            fingerprint: Some(fingerprint),
            elapsed_ms: elapsed_ms(start),
        })
    }
}
