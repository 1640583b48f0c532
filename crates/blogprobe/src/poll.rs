//! Assertion poller.
//!
//! Every wait in the crate goes through here: actionability checks, `expect`
//! assertions, URL and response waits. A probe re-reads the live state on
//! each attempt; the poller owns the clock, the backoff schedule and the
//! shape of the failure.
//!
//! Time is measured with `tokio::time`, so tests running on a paused clock
//! observe exact attempt timings.

use crate::result::{ErrorKind, ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for actions and assertions (10 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default delays between attempts; the last one repeats
pub const DEFAULT_BACKOFF_MS: [u64; 6] = [0, 20, 50, 100, 100, 500];

// =============================================================================
// OPTIONS
// =============================================================================

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every time
    Fixed {
        /// Delay in milliseconds
        interval_ms: u64,
    },
    /// Increasing delays, last value repeats
    Stepped {
        /// Delays in milliseconds
        steps_ms: Vec<u64>,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Stepped {
            steps_ms: DEFAULT_BACKOFF_MS.to_vec(),
        }
    }
}

impl Backoff {
    /// Delay to wait after the `retry`-th failed attempt (0-based)
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let ms = match self {
            Self::Fixed { interval_ms } => *interval_ms,
            Self::Stepped { steps_ms } => steps_ms
                .get(retry as usize)
                .or_else(|| steps_ms.last())
                .copied()
                .unwrap_or(DEFAULT_BACKOFF_MS[DEFAULT_BACKOFF_MS.len() - 1]),
        };
        Duration::from_millis(ms)
    }
}

/// Options for a single wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Overall deadline
    pub timeout: Duration,
    /// Delay schedule
    pub backoff: Backoff,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            backoff: Backoff::default(),
        }
    }
}

impl PollOptions {
    /// Create new options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the deadline in milliseconds
    #[must_use]
    pub fn with_timeout_ms(self, ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(ms))
    }

    /// Set the delay schedule
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

// =============================================================================
// PROBE RESULTS
// =============================================================================

/// What a single probe evaluation found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T> {
    /// Condition holds
    Pass(T),
    /// Not yet; try again
    Pending {
        /// Description of the observed state
        observed: String,
    },
    /// Can never hold from here; stop now
    Terminal {
        /// Description of the observed state
        observed: String,
    },
}

impl<T> Check<T> {
    /// Pending with an observation
    pub fn pending(observed: impl Into<String>) -> Self {
        Self::Pending {
            observed: observed.into(),
        }
    }

    /// Terminal with an observation
    pub fn terminal(observed: impl Into<String>) -> Self {
        Self::Terminal {
            observed: observed.into(),
        }
    }
}

/// What is being waited for; used to build failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Subject, usually a selector description
    pub target: String,
    /// Verb phrase (`have text`, `be visible`, ...)
    pub condition: String,
    /// Expected value or state
    pub expected: String,
}

impl Condition {
    /// Describe a wait
    pub fn new(
        target: impl Into<String>,
        condition: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            condition: condition.into(),
            expected: expected.into(),
        }
    }

    fn timeout(&self, actual: String, elapsed: Duration, attempts: u32) -> ProbeError {
        ProbeError::Timeout {
            target: self.target.clone(),
            condition: self.condition.clone(),
            expected: self.expected.clone(),
            actual,
            elapsed_ms: elapsed.as_millis() as u64,
            attempts,
        }
    }
}

/// Successful wait outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    /// Value produced by the passing evaluation
    pub value: T,
    /// Number of evaluations, including the passing one
    pub attempts: u32,
    /// Time from the first evaluation to success
    pub elapsed: Duration,
}

// =============================================================================
// CLOCK
// =============================================================================

struct Clock<'a> {
    start: Instant,
    deadline: Instant,
    attempts: u32,
    backoff: &'a Backoff,
}

impl<'a> Clock<'a> {
    fn start(options: &'a PollOptions) -> Self {
        let start = Instant::now();
        Self {
            start,
            deadline: start + options.timeout,
            attempts: 0,
            backoff: &options.backoff,
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleep before the next attempt; `false` once the deadline has passed
    async fn pause(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let delay = self
            .backoff
            .delay(self.attempts.saturating_sub(1))
            .min(self.deadline - now);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        true
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Evaluate `probe` until it passes, turns terminal, or the deadline passes.
///
/// The first evaluation happens immediately, so a condition that already
/// holds succeeds after exactly one attempt. A retryable probe error
/// ([`ProbeError::Detached`]) counts as an observation; any other error
/// aborts the wait.
pub async fn wait_until<T, F, Fut>(
    what: &Condition,
    options: &PollOptions,
    mut probe: F,
) -> ProbeResult<Polled<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<Check<T>>>,
{
    let mut clock = Clock::start(options);
    loop {
        clock.attempts += 1;
        let last = match probe().await {
            Ok(Check::Pass(value)) => {
                tracing::debug!(
                    target_desc = %what.target,
                    condition = %what.condition,
                    attempts = clock.attempts,
                    "condition met"
                );
                return Ok(Polled {
                    value,
                    attempts: clock.attempts,
                    elapsed: clock.elapsed(),
                });
            }
            Ok(Check::Pending { observed }) => observed,
            Ok(Check::Terminal { observed }) => {
                return Err(ProbeError::AssertionMismatch {
                    target: what.target.clone(),
                    expected: what.expected.clone(),
                    actual: observed,
                });
            }
            Err(e) if e.is_retryable() => e.to_string(),
            Err(e) => return Err(e),
        };
        tracing::debug!(
            target_desc = %what.target,
            attempt = clock.attempts,
            observed = %last,
            "condition pending"
        );
        if !clock.pause().await {
            return Err(what.timeout(last, clock.elapsed(), clock.attempts));
        }
    }
}

/// Re-run a whole assertion block until it succeeds or the deadline passes;
/// the block's last error is returned on timeout.
///
/// Selector errors are returned at once since no retry can fix them.
pub async fn retry_block<T, F, Fut>(
    description: &str,
    options: &PollOptions,
    mut block: F,
) -> ProbeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<T>>,
{
    let mut clock = Clock::start(options);
    loop {
        clock.attempts += 1;
        match block().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == ErrorKind::Selector => return Err(e),
            Err(e) => {
                tracing::debug!(block = description, attempt = clock.attempts, error = %e, "block failed");
                if !clock.pause().await {
                    return Err(e);
                }
            }
        }
    }
}

/// Read a value until two consecutive reads agree
pub async fn stable_value<T, F, Fut>(
    description: &str,
    options: &PollOptions,
    mut read: F,
) -> ProbeResult<T>
where
    T: PartialEq + Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<T>>,
{
    let mut clock = Clock::start(options);
    let mut previous: Option<T> = None;
    loop {
        clock.attempts += 1;
        match read().await {
            Ok(value) => {
                if previous.as_ref() == Some(&value) {
                    return Ok(value);
                }
                previous = Some(value);
            }
            Err(e) if e.is_retryable() => previous = None,
            Err(e) => return Err(e),
        }
        if !clock.pause().await {
            let what = Condition::new(description, "settle", "two equal consecutive reads");
            return Err(what.timeout(format!("{previous:?}"), clock.elapsed(), clock.attempts));
        }
    }
}
