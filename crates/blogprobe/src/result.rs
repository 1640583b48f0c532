//! Result and error types for blogprobe.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for blogprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while resolving, acting, asserting or seeding
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Malformed selector, rejected at construction
    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector {
        /// Selector source as written
        selector: String,
        /// What is wrong with it
        reason: String,
    },

    /// A poll or precondition never held before the deadline
    #[error(
        "Timed out after {elapsed_ms}ms ({attempts} attempts) waiting for {target} to {condition}: expected {expected}, last observed {actual}"
    )]
    Timeout {
        /// What was being waited on (usually a selector description)
        target: String,
        /// The unmet condition
        condition: String,
        /// Expected value or state
        expected: String,
        /// Last observed value or state
        actual: String,
        /// Time spent waiting
        elapsed_ms: u64,
        /// Number of evaluations performed
        attempts: u32,
    },

    /// The element existed but refused the action
    #[error("{action} on {selector} was rejected: {reason}")]
    ActionRejected {
        /// Selector description
        selector: String,
        /// Action name
        action: String,
        /// Why the element could not take the action
        reason: String,
    },

    /// External seed/reset command exited unsuccessfully
    #[error("Seed command `{command}` failed with exit code {exit_code:?}:\n{output}")]
    SeedFailed {
        /// Command line that failed
        command: String,
        /// Exit code (None when killed by a signal)
        exit_code: Option<i32>,
        /// Captured stdout and stderr
        output: String,
    },

    /// The state settled on a value that can never match
    #[error("Assertion failed for {target}: expected {expected}, got {actual}")]
    AssertionMismatch {
        /// What was asserted on
        target: String,
        /// Expected value
        expected: String,
        /// Actual value
        actual: String,
    },

    /// The node targeted by an action disappeared between resolution and dispatch
    #[error("Element for {selector} detached from the document")]
    Detached {
        /// Selector description
        selector: String,
    },

    /// Driver-level failure (browser, CDP, in-memory page)
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Navigation failure
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Operation called in the wrong state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// HTTP transport error talking to the target application
    #[cfg(feature = "api")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Coarse error category used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed selector
    Selector,
    /// Poll or precondition deadline exceeded
    Timeout,
    /// Element refused the action
    ActionRejected,
    /// Seed/reset subprocess failed
    ExternalProcess,
    /// Settled state does not match
    Assertion,
    /// Browser or page failure
    Driver,
    /// Setup or configuration problem
    Setup,
    /// Anything else (I/O, serialization, HTTP)
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Selector => "selector",
            Self::Timeout => "timeout",
            Self::ActionRejected => "action-rejected",
            Self::ExternalProcess => "external-process",
            Self::Assertion => "assertion",
            Self::Driver => "driver",
            Self::Setup => "setup",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl ProbeError {
    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid selector error
    #[must_use]
    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Category of this error for reporting
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSelector { .. } => ErrorKind::Selector,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ActionRejected { .. } => ErrorKind::ActionRejected,
            Self::SeedFailed { .. } => ErrorKind::ExternalProcess,
            Self::AssertionMismatch { .. } => ErrorKind::Assertion,
            Self::Detached { .. } | Self::Driver { .. } | Self::Navigation { .. } => {
                ErrorKind::Driver
            }
            Self::InvalidState { .. } | Self::Config { .. } => ErrorKind::Setup,
            #[cfg(feature = "api")]
            Self::Http(_) => ErrorKind::Other,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => ErrorKind::Other,
        }
    }

    /// Whether a poller may swallow this error and try again.
    ///
    /// Only a detached node qualifies: the DOM re-rendered between resolution
    /// and use, and the next evaluation re-resolves from scratch.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Detached { .. })
    }
}
