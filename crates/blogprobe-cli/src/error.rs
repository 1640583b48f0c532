//! Error types for the CLI

use blogprobe::{ErrorKind, ProbeError};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Exit code when every scenario passed
pub const EXIT_OK: u8 = 0;
/// Exit code when at least one scenario failed
pub const EXIT_FAILED: u8 = 1;
/// Exit code for bad arguments or configuration
pub const EXIT_USAGE: u8 = 2;
/// Exit code when seeding or the browser could not be set up
pub const EXIT_SETUP: u8 = 3;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// A suite finished with failing scenarios
    #[error("Suite `{suite}` failed: {failed} of {total} scenarios did not pass")]
    SuiteFailed {
        /// Suite name
        suite: String,
        /// Failing scenarios
        failed: usize,
        /// Scenarios run
        total: usize,
    },

    /// Two consecutive seeds left different data behind
    #[error("Seeding is not idempotent: fingerprint {first} then {second}")]
    NotIdempotent {
        /// Fingerprint after the first seed
        first: String,
        /// Fingerprint after the second seed
        second: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// blogprobe library error
    #[error("{0}")]
    Probe(#[from] ProbeError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::SuiteFailed { .. } | Self::NotIdempotent { .. } => EXIT_FAILED,
            Self::Config { .. } | Self::InvalidArgument { .. } => EXIT_USAGE,
            Self::Io(_) => EXIT_SETUP,
            Self::Probe(e) => match e.kind() {
                ErrorKind::Setup | ErrorKind::Selector => EXIT_USAGE,
                ErrorKind::ExternalProcess | ErrorKind::Driver => EXIT_SETUP,
                _ => EXIT_FAILED,
            },
        }
    }
}
