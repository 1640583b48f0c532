//! blogprobe CLI library
//!
//! Command-line front end for the blogprobe harness: store seeding, the API
//! contract suite, the Chromium UI suite and stored-report summaries.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ReportArgs, ReportFormat, SeedArgs};
pub use config::{init_logging, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult, EXIT_FAILED, EXIT_OK, EXIT_SETUP, EXIT_USAGE};
pub use output::{OutputFormat, ProgressReporter};
pub use runner::{SeedOutcome, SuiteRunner};
