//! blogprobe CLI
//!
//! ## Usage
//!
//! ```bash
//! blogprobe seed --verify                # seed twice, compare fingerprints
//! blogprobe contract                     # API contract suite
//! blogprobe ui --config probe.yaml       # UI suite in Chromium
//! blogprobe report target/blogprobe/reports/ui-10182026_120000.json
//! ```

use blogprobe_cli::{
    init_logging, Cli, CliConfig, CliError, CliResult, Commands, SuiteRunner, Verbosity, EXIT_OK,
};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(&config);

    match run(cli, &config) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_json_logs(cli.json_logs)
        .with_config_path(cli.config.clone())
}

fn run(cli: Cli, config: &CliConfig) -> CliResult<()> {
    if let Commands::Report(args) = &cli.command {
        let rendered = SuiteRunner::show_report(&args.file, args.format.into())?;
        print!("{rendered}");
        return Ok(());
    }

    let mut runner = SuiteRunner::new(config)?;
    match cli.command {
        Commands::Config => {
            print!("{}", runner.show_config()?);
            Ok(())
        }
        Commands::Seed(args) => block_on(async { runner.run_seed(args.verify).await.map(drop) }),
        Commands::Contract => block_on(async { runner.run_contract().await.map(drop) }),
        #[cfg(feature = "browser")]
        Commands::Ui => block_on(async { runner.run_ui().await.map(drop) }),
        Commands::Report(_) => Ok(()),
    }
}

fn block_on<F>(future: F) -> CliResult<()>
where
    F: std::future::Future<Output = CliResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Io)?;
    runtime.block_on(future)
}
