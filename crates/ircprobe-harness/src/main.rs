//! ircprobe binary.
//!
//! # Usage
//!
//! ```bash
//! # Two clients race for one nickname on a local server
//! ircprobe nick-collision --server localhost:6667
//!
//! # Channel message routed between a hub and a leaf
//! ircprobe routing --hub localhost:6667 --leaf localhost:6668
//! ```
//!
//! The report goes to stdout, logs to stderr. The exit code is the verdict's:
//! 0 success, 1 failure or inconclusive (3 for inconclusive with
//! `--distinct-exit-codes`), 2 for a configuration error.

use std::{io::Write, process::ExitCode};

use clap::Parser;
use ircprobe_harness::{Args, EXIT_CONFIG_ERROR};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let scenario = match args.scenario() {
        Ok(scenario) => scenario,
        Err(err) => {
            tracing::error!(error = %err, "cannot build scenario");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        },
    };

    let report = scenario.run(args.exit_codes()).await;

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = write!(stdout, "{report}").and_then(|()| stdout.flush()) {
        tracing::error!(error = %err, "failed to write report");
    }

    ExitCode::from(report.exit_code())
}
