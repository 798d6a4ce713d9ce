//! # spikenet CLI
//!
//! Command-line driver for spikenet experiments. Log verbosity follows
//! `RUST_LOG`, falling back to `info` (or `debug` with `--verbose`).

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spikenet_cli::error::CliResult;
use spikenet_cli::SpikenetCli;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = SpikenetCli::parse();

    // Initialize logging with environment variable support
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = cli.execute().await {
        error!("Command failed: {}", err);
        std::process::exit(1);
    }

    Ok(())
}
