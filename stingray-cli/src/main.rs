//! Stingray CLI - Command-line interface
//!
//! Runs the pre-built attack scenarios and prints their flow reports.

mod commands;

use clap::Parser;
use stingray_core::tracing_setup::{init_tracing, CliLogLevel};

#[derive(Parser)]
#[command(name = "stingray")]
#[command(about = "Attack-scenario harness for a simulated cellular access network")]
struct Cli {
    /// Console log level (full debug log always goes to logs/)
    #[arg(long, default_value = "info")]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), None)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    commands::handle_command(cli.command)?;
    Ok(())
}
