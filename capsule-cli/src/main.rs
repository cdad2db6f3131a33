//! Capsule container launcher
//!
//! Runs one command in fresh mount, UTS, PID, IPC and network namespaces,
//! rooted in a prepared directory and attached to a host bridge.

use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;
mod run;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr; stdout belongs to the container
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run::execute(cli).await {
        Ok(exit) => process::exit(exit.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}
