//! Courier CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use courier_cli::cli::Cli;
use courier_cli::commands;

fn main() {
    courier_core::load_env();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let state_dir = cli.state_dir();

    if let Err(e) = courier_core::ensure_dirs_in(&state_dir) {
        tracing::warn!(error = %e, "Failed to create all directories");
    }

    match commands::execute(cli.command, &state_dir) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
