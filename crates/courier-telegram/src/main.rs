//! Courier Telegram listener binary.
//!
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx courier-telegram
//! ```

use std::path::PathBuf;

use clap::Parser;
use courier_telegram::TelegramBot;
use tracing_subscriber::EnvFilter;

/// Courier Telegram listener - queue chat messages for the worker
#[derive(Parser, Debug)]
#[command(name = "courier-telegram")]
#[command(about = "Telegram listener for Courier - queue chat messages for the agent worker")]
struct Args {
    /// State directory (default: ~/.courier)
    #[arg(long, env = "COURIER_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    courier_core::load_env();
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "courier_telegram=info,courier_runtime=info,teloxide=warn",
        1 => "courier_telegram=debug,courier_runtime=debug,courier_queue=debug,teloxide=info",
        2 => "courier_telegram=trace,courier_runtime=trace,courier_queue=trace,teloxide=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state_dir = args.state_dir.unwrap_or_else(courier_core::state_dir);

    if let Err(e) = courier_core::ensure_dirs_in(&state_dir) {
        tracing::warn!(error = %e, "Failed to create all directories");
    }

    let bot = TelegramBot::new(&state_dir)?;

    match bot.get_me().await {
        Ok(username) => {
            tracing::info!(username = %username, state_dir = %state_dir.display(), "Bot initialized successfully");
            println!("\nCourier Telegram listener");
            println!("   Bot: @{}", username);
            println!("   State: {}", state_dir.display());
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get bot info");
            return Err(e.into());
        }
    }

    println!("   Press Ctrl+C to stop\n");

    bot.start_polling().await?;

    Ok(())
}
