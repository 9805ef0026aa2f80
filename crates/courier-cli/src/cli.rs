//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_models::Verbosity;

/// Version string with git hash and build date, e.g. "0.1.0 (abc1234, 2026-10-16)".
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("COURIER_GIT_HASH");
    const BUILD_DATE: &str = env!("COURIER_BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// Courier - durable message queue between chat surfaces and an agent worker
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, global = true, env = "COURIER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the queue consumer until Ctrl-C or a restart request
    Worker {
        /// Agent command line (default: COURIER_AGENT_COMMAND or claude)
        #[arg(long)]
        agent: Option<String>,

        /// Working directory for agent jobs
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// Queue a raw event
    Push {
        /// Event source, e.g. telegram or dashboard
        #[arg(long, required = true)]
        source: String,

        /// Event type tag (default: <source>:message)
        #[arg(long = "type")]
        event_type: Option<String>,

        /// Message text
        #[arg(long, required = true)]
        text: String,

        /// Conversation key for history
        #[arg(long)]
        conversation: Option<String>,

        /// Delivery verbosity (final, streaming)
        #[arg(long)]
        verbosity: Option<Verbosity>,
    },

    /// List pending events, oldest first
    Pending {
        /// Only events from this source
        #[arg(long)]
        source: Option<String>,

        /// Only events with this type tag
        #[arg(long = "type")]
        event_type: Option<String>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List processed events
    Processed {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show a conversation's history
    History {
        /// Conversation key, e.g. telegram:12345
        #[arg(required = true)]
        key: String,

        /// Number of most recent messages
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },

    /// Run a slash-command against the control plane
    Command {
        /// Command text, e.g. "/queue off"
        #[arg(required = true)]
        text: String,

        /// Conversation the command applies to
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Read messages from stdin, one per line, and feed them to the listener
    ListenStdin {
        /// Source name the messages are attributed to
        #[arg(long, default_value = crate::console::CONSOLE_SOURCE)]
        source: String,

        /// Conversation key for the session (default: <source>:stdin)
        #[arg(long)]
        conversation: Option<String>,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(courier_core::state_dir)
    }

    /// Returns the tracing filter directive for the verbosity count.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn,courier_runtime=info,courier_queue=info",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
