//! Shared configuration for Courier.
//!
//! All state lives under `~/.courier/`:
//!
//! ```text
//! ~/.courier/
//! ├── queue/        # Pending and processed events, consumer lock
//! ├── history/      # Per-conversation message logs
//! ├── control/      # Control requests and the worker's session snapshot
//! ├── logs/         # Application logs, dashboard outbox
//! └── config/       # .env.local
//! ```
//!
//! # Environment Variables
//!
//! - `COURIER_STATE_DIR`: Override the base state directory
//! - `COURIER_LOG_DIR`: Override the log directory
//! - `COURIER_CONFIG_DIR`: Override the config directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "COURIER_STATE_DIR";

/// Environment variable for custom log directory.
pub const LOG_DIR_ENV: &str = "COURIER_LOG_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "COURIER_CONFIG_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".courier";

const QUEUE_SUBDIR: &str = "queue";
const HISTORY_SUBDIR: &str = "history";
const CONTROL_SUBDIR: &str = "control";
const LOGS_SUBDIR: &str = "logs";
const CONFIG_SUBDIR: &str = "config";

static STATE_DIR_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Get the Courier state directory.
///
/// Resolved once per process:
/// 1. `COURIER_STATE_DIR` if set
/// 2. `~/.courier` if the home directory is known
/// 3. `.courier` in the current directory
pub fn state_dir() -> PathBuf {
    STATE_DIR_CACHE
        .get_or_init(|| {
            std::env::var(STATE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::home_dir()
                        .map(|h| h.join(DEFAULT_STATE_DIR))
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
                })
        })
        .clone()
}

/// Queue directory (`queue/`).
pub fn queue_dir() -> PathBuf {
    state_dir().join(QUEUE_SUBDIR)
}

/// History directory (`history/`).
pub fn history_dir() -> PathBuf {
    state_dir().join(HISTORY_SUBDIR)
}

/// Control directory (`control/`).
pub fn control_dir() -> PathBuf {
    state_dir().join(CONTROL_SUBDIR)
}

/// Get the logs directory.
///
/// Defaults to `~/.courier/logs/` or `COURIER_LOG_DIR`.
pub fn logs_dir() -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join(LOGS_SUBDIR))
}

/// Get the user config directory.
///
/// Defaults to `~/.courier/config/` or `COURIER_CONFIG_DIR`.
pub fn config_dir() -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join(CONFIG_SUBDIR))
}

/// Get the .env.local file path (bot tokens and other secrets).
pub fn env_file() -> PathBuf {
    config_dir().join(".env.local")
}

/// JSON-lines file the dashboard reads replies from.
pub fn outbox_file(base: &Path) -> PathBuf {
    base.join(LOGS_SUBDIR).join("dashboard-outbox.jsonl")
}

/// Load environment variables for a binary.
///
/// The config directory's `.env.local` wins; a `.env.local` or `.env` in
/// the working directory fills in anything it leaves unset.
pub fn load_env() {
    let env_path = env_file();
    if env_path.exists() {
        if let Err(e) = dotenvy::from_path(&env_path) {
            debug!(path = %env_path.display(), error = %e, "Failed to load env file");
        }
    }
    let _ = dotenvy::from_filename(".env.local").or_else(|_| dotenvy::dotenv());
}

/// Create the standard subdirectories under `base`.
pub fn ensure_dirs_in(base: &Path) -> std::io::Result<()> {
    for sub in [QUEUE_SUBDIR, HISTORY_SUBDIR, CONTROL_SUBDIR, LOGS_SUBDIR, CONFIG_SUBDIR] {
        std::fs::create_dir_all(base.join(sub))?;
    }
    Ok(())
}
