//! Courier Core - logic shared by the worker, listeners and the CLI.
//!
//! - **commands**: Parse slash-commands into typed intents
//! - **channel**: Channel kinds, their delivery limits and command support
//! - **config**: State directory layout and environment loading

pub mod channel;
pub mod commands;
pub mod config;

pub use channel::{split_message, ChannelKind};
pub use commands::{describe, parse, supports_commands, CommandArgs, CommandType, ParsedCommand};
pub use config::{
    config_dir, control_dir, ensure_dirs_in, env_file, history_dir, load_env,
    logs_dir, outbox_file, queue_dir, state_dir,
};
