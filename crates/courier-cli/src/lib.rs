//! Courier CLI library.
//!
//! Argument definitions, subcommand handlers and the console delivery used
//! by the `courier` binary.

pub mod cli;
pub mod commands;
pub mod console;
