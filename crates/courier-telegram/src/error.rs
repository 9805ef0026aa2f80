//! Error types for the Telegram surface.

use thiserror::Error;

/// Errors that can occur in the Telegram listener.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Bot token not provided.
    #[error("Telegram bot token not set. Set TELEGRAM_BOT_TOKEN environment variable.")]
    NoToken,

    /// Failed to reach the Bot API at startup.
    #[error("Failed to start bot: {0}")]
    BotStartFailed(String),

    /// `TELEGRAM_ALLOWED_CHATS` could not be parsed.
    #[error("Invalid allowed chat list: {0}")]
    InvalidAllowList(String),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;
