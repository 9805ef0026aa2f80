//! Telegram surface for Courier.
//!
//! Two halves that run in different processes:
//!
//! - [`TelegramBot`]: a listener that long-polls the Bot API and feeds every
//!   text message through [`courier_runtime::Listener`]. Slash-commands are
//!   answered immediately; everything else is queued for the worker.
//! - [`TelegramDelivery`]: the worker-side [`courier_runtime::Delivery`]
//!   that sends replies back to the originating chat.
//!
//! # Environment Variables
//!
//! Required:
//! - `TELEGRAM_BOT_TOKEN`: Bot token from @BotFather
//!
//! Optional:
//! - `TELEGRAM_ALLOWED_CHATS`: Comma-separated chat ids; other chats are ignored
//!
//! # Example
//!
//! ```no_run
//! use courier_telegram::TelegramBot;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bot = TelegramBot::new(Path::new("/path/to/state"))?;
//!     bot.start_polling().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod delivery;
pub mod error;

pub use bot::{inbound_from_parts, parse_allowed_chats, TelegramBot};
pub use delivery::TelegramDelivery;
pub use error::{Result, TelegramError};

/// Environment variable holding the bot token.
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable restricting which chats are served.
pub const ALLOWED_CHATS_ENV: &str = "TELEGRAM_ALLOWED_CHATS";
