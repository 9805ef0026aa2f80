//! Telegram listener process.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use courier_models::{EventPayload, TelegramMessage};
use courier_runtime::{InboundMessage, Listener, ListenerOutcome};
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TelegramError};
use crate::{ALLOWED_CHATS_ENV, TOKEN_ENV};

/// Source name for events produced by this listener.
pub const SOURCE: &str = "telegram";

/// The Telegram listener.
pub struct TelegramBot {
    bot: Bot,
    listener: Arc<Listener>,
    allowed_chats: Option<Arc<HashSet<i64>>>,
}

impl TelegramBot {
    /// Create a listener writing into `state_dir`.
    ///
    /// Requires `TELEGRAM_BOT_TOKEN`; honours `TELEGRAM_ALLOWED_CHATS`.
    pub fn new(state_dir: &Path) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV).map_err(|_| TelegramError::NoToken)?;
        let allowed_chats = match std::env::var(ALLOWED_CHATS_ENV) {
            Ok(list) => Some(parse_allowed_chats(&list)?),
            Err(_) => None,
        };

        Ok(Self::with_bot(Bot::new(token), state_dir, allowed_chats))
    }

    /// Create a listener around an existing bot client.
    pub fn with_bot(bot: Bot, state_dir: &Path, allowed_chats: Option<HashSet<i64>>) -> Self {
        Self {
            bot,
            listener: Arc::new(Listener::new(state_dir, SOURCE)),
            allowed_chats: allowed_chats.map(Arc::new),
        }
    }

    /// Get the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::BotStartFailed(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Long-poll for updates until Ctrl-C.
    pub async fn start_polling(&self) -> Result<()> {
        info!(
            restricted = self.allowed_chats.is_some(),
            "Starting Telegram listener in polling mode"
        );

        let listener = Arc::clone(&self.listener);
        let allowed_chats = self.allowed_chats.clone();

        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let listener = Arc::clone(&listener);
            let allowed_chats = allowed_chats.clone();
            async move { handle_message(bot, msg, listener, allowed_chats).await }
        });

        Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|upd| async move {
                debug!(update_id = ?upd.id, "Unhandled update");
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Telegram listener stopped");
        Ok(())
    }
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    listener: Arc<Listener>,
    allowed_chats: Option<Arc<HashSet<i64>>>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;

    if let Some(allowed) = &allowed_chats {
        if !allowed.contains(&chat_id.0) {
            warn!(chat_id = %chat_id, "Ignoring message from chat outside allow list");
            return Ok(());
        }
    }

    let Some(text) = msg.text() else {
        debug!(chat_id = %chat_id, "Ignoring non-text message");
        return Ok(());
    };

    let from = msg
        .from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.first_name.clone()));
    let inbound = inbound_from_parts(chat_id.0, Some(msg.id.0), from, text);

    match listener.handle(inbound) {
        Ok(ListenerOutcome::Command { command, reply }) => {
            info!(chat_id = %chat_id, command = %command.command_type, "Command handled");
            bot.send_message(chat_id, reply).await?;
        }
        Ok(ListenerOutcome::Queued { event_id }) => {
            debug!(chat_id = %chat_id, event_id = %event_id, "Message queued");
            if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
                debug!(error = %e, "Failed to send typing indicator");
            }
        }
        Ok(ListenerOutcome::Ignored) => {}
        Err(e) => {
            error!(chat_id = %chat_id, error = %e, "Failed to accept message");
            bot.send_message(chat_id, "Sorry, your message could not be queued. Please try again.")
                .await?;
        }
    }

    Ok(())
}

/// Build the inbound message for a Telegram text message.
pub fn inbound_from_parts(
    chat_id: i64,
    message_id: Option<i32>,
    from: Option<String>,
    text: &str,
) -> InboundMessage {
    InboundMessage::new(EventPayload::Telegram(TelegramMessage {
        chat_id,
        message_id,
        from,
        text: text.to_string(),
    }))
}

/// Parse a comma-separated list of chat ids.
pub fn parse_allowed_chats(list: &str) -> Result<HashSet<i64>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| TelegramError::InvalidAllowList(s.to_string()))
        })
        .collect()
}
