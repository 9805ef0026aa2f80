//! Worker-side delivery of replies to Telegram chats.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_core::ChannelKind;
use courier_models::{Event, EventId, EventPayload};
use courier_runtime::{Delivery, DeliveryError};
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::RequestError;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Longest text Telegram accepts in one message.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Appended to a preview whose job was stopped.
const DISCARDED_MARKER: &str = "[stopped]";

/// A message already sent for a streaming job, edited as text arrives.
#[derive(Debug, Clone)]
struct Preview {
    message_id: MessageId,
    text: String,
}

/// Sends replies back to the chat an event came from.
///
/// For streaming events the first fragment is sent as a new message and
/// later fragments edit it in place; the final reply replaces the preview.
pub struct TelegramDelivery {
    bot: Bot,
    previews: Mutex<HashMap<EventId, Preview>>,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            previews: Mutex::new(HashMap::new()),
        }
    }

    /// Create a delivery from `TELEGRAM_BOT_TOKEN`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var(crate::TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(|token| Self::new(Bot::new(token)))
    }

    async fn edit(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), DeliveryError> {
        match self.bot.edit_message_text(chat_id, message_id, text).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                debug!("message unchanged, skipping edit");
                Ok(())
            }
            Err(e) => Err(map_request_error(e)),
        }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, event: &Event, text: &str) -> Result<(), DeliveryError> {
        let chat_id = target_chat(event)?;
        let preview = self.previews.lock().await.remove(event.id());

        let mut chunks = ChannelKind::Telegram.chunk(text).into_iter();
        if let Some(preview) = &preview {
            if let Some(first) = chunks.next() {
                self.edit(chat_id, preview.message_id, &first).await?;
            }
        }

        let mut sent = 0usize;
        for chunk in chunks {
            self.bot
                .send_message(chat_id, chunk)
                .await
                .map_err(map_request_error)?;
            sent += 1;
        }

        info!(
            chat_id = %chat_id,
            event_id = %event.id(),
            edited_preview = preview.is_some(),
            messages = sent,
            "Delivered reply to Telegram"
        );
        Ok(())
    }

    async fn send_partial(&self, event: &Event, fragment: &str) -> Result<(), DeliveryError> {
        if fragment.is_empty() {
            return Ok(());
        }
        let chat_id = target_chat(event)?;
        let mut previews = self.previews.lock().await;

        match previews.get_mut(event.id()) {
            Some(preview) => {
                let before = preview_text(&preview.text);
                preview.text.push_str(fragment);
                let after = preview_text(&preview.text);
                if after != before {
                    self.edit(chat_id, preview.message_id, &after).await?;
                }
            }
            None => {
                let text = fragment.to_string();
                let shown = preview_text(&text);
                if shown.trim().is_empty() {
                    return Ok(());
                }
                let sent = self
                    .bot
                    .send_message(chat_id, shown)
                    .await
                    .map_err(map_request_error)?;
                previews.insert(
                    event.id().clone(),
                    Preview {
                        message_id: sent.id,
                        text,
                    },
                );
            }
        }
        Ok(())
    }

    async fn discard(&self, event: &Event) -> Result<(), DeliveryError> {
        let Some(preview) = self.previews.lock().await.remove(event.id()) else {
            return Ok(());
        };
        debug!(event_id = %event.id(), "Dropping streaming preview");
        let chat_id = target_chat(event)?;
        self.edit(chat_id, preview.message_id, &discarded_text(&preview.text))
            .await
    }
}

/// Preview text left in the chat when a job ends without a reply.
fn discarded_text(buffer: &str) -> String {
    preview_text(&format!("{}\n\n{}", buffer.trim_end(), DISCARDED_MARKER))
}

/// Chat the reply for `event` goes to.
fn target_chat(event: &Event) -> Result<ChatId, DeliveryError> {
    match event.typed_payload() {
        EventPayload::Telegram(m) => Ok(ChatId(m.chat_id)),
        other => Err(DeliveryError::MissingTarget(format!(
            "event {} has type {}, not {}",
            event.id(),
            other.event_type(),
            EventPayload::TELEGRAM_MESSAGE
        ))),
    }
}

/// Text shown in a streaming preview, cut to Telegram's message limit.
fn preview_text(buffer: &str) -> String {
    if buffer.chars().count() <= MAX_MESSAGE_CHARS {
        return buffer.to_string();
    }
    let mut text: String = buffer.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    text.push('…');
    text
}

fn is_not_modified(e: &RequestError) -> bool {
    e.to_string().contains("message is not modified")
}

fn map_request_error(e: RequestError) -> DeliveryError {
    match e {
        RequestError::Network(_) | RequestError::Io(_) => DeliveryError::Unreachable(e.to_string()),
        other => DeliveryError::Rejected(other.to_string()),
    }
}
