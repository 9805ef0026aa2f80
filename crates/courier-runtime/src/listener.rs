//! Producer path shared by every channel listener.

use std::path::PathBuf;

use courier_core::{parse, supports_commands, ChannelKind, ParsedCommand};
use courier_models::{Event, EventId, EventPayload, Message, Verbosity};
use courier_persistence::HistoryStore;
use courier_queue::EventQueue;
use tracing::{debug, info};

use crate::control::ControlPlane;
use crate::error::Result;

/// A message received from an external surface.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: EventPayload,
    /// Overrides the channel's default verbosity.
    pub verbosity: Option<Verbosity>,
}

impl InboundMessage {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            verbosity: None,
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = Some(verbosity);
        self
    }
}

/// What the listener did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerOutcome {
    /// Queued for the worker.
    Queued { event_id: EventId },
    /// Interpreted as a command; `reply` goes back to the sender.
    Command { command: ParsedCommand, reply: String },
    /// Nothing to do (blank text).
    Ignored,
}

/// Turns inbound messages into commands or queued events for one source.
pub struct Listener {
    source: String,
    queue: EventQueue,
    history: HistoryStore,
    control: ControlPlane,
}

impl Listener {
    pub fn new(base_path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let base_path = base_path.into();
        Self {
            source: source.into(),
            queue: EventQueue::new(&base_path),
            history: HistoryStore::new(&base_path),
            control: ControlPlane::new(base_path),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn default_verbosity(&self) -> Verbosity {
        ChannelKind::from_name(&self.source)
            .map(|kind| kind.default_verbosity())
            .unwrap_or_default()
    }

    /// Handles one inbound message.
    ///
    /// Commands are only recognized on channels that support them; on any
    /// other channel slash-text is queued like any other message.
    pub fn handle(&self, message: InboundMessage) -> Result<ListenerOutcome> {
        let payload = &message.payload;
        let conversation = payload.conversation_key();

        if let Some(text) = payload.text() {
            if text.trim().is_empty() {
                debug!(source = %self.source, "Ignoring blank message");
                return Ok(ListenerOutcome::Ignored);
            }

            if supports_commands(&self.source) {
                if let Some(command) = parse(text) {
                    let reply = self.control.apply(&command, conversation.as_deref())?;
                    return Ok(ListenerOutcome::Command { command, reply });
                }
            }

            if let Some(key) = &conversation {
                let sender = payload.sender_name().map(str::to_string);
                self.history.append(key, &Message::user(sender, text))?;
            }
        }

        let verbosity = message.verbosity.unwrap_or_else(|| self.default_verbosity());
        let event = Event::from_payload(self.source.clone(), payload, verbosity);
        let event_id = self.queue.push_event(&event)?;

        info!(
            source = %self.source,
            event_id = %event_id,
            conversation = ?conversation,
            "Message queued"
        );
        Ok(ListenerOutcome::Queued { event_id })
    }
}
