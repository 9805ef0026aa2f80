//! Queued inbound events.
//!
//! An [`Event`] is the durable record a listener writes for every inbound
//! message that should reach the worker. On disk it is always the flat
//! `{id, type, source, timestamp, payload}` object; [`EventPayload`] is the
//! typed view over `type` + `payload` used by the rest of the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EventId;

/// Payload key that carries the listener's chosen verbosity.
const VERBOSITY_KEY: &str = "verbosity";

/// How a channel reacts to non-terminal job output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Buffer everything and deliver once, at completion.
    #[default]
    Final,
    /// Forward partial output as it arrives.
    Streaming,
}

impl Verbosity {
    /// Returns the wire name of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Final => "final",
            Verbosity::Streaming => "streaming",
        }
    }
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "final" => Ok(Verbosity::Final),
            "streaming" | "stream" => Ok(Verbosity::Streaming),
            other => Err(format!("unknown verbosity: {}", other)),
        }
    }
}

/// A durable record of one inbound message awaiting the worker.
///
/// Fields are private: an event never changes after creation. Its only
/// mutable aspect is queue membership, which lives in the queue's storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    #[serde(rename = "type")]
    event_type: String,
    source: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: Map<String, Value>,
}

impl Event {
    /// Creates a new event with a fresh id, stamped with the current instant.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Creates an event from a typed payload, recording the verbosity policy.
    pub fn from_payload(
        source: impl Into<String>,
        payload: &EventPayload,
        verbosity: Verbosity,
    ) -> Self {
        let mut map = payload.to_map();
        map.insert(
            VERBOSITY_KEY.to_string(),
            Value::String(verbosity.as_str().to_string()),
        );
        Self::new(payload.event_type(), source, map)
    }

    /// Returns a copy of this event with an explicit timestamp.
    ///
    /// Used by tests and imports that need deterministic ordering.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Unique identifier.
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Type tag, e.g. `telegram:message`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Name of the channel that produced the event.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Creation instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Raw payload map.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Typed view of the payload.
    pub fn typed_payload(&self) -> EventPayload {
        EventPayload::from_parts(&self.event_type, &self.payload)
    }

    /// Verbosity chosen by the producing listener (defaults to final).
    pub fn verbosity(&self) -> Verbosity {
        self.payload
            .get(VERBOSITY_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Conversation this event belongs to, if the payload names one.
    pub fn conversation_key(&self) -> Option<String> {
        self.typed_payload().conversation_key()
    }

    /// Text the job should act on, if any.
    pub fn text(&self) -> Option<String> {
        self.typed_payload().text().map(str::to_string)
    }
}

/// Inbound message from a Telegram chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub chat_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub text: String,
}

/// Inbound email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Inbound message from a chat space (room/thread based chat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSpaceMessage {
    pub space: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub text: String,
}

/// Inbound message typed into the web dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMessage {
    pub session: String,
    pub text: String,
}

/// Typed view of an event's `type` + `payload`.
///
/// Known event types map to their payload shape; anything else (or a known
/// type whose payload does not fit) is preserved as [`EventPayload::Opaque`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Telegram(TelegramMessage),
    Email(EmailMessage),
    ChatSpace(ChatSpaceMessage),
    Dashboard(DashboardMessage),
    Opaque {
        event_type: String,
        fields: Map<String, Value>,
    },
}

impl EventPayload {
    pub const TELEGRAM_MESSAGE: &'static str = "telegram:message";
    pub const EMAIL_MESSAGE: &'static str = "email:message";
    pub const CHATSPACE_MESSAGE: &'static str = "chatspace:message";
    pub const DASHBOARD_MESSAGE: &'static str = "dashboard:message";

    /// Builds the typed view from a stored type tag and payload map.
    pub fn from_parts(event_type: &str, payload: &Map<String, Value>) -> Self {
        let value = Value::Object(payload.clone());
        let typed = match event_type {
            Self::TELEGRAM_MESSAGE => serde_json::from_value(value).ok().map(Self::Telegram),
            Self::EMAIL_MESSAGE => serde_json::from_value(value).ok().map(Self::Email),
            Self::CHATSPACE_MESSAGE => serde_json::from_value(value).ok().map(Self::ChatSpace),
            Self::DASHBOARD_MESSAGE => serde_json::from_value(value).ok().map(Self::Dashboard),
            _ => None,
        };

        typed.unwrap_or_else(|| Self::Opaque {
            event_type: event_type.to_string(),
            fields: payload.clone(),
        })
    }

    /// Returns the type tag this payload is stored under.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Telegram(_) => Self::TELEGRAM_MESSAGE,
            Self::Email(_) => Self::EMAIL_MESSAGE,
            Self::ChatSpace(_) => Self::CHATSPACE_MESSAGE,
            Self::Dashboard(_) => Self::DASHBOARD_MESSAGE,
            Self::Opaque { event_type, .. } => event_type,
        }
    }

    /// Serializes the payload into the persisted map form.
    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            Self::Telegram(m) => serde_json::to_value(m),
            Self::Email(m) => serde_json::to_value(m),
            Self::ChatSpace(m) => serde_json::to_value(m),
            Self::Dashboard(m) => serde_json::to_value(m),
            Self::Opaque { fields, .. } => return fields.clone(),
        };

        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Key under which conversation history for this message is grouped.
    pub fn conversation_key(&self) -> Option<String> {
        match self {
            Self::Telegram(m) => Some(format!("telegram:{}", m.chat_id)),
            Self::Email(m) => Some(format!("email:{}", m.from.to_ascii_lowercase())),
            Self::ChatSpace(m) => Some(match &m.thread {
                Some(thread) => format!("chatspace:{}/{}", m.space, thread),
                None => format!("chatspace:{}", m.space),
            }),
            Self::Dashboard(m) => Some(format!("dashboard:{}", m.session)),
            Self::Opaque { fields, .. } => fields
                .get("conversation")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }

    /// The message text.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Telegram(m) => Some(&m.text),
            Self::Email(m) => Some(&m.body),
            Self::ChatSpace(m) => Some(&m.text),
            Self::Dashboard(m) => Some(&m.text),
            Self::Opaque { fields, .. } => fields.get("text").and_then(|v| v.as_str()),
        }
    }

    /// Display name of the sender, when the surface provides one.
    pub fn sender_name(&self) -> Option<&str> {
        match self {
            Self::Telegram(m) => m.from.as_deref(),
            Self::Email(m) => Some(&m.from),
            Self::ChatSpace(m) => m.sender.as_deref(),
            Self::Dashboard(_) => None,
            Self::Opaque { fields, .. } => fields.get("name").and_then(|v| v.as_str()),
        }
    }
}
