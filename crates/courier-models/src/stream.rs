//! Stream events emitted by a running job.
//!
//! The worker's agent prints one JSON object per line. Only the shapes the
//! dispatcher cares about are modelled; every other `type` deserializes to
//! [`StreamEvent::Other`] so new event kinds never break a running job.

use serde::{Deserialize, Serialize};

/// Result subtype that maps to a zero exit code.
pub const SUCCESS_SUBTYPE: &str = "success";

/// One increment of a running job's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Session bookkeeping emitted when the agent starts.
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// A complete assistant turn.
    Assistant { message: AssistantMessage },
    /// A single incremental fragment.
    ContentBlockDelta { delta: Delta },
    /// Terminal event for the job.
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Body of an assistant event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A content block inside an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// The payload of a `content_block_delta` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

impl StreamEvent {
    /// Parses one line of agent output.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// An assistant event carrying a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        StreamEvent::Assistant {
            message: AssistantMessage {
                content: vec![ContentBlock::Text { text: text.into() }],
            },
        }
    }

    /// A text delta event.
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text: text.into() },
        }
    }

    /// A terminal result event.
    pub fn result(subtype: impl Into<String>) -> Self {
        StreamEvent::Result {
            subtype: subtype.into(),
            result: None,
            session_id: None,
        }
    }

    /// Extracts the text this event contributes to a reply.
    ///
    /// Assistant events concatenate their text blocks in order, text deltas
    /// contribute their fragment, everything else contributes nothing.
    pub fn text(&self) -> String {
        match self {
            StreamEvent::Assistant { message } => message
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Other => None,
                })
                .collect(),
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
            } => text.clone(),
            _ => String::new(),
        }
    }

    /// Returns true for the terminal `result` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Result { .. })
    }

    /// Exit code for a terminal event: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StreamEvent::Result { subtype, .. } if subtype == SUCCESS_SUBTYPE => Some(0),
            StreamEvent::Result { .. } => Some(1),
            _ => None,
        }
    }

    /// Agent session id announced by this event, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            StreamEvent::System { session_id, .. } | StreamEvent::Result { session_id, .. } => {
                session_id.as_deref()
            }
            _ => None,
        }
    }
}
