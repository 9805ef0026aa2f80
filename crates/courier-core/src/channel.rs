//! Channel kinds and outbound message limits.

use std::fmt;
use std::str::FromStr;

use courier_models::Verbosity;
use serde::{Deserialize, Serialize};

use crate::commands::supports_commands;

/// Telegram's per-message character limit.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Chat-space (team chat) per-message character limit.
pub const CHATSPACE_MAX_MESSAGE_LEN: usize = 4096;

/// The external surfaces Courier knows how to reply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Telegram,
    ChatSpace,
    Dashboard,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Email,
        ChannelKind::Telegram,
        ChannelKind::ChatSpace,
        ChannelKind::Dashboard,
    ];

    /// Source name used on events and in the command allow-list.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Telegram => "telegram",
            ChannelKind::ChatSpace => "chatspace",
            ChannelKind::Dashboard => "dashboard",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Verbosity used when the producer does not ask for one.
    pub fn default_verbosity(&self) -> Verbosity {
        match self {
            ChannelKind::Dashboard => Verbosity::Streaming,
            _ => Verbosity::Final,
        }
    }

    /// Longest single message the surface accepts, if bounded.
    pub fn max_message_len(&self) -> Option<usize> {
        match self {
            ChannelKind::Telegram => Some(TELEGRAM_MAX_MESSAGE_LEN),
            ChannelKind::ChatSpace => Some(CHATSPACE_MAX_MESSAGE_LEN),
            ChannelKind::Email | ChannelKind::Dashboard => None,
        }
    }

    pub fn supports_commands(&self) -> bool {
        supports_commands(self.name())
    }

    /// Splits `text` into messages this surface accepts.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        match self.max_message_len() {
            Some(max) => split_message(text, max),
            None => vec![text.to_string()],
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(&s.to_ascii_lowercase()).ok_or_else(|| format!("unknown channel: {}", s))
    }
}

/// Split text into chunks of at most `max` characters.
///
/// Breaks fall on line boundaries where possible; a single line longer than
/// `max` is cut at character boundaries. Empty input yields no chunks.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len <= max {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= max {
            current.push_str(line);
            current_len = line_len;
        } else {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max) {
                if piece.len() == max {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
