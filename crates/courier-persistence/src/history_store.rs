//! Conversation history store.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use courier_models::Message;
use tracing::warn;

use crate::atomic::append_line;
use crate::error::{PersistenceError, Result};

/// Append-only message log per conversation.
///
/// Each conversation is one JSON-lines file, one [`Message`] per line:
/// ```text
/// base_path/
/// └── history/
///     ├── telegram%3A42.jsonl
///     └── email%3Abob%40example%2Ecom.jsonl
/// ```
///
/// Every append is a single `O_APPEND` write, so two processes appending to
/// the same conversation never overwrite each other's records. Files are
/// created on first append.
pub struct HistoryStore {
    base_path: PathBuf,
}

impl HistoryStore {
    /// Creates a new HistoryStore with the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the history directory.
    fn history_dir(&self) -> PathBuf {
        self.base_path.join("history")
    }

    /// Returns the log file for a conversation key.
    fn history_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(PersistenceError::InvalidData(
                "conversation key must not be empty".to_string(),
            ));
        }
        Ok(self.history_dir().join(format!("{}.jsonl", encode_key(key))))
    }

    /// Appends a message to a conversation.
    pub fn append(&self, key: &str, message: &Message) -> Result<()> {
        let path = self.history_path(key)?;
        let line = serde_json::to_string(message)?;
        append_line(&path, &line)
    }

    /// Loads the full history of a conversation in append order.
    ///
    /// Unreadable lines (for example a record torn by a crash) are skipped
    /// with a warning.
    pub fn load(&self, key: &str) -> Result<Vec<Message>> {
        let path = self.history_path(key)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(PersistenceError::ReadError { path, source }),
        };

        let mut messages = Vec::new();
        for (index, line) in data.split(|&b| b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Message>(line) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed history record"
                    );
                }
            }
        }
        Ok(messages)
    }

    /// Returns the last `n` messages in append order.
    pub fn recent(&self, key: &str, n: usize) -> Result<Vec<Message>> {
        let mut messages = self.load(key)?;
        let skip = messages.len().saturating_sub(n);
        Ok(messages.split_off(skip))
    }

    /// Number of messages recorded for a conversation.
    pub fn len(&self, key: &str) -> Result<usize> {
        Ok(self.load(key)?.len())
    }
}

/// Encodes a conversation key into a file-name-safe form.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, so distinct keys always map to distinct files.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
