//! Conversation history messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current instant.
    pub fn new(role: Role, name: Option<String>, text: impl Into<String>) -> Self {
        Self {
            role,
            name,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// A message typed by a user.
    pub fn user(name: Option<String>, text: impl Into<String>) -> Self {
        Self::new(Role::User, name, text)
    }

    /// A reply produced by the worker.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, None, text)
    }

    /// Label used when rendering transcripts.
    pub fn speaker(&self) -> String {
        match (&self.role, &self.name) {
            (Role::User, Some(name)) => name.clone(),
            (role, _) => role.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_omits_missing_name() {
        let msg = Message::assistant("done");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_speaker() {
        assert_eq!(Message::user(Some("ana".into()), "hi").speaker(), "ana");
        assert_eq!(Message::user(None, "hi").speaker(), "user");
        assert_eq!(Message::assistant("yo").speaker(), "assistant");
    }
}
