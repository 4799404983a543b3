//! Chat and message types for Parley.
//!
//! A chat is a named conversation thread bound to one generation model.
//! Messages belong to exactly one chat and are ordered by creation time.
//! Identifiers are numeric and assigned by the store on creation; the
//! `New*` types carry everything except the id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| format!("invalid chat id: '{s}'"))
    }
}

/// Store-assigned identifier of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('system', 'user', 'assistant'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A conversation thread.
///
/// `model` may only change while the chat has no messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a chat; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChat {
    pub name: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl NewChat {
    /// A chat stamped with the current time.
    pub fn now(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }

    /// Attach the store-assigned id.
    pub fn with_id(self, id: ChatId) -> Chat {
        Chat {
            id,
            name: self.name,
            model: self.model,
            created_at: self.created_at,
        }
    }
}

/// One turn within a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: MessageRole,
    /// Grows while an assistant stream is open; fixed afterwards.
    pub content: String,
    /// Continuation token from the generation backend (assistant messages only,
    /// set when the stream completes).
    pub context: Option<String>,
    /// Opaque metadata attached to system notes.
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a message; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub role: MessageRole,
    pub content: String,
    pub context: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// A message stamped with the current time and no context or metadata.
    pub fn now(chat_id: ChatId, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            role,
            content: content.into(),
            context: None,
            meta: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_meta(mut self, meta: Option<serde_json::Value>) -> Self {
        self.meta = meta;
        self
    }

    /// Attach the store-assigned id.
    pub fn with_id(self, id: MessageId) -> Message {
        Message {
            id,
            chat_id: self.chat_id,
            role: self.role,
            content: self.content,
            context: self.context,
            meta: self.meta,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_message_role_rejects_unknown() {
        let err = "tool".parse::<MessageRole>().unwrap_err();
        assert!(err.contains("tool"));
    }

    #[test]
    fn test_message_role_serde() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_chat_id_parse() {
        assert_eq!(" 42 ".parse::<ChatId>().unwrap(), ChatId(42));
        assert!("forty-two".parse::<ChatId>().is_err());
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let chat = NewChat::now("Test chat", "llama3").with_id(ChatId(7));
        let json = serde_json::to_string(&chat).unwrap();
        assert!(json.contains("\"id\":7"));
    }

    #[test]
    fn test_new_message_with_id_keeps_fields() {
        let meta = serde_json::json!({"source": "cli"});
        let msg = NewMessage::now(ChatId(1), MessageRole::System, "note")
            .with_meta(Some(meta.clone()))
            .with_id(MessageId(9));
        assert_eq!(msg.id, MessageId(9));
        assert_eq!(msg.chat_id, ChatId(1));
        assert_eq!(msg.content, "note");
        assert_eq!(msg.meta, Some(meta));
        assert!(msg.context.is_none());
    }
}
