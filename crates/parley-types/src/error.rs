use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::ChatId;

/// Store operation that failed, carried by [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    CreateChat,
    GetChat,
    ListChats,
    UpdateChat,
    DeleteChat,
    CreateMessage,
    GetMessage,
    UpdateMessage,
    ListMessages,
    Clear,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::CreateChat => "create_chat",
            StoreOperation::GetChat => "get_chat",
            StoreOperation::ListChats => "list_chats",
            StoreOperation::UpdateChat => "update_chat",
            StoreOperation::DeleteChat => "delete_chat",
            StoreOperation::CreateMessage => "create_message",
            StoreOperation::GetMessage => "get_message",
            StoreOperation::UpdateMessage => "update_message",
            StoreOperation::ListMessages => "list_messages",
            StoreOperation::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Errors from store operations (used by the `ChatStore` trait in parley-core).
///
/// `key` names the record involved: `chat:3`, `message:17`, or `*` for
/// collection-wide operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("storage error in {operation} ({key}): {reason}")]
pub struct StorageError {
    pub operation: StoreOperation,
    pub key: String,
    pub reason: String,
}

impl StorageError {
    pub fn new(operation: StoreOperation, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation,
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// The record addressed by `key` does not exist.
    pub fn not_found(operation: StoreOperation, key: impl Into<String>) -> Self {
        Self::new(operation, key, "not found")
    }

    pub fn is_not_found(&self) -> bool {
        self.reason == "not found"
    }
}

/// Failures observed by a session.
///
/// None of these are returned to the session's consumer; they are logged,
/// kept as the session's last error and broadcast as events.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("completion for chat {chat_id} arrived with no message in flight")]
    StreamInconsistency { chat_id: ChatId },

    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("transport error: {0}")]
    Transport(String),
}
