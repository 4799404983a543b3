//! Event types for the Parley session event bus.
//!
//! `SessionEvent` is broadcast whenever the session's observable state
//! changes, so a presentation layer can re-read the views it cares about.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatId, MessageId};
use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The chat cache changed (created, renamed, deleted, model switched).
    ChatsChanged,

    /// A different chat (or none) became active.
    ActiveChatChanged { chat_id: Option<ChatId> },

    /// The visible message list of the active chat was replaced or extended.
    MessagesChanged { chat_id: ChatId },

    /// An assistant message was created for a new stream.
    StreamStarted { chat_id: ChatId, message_id: MessageId },

    /// A fragment was appended to an in-flight message.
    StreamFragment {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },

    /// The in-flight message received its continuation token.
    StreamFinalized { chat_id: ChatId, message_id: MessageId },

    /// The stream ended without a completion (transport error or cancel).
    StreamAbandoned { chat_id: ChatId },

    /// A failure was swallowed; state may have diverged from the store.
    Error(SessionError),
}
