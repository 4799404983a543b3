//! ChatStore trait definition.
//!
//! CRUD over the two record collections (chats, messages), an equality
//! query of messages by chat id, and a bulk clear.

use parley_types::chat::{Chat, ChatId, Message, MessageId, NewChat, NewMessage};
use parley_types::error::StorageError;

/// Persistence port for chats and messages.
///
/// Every write either durably succeeds before the returned future resolves
/// `Ok`, or fails and leaves prior state untouched. Updating or deleting a
/// record that does not exist fails with a "not found" `StorageError`.
///
/// Implementations live in parley-infra (e.g., `SqliteChatStore`) and in
/// [`crate::store::memory`]. Uses native async fn in traits (RPITIT, Rust
/// 2024 edition).
pub trait ChatStore: Send + Sync {
    /// Insert a chat and return it with its assigned id.
    fn create_chat(
        &self,
        chat: &NewChat,
    ) -> impl std::future::Future<Output = Result<Chat, StorageError>> + Send;

    fn get_chat(
        &self,
        id: ChatId,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, StorageError>> + Send;

    /// All chats, in no particular order.
    fn list_chats(&self) -> impl std::future::Future<Output = Result<Vec<Chat>, StorageError>> + Send;

    /// Overwrite the name and model of an existing chat.
    fn update_chat(
        &self,
        chat: &Chat,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Delete a chat together with all of its messages.
    fn delete_chat(
        &self,
        id: ChatId,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Insert a message and return it with its assigned id.
    ///
    /// Fails if the parent chat does not exist.
    fn create_message(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Message, StorageError>> + Send;

    fn get_message(
        &self,
        id: MessageId,
    ) -> impl std::future::Future<Output = Result<Option<Message>, StorageError>> + Send;

    /// Overwrite the content, context, and metadata of an existing message.
    fn update_message(
        &self,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Messages of one chat, ordered by `created_at` then id.
    fn list_messages(
        &self,
        chat_id: ChatId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StorageError>> + Send;

    /// Remove every chat and message.
    fn clear(&self) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

/// Key used in `StorageError` for a chat record.
pub fn chat_key(id: ChatId) -> String {
    format!("chat:{id}")
}

/// Key used in `StorageError` for a message record.
pub fn message_key(id: MessageId) -> String {
    format!("message:{id}")
}

/// Key used in `StorageError` for collection-wide operations.
pub const ALL_KEY: &str = "*";
