//! In-memory `ChatStore` implementation.
//!
//! Useful for tests and for sessions that should not touch disk. Supports
//! failure injection per [`StoreOperation`] so callers can exercise their
//! error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use parley_types::chat::{Chat, ChatId, Message, MessageId, NewChat, NewMessage};
use parley_types::error::{StorageError, StoreOperation};

use super::repository::{chat_key, message_key, ChatStore, ALL_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Always,
    Once,
}

#[derive(Debug, Default)]
struct Inner {
    chats: BTreeMap<ChatId, Chat>,
    messages: BTreeMap<MessageId, Message>,
    last_chat_id: i64,
    last_message_id: i64,
    failures: HashMap<StoreOperation, Failure>,
}

impl Inner {
    /// Consume an injected failure for `operation`, if one is armed.
    fn check(&mut self, operation: StoreOperation, key: &str) -> Result<(), StorageError> {
        match self.failures.get(&operation).copied() {
            Some(Failure::Always) => Err(StorageError::new(operation, key, "injected failure")),
            Some(Failure::Once) => {
                self.failures.remove(&operation);
                Err(StorageError::new(operation, key, "injected failure"))
            }
            None => Ok(()),
        }
    }
}

/// Cloneable in-memory store; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryChatStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Make every subsequent call of `operation` fail until [`heal`](Self::heal).
    pub fn fail_on(&self, operation: StoreOperation) {
        self.with_inner(|inner| inner.failures.insert(operation, Failure::Always));
    }

    /// Make only the next call of `operation` fail.
    pub fn fail_next(&self, operation: StoreOperation) {
        self.with_inner(|inner| inner.failures.insert(operation, Failure::Once));
    }

    pub fn heal(&self, operation: StoreOperation) {
        self.with_inner(|inner| inner.failures.remove(&operation));
    }

    pub fn heal_all(&self) {
        self.with_inner(|inner| inner.failures.clear());
    }

    pub fn chat_count(&self) -> usize {
        self.with_inner(|inner| inner.chats.len())
    }

    pub fn message_count(&self) -> usize {
        self.with_inner(|inner| inner.messages.len())
    }
}

impl ChatStore for MemoryChatStore {
    async fn create_chat(&self, chat: &NewChat) -> Result<Chat, StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::CreateChat, "chat:new")?;
            inner.last_chat_id += 1;
            let chat = chat.clone().with_id(ChatId(inner.last_chat_id));
            inner.chats.insert(chat.id, chat.clone());
            Ok(chat)
        })
    }

    async fn get_chat(&self, id: ChatId) -> Result<Option<Chat>, StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::GetChat, &chat_key(id))?;
            Ok(inner.chats.get(&id).cloned())
        })
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::ListChats, ALL_KEY)?;
            Ok(inner.chats.values().cloned().collect())
        })
    }

    async fn update_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        self.with_inner(|inner| {
            let key = chat_key(chat.id);
            inner.check(StoreOperation::UpdateChat, &key)?;
            match inner.chats.get_mut(&chat.id) {
                Some(stored) => {
                    stored.name = chat.name.clone();
                    stored.model = chat.model.clone();
                    Ok(())
                }
                None => Err(StorageError::not_found(StoreOperation::UpdateChat, key)),
            }
        })
    }

    async fn delete_chat(&self, id: ChatId) -> Result<(), StorageError> {
        self.with_inner(|inner| {
            let key = chat_key(id);
            inner.check(StoreOperation::DeleteChat, &key)?;
            if inner.chats.remove(&id).is_none() {
                return Err(StorageError::not_found(StoreOperation::DeleteChat, key));
            }
            inner.messages.retain(|_, message| message.chat_id != id);
            Ok(())
        })
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::CreateMessage, "message:new")?;
            if !inner.chats.contains_key(&message.chat_id) {
                return Err(StorageError::not_found(
                    StoreOperation::CreateMessage,
                    chat_key(message.chat_id),
                ));
            }
            inner.last_message_id += 1;
            let message = message.clone().with_id(MessageId(inner.last_message_id));
            inner.messages.insert(message.id, message.clone());
            Ok(message)
        })
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::GetMessage, &message_key(id))?;
            Ok(inner.messages.get(&id).cloned())
        })
    }

    async fn update_message(&self, message: &Message) -> Result<(), StorageError> {
        self.with_inner(|inner| {
            let key = message_key(message.id);
            inner.check(StoreOperation::UpdateMessage, &key)?;
            match inner.messages.get_mut(&message.id) {
                Some(stored) => {
                    stored.content = message.content.clone();
                    stored.context = message.context.clone();
                    stored.meta = message.meta.clone();
                    Ok(())
                }
                None => Err(StorageError::not_found(StoreOperation::UpdateMessage, key)),
            }
        })
    }

    async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::ListMessages, &chat_key(chat_id))?;
            let mut messages: Vec<Message> = inner
                .messages
                .values()
                .filter(|message| message.chat_id == chat_id)
                .cloned()
                .collect();
            messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(messages)
        })
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.with_inner(|inner| {
            inner.check(StoreOperation::Clear, ALL_KEY)?;
            inner.chats.clear();
            inner.messages.clear();
            Ok(())
        })
    }
}
