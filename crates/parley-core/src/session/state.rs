//! In-memory projection of the session.
//!
//! `SessionState` holds the chat cache, the active chat, its ordered message
//! list, and the per-chat in-flight assistant messages. It performs no
//! validation of its own: the orchestrator and the stream aggregator keep it
//! consistent with the store. Derived views are recomputed on every read.

use std::collections::HashMap;

use parley_types::chat::{Chat, ChatId, Message};

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    chats: Vec<Chat>,
    active_chat: Option<Chat>,
    messages: Vec<Message>,
    /// At most one open assistant message per chat.
    in_flight: HashMap<ChatId, Message>,
    /// Stream text whose message could not be created yet; never visible.
    unsaved: HashMap<ChatId, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Chat cache ---

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, id: ChatId) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    pub fn replace_chats(&mut self, chats: Vec<Chat>) {
        self.chats = chats;
    }

    pub fn push_chat(&mut self, chat: Chat) {
        self.chats.push(chat);
    }

    /// Replace a cached chat by id (inserting it if absent) and mirror the
    /// change into the active chat.
    pub fn upsert_chat(&mut self, chat: Chat) {
        if let Some(active) = self.active_chat.as_mut().filter(|a| a.id == chat.id) {
            *active = chat.clone();
        }
        match self.chats.iter_mut().find(|cached| cached.id == chat.id) {
            Some(cached) => *cached = chat,
            None => self.chats.push(chat),
        }
    }

    pub fn remove_chat(&mut self, id: ChatId) -> Option<Chat> {
        let index = self.chats.iter().position(|chat| chat.id == id)?;
        Some(self.chats.remove(index))
    }

    /// Chats newest first; ties on `created_at` fall back to the higher id.
    pub fn sorted_chats(&self) -> Vec<Chat> {
        let mut chats = self.chats.clone();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        chats
    }

    pub fn newest_chat(&self) -> Option<&Chat> {
        self.chats
            .iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    }

    // --- Active chat ---

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat.as_ref()
    }

    pub fn active_chat_id(&self) -> Option<ChatId> {
        self.active_chat.as_ref().map(|chat| chat.id)
    }

    pub fn set_active_chat(&mut self, chat: Option<Chat>) {
        self.active_chat = chat;
    }

    pub fn is_active(&self, id: ChatId) -> bool {
        self.active_chat_id() == Some(id)
    }

    pub fn has_active_chat(&self) -> bool {
        self.active_chat.is_some()
    }

    // --- Visible messages ---

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Replace the visible list with freshly loaded messages.
    ///
    /// Messages that are currently in flight keep their in-memory content,
    /// which may be ahead of what the store holds.
    pub fn replace_messages(&mut self, mut messages: Vec<Message>) {
        for message in &mut messages {
            if let Some(live) = self
                .in_flight
                .get(&message.chat_id)
                .filter(|live| live.id == message.id)
            {
                *message = live.clone();
            }
        }
        self.messages = messages;
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Overwrite the visible copy of `message`, if it is visible.
    pub fn mirror_visible(&mut self, message: &Message) {
        if let Some(visible) = self.messages.iter_mut().find(|m| m.id == message.id) {
            *visible = message.clone();
        }
    }

    // --- Streams ---

    pub fn in_flight(&self, chat_id: ChatId) -> Option<&Message> {
        self.in_flight.get(&chat_id)
    }

    pub fn in_flight_mut(&mut self, chat_id: ChatId) -> Option<&mut Message> {
        self.in_flight.get_mut(&chat_id)
    }

    pub fn is_streaming(&self, chat_id: ChatId) -> bool {
        self.in_flight.contains_key(&chat_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Register a freshly persisted assistant message as the chat's open
    /// stream and show it if its chat is active.
    pub fn begin_stream(&mut self, message: Message) {
        let chat_id = message.chat_id;
        if self.is_active(chat_id) && !self.messages.iter().any(|m| m.id == message.id) {
            self.messages.push(message.clone());
        }
        self.in_flight.insert(chat_id, message);
    }

    /// Close the chat's open stream, returning its message.
    pub fn finish_stream(&mut self, chat_id: ChatId) -> Option<Message> {
        self.in_flight.remove(&chat_id)
    }

    /// Drop the chat's open stream and any unsaved text. Returns whether
    /// anything was dropped.
    pub fn abandon_stream(&mut self, chat_id: ChatId) -> bool {
        let had_message = self.in_flight.remove(&chat_id).is_some();
        let had_unsaved = self.unsaved.remove(&chat_id).is_some();
        had_message || had_unsaved
    }

    pub fn stash_unsaved(&mut self, chat_id: ChatId, text: String) {
        self.unsaved.entry(chat_id).or_default().push_str(&text);
    }

    pub fn take_unsaved(&mut self, chat_id: ChatId) -> Option<String> {
        self.unsaved.remove(&chat_id)
    }

    pub fn unsaved(&self, chat_id: ChatId) -> Option<&str> {
        self.unsaved.get(&chat_id).map(String::as_str)
    }

    /// Back to the empty state of a fresh session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Continuation token of the most recent message that carries one.
pub fn latest_context(messages: &[Message]) -> Option<String> {
    messages.iter().rev().find_map(|message| message.context.clone())
}
