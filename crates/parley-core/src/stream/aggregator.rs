//! Per-chat stream aggregation.
//!
//! [`transition`] is the pure half: it folds one `StreamEvent` into the
//! in-memory state and says what must be persisted. [`StreamAggregator`]
//! is the effectful half: it performs that persistence and publishes events.
//!
//! Every store write carries the full accumulated content, so a failed
//! append is repaired by the next successful append or by the finalize.

use std::sync::Arc;

use parley_types::chat::{ChatId, Message, MessageRole, NewMessage};
use parley_types::error::SessionError;
use parley_types::event::SessionEvent;
use parley_types::llm::StreamEvent;

use crate::session::{Session, SessionState};
use crate::store::ChatStore;

/// Outcome of folding one event into the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// First fragment: an assistant message with `content` must be created.
    Start { chat_id: ChatId, content: String },

    /// `fragment` was appended; `message` is the updated in-flight copy.
    Append { message: Message, fragment: String },

    /// The stream closed; `message` carries its final content and context.
    Finalize { message: Message },

    /// A completion arrived with nothing in flight. Any buffered text that
    /// never reached the store is returned in `discarded`.
    Inconsistent {
        chat_id: ChatId,
        discarded: Option<String>,
    },
}

/// Apply `event` for `chat_id` to `state`.
///
/// A `Start` leaves the in-flight map untouched; the driver registers the
/// message once the store has assigned it an id.
pub fn transition(state: &mut SessionState, chat_id: ChatId, event: StreamEvent) -> Transition {
    match event {
        StreamEvent::Partial(fragment) => match state.in_flight_mut(chat_id) {
            Some(message) => {
                message.content.push_str(&fragment);
                let message = message.clone();
                state.mirror_visible(&message);
                Transition::Append { message, fragment }
            }
            None => {
                let mut content = state.take_unsaved(chat_id).unwrap_or_default();
                content.push_str(&fragment);
                Transition::Start { chat_id, content }
            }
        },
        StreamEvent::Complete(context) => match state.finish_stream(chat_id) {
            Some(mut message) => {
                message.context = context;
                state.mirror_visible(&message);
                Transition::Finalize { message }
            }
            None => Transition::Inconsistent {
                chat_id,
                discarded: state.take_unsaved(chat_id),
            },
        },
    }
}

/// Drives [`transition`] against a store and a session.
pub struct StreamAggregator<S> {
    store: Arc<S>,
    session: Arc<Session>,
}

impl<S> Clone for StreamAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: Arc::clone(&self.session),
        }
    }
}

impl<S: ChatStore> StreamAggregator<S> {
    pub fn new(store: Arc<S>, session: Arc<Session>) -> Self {
        Self { store, session }
    }

    /// Fold one stream event for `chat_id` into state and store.
    ///
    /// Never fails: store errors are reported on the session and the
    /// in-memory content is kept.
    pub async fn apply(&self, chat_id: ChatId, event: StreamEvent) {
        let step = self.session.update(|state| transition(state, chat_id, event));

        match step {
            Transition::Start { chat_id, content } => self.start(chat_id, content).await,
            Transition::Append { message, fragment } => self.append(message, fragment).await,
            Transition::Finalize { message } => self.finalize(message).await,
            Transition::Inconsistent { chat_id, discarded } => {
                if let Some(text) = discarded {
                    tracing::warn!(
                        chat_id = %chat_id,
                        bytes = text.len(),
                        "dropping stream text that was never persisted"
                    );
                }
                self.session
                    .report(SessionError::StreamInconsistency { chat_id });
            }
        }
    }

    /// Drop whatever is in flight for `chat_id`. Content already written to
    /// the store stays as it is.
    pub fn abandon(&self, chat_id: ChatId) {
        let dropped = self.session.update(|state| state.abandon_stream(chat_id));
        tracing::debug!(chat_id = %chat_id, dropped, "stream abandoned");
        self.session.publish(SessionEvent::StreamAbandoned { chat_id });
    }

    async fn start(&self, chat_id: ChatId, content: String) {
        let new = NewMessage::now(chat_id, MessageRole::Assistant, content.clone());
        match self.store.create_message(&new).await {
            Ok(message) => {
                let message_id = message.id;
                let visible = self.session.update(|state| {
                    let visible = state.is_active(chat_id);
                    state.begin_stream(message);
                    visible
                });
                tracing::debug!(chat_id = %chat_id, message_id = %message_id, "stream started");
                self.session
                    .publish(SessionEvent::StreamStarted { chat_id, message_id });
                self.session.publish(SessionEvent::StreamFragment {
                    chat_id,
                    message_id,
                    text: content,
                });
                if visible {
                    self.session.publish(SessionEvent::MessagesChanged { chat_id });
                }
            }
            Err(err) => {
                self.session
                    .update(|state| state.stash_unsaved(chat_id, content));
                self.session.report(err);
            }
        }
    }

    async fn append(&self, message: Message, fragment: String) {
        let chat_id = message.chat_id;
        self.session.publish(SessionEvent::StreamFragment {
            chat_id,
            message_id: message.id,
            text: fragment,
        });

        if let Err(err) = self.store.update_message(&message).await {
            self.session.report(err);
            return;
        }

        if self.session.read(|state| state.is_active(chat_id)) {
            if let Err(err) = self.session.sync_messages(self.store.as_ref(), chat_id).await {
                self.session.report(err);
            }
        }
    }

    async fn finalize(&self, message: Message) {
        let chat_id = message.chat_id;
        let message_id = message.id;
        match self.store.update_message(&message).await {
            Ok(()) => {
                tracing::debug!(
                    chat_id = %chat_id,
                    message_id = %message_id,
                    has_context = message.context.is_some(),
                    "stream finalized"
                );
            }
            Err(err) => self.session.report(err),
        }
        self.session
            .publish(SessionEvent::StreamFinalized { chat_id, message_id });
    }
}
