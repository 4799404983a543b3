//! Shared session handle.
//!
//! `Session` couples the [`SessionState`] with a broadcast channel of
//! [`SessionEvent`]s and the last swallowed error. It is shared (`Arc`) between the orchestrator and the
//! stream aggregator. The state lock is synchronous and is never held across
//! an `.await`.

use std::sync::{Mutex, PoisonError};

use parley_types::chat::{ChatId, Message};
use parley_types::error::{SessionError, StorageError};
use parley_types::event::SessionEvent;
use tokio::sync::broadcast;

use super::state::SessionState;
use crate::store::ChatStore;

pub struct Session {
    state: Mutex<SessionState>,
    last_error: Mutex<Option<SessionError>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(SessionState::new()),
            last_error: Mutex::new(None),
            events,
        }
    }

    /// Run `f` against a shared view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Run `f` against the state with exclusive access.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn snapshot(&self) -> SessionState {
        self.read(SessionState::clone)
    }

    /// Drop all cached state and the last error.
    pub fn reset(&self) {
        self.update(SessionState::reset);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a swallowed failure: log it, keep it as the last error and
    /// broadcast it.
    pub fn report(&self, err: impl Into<SessionError>) {
        let err = err.into();
        match &err {
            SessionError::Storage(storage) => tracing::error!(
                operation = %storage.operation,
                key = %storage.key,
                reason = %storage.reason,
                "store operation failed"
            ),
            SessionError::StreamInconsistency { chat_id } => tracing::error!(
                chat_id = %chat_id,
                "completion arrived with no message in flight"
            ),
            SessionError::PreconditionViolation(detail) => {
                tracing::warn!(detail = %detail, "precondition violated")
            }
            SessionError::Transport(detail) => {
                tracing::error!(detail = %detail, "completion transport failed")
            }
        }
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
        self.publish(SessionEvent::Error(err));
    }

    /// Broadcast `event`. Dropped when nobody is subscribed.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Reload the messages of `chat_id` from the store.
    ///
    /// The visible list is replaced only if `chat_id` is still the active
    /// chat once the load completes; a switch during the load wins.
    pub async fn sync_messages<S: ChatStore>(
        &self,
        store: &S,
        chat_id: ChatId,
    ) -> Result<Vec<Message>, StorageError> {
        let messages = store.list_messages(chat_id).await?;
        let applied = self.update(|state| {
            if state.is_active(chat_id) {
                state.replace_messages(messages.clone());
                true
            } else {
                false
            }
        });
        if applied {
            self.publish(SessionEvent::MessagesChanged { chat_id });
        }
        Ok(messages)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.snapshot())
            .field("last_error", &self.last_error())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}
