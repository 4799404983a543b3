//! Session orchestrator: the entry points a presentation layer calls.
//!
//! Every operation takes `&self` and returns nothing fallible. Store and
//! transport failures are reported on the [`Session`] (logged, kept as the
//! last error, broadcast) and the operation stops where it failed. Requests
//! whose preconditions do not hold (no active chat, a chat that already has
//! a generation running) are logged and ignored.
//!
//! Operations may run concurrently on one runtime and interleave at store
//! and transport awaits. Open generations are tracked per chat with a
//! `CancellationToken`, which doubles as the per-chat streaming lock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use parley_types::chat::{Chat, ChatId, Message, MessageRole, NewChat, NewMessage};
use parley_types::config::ParleyConfig;
use parley_types::error::SessionError;
use parley_types::event::SessionEvent;
use parley_types::llm::{GenerateRequest, StreamEvent};

use super::handle::Session;
use super::state::{latest_context, SessionState};
use crate::llm::CompletionTransport;
use crate::store::ChatStore;
use crate::stream::StreamAggregator;

pub struct SessionOrchestrator<S, T> {
    store: Arc<S>,
    transport: T,
    session: Arc<Session>,
    aggregator: StreamAggregator<S>,
    streams: DashMap<ChatId, CancellationToken>,
    config: ParleyConfig,
}

impl<S: ChatStore, T: CompletionTransport> SessionOrchestrator<S, T> {
    pub fn new(store: Arc<S>, transport: T, config: ParleyConfig) -> Self {
        let session = Arc::new(Session::new(config.event_capacity));
        let aggregator = StreamAggregator::new(Arc::clone(&store), Arc::clone(&session));
        Self {
            store,
            transport,
            session,
            aggregator,
            streams: DashMap::new(),
            config,
        }
    }

    /// Load the chat list and activate the newest chat, or start a default
    /// chat if the store is empty.
    pub async fn initialize(&self) {
        let chats = match self.store.list_chats().await {
            Ok(chats) => chats,
            Err(err) => {
                self.session.report(err);
                return;
            }
        };

        let newest = self.session.update(|state| {
            state.replace_chats(chats);
            state.newest_chat().map(|chat| chat.id)
        });
        self.session.publish(SessionEvent::ChatsChanged);

        match newest {
            Some(chat_id) => self.switch_chat(chat_id).await,
            None => {
                tracing::info!("no chats stored; starting a default chat");
                self.start_new_chat(
                    self.config.default_chat_name.clone(),
                    self.config.default_model.clone(),
                )
                .await;
            }
        }
    }

    /// Make `chat_id` the active chat and load its messages. Unknown ids are
    /// ignored.
    pub async fn switch_chat(&self, chat_id: ChatId) {
        let chat = match self.store.get_chat(chat_id).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                tracing::debug!(chat_id = %chat_id, "switch to unknown chat ignored");
                return;
            }
            Err(err) => {
                self.session.report(err);
                return;
            }
        };

        self.session.update(|state| {
            state.set_active_chat(Some(chat));
            state.clear_messages();
        });
        self.session.publish(SessionEvent::ActiveChatChanged {
            chat_id: Some(chat_id),
        });

        if let Err(err) = self.session.sync_messages(self.store.as_ref(), chat_id).await {
            self.session.report(err);
        }
    }

    /// Change the model of the active chat, only while it has no messages.
    pub async fn switch_model(&self, model: impl Into<String>) {
        let target = self.session.read(|state| match state.active_chat() {
            None => Err("no active chat"),
            Some(_) if state.has_messages() => Err("model is fixed once a chat has messages"),
            Some(chat) => Ok(chat.clone()),
        });
        let chat = match target {
            Ok(chat) => chat,
            Err(reason) => {
                refuse(reason);
                return;
            }
        };
        // An empty list may only mean the last reload failed.
        match self.store.list_messages(chat.id).await {
            Ok(stored) if !stored.is_empty() => {
                refuse("model is fixed once a chat has messages");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                self.session.report(err);
                return;
            }
        }

        let updated = Chat {
            model: model.into(),
            ..chat
        };
        if let Err(err) = self.store.update_chat(&updated).await {
            self.session.report(err);
            return;
        }

        tracing::info!(chat_id = %updated.id, model = %updated.model, "chat model switched");
        self.session.update(|state| state.upsert_chat(updated));
        self.session.publish(SessionEvent::ChatsChanged);
    }

    /// Create a chat, make it active and show its (empty) message list.
    pub async fn start_new_chat(
        &self,
        name: impl Into<String>,
        model: impl Into<String>,
    ) -> Option<Chat> {
        let new = NewChat::now(name, model);
        let chat = match self.store.create_chat(&new).await {
            Ok(chat) => chat,
            Err(err) => {
                self.session.report(err);
                return None;
            }
        };

        tracing::info!(chat_id = %chat.id, model = %chat.model, "chat started");
        self.session.update(|state| {
            state.push_chat(chat.clone());
            state.set_active_chat(Some(chat.clone()));
            state.clear_messages();
        });
        self.session.publish(SessionEvent::ChatsChanged);
        self.session.publish(SessionEvent::ActiveChatChanged {
            chat_id: Some(chat.id),
        });
        self.session
            .publish(SessionEvent::MessagesChanged { chat_id: chat.id });
        Some(chat)
    }

    pub async fn rename_chat(&self, chat_id: ChatId, name: impl Into<String>) {
        let chat = match self.store.get_chat(chat_id).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                refuse(format!("chat {chat_id} does not exist"));
                return;
            }
            Err(err) => {
                self.session.report(err);
                return;
            }
        };

        let renamed = Chat {
            name: name.into(),
            ..chat
        };
        if let Err(err) = self.store.update_chat(&renamed).await {
            self.session.report(err);
            return;
        }

        self.session.update(|state| state.upsert_chat(renamed));
        self.session.publish(SessionEvent::ChatsChanged);
    }

    /// Persist a system message in the active chat. Does not trigger a
    /// generation.
    pub async fn add_system_message(
        &self,
        content: impl Into<String>,
        meta: Option<serde_json::Value>,
    ) {
        let Some(chat_id) = self.session.read(SessionState::active_chat_id) else {
            refuse("no active chat");
            return;
        };

        let new = NewMessage::now(chat_id, MessageRole::System, content).with_meta(meta);
        match self.store.create_message(&new).await {
            Ok(message) => self.show_message(message),
            Err(err) => self.session.report(err),
        }
    }

    /// Persist a user message in the active chat and stream the reply into
    /// a new assistant message.
    ///
    /// Returns once the generation has completed, failed, or been cancelled.
    pub async fn add_user_message(&self, content: impl Into<String>) {
        let Some(chat) = self.session.read(|state| state.active_chat().cloned()) else {
            refuse("no active chat");
            return;
        };

        let cancel = CancellationToken::new();
        match self.streams.entry(chat.id) {
            Entry::Occupied(_) => {
                refuse(format!("chat {} already has a generation running", chat.id));
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }

        self.converse(&chat, content.into(), &cancel).await;
        self.streams.remove(&chat.id);
    }

    async fn converse(&self, chat: &Chat, content: String, cancel: &CancellationToken) {
        let chat_id = chat.id;

        let history = match self.session.sync_messages(self.store.as_ref(), chat_id).await {
            Ok(messages) => messages,
            Err(err) => {
                self.session.report(err);
                self.session.read(|state| state.messages().to_vec())
            }
        };

        let new = NewMessage::now(chat_id, MessageRole::User, content.clone());
        match self.store.create_message(&new).await {
            Ok(message) => self.show_message(message),
            Err(err) => {
                self.session.report(err);
                return;
            }
        }

        let request = GenerateRequest {
            model: chat.model.clone(),
            prompt: content,
            context: latest_context(&history),
        };
        tracing::info!(
            chat_id = %chat_id,
            model = %request.model,
            transport = self.transport.name(),
            has_context = request.context.is_some(),
            "generation requested"
        );

        let mut stream = self.transport.generate(request);
        let mut completed = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(chat_id = %chat_id, "generation cancelled");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        let done = matches!(event, StreamEvent::Complete(_));
                        self.aggregator.apply(chat_id, event).await;
                        if done {
                            completed = true;
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        self.session.report(SessionError::Transport(err.to_string()));
                        break;
                    }
                    None => {
                        tracing::warn!(chat_id = %chat_id, "generation ended without completion");
                        break;
                    }
                },
            }
        }

        if !completed {
            self.aggregator.abandon(chat_id);
        }
    }

    /// Cancel the running generation of `chat_id`. Returns whether one was
    /// running.
    pub fn cancel_stream(&self, chat_id: ChatId) -> bool {
        match self.streams.get(&chat_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Delete a chat and its messages. If it was active, the newest
    /// remaining chat becomes active, or a default chat is started.
    pub async fn delete_chat(&self, chat_id: ChatId) {
        self.cancel_stream(chat_id);

        let cached_model = self
            .session
            .read(|state| state.chat(chat_id).map(|chat| chat.model.clone()));
        let model = match cached_model {
            Some(model) => Some(model),
            None => self
                .store
                .get_chat(chat_id)
                .await
                .ok()
                .flatten()
                .map(|chat| chat.model),
        };

        if let Err(err) = self.store.delete_chat(chat_id).await {
            self.session.report(err);
            return;
        }
        tracing::info!(chat_id = %chat_id, "chat deleted");

        let was_active = self.session.update(|state| {
            state.abandon_stream(chat_id);
            state.remove_chat(chat_id);
            let was_active = state.is_active(chat_id);
            if was_active {
                state.set_active_chat(None);
                state.clear_messages();
            }
            was_active
        });
        self.session.publish(SessionEvent::ChatsChanged);
        if !was_active {
            return;
        }
        self.session
            .publish(SessionEvent::ActiveChatChanged { chat_id: None });

        match self.session.read(|state| state.newest_chat().map(|chat| chat.id)) {
            Some(next) => self.switch_chat(next).await,
            None => {
                let model = model.unwrap_or_else(|| self.config.fallback_model.clone());
                self.start_new_chat(self.config.default_chat_name.clone(), model)
                    .await;
            }
        }
    }

    /// Remove every chat and message, then start one default chat that keeps
    /// the previously active chat's model.
    pub async fn wipe_database(&self) {
        let model = self
            .session
            .read(|state| state.active_chat().map(|chat| chat.model.clone()))
            .unwrap_or_else(|| self.config.fallback_model.clone());

        for stream in self.streams.iter() {
            stream.value().cancel();
        }

        if let Err(err) = self.store.clear().await {
            self.session.report(err);
            return;
        }
        tracing::info!("database wiped");

        self.session.reset();
        self.session.publish(SessionEvent::ChatsChanged);
        self.session
            .publish(SessionEvent::ActiveChatChanged { chat_id: None });

        self.start_new_chat(self.config.default_chat_name.clone(), model)
            .await;
    }

    fn show_message(&self, message: Message) {
        let chat_id = message.chat_id;
        let shown = self.session.update(|state| {
            if state.is_active(chat_id) {
                state.push_message(message);
                true
            } else {
                false
            }
        });
        if shown {
            self.session.publish(SessionEvent::MessagesChanged { chat_id });
        }
    }
}

// Read views. These never touch the store.
impl<S, T> SessionOrchestrator<S, T> {
    pub fn chats(&self) -> Vec<Chat> {
        self.session.read(|state| state.chats().to_vec())
    }

    pub fn sorted_chats(&self) -> Vec<Chat> {
        self.session.read(SessionState::sorted_chats)
    }

    pub fn active_chat(&self) -> Option<Chat> {
        self.session.read(|state| state.active_chat().cloned())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.session.read(|state| state.messages().to_vec())
    }

    pub fn has_active_chat(&self) -> bool {
        self.session.read(SessionState::has_active_chat)
    }

    pub fn has_messages(&self) -> bool {
        self.session.read(SessionState::has_messages)
    }

    /// Whether a generation is running for `chat_id`.
    pub fn is_streaming(&self, chat_id: ChatId) -> bool {
        self.streams.contains_key(&chat_id)
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.session.last_error()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }
}

fn refuse(detail: impl Into<String>) {
    let err = SessionError::PreconditionViolation(detail.into());
    tracing::warn!(error = %err, "request ignored");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::ScriptedTransport;
    use crate::store::MemoryChatStore;
    use parley_types::error::StoreOperation;
    use parley_types::llm::LlmError;

    type Orchestrator = SessionOrchestrator<MemoryChatStore, ScriptedTransport>;

    fn setup() -> (MemoryChatStore, ScriptedTransport, Arc<Orchestrator>) {
        let store = MemoryChatStore::new();
        let transport = ScriptedTransport::new();
        let orchestrator = SessionOrchestrator::new(
            Arc::new(store.clone()),
            transport.clone(),
            ParleyConfig::default(),
        );
        (store, transport, Arc::new(orchestrator))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn seed_chat(store: &MemoryChatStore, name: &str, messages: usize) -> Chat {
        let chat = store.create_chat(&NewChat::now(name, "mistral")).await.unwrap();
        for i in 0..messages {
            store
                .create_message(&NewMessage::now(chat.id, MessageRole::User, format!("m{i}")))
                .await
                .unwrap();
        }
        chat
    }

    #[tokio::test]
    async fn test_initialize_empty_store_creates_default_chat() {
        let (store, _transport, orch) = setup();

        orch.initialize().await;

        assert_eq!(store.chat_count(), 1);
        let active = orch.active_chat().unwrap();
        assert_eq!(active.name, "New Chat");
        assert_eq!(active.model, "llama3");
        assert_eq!(orch.chats().len(), 1);
        assert!(!orch.has_messages());
    }

    #[tokio::test]
    async fn test_initialize_activates_newest_chat() {
        let (store, _transport, orch) = setup();
        seed_chat(&store, "old", 1).await;
        let newest = seed_chat(&store, "new", 3).await;

        orch.initialize().await;

        assert_eq!(orch.active_chat().unwrap().id, newest.id);
        assert_eq!(orch.messages().len(), 3);
        assert_eq!(store.chat_count(), 2);
    }

    #[tokio::test]
    async fn test_initialize_failure_leaves_no_active_chat() {
        let (store, _transport, orch) = setup();
        store.fail_next(StoreOperation::ListChats);

        orch.initialize().await;

        assert!(!orch.has_active_chat());
        assert!(matches!(orch.last_error(), Some(SessionError::Storage(_))));
    }

    #[tokio::test]
    async fn test_switch_chat_loads_messages() {
        let (store, _transport, orch) = setup();
        let a = seed_chat(&store, "a", 2).await;
        seed_chat(&store, "b", 0).await;
        orch.initialize().await;
        assert!(!orch.has_messages());

        orch.switch_chat(a.id).await;

        assert_eq!(orch.active_chat().unwrap().id, a.id);
        assert_eq!(orch.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_switch_chat_unknown_id_is_noop() {
        let (_store, _transport, orch) = setup();
        orch.initialize().await;
        let before = orch.active_chat();

        orch.switch_chat(ChatId(999)).await;

        assert_eq!(orch.active_chat(), before);
        assert!(orch.last_error().is_none());
    }

    #[tokio::test]
    async fn test_user_message_streams_reply() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        transport.reply(&["He", "llo"], Some("tok1"));

        orch.add_user_message("hi").await;

        let chat_id = orch.active_chat().unwrap().id;
        let stored = store.list_messages(chat_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, MessageRole::User);
        assert_eq!(stored[0].content, "hi");
        assert_eq!(stored[1].role, MessageRole::Assistant);
        assert_eq!(stored[1].content, "Hello");
        assert_eq!(stored[1].context.as_deref(), Some("tok1"));

        assert_eq!(orch.messages(), stored);
        assert!(!orch.is_streaming(chat_id));
        assert!(orch.last_error().is_none());

        let request = &transport.requests()[0];
        assert_eq!(request.model, "llama3");
        assert_eq!(request.prompt, "hi");
        assert_eq!(request.context, None);
    }

    #[tokio::test]
    async fn test_context_is_forwarded_from_latest_reply() {
        let (_store, transport, orch) = setup();
        orch.initialize().await;
        transport.reply(&["one"], Some("tok1"));
        transport.reply(&["two"], Some("tok2"));
        transport.reply(&["three"], None);

        orch.add_user_message("first").await;
        orch.add_user_message("second").await;
        orch.add_user_message("third").await;

        let contexts: Vec<Option<String>> =
            transport.requests().into_iter().map(|r| r.context).collect();
        assert_eq!(
            contexts,
            vec![None, Some("tok1".to_string()), Some("tok2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_contextless_reply_yields_no_context_next_time() {
        let (_store, transport, orch) = setup();
        orch.initialize().await;
        transport.reply(&["ok"], None);
        transport.reply(&["ok"], None);

        orch.add_user_message("first").await;
        orch.add_user_message("second").await;

        assert_eq!(transport.requests()[1].context, None);
    }

    #[tokio::test]
    async fn test_user_message_without_active_chat_is_noop() {
        let (store, transport, orch) = setup();

        orch.add_user_message("hi").await;

        assert!(transport.requests().is_empty());
        assert_eq!(store.message_count(), 0);
        assert!(orch.last_error().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_abandons_stream() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        transport.reply_events(vec![
            Ok(StreamEvent::Partial("Hal".to_string())),
            Err(LlmError::Stream("connection reset".to_string())),
        ]);

        orch.add_user_message("hi").await;

        let chat_id = orch.active_chat().unwrap().id;
        assert!(matches!(orch.last_error(), Some(SessionError::Transport(_))));
        assert_eq!(orch.session().read(SessionState::in_flight_count), 0);
        let stored = store.list_messages(chat_id).await.unwrap();
        assert_eq!(stored[1].content, "Hal");
        assert!(stored[1].context.is_none());
        assert!(!orch.is_streaming(chat_id));
    }

    #[tokio::test]
    async fn test_stream_without_completion_is_abandoned() {
        let (_store, transport, orch) = setup();
        orch.initialize().await;
        transport.reply_events(vec![Ok(StreamEvent::Partial("x".to_string()))]);
        let mut rx = orch.subscribe();

        orch.add_user_message("hi").await;

        assert_eq!(orch.session().read(SessionState::in_flight_count), 0);
        let mut abandoned = false;
        while let Ok(event) = rx.try_recv() {
            abandoned |= matches!(event, SessionEvent::StreamAbandoned { .. });
        }
        assert!(abandoned);
    }

    #[tokio::test]
    async fn test_user_message_store_failure_skips_generation() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        store.fail_next(StoreOperation::CreateMessage);

        orch.add_user_message("hi").await;

        assert!(transport.requests().is_empty());
        assert!(matches!(orch.last_error(), Some(SessionError::Storage(_))));
    }

    #[tokio::test]
    async fn test_second_message_while_streaming_is_rejected() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;
        let tx = transport.reply_channel();

        let running = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.add_user_message("first").await }
        });
        wait_until(|| transport.requests().len() == 1).await;
        assert!(orch.is_streaming(chat_id));

        orch.add_user_message("second").await;
        assert_eq!(transport.requests().len(), 1);

        tx.send(Ok(StreamEvent::Partial("done".to_string()))).unwrap();
        tx.send(Ok(StreamEvent::Complete(None))).unwrap();
        running.await.unwrap();

        let stored = store.list_messages(chat_id).await.unwrap();
        let users = stored.iter().filter(|m| m.role == MessageRole::User).count();
        assert_eq!(users, 1);
        assert!(!orch.is_streaming(chat_id));
    }

    #[tokio::test]
    async fn test_cancel_stream_abandons_in_flight() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;
        let tx = transport.reply_channel();

        let running = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.add_user_message("hi").await }
        });
        tx.send(Ok(StreamEvent::Partial("Hel".to_string()))).unwrap();
        wait_until(|| orch.session().read(|s| s.is_streaming(chat_id))).await;

        assert!(orch.cancel_stream(chat_id));
        running.await.unwrap();

        assert_eq!(orch.session().read(SessionState::in_flight_count), 0);
        assert!(!orch.is_streaming(chat_id));
        assert!(!orch.cancel_stream(chat_id));
        let stored = store.list_messages(chat_id).await.unwrap();
        assert_eq!(stored[1].content, "Hel");
    }

    #[tokio::test]
    async fn test_concurrent_streams_do_not_mix() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let a = orch.active_chat().unwrap();
        let tx_a = transport.reply_channel();
        let tx_b = transport.reply_channel();

        let task_a = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.add_user_message("to a").await }
        });
        wait_until(|| transport.requests().len() == 1).await;

        let b = orch.start_new_chat("B", "mistral").await.unwrap();
        let task_b = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.add_user_message("to b").await }
        });
        wait_until(|| transport.requests().len() == 2).await;

        for (tx, text) in [(&tx_a, "a1"), (&tx_b, "b1"), (&tx_a, "a2"), (&tx_b, "b2")] {
            tx.send(Ok(StreamEvent::Partial(text.to_string()))).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx_a.send(Ok(StreamEvent::Complete(Some("ta".to_string())))).unwrap();
        tx_b.send(Ok(StreamEvent::Complete(Some("tb".to_string())))).unwrap();
        task_a.await.unwrap();
        task_b.await.unwrap();

        let stored_a = store.list_messages(a.id).await.unwrap();
        let stored_b = store.list_messages(b.id).await.unwrap();
        assert_eq!(stored_a[1].content, "a1a2");
        assert_eq!(stored_a[1].context.as_deref(), Some("ta"));
        assert_eq!(stored_b[1].content, "b1b2");
        assert_eq!(stored_b[1].context.as_deref(), Some("tb"));

        // Only the active chat's messages are visible.
        assert_eq!(orch.messages(), stored_b);
        assert_eq!(transport.requests()[1].model, "mistral");
    }

    #[tokio::test]
    async fn test_switch_model_only_on_empty_chat() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;

        orch.switch_model("mistral").await;
        assert_eq!(orch.active_chat().unwrap().model, "mistral");
        assert_eq!(store.get_chat(chat_id).await.unwrap().unwrap().model, "mistral");
        assert_eq!(orch.chats()[0].model, "mistral");

        transport.reply(&["ok"], None);
        orch.add_user_message("hi").await;

        orch.switch_model("phi3").await;
        assert_eq!(orch.active_chat().unwrap().model, "mistral");
        assert_eq!(store.get_chat(chat_id).await.unwrap().unwrap().model, "mistral");
    }

    #[tokio::test]
    async fn test_switch_model_store_failure_keeps_memory() {
        let (store, _transport, orch) = setup();
        orch.initialize().await;
        store.fail_next(StoreOperation::UpdateChat);

        orch.switch_model("mistral").await;

        assert_eq!(orch.active_chat().unwrap().model, "llama3");
        assert!(orch.last_error().is_some());
    }

    #[tokio::test]
    async fn test_switch_model_checks_store_after_failed_reload() {
        let (store, _transport, orch) = setup();
        let a = seed_chat(&store, "a", 1).await;
        seed_chat(&store, "b", 0).await;
        orch.initialize().await;

        store.fail_next(StoreOperation::ListMessages);
        orch.switch_chat(a.id).await;
        assert_eq!(orch.active_chat().unwrap().id, a.id);
        assert!(!orch.has_messages());

        orch.switch_model("phi3").await;

        assert_eq!(orch.active_chat().unwrap().model, "mistral");
        assert_eq!(store.get_chat(a.id).await.unwrap().unwrap().model, "mistral");
    }

    #[tokio::test]
    async fn test_switch_model_list_failure_is_reported() {
        let (store, _transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;
        store.fail_next(StoreOperation::ListMessages);

        orch.switch_model("phi3").await;

        assert_eq!(orch.active_chat().unwrap().model, "llama3");
        assert_eq!(store.get_chat(chat_id).await.unwrap().unwrap().model, "llama3");
        assert!(matches!(orch.last_error(), Some(SessionError::Storage(_))));
    }

    #[tokio::test]
    async fn test_start_new_chat_becomes_active() {
        let (_store, _transport, orch) = setup();
        orch.initialize().await;
        let mut rx = orch.subscribe();

        let chat = orch.start_new_chat("Second", "phi3").await.unwrap();

        assert_eq!(orch.active_chat().unwrap().id, chat.id);
        assert_eq!(orch.sorted_chats()[0].id, chat.id);
        assert!(!orch.has_messages());
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ChatsChanged);
    }

    #[tokio::test]
    async fn test_rename_chat_updates_cache_and_active() {
        let (store, _transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;

        orch.rename_chat(chat_id, "Renamed").await;

        assert_eq!(orch.active_chat().unwrap().name, "Renamed");
        assert_eq!(orch.chats()[0].name, "Renamed");
        assert_eq!(store.get_chat(chat_id).await.unwrap().unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_system_message_is_persisted_with_meta() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;

        orch.add_system_message("be brief", Some(serde_json::json!({"source": "cli"})))
            .await;

        let stored = store.list_messages(chat_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, MessageRole::System);
        assert_eq!(stored[0].meta, Some(serde_json::json!({"source": "cli"})));
        assert_eq!(orch.messages(), stored);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_delete_active_chat_switches_to_newest_remaining() {
        let (store, _transport, orch) = setup();
        let oldest = seed_chat(&store, "oldest", 0).await;
        let middle = seed_chat(&store, "middle", 2).await;
        let newest = seed_chat(&store, "newest", 0).await;
        orch.initialize().await;
        assert_eq!(orch.active_chat().unwrap().id, newest.id);

        orch.delete_chat(newest.id).await;

        assert_eq!(orch.active_chat().unwrap().id, middle.id);
        assert_eq!(orch.messages().len(), 2);
        assert_eq!(orch.chats().len(), 2);
        assert!(orch.chats().iter().any(|c| c.id == oldest.id));
        assert_eq!(store.chat_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_inactive_chat_keeps_active() {
        let (store, _transport, orch) = setup();
        let other = seed_chat(&store, "other", 1).await;
        let active = seed_chat(&store, "active", 0).await;
        orch.initialize().await;

        orch.delete_chat(other.id).await;

        assert_eq!(orch.active_chat().unwrap().id, active.id);
        assert_eq!(store.chat_count(), 1);
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_last_chat_starts_one_with_same_model() {
        let (store, _transport, orch) = setup();
        let only = seed_chat(&store, "only", 4).await;
        orch.initialize().await;

        orch.delete_chat(only.id).await;

        assert_eq!(store.chat_count(), 1);
        assert_eq!(store.message_count(), 0);
        let replacement = orch.active_chat().unwrap();
        assert_ne!(replacement.id, only.id);
        assert_eq!(replacement.model, "mistral");
        assert_eq!(replacement.name, "New Chat");
        assert_eq!(orch.chats().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_chat() {
        let (store, _transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;
        store.fail_next(StoreOperation::DeleteChat);

        orch.delete_chat(chat_id).await;

        assert_eq!(orch.active_chat().unwrap().id, chat_id);
        assert_eq!(store.chat_count(), 1);
        assert!(orch.last_error().is_some());
    }

    #[tokio::test]
    async fn test_delete_streaming_chat_cancels_generation() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let chat_id = orch.active_chat().unwrap().id;
        let tx = transport.reply_channel();

        let running = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.add_user_message("hi").await }
        });
        tx.send(Ok(StreamEvent::Partial("par".to_string()))).unwrap();
        wait_until(|| orch.session().read(|s| s.is_streaming(chat_id))).await;

        orch.delete_chat(chat_id).await;
        running.await.unwrap();

        assert_eq!(orch.session().read(SessionState::in_flight_count), 0);
        assert_eq!(store.chat_count(), 1);
        assert_eq!(store.message_count(), 0);
        assert_ne!(orch.active_chat().unwrap().id, chat_id);
    }

    #[tokio::test]
    async fn test_wipe_database_leaves_one_empty_chat() {
        let (store, _transport, orch) = setup();
        for i in 0..5 {
            seed_chat(&store, &format!("chat {i}"), 8).await;
        }
        assert_eq!(store.message_count(), 40);
        orch.initialize().await;

        orch.wipe_database().await;

        assert_eq!(store.chat_count(), 1);
        assert_eq!(store.message_count(), 0);
        assert_eq!(orch.session().read(SessionState::in_flight_count), 0);
        assert_eq!(orch.chats().len(), 1);
        let active = orch.active_chat().unwrap();
        assert_eq!(active.model, "mistral");
        assert!(!orch.has_messages());
        assert!(orch.last_error().is_none());
    }

    #[tokio::test]
    async fn test_wipe_during_live_stream_drops_it() {
        let (store, transport, orch) = setup();
        orch.initialize().await;
        let old_id = orch.active_chat().unwrap().id;
        let tx = transport.reply_channel();

        let running = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.add_user_message("hi").await }
        });
        tx.send(Ok(StreamEvent::Partial("Hel".to_string()))).unwrap();
        wait_until(|| orch.session().read(|s| s.is_streaming(old_id))).await;

        orch.wipe_database().await;
        let _ = tx.send(Ok(StreamEvent::Partial("lo".to_string())));
        running.await.unwrap();

        assert_eq!(store.chat_count(), 1);
        assert_eq!(store.message_count(), 0);
        assert_eq!(orch.session().read(SessionState::in_flight_count), 0);
        assert!(!orch.is_streaming(old_id));
        assert_ne!(orch.active_chat().unwrap().id, old_id);
        assert!(!orch.has_messages());
        assert!(orch.last_error().is_none());
    }

    #[tokio::test]
    async fn test_wipe_without_active_chat_uses_fallback_model() {
        let (store, _transport, orch) = setup();

        orch.wipe_database().await;

        assert_eq!(store.chat_count(), 1);
        assert_eq!(orch.active_chat().unwrap().model, "unknown");
    }
}
