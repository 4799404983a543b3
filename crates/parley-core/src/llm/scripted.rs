//! Transport that replays queued replies instead of calling a backend.
//!
//! Each call to `generate` pops the next queued reply. A reply is either a
//! fixed list of events or a live channel the caller feeds, which lets tests
//! interleave two streams deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::stream;
use parley_types::llm::{GenerateRequest, LlmError, StreamEvent};
use tokio::sync::mpsc;

use super::transport::{CompletionTransport, GenerationStream};

type Item = Result<StreamEvent, LlmError>;

enum Reply {
    Events(Vec<Item>),
    Channel(mpsc::UnboundedReceiver<Item>),
}

#[derive(Default)]
struct Inner {
    replies: VecDeque<Reply>,
    requests: Vec<GenerateRequest>,
}

/// Cloneable scripted transport; clones share the reply queue and the
/// request log.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Queue a reply made of the given fragments followed by a completion.
    pub fn reply(&self, fragments: &[&str], context: Option<&str>) {
        let mut events: Vec<Item> = fragments
            .iter()
            .map(|fragment| Ok(StreamEvent::Partial((*fragment).to_string())))
            .collect();
        events.push(Ok(StreamEvent::Complete(context.map(str::to_string))));
        self.reply_events(events);
    }

    /// Queue an arbitrary event sequence, including errors or a missing
    /// completion.
    pub fn reply_events(&self, events: Vec<Item>) {
        self.with_inner(|inner| inner.replies.push_back(Reply::Events(events)));
    }

    /// Queue a reply whose events are sent through the returned channel.
    /// The stream ends when the sender is dropped.
    pub fn reply_channel(&self) -> mpsc::UnboundedSender<Item> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_inner(|inner| inner.replies.push_back(Reply::Channel(rx)));
        tx
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.with_inner(|inner| inner.requests.clone())
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_inner(|inner| {
            f.debug_struct("ScriptedTransport")
                .field("queued", &inner.replies.len())
                .field("requests", &inner.requests.len())
                .finish()
        })
    }
}

impl CompletionTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: GenerateRequest) -> GenerationStream {
        let reply = self.with_inner(|inner| {
            inner.requests.push(request);
            inner.replies.pop_front()
        });

        match reply {
            Some(Reply::Events(events)) => Box::pin(stream::iter(events)),
            Some(Reply::Channel(mut rx)) => Box::pin(async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            }),
            None => Box::pin(stream::iter(vec![Err(LlmError::Provider {
                message: "no scripted reply queued".to_string(),
            })])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "llama3".to_string(),
            prompt: prompt.to_string(),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_reply_yields_fragments_then_complete() {
        let transport = ScriptedTransport::new();
        transport.reply(&["He", "llo"], Some("tok1"));

        let events: Vec<StreamEvent> = transport
            .generate(request("hi"))
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Partial("He".to_string()),
                StreamEvent::Partial("llo".to_string()),
                StreamEvent::Complete(Some("tok1".to_string())),
            ]
        );
        assert_eq!(transport.requests()[0].prompt, "hi");
    }

    #[tokio::test]
    async fn test_channel_reply_ends_when_sender_dropped() {
        let transport = ScriptedTransport::new();
        let tx = transport.reply_channel();
        let mut stream = transport.generate(request("hi"));

        tx.send(Ok(StreamEvent::Partial("a".to_string()))).unwrap();
        drop(tx);

        assert!(matches!(stream.next().await, Some(Ok(StreamEvent::Partial(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_queue_yields_error() {
        let transport = ScriptedTransport::new();
        let mut stream = transport.generate(request("hi"));
        assert!(matches!(stream.next().await, Some(Err(LlmError::Provider { .. }))));
    }
}
