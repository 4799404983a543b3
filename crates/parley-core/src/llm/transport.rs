//! CompletionTransport trait definition.

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{GenerateRequest, LlmError, StreamEvent};

/// Boxed stream of generation events.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Backend that turns a prompt into a stream of `Partial` fragments followed
/// by one `Complete`.
///
/// The stream owns everything it needs (`'static`) so a session can drive it
/// while issuing other store operations. Implementations live in
/// parley-infra (e.g., `OllamaTransport`) and in [`crate::llm::scripted`].
pub trait CompletionTransport: Send + Sync {
    /// Human-readable backend name (e.g., "ollama").
    fn name(&self) -> &str;

    /// Start a streamed generation.
    ///
    /// Connection failures surface as the first item of the stream rather
    /// than as a separate error, so callers handle one failure path.
    fn generate(&self, request: GenerateRequest) -> GenerationStream;
}
