//! Wire types for the Ollama `/api/generate` endpoint.

use serde::{Deserialize, Serialize};

/// Request body for a streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Token ids returned by the previous generation in the chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    pub stream: bool,
}

/// One NDJSON line of a streamed response.
///
/// Intermediate lines carry a `response` fragment; the final line has
/// `done: true` and the `context` to continue from. A failure mid-stream
/// arrives as a line with only `error`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    #[serde(default)]
    pub error: Option<String>,
}
