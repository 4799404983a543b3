//! Completion transport types for Parley.
//!
//! These types model the data shapes exchanged with a generation backend:
//! the request, the two-event streaming protocol, and transport errors.

use serde::{Deserialize, Serialize};

/// Request for one streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier of the chat the generation belongs to.
    pub model: String,
    /// The user's new message.
    pub prompt: String,
    /// Continuation token from the most recent completed generation in the
    /// chat, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Events emitted during a streamed generation.
///
/// A well-behaved stream yields zero or more `Partial` events followed by
/// exactly one `Complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of generated text.
    Partial(String),

    /// Generation finished; carries the continuation token, if the backend
    /// returned one.
    Complete(Option<String>),
}

/// Errors from completion transport operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("model not found: {0}")]
    ModelNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_serde_shape() {
        let json = serde_json::to_string(&StreamEvent::Partial("He".to_string())).unwrap();
        assert_eq!(json, r#"{"type":"partial","value":"He"}"#);

        let json = serde_json::to_string(&StreamEvent::Complete(None)).unwrap();
        assert_eq!(json, r#"{"type":"complete","value":null}"#);
    }

    #[test]
    fn test_generate_request_omits_missing_context() {
        let req = GenerateRequest {
            model: "llama3".to_string(),
            prompt: "hi".to_string(),
            context: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("context"));
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::RateLimited {
            retry_after_ms: Some(500),
        };
        assert!(err.to_string().contains("500"));
    }
}
