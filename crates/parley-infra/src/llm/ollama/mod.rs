//! OllamaTransport -- [`CompletionTransport`] for an Ollama server.
//!
//! Sends streamed generation requests to `/api/generate`. The continuation
//! token exchanged with the session is Ollama's `context` id array encoded
//! as JSON text.

pub mod streaming;
pub mod types;

use std::time::Duration;

use parley_core::llm::{CompletionTransport, GenerationStream};
use parley_types::config::OllamaConfig;
use parley_types::llm::{GenerateRequest, LlmError};

use self::streaming::{create_ollama_stream, decode_context};
use self::types::OllamaGenerateRequest;

pub struct OllamaTransport {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaTransport {
    pub fn new(config: &OllamaConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Convert a [`GenerateRequest`] into the Ollama wire shape.
    ///
    /// A token that does not decode is dropped with a warning so the chat
    /// can continue without history rather than fail every turn.
    fn to_ollama_request(&self, request: &GenerateRequest) -> OllamaGenerateRequest {
        let context = request
            .context
            .as_deref()
            .and_then(|token| match decode_context(token) {
                Ok(ids) => Some(ids),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring undecodable continuation token");
                    None
                }
            });

        OllamaGenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            context,
            stream: true,
        }
    }
}

impl CompletionTransport for OllamaTransport {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate(&self, request: GenerateRequest) -> GenerationStream {
        let body = self.to_ollama_request(&request);
        let url = self.url("/api/generate");
        tracing::debug!(url = %url, model = %body.model, "opening generation stream");

        create_ollama_stream(&self.client, &url, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_transport() -> OllamaTransport {
        OllamaTransport::new(&OllamaConfig::default()).unwrap()
    }

    #[test]
    fn test_transport_name() {
        assert_eq!(make_transport().name(), "ollama");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = OllamaConfig {
            base_url: "http://gpu-box:11434/".to_string(),
            ..OllamaConfig::default()
        };
        let transport = OllamaTransport::new(&config).unwrap();
        assert_eq!(transport.url("/api/generate"), "http://gpu-box:11434/api/generate");
    }

    #[test]
    fn test_to_ollama_request_decodes_context() {
        let transport = make_transport();
        let request = GenerateRequest {
            model: "llama3".to_string(),
            prompt: "again".to_string(),
            context: Some("[1,2,3]".to_string()),
        };

        let body = transport.to_ollama_request(&request);
        assert_eq!(body.model, "llama3");
        assert_eq!(body.prompt, "again");
        assert_eq!(body.context, Some(vec![1, 2, 3]));
        assert!(body.stream);
    }

    #[test]
    fn test_to_ollama_request_drops_bad_context() {
        let transport = make_transport();
        let request = GenerateRequest {
            model: "llama3".to_string(),
            prompt: "hi".to_string(),
            context: Some("not-a-token".to_string()),
        };

        assert_eq!(transport.to_ollama_request(&request).context, None);
    }

    #[test]
    fn test_request_body_shape() {
        let transport = make_transport();
        let request = GenerateRequest {
            model: "llama3".to_string(),
            prompt: "hi".to_string(),
            context: None,
        };

        let json = serde_json::to_value(transport.to_ollama_request(&request)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "llama3", "prompt": "hi", "stream": true})
        );
    }
}
