//! NDJSON stream adapter for the Ollama `/api/generate` endpoint.
//!
//! The response body is newline-delimited JSON. Each line becomes zero or
//! more [`StreamEvent`]s: a non-empty `response` yields `Partial`, and the
//! line with `done: true` yields `Complete` carrying the JSON-encoded
//! `context` array. Reading stops at the first `Complete`.

use futures_util::StreamExt;

use parley_core::llm::GenerationStream;
use parley_types::llm::{LlmError, StreamEvent};

use super::types::{OllamaChunk, OllamaGenerateRequest};

/// Encode Ollama context ids as the opaque continuation token.
pub fn encode_context(ids: &[i64]) -> Result<String, LlmError> {
    serde_json::to_string(ids).map_err(|e| LlmError::Deserialization(format!("encode context: {e}")))
}

/// Decode a continuation token back into Ollama context ids.
pub fn decode_context(token: &str) -> Result<Vec<i64>, LlmError> {
    serde_json::from_str(token).map_err(|e| LlmError::Deserialization(format!("decode context: {e}")))
}

/// Parse one NDJSON line. Blank lines yield nothing.
pub fn parse_line(line: &[u8]) -> Result<Vec<StreamEvent>, LlmError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| LlmError::Deserialization(format!("utf8 decode: {e}")))?
        .trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chunk: OllamaChunk = serde_json::from_str(text)
        .map_err(|e| LlmError::Deserialization(format!("ollama chunk: {e}")))?;

    if let Some(message) = chunk.error {
        return Err(LlmError::Provider { message });
    }

    let mut events = Vec::with_capacity(2);
    if !chunk.response.is_empty() {
        events.push(StreamEvent::Partial(chunk.response));
    }
    if chunk.done {
        let context = chunk.context.as_deref().map(encode_context).transpose()?;
        events.push(StreamEvent::Complete(context));
    }
    Ok(events)
}

/// Map a non-success HTTP status to an [`LlmError`].
fn status_error(status: reqwest::StatusCode, model: &str, body: String) -> LlmError {
    match status.as_u16() {
        404 => LlmError::ModelNotFound(model.to_string()),
        429 => LlmError::RateLimited { retry_after_ms: None },
        s if s >= 500 => LlmError::Provider {
            message: format!("Ollama server error HTTP {status}: {body}"),
        },
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

async fn ensure_success(response: reqwest::Response, model: &str) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %error_body, "Ollama generate error response");
    Err(status_error(status, model, error_body))
}

/// Open a streamed generation against `url`.
///
/// Connection and status failures surface as the first stream item.
pub fn create_ollama_stream(
    client: &reqwest::Client,
    url: &str,
    body: OllamaGenerateRequest,
) -> GenerationStream {
    let client = client.clone();
    let url = url.to_string();

    Box::pin(async_stream::try_stream! {
        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;
        let response = ensure_success(response, &body.model).await?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut completed = false;

        'read: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::Stream(format!("response body read: {e}")))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                for event in parse_line(&line)? {
                    let done = matches!(event, StreamEvent::Complete(_));
                    yield event;
                    if done {
                        completed = true;
                        break 'read;
                    }
                }
            }
        }

        // Final line without a trailing newline.
        if !completed {
            for event in parse_line(&buffer)? {
                yield event;
            }
        }
    })
}
