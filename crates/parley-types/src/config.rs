//! Configuration types for Parley.
//!
//! `ParleyConfig` represents the top-level `config.toml` that controls chat
//! defaults, the session event bus, and the generation backend.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Name given to chats started implicitly (first launch, after delete/wipe).
    #[serde(default = "default_chat_name")]
    pub default_chat_name: String,

    /// Model for the chat created on first launch.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used when a replacement chat has no predecessor to inherit from.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Capacity of the session event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_chat_name() -> String {
    "New Chat".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_fallback_model() -> String {
    "unknown".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            default_chat_name: default_chat_name(),
            default_model: default_model(),
            fallback_model: default_fallback_model(),
            event_capacity: default_event_capacity(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Connection settings for an Ollama-compatible generation server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout; generations can be long.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
