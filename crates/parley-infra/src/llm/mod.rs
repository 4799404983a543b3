//! Completion transport implementations.
//!
//! Contains concrete implementations of the [`CompletionTransport`] trait
//! defined in `parley-core`.
//!
//! [`CompletionTransport`]: parley_core::llm::CompletionTransport

pub mod ollama;

pub use ollama::OllamaTransport;
