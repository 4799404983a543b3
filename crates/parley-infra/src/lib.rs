//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: the
//! SQLite chat store and the Ollama completion transport, plus the data
//! directory and `config.toml` helpers.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
