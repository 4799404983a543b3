//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley workspace:
//! chats, messages, streaming events, session events, configuration, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
