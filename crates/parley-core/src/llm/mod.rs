//! Completion transport abstractions for Parley.
//!
//! - `CompletionTransport`: trait for generation backends
//! - `ScriptedTransport`: replays canned replies, for tests and offline runs

pub mod scripted;
pub mod transport;

pub use scripted::ScriptedTransport;
pub use transport::{CompletionTransport, GenerationStream};
