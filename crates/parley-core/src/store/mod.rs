//! Chat and message persistence abstractions for Parley.
//!
//! This module defines the `ChatStore` trait that the infrastructure layer
//! implements, plus an in-memory implementation used by tests and by
//! ephemeral sessions.

pub mod memory;
pub mod repository;

pub use memory::MemoryChatStore;
pub use repository::ChatStore;
