//! SQLite storage for Parley.

pub mod chat;
pub mod pool;

pub use chat::SqliteChatStore;
pub use pool::DatabasePool;
