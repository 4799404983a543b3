//! SQLite connection pools for the chat store.
//!
//! Writes go through a single connection so they are serialized in one
//! place; reads share a small pool and see committed data thanks to WAL.
//! Foreign keys are switched on for every connection because deleting a
//! chat relies on the cascade to its messages.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const READER_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only connections for listing chats and messages.
    pub reader: SqlitePool,
    /// The one connection allowed to write.
    pub writer: SqlitePool,
}

async fn connect(options: SqliteConnectOptions, connections: u32) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(connections)
        .connect_with(options)
        .await
}

impl DatabasePool {
    /// Open the database at `database_url`, migrating the schema before any
    /// reader connects.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let writer = connect(options.clone(), 1).await?;
        sqlx::migrate!("../../migrations").run(&writer).await?;
        let reader = connect(options.read_only(true), READER_CONNECTIONS).await?;

        tracing::debug!(url = %database_url, readers = READER_CONNECTIONS, "chat database opened");
        Ok(Self { reader, writer })
    }

    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}
