//! SQLite chat store implementation.
//!
//! Implements `ChatStore` from `parley-core` using sqlx with split read/write
//! pools: raw queries, private Row structs, reads on the reader pool and
//! writes on the single-connection writer.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use parley_core::store::repository::{chat_key, message_key, ALL_KEY};
use parley_core::store::ChatStore;
use parley_types::chat::{Chat, ChatId, Message, MessageId, MessageRole, NewChat, NewMessage};
use parley_types::error::{StorageError, StoreOperation};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatStore`.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    id: i64,
    name: String,
    model: String,
    created_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            model: row.try_get("model")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_chat(self, operation: StoreOperation) -> Result<Chat, StorageError> {
        let id = ChatId(self.id);
        let created_at = parse_datetime(&self.created_at)
            .map_err(|reason| StorageError::new(operation, chat_key(id), reason))?;

        Ok(Chat {
            id,
            name: self.name,
            model: self.model,
            created_at,
        })
    }
}

struct MessageRow {
    id: i64,
    chat_id: i64,
    role: String,
    content: String,
    context: Option<String>,
    meta: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            context: row.try_get("context")?,
            meta: row.try_get("meta")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self, operation: StoreOperation) -> Result<Message, StorageError> {
        let id = MessageId(self.id);
        let invalid = |reason: String| StorageError::new(operation, message_key(id), reason);

        let role: MessageRole = self.role.parse().map_err(invalid)?;
        let created_at = parse_datetime(&self.created_at).map_err(invalid)?;
        let meta = self
            .meta
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| invalid(format!("invalid meta: {e}")))?;

        Ok(Message {
            id,
            chat_id: ChatId(self.chat_id),
            role,
            content: self.content,
            context: self.context,
            meta,
            created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid datetime: {e}"))
}

/// Fixed-width UTC timestamps so that `ORDER BY created_at` is chronological.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_error(operation: StoreOperation, key: impl Into<String>) -> impl FnOnce(sqlx::Error) -> StorageError {
    let key = key.into();
    move |err| StorageError::new(operation, key, err.to_string())
}

fn encode_meta(meta: Option<&serde_json::Value>) -> Option<String> {
    meta.map(serde_json::Value::to_string)
}

// ---------------------------------------------------------------------------
// ChatStore implementation
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    async fn create_chat(&self, chat: &NewChat) -> Result<Chat, StorageError> {
        let operation = StoreOperation::CreateChat;
        let created_at = format_datetime(&chat.created_at);

        let result = sqlx::query("INSERT INTO chats (name, model, created_at) VALUES (?, ?, ?)")
            .bind(&chat.name)
            .bind(&chat.model)
            .bind(&created_at)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error(operation, "chat:new"))?;

        ChatRow {
            id: result.last_insert_rowid(),
            name: chat.name.clone(),
            model: chat.model.clone(),
            created_at,
        }
        .into_chat(operation)
    }

    async fn get_chat(&self, id: ChatId) -> Result<Option<Chat>, StorageError> {
        let operation = StoreOperation::GetChat;
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error(operation, chat_key(id)))?;

        match row {
            Some(row) => {
                let chat_row = ChatRow::from_row(&row).map_err(query_error(operation, chat_key(id)))?;
                Ok(Some(chat_row.into_chat(operation)?))
            }
            None => Ok(None),
        }
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, StorageError> {
        let operation = StoreOperation::ListChats;
        let rows = sqlx::query("SELECT * FROM chats ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error(operation, ALL_KEY))?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in &rows {
            let chat_row = ChatRow::from_row(row).map_err(query_error(operation, ALL_KEY))?;
            chats.push(chat_row.into_chat(operation)?);
        }

        Ok(chats)
    }

    async fn update_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        let operation = StoreOperation::UpdateChat;
        let result = sqlx::query("UPDATE chats SET name = ?, model = ? WHERE id = ?")
            .bind(&chat.name)
            .bind(&chat.model)
            .bind(chat.id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error(operation, chat_key(chat.id)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(operation, chat_key(chat.id)));
        }

        Ok(())
    }

    async fn delete_chat(&self, id: ChatId) -> Result<(), StorageError> {
        let operation = StoreOperation::DeleteChat;
        // Messages go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error(operation, chat_key(id)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(operation, chat_key(id)));
        }

        Ok(())
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, StorageError> {
        let operation = StoreOperation::CreateMessage;
        let created_at = format_datetime(&message.created_at);
        let meta = encode_meta(message.meta.as_ref());

        let result = sqlx::query(
            r#"INSERT INTO messages (chat_id, role, content, context, meta, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.chat_id.0)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&message.context)
        .bind(&meta)
        .bind(&created_at)
        .execute(&self.pool.writer)
        .await
        .map_err(|err| {
            let missing_chat = err
                .as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation());
            if missing_chat {
                StorageError::not_found(operation, chat_key(message.chat_id))
            } else {
                StorageError::new(operation, "message:new", err.to_string())
            }
        })?;

        MessageRow {
            id: result.last_insert_rowid(),
            chat_id: message.chat_id.0,
            role: message.role.to_string(),
            content: message.content.clone(),
            context: message.context.clone(),
            meta,
            created_at,
        }
        .into_message(operation)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        let operation = StoreOperation::GetMessage;
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error(operation, message_key(id)))?;

        match row {
            Some(row) => {
                let message_row =
                    MessageRow::from_row(&row).map_err(query_error(operation, message_key(id)))?;
                Ok(Some(message_row.into_message(operation)?))
            }
            None => Ok(None),
        }
    }

    async fn update_message(&self, message: &Message) -> Result<(), StorageError> {
        let operation = StoreOperation::UpdateMessage;
        let result = sqlx::query("UPDATE messages SET content = ?, context = ?, meta = ? WHERE id = ?")
            .bind(&message.content)
            .bind(&message.context)
            .bind(encode_meta(message.meta.as_ref()))
            .bind(message.id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error(operation, message_key(message.id)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(operation, message_key(message.id)));
        }

        Ok(())
    }

    async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, StorageError> {
        let operation = StoreOperation::ListMessages;
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_id.0)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error(operation, chat_key(chat_id)))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(query_error(operation, chat_key(chat_id)))?;
            messages.push(message_row.into_message(operation)?);
        }

        Ok(messages)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let operation = StoreOperation::Clear;
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(query_error(operation, ALL_KEY))?;

        sqlx::query("DELETE FROM messages")
            .execute(&mut *tx)
            .await
            .map_err(query_error(operation, ALL_KEY))?;
        sqlx::query("DELETE FROM chats")
            .execute(&mut *tx)
            .await
            .map_err(query_error(operation, ALL_KEY))?;

        tx.commit().await.map_err(query_error(operation, ALL_KEY))?;
        Ok(())
    }
}
