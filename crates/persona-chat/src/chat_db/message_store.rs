use crate::chat_db::schema::*;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::{debug, warn};

/// Append-only conversation log, read back in `(created_at, id)` order.
pub struct MessageStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MessageStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn append_message(&self, user_id: i64, sender: Sender, message: &str) -> anyhow::Result<StoredMessage> {
        let now = Utc::now();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO messages (user_id, sender, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, sender.as_str(), message, format_timestamp(&now)],
        )?;
        let id = conn.last_insert_rowid();

        debug!("Stored {} message {} for user {}", sender, id, user_id);
        Ok(StoredMessage {
            id,
            user_id,
            sender,
            message: message.to_string(),
            created_at: now,
        })
    }

    /// Full history, oldest first.
    pub fn list_messages(&self, user_id: i64) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, sender, message, created_at
             FROM messages WHERE user_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(Self::row_to_message(row)?);
        }
        Ok(messages)
    }

    /// The newest `limit` messages, still oldest first.
    pub fn recent_messages(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, sender, message, created_at
             FROM messages WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![user_id, limit as i64])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(Self::row_to_message(row)?);
        }
        messages.reverse();
        Ok(messages)
    }

    pub fn count_messages(&self, user_id: i64) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn row_to_message(row: &Row) -> anyhow::Result<StoredMessage> {
        let sender: String = row.get(2)?;
        let created_at = parse_timestamp(&row.get::<_, String>(4)?)
            .unwrap_or_else(|| { warn!("Failed parse message timestamp"); Utc::now() });

        Ok(StoredMessage {
            id: row.get(0)?,
            user_id: row.get(1)?,
            sender: sender.parse()?,
            message: row.get(3)?,
            created_at,
        })
    }
}
