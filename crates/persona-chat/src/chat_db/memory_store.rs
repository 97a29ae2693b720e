use crate::chat_db::schema::*;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::{info, warn};

/// Key/value facts about a user, unique per `(user_id, key)`.
pub struct MemoryStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Memories in insertion order. Callers must not rely on the order.
    pub fn get_memories(&self, user_id: i64) -> anyhow::Result<Vec<MemoryEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, key, value, created_at, updated_at
             FROM memory WHERE user_id = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(Self::row_to_memory(row)?);
        }
        Ok(memories)
    }

    pub fn upsert_memory(&self, user_id: i64, key: &str, value: &str) -> anyhow::Result<MemoryEntry> {
        let now = format_timestamp(&Utc::now());
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO memory (user_id, key, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![user_id, key, value, now],
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, key, value, created_at, updated_at
             FROM memory WHERE user_id = ?1 AND key = ?2",
        )?;
        let mut rows = stmt.query(params![user_id, key])?;
        let entry = match rows.next()? {
            Some(row) => Self::row_to_memory(row)?,
            None => return Err(anyhow::anyhow!("Memory '{}' for user {} vanished after upsert", key, user_id)),
        };

        info!("Upserted memory '{}' for user {}", key, user_id);
        Ok(entry)
    }

    pub fn delete_memory(&self, user_id: i64, key: &str) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM memory WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
        )?;
        Ok(deleted > 0)
    }

    fn row_to_memory(row: &Row) -> anyhow::Result<MemoryEntry> {
        let created_at = parse_timestamp(&row.get::<_, String>(4)?)
            .unwrap_or_else(|| { warn!("Failed parse memory created_at"); Utc::now() });
        let updated_at = parse_timestamp(&row.get::<_, String>(5)?)
            .unwrap_or_else(|| { warn!("Failed parse memory updated_at"); Utc::now() });

        Ok(MemoryEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            key: row.get(2)?,
            value: row.get(3)?,
            created_at,
            updated_at,
        })
    }
}
