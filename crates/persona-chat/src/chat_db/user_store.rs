use crate::chat_db::schema::*;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::{info, warn};
use chrono::Utc;

pub struct UserStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl UserStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn create_user(&self) -> anyhow::Result<User> {
        let now = Utc::now();
        let conn = self.get_conn()?;
        conn.execute("INSERT INTO users (created_at) VALUES (?1)", params![format_timestamp(&now)])?;
        let id = conn.last_insert_rowid();

        info!("Created user {}", id);
        Ok(User { id, created_at: now })
    }

    pub fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT id, created_at FROM users WHERE id = ?1",
                [user_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(id, created_at)| User {
            id,
            created_at: parse_timestamp(&created_at).unwrap_or_else(|| {
                warn!("Failed parse user created_at");
                Utc::now()
            }),
        }))
    }

    /// Removes the user; persona, messages and memories go with it via `ON DELETE CASCADE`.
    pub fn delete_user(&self, user_id: i64) -> anyhow::Result<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        if deleted > 0 {
            info!("Deleted user {}", user_id);
        }
        Ok(deleted > 0)
    }
}
