use crate::chat_db::schema::*;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Row};
use std::sync::Arc;
use tracing::{info, warn};

/// Persona rows, one per user.
pub struct PersonaStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

const PERSONA_COLUMNS: &str =
    "id, user_id, name, role, personality, tone, likes, dislikes, created_at, updated_at";

impl PersonaStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn get_persona(&self, user_id: i64) -> anyhow::Result<Option<Persona>> {
        let conn = self.get_conn()?;
        Self::select_by_user(&conn, user_id)
    }

    /// Inserts the persona or overwrites every field of the existing one.
    pub fn upsert_persona(&self, user_id: i64, input: &PersonaInput) -> anyhow::Result<Persona> {
        let now = format_timestamp(&Utc::now());
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO persona
             (user_id, name, role, personality, tone, likes, dislikes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                personality = excluded.personality,
                tone = excluded.tone,
                likes = excluded.likes,
                dislikes = excluded.dislikes,
                updated_at = excluded.updated_at",
            params![
                user_id,
                input.name,
                input.role,
                input.personality,
                input.tone,
                input.likes,
                input.dislikes,
                now,
            ],
        )?;

        info!("Upserted persona '{}' for user {}", input.name, user_id);
        Self::select_by_user(&conn, user_id)?
            .ok_or_else(|| anyhow::anyhow!("Persona for user {} vanished after upsert", user_id))
    }

    fn select_by_user(conn: &Connection, user_id: i64) -> anyhow::Result<Option<Persona>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM persona WHERE user_id = ?1",
            PERSONA_COLUMNS
        ))?;
        let mut rows = stmt.query([user_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_persona(row)?)),
            None => Ok(None),
        }
    }

    fn row_to_persona(row: &Row) -> anyhow::Result<Persona> {
        let created_at = parse_timestamp(&row.get::<_, String>(8)?)
            .unwrap_or_else(|| { warn!("Failed parse persona created_at"); Utc::now() });
        let updated_at = parse_timestamp(&row.get::<_, String>(9)?)
            .unwrap_or_else(|| { warn!("Failed parse persona updated_at"); Utc::now() });

        Ok(Persona {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            role: row.get(3)?,
            personality: row.get(4)?,
            tone: row.get(5)?,
            likes: row.get(6)?,
            dislikes: row.get(7)?,
            created_at,
            updated_at,
        })
    }
}
