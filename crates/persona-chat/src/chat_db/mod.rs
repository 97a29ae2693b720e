//! Chat database module - SQLite-based storage for users, personas, messages and memories
pub mod schema;
pub mod migration;
pub mod user_store;
pub mod persona_store;
pub mod message_store;
pub mod memory_store;
pub use schema::*;
pub use migration::MigrationManager;
pub use user_store::UserStore;
pub use persona_store::PersonaStore;
pub use message_store::MessageStore;
pub use memory_store::MemoryStore;
use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::store::ChatStore;

/// SQLite-backed persistence for every chat record kind.
pub struct Database {
    pub users: UserStore,
    pub personas: PersonaStore,
    pub messages: MessageStore,
    pub memories: MemoryStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

/// Runs on every pooled connection; `foreign_keys` is per-connection in SQLite.
fn configure_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

impl Database {
    pub fn new(db_path: &Path, pool_size: u32) -> anyhow::Result<Self> {
        info!("Opening chat database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        info!("Chat database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Single-connection in-memory database; each SQLite memory connection is its own database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self {
            users: UserStore::new(Arc::clone(&pool)),
            personas: PersonaStore::new(Arc::clone(&pool)),
            messages: MessageStore::new(Arc::clone(&pool)),
            memories: MemoryStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }
}

impl ChatStore for Database {
    fn create_user(&self) -> anyhow::Result<User> {
        self.users.create_user()
    }

    fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        self.users.get_user(user_id)
    }

    fn delete_user(&self, user_id: i64) -> anyhow::Result<bool> {
        self.users.delete_user(user_id)
    }

    fn get_persona(&self, user_id: i64) -> anyhow::Result<Option<Persona>> {
        self.personas.get_persona(user_id)
    }

    fn upsert_persona(&self, user_id: i64, input: &PersonaInput) -> anyhow::Result<Persona> {
        self.personas.upsert_persona(user_id, input)
    }

    fn list_messages(&self, user_id: i64) -> anyhow::Result<Vec<StoredMessage>> {
        self.messages.list_messages(user_id)
    }

    fn recent_messages(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        self.messages.recent_messages(user_id, limit)
    }

    fn append_message(&self, user_id: i64, sender: Sender, message: &str) -> anyhow::Result<StoredMessage> {
        self.messages.append_message(user_id, sender, message)
    }

    fn get_memories(&self, user_id: i64) -> anyhow::Result<Vec<MemoryEntry>> {
        self.memories.get_memories(user_id)
    }

    fn upsert_memory(&self, user_id: i64, key: &str, value: &str) -> anyhow::Result<MemoryEntry> {
        self.memories.upsert_memory(user_id, key, value)
    }

    fn delete_memory(&self, user_id: i64, key: &str) -> anyhow::Result<bool> {
        self.memories.delete_memory(user_id, key)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("chat.db"), 4).unwrap();
        (dir, db)
    }

    fn persona_input(name: &str, likes: Option<&str>) -> PersonaInput {
        PersonaInput {
            name: name.to_string(),
            role: "friend".to_string(),
            personality: "cheerful".to_string(),
            tone: "playful".to_string(),
            likes: likes.map(str::to_string),
            dislikes: None,
        }
    }

    #[test]
    fn test_create_and_get_user() {
        let (_dir, db) = open_temp();
        let user = db.create_user().unwrap();
        let fetched = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert!(db.get_user(user.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_persona_upsert_is_idempotent() {
        let (_dir, db) = open_temp();
        let user = db.create_user().unwrap();

        let first = db.upsert_persona(user.id, &persona_input("Aria", Some("jokes"))).unwrap();
        let second = db.upsert_persona(user.id, &persona_input("Nova", None)).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Nova");
        assert_eq!(second.likes, None);
        assert_eq!(db.get_stats().unwrap().total_personas, 1);
    }

    #[test]
    fn test_persona_for_unknown_user_violates_foreign_key() {
        let (_dir, db) = open_temp();
        assert!(db.upsert_persona(999, &persona_input("Aria", None)).is_err());
    }

    #[test]
    fn test_messages_read_back_in_insertion_order() {
        let (_dir, db) = open_temp();
        let user = db.create_user().unwrap();
        for i in 0..12 {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Ai };
            db.append_message(user.id, sender, &format!("message {}", i)).unwrap();
        }

        let all = db.list_messages(user.id).unwrap();
        assert_eq!(all.len(), 12);
        assert_eq!(all[0].message, "message 0");
        assert_eq!(all[0].sender, Sender::User);
        assert_eq!(all[11].message, "message 11");
        assert_eq!(all[11].sender, Sender::Ai);

        let recent = db.recent_messages(user.id, 3).unwrap();
        let bodies: Vec<_> = recent.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["message 9", "message 10", "message 11"]);
        assert_eq!(db.messages.count_messages(user.id).unwrap(), 12);
    }

    #[test]
    fn test_memory_key_is_unique_per_user() {
        let (_dir, db) = open_temp();
        let user = db.create_user().unwrap();
        let other = db.create_user().unwrap();

        db.upsert_memory(user.id, "favorite_food", "pizza").unwrap();
        let updated = db.upsert_memory(user.id, "favorite_food", "sushi").unwrap();
        db.upsert_memory(other.id, "favorite_food", "tacos").unwrap();

        let memories = db.get_memories(user.id).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].value, "sushi");
        assert_eq!(memories[0].id, updated.id);
        assert_eq!(db.get_memories(other.id).unwrap()[0].value, "tacos");
    }

    #[test]
    fn test_delete_memory() {
        let (_dir, db) = open_temp();
        let user = db.create_user().unwrap();
        db.upsert_memory(user.id, "pet", "cat").unwrap();

        assert!(db.delete_memory(user.id, "pet").unwrap());
        assert!(!db.delete_memory(user.id, "pet").unwrap());
        assert!(db.get_memories(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_user_cascades() {
        let (_dir, db) = open_temp();
        let user = db.create_user().unwrap();
        db.upsert_persona(user.id, &persona_input("Aria", None)).unwrap();
        db.append_message(user.id, Sender::User, "hi").unwrap();
        db.upsert_memory(user.id, "pet", "cat").unwrap();

        assert!(db.delete_user(user.id).unwrap());

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.total_personas, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.total_memories, 0);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let user_id = {
            let db = Database::new(&path, 2).unwrap();
            let user = db.create_user().unwrap();
            db.append_message(user.id, Sender::User, "persisted").unwrap();
            user.id
        };

        let db = Database::new(&path, 2).unwrap();
        assert_eq!(db.list_messages(user_id).unwrap()[0].message, "persisted");
    }

    #[test]
    fn test_in_memory_database_round_trip() {
        let db = Database::new_in_memory().unwrap();
        let user = db.create_user().unwrap();
        db.upsert_persona(user.id, &persona_input("Aria", Some("jokes"))).unwrap();
        assert_eq!(db.get_persona(user.id).unwrap().unwrap().likes.as_deref(), Some("jokes"));
    }
}
