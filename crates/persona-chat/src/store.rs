//! Data-access interface over users, personas, messages and memories.
//!
//! [`crate::chat_db::Database`] is the SQLite implementation used by the server.
//! [`InMemoryChatStore`] keeps everything in a `DashMap` and backs tests and
//! ephemeral runs.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::chat_db::schema::{MemoryEntry, Persona, PersonaInput, Sender, StoredMessage, User};

pub trait ChatStore: Send + Sync {
    fn create_user(&self) -> anyhow::Result<User>;
    fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>>;
    /// Deletes the user together with everything it owns. Returns `false` if unknown.
    fn delete_user(&self, user_id: i64) -> anyhow::Result<bool>;

    fn get_persona(&self, user_id: i64) -> anyhow::Result<Option<Persona>>;
    fn upsert_persona(&self, user_id: i64, input: &PersonaInput) -> anyhow::Result<Persona>;

    /// Whole conversation, ascending by creation.
    fn list_messages(&self, user_id: i64) -> anyhow::Result<Vec<StoredMessage>>;
    /// Most recent `limit` messages, ascending by creation.
    fn recent_messages(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<StoredMessage>>;
    fn append_message(&self, user_id: i64, sender: Sender, message: &str) -> anyhow::Result<StoredMessage>;

    fn get_memories(&self, user_id: i64) -> anyhow::Result<Vec<MemoryEntry>>;
    fn upsert_memory(&self, user_id: i64, key: &str, value: &str) -> anyhow::Result<MemoryEntry>;
    fn delete_memory(&self, user_id: i64, key: &str) -> anyhow::Result<bool>;
}

#[derive(Default)]
struct UserRecord {
    user: Option<User>,
    persona: Option<Persona>,
    messages: Vec<StoredMessage>,
    memories: Vec<MemoryEntry>,
}

#[derive(Clone)]
pub struct InMemoryChatStore {
    users: Arc<DashMap<i64, UserRecord>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn unknown_user(user_id: i64) -> anyhow::Error {
        anyhow::anyhow!("User {} does not exist", user_id)
    }
}

impl Default for InMemoryChatStore {
    fn default() -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl ChatStore for InMemoryChatStore {
    fn create_user(&self) -> anyhow::Result<User> {
        let user = User { id: self.next_id(), created_at: Utc::now() };
        self.users.insert(user.id, UserRecord { user: Some(user.clone()), ..Default::default() });
        Ok(user)
    }

    fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.users.get(&user_id).and_then(|record| record.user.clone()))
    }

    fn delete_user(&self, user_id: i64) -> anyhow::Result<bool> {
        Ok(self.users.remove(&user_id).is_some())
    }

    fn get_persona(&self, user_id: i64) -> anyhow::Result<Option<Persona>> {
        Ok(self.users.get(&user_id).and_then(|record| record.persona.clone()))
    }

    fn upsert_persona(&self, user_id: i64, input: &PersonaInput) -> anyhow::Result<Persona> {
        let now = Utc::now();
        let next_id = self.next_id();
        let mut record = self.users.get_mut(&user_id).ok_or_else(|| Self::unknown_user(user_id))?;
        let persona = match record.persona.take() {
            Some(existing) => Persona {
                name: input.name.clone(),
                role: input.role.clone(),
                personality: input.personality.clone(),
                tone: input.tone.clone(),
                likes: input.likes.clone(),
                dislikes: input.dislikes.clone(),
                updated_at: now,
                ..existing
            },
            None => Persona {
                id: next_id,
                user_id,
                name: input.name.clone(),
                role: input.role.clone(),
                personality: input.personality.clone(),
                tone: input.tone.clone(),
                likes: input.likes.clone(),
                dislikes: input.dislikes.clone(),
                created_at: now,
                updated_at: now,
            },
        };
        record.persona = Some(persona.clone());
        Ok(persona)
    }

    fn list_messages(&self, user_id: i64) -> anyhow::Result<Vec<StoredMessage>> {
        Ok(self
            .users
            .get(&user_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default())
    }

    fn recent_messages(&self, user_id: i64, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        Ok(self
            .users
            .get(&user_id)
            .map(|record| {
                let start = record.messages.len().saturating_sub(limit);
                record.messages[start..].to_vec()
            })
            .unwrap_or_default())
    }

    fn append_message(&self, user_id: i64, sender: Sender, message: &str) -> anyhow::Result<StoredMessage> {
        let id = self.next_id();
        let mut record = self.users.get_mut(&user_id).ok_or_else(|| Self::unknown_user(user_id))?;
        let stored = StoredMessage {
            id,
            user_id,
            sender,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        record.messages.push(stored.clone());
        Ok(stored)
    }

    fn get_memories(&self, user_id: i64) -> anyhow::Result<Vec<MemoryEntry>> {
        Ok(self
            .users
            .get(&user_id)
            .map(|record| record.memories.clone())
            .unwrap_or_default())
    }

    fn upsert_memory(&self, user_id: i64, key: &str, value: &str) -> anyhow::Result<MemoryEntry> {
        let now = Utc::now();
        let next_id = self.next_id();
        let mut record = self.users.get_mut(&user_id).ok_or_else(|| Self::unknown_user(user_id))?;
        if let Some(existing) = record.memories.iter_mut().find(|m| m.key == key) {
            existing.value = value.to_string();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let entry = MemoryEntry {
            id: next_id,
            user_id,
            key: key.to_string(),
            value: value.to_string(),
            created_at: now,
            updated_at: now,
        };
        record.memories.push(entry.clone());
        Ok(entry)
    }

    fn delete_memory(&self, user_id: i64, key: &str) -> anyhow::Result<bool> {
        Ok(match self.users.get_mut(&user_id) {
            Some(mut record) => {
                let before = record.memories.len();
                record.memories.retain(|m| m.key != key);
                record.memories.len() != before
            }
            None => false,
        })
    }
}
