//! Record types for users, personas, messages and memory facts
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An identity owning one optional persona, a message log and memory facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Persona fields as supplied by a caller; upserted per user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonaInput {
    pub name: String,
    pub role: String,
    pub personality: String,
    pub tone: String,
    pub likes: Option<String>,
    pub dislikes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub role: String,
    pub personality: String,
    pub tone: String,
    pub likes: Option<String>,
    pub dislikes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Persona {
    /// Likes, only when present and non-empty.
    pub fn likes(&self) -> Option<&str> {
        self.likes.as_deref().filter(|s| !s.is_empty())
    }

    /// Dislikes, only when present and non-empty.
    pub fn dislikes(&self) -> Option<&str> {
        self.dislikes.as_deref().filter(|s| !s.is_empty())
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "ai" => Ok(Sender::Ai),
            other => Err(anyhow::anyhow!("Unknown message sender: {}", other)),
        }
    }
}

/// One persisted entry of a user's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub user_id: i64,
    pub sender: Sender,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A durable key/value fact about a user. `(user_id, key)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    pub total_users: i64,
    pub total_personas: i64,
    pub total_messages: i64,
    pub total_memories: i64,
    pub database_size_bytes: i64,
}

/// Fixed-width RFC 3339 so that lexical order in SQLite matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}
