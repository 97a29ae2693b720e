//! Chat turn workflow and the persona/memory/history service operations.
//!
//! The orchestrator holds no conversation state of its own; every turn is
//! rebuilt from the store.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chat_db::schema::{MemoryEntry, Persona, PersonaInput, Sender, StoredMessage, User};
use crate::context_engine::prompt_builder::build_prompt;
use crate::error::{ChatError, ChatResult};
use crate::llm::{Generation, LanguageModel};
use crate::metrics;
use crate::store::ChatStore;

/// Returned instead of a model reply when the user has no persona yet.
pub const PERSONA_MISSING_REPLY: &str = "Please set up your persona first!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Generated,
    /// Model call failed; the fallback text was stored and returned.
    Degraded,
    /// Nothing was stored and the model was not called.
    PersonaMissing,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Generated => "generated",
            TurnOutcome::Degraded => "degraded",
            TurnOutcome::PersonaMissing => "persona_missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Run turns for the same user one at a time.
    pub serialize_user_turns: bool,
}

pub struct ChatOrchestrator {
    store: Arc<dyn ChatStore>,
    model: Arc<dyn LanguageModel>,
    config: OrchestratorConfig,
    user_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ChatOrchestrator {
    pub fn new(store: Arc<dyn ChatStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self::with_config(store, model, OrchestratorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ChatStore>,
        model: Arc<dyn LanguageModel>,
        config: OrchestratorConfig,
    ) -> Self {
        info!(
            "Chat orchestrator initialized (model: {}, serialized turns: {})",
            model.model_name(),
            config.serialize_user_turns
        );
        Self { store, model, config, user_locks: DashMap::new() }
    }

    pub fn with_user_serialization(mut self, enabled: bool) -> Self {
        self.config.serialize_user_turns = enabled;
        self
    }

    fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn require_user(&self, user_id: i64) -> ChatResult<User> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| ChatError::not_found(format!("User {}", user_id)))
    }

    /// Runs one chat turn for `user_id`.
    pub async fn chat(&self, user_id: i64, message: &str) -> ChatResult<ChatReply> {
        self.require_user(user_id)?;

        if !self.config.serialize_user_turns {
            return self.run_turn(user_id, message).await;
        }
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.run_turn(user_id, message).await
    }

    async fn run_turn(&self, user_id: i64, message: &str) -> ChatResult<ChatReply> {
        let Some(persona) = self.store.get_persona(user_id)? else {
            debug!("User {} has no persona, skipping model call", user_id);
            metrics::inc_chat_turn(TurnOutcome::PersonaMissing.as_str());
            return Ok(ChatReply {
                reply: PERSONA_MISSING_REPLY.to_string(),
                outcome: TurnOutcome::PersonaMissing,
            });
        };

        // Loaded before the new message is stored, so it is not part of its own prompt.
        let history = self.store.list_messages(user_id)?;
        let memories = self.store.get_memories(user_id)?;
        let prompt = build_prompt(&persona, &history, &memories);
        debug!(
            "Built prompt for user {} ({} messages, {} memories)",
            user_id,
            history.len(),
            memories.len()
        );

        let generation = self.model.generate(&prompt).await;
        let outcome = match &generation {
            Generation::Text(_) => TurnOutcome::Generated,
            Generation::Fallback { error, .. } => {
                warn!("Chat turn for user {} degraded: {}", user_id, error);
                TurnOutcome::Degraded
            }
        };
        let reply = generation.into_reply();

        self.store.append_message(user_id, Sender::User, message)?;
        self.store.append_message(user_id, Sender::Ai, &reply)?;

        metrics::inc_chat_turn(outcome.as_str());
        Ok(ChatReply { reply, outcome })
    }

    pub fn create_user(&self) -> ChatResult<User> {
        let user = self.store.create_user()?;
        info!("Created user {}", user.id);
        Ok(user)
    }

    pub fn delete_user(&self, user_id: i64) -> ChatResult<()> {
        if !self.store.delete_user(user_id)? {
            return Err(ChatError::not_found(format!("User {}", user_id)));
        }
        self.user_locks.remove(&user_id);
        info!("Deleted user {}", user_id);
        Ok(())
    }

    pub fn upsert_persona(&self, user_id: i64, input: &PersonaInput) -> ChatResult<Persona> {
        self.require_user(user_id)?;
        Ok(self.store.upsert_persona(user_id, input)?)
    }

    pub fn get_persona(&self, user_id: i64) -> ChatResult<Persona> {
        self.store
            .get_persona(user_id)?
            .ok_or_else(|| ChatError::not_found("Persona"))
    }

    /// Most recent `limit` messages, oldest first. Unknown users have no history.
    pub fn history(&self, user_id: i64, limit: usize) -> ChatResult<Vec<StoredMessage>> {
        Ok(self.store.recent_messages(user_id, limit)?)
    }

    pub fn upsert_memory(&self, user_id: i64, key: &str, value: &str) -> ChatResult<MemoryEntry> {
        self.require_user(user_id)?;
        Ok(self.store.upsert_memory(user_id, key, value)?)
    }

    pub fn memories(&self, user_id: i64) -> ChatResult<Vec<MemoryEntry>> {
        Ok(self.store.get_memories(user_id)?)
    }

    pub fn delete_memory(&self, user_id: i64, key: &str) -> ChatResult<()> {
        if !self.store.delete_memory(user_id, key)? {
            return Err(ChatError::not_found(format!("Memory '{}'", key)));
        }
        Ok(())
    }
}
