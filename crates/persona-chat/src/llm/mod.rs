//! Language model boundary: one prompt in, one reply out.

pub mod gemini;

pub use gemini::{GeminiClient, ModelInfo};

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

use crate::metrics;

/// Prefix of the reply persisted when the model cannot be reached.
pub const FALLBACK_PREFIX: &str = "I'm having trouble responding right now.";

/// Outcome of a generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// The model produced this text.
    Text(String),
    /// The model call failed; `reply` is the user-facing substitute.
    Fallback { reply: String, error: String },
}

impl Generation {
    pub fn fallback(error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        Generation::Fallback {
            reply: format!("{} Error: {}", FALLBACK_PREFIX, error),
            error,
        }
    }

    pub fn reply(&self) -> &str {
        match self {
            Generation::Text(text) => text,
            Generation::Fallback { reply, .. } => reply,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Generation::Fallback { .. })
    }

    pub fn into_reply(self) -> String {
        match self {
            Generation::Text(text) => text,
            Generation::Fallback { reply, .. } => reply,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Raw call; any failure is an error.
    async fn try_generate(&self, prompt: &str) -> anyhow::Result<String>;

    /// Never fails: errors become a [`Generation::Fallback`].
    async fn generate(&self, prompt: &str) -> Generation {
        let started = Instant::now();
        let result = self.try_generate(prompt).await;
        metrics::observe_llm_request(started.elapsed().as_secs_f64());

        match result {
            Ok(text) => {
                debug!("Model {} replied with {} chars", self.model_name(), text.len());
                Generation::Text(text)
            }
            Err(e) => {
                warn!("Model {} call failed, using fallback reply: {:#}", self.model_name(), e);
                Generation::fallback(format!("{:#}", e))
            }
        }
    }
}
