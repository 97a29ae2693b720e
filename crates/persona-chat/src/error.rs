//! Domain error taxonomy shared by the store, the orchestrator and the API layer.

use thiserror::Error;

/// Errors surfaced by chat operations.
///
/// Model-call failures are deliberately absent: they are absorbed by
/// [`crate::llm::LanguageModel::generate`] and turned into a fallback reply.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Unusable process configuration, e.g. a missing model credential.
    #[error("setup error: {0}")]
    Setup(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    /// Any failure reading from or writing to the persistence store.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ChatError::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
