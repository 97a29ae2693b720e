//! Chat turn and history endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use super::{not_blank, record, ApiError, ValidatedJson};
use crate::chat_db::schema::{format_timestamp, Sender, StoredMessage};
use crate::shared_state::AppState;

pub const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 65536), custom = "not_blank")]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub sender: Sender,
    pub message: String,
    pub created_at: String,
}

impl From<StoredMessage> for HistoryEntry {
    fn from(message: StoredMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            message: message.message,
            created_at: format_timestamp(&message.created_at),
        }
    }
}

pub async fn chat(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    debug!("Chat turn for user {} ({} chars)", payload.user_id, payload.message.len());
    let result = state.orchestrator.chat(payload.user_id, &payload.message).await;
    if let Ok(reply) = &result {
        state.counters.record_turn(reply.outcome);
    }
    let result = result
        .map(|reply| Json(ChatResponse { reply: reply.reply }))
        .map_err(ApiError::from);
    record(&state, "chat", result)
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(state.config.history_limit);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        let err = ApiError::bad_request(format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT));
        return record(&state, "history", Err(err));
    }
    let result = state
        .orchestrator
        .history(user_id, limit)
        .map(|messages| Json(messages.into_iter().map(HistoryEntry::from).collect()))
        .map_err(ApiError::from);
    record(&state, "history", result)
}
