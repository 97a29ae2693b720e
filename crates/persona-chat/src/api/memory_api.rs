//! Per-user memory facts.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{not_blank, record, ApiError, ValidatedJson};
use crate::chat_db::schema::MemoryEntry;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct MemoryRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteMemoryResponse {
    pub success: bool,
}

pub async fn upsert_memory(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<MemoryRequest>,
) -> Result<Json<MemoryEntry>, ApiError> {
    info!("Storing memory '{}' for user {}", payload.key, payload.user_id);
    let result = state
        .orchestrator
        .upsert_memory(payload.user_id, payload.key.trim(), &payload.value)
        .map(Json)
        .map_err(ApiError::from);
    record(&state, "upsert_memory", result)
}

pub async fn list_memories(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<MemoryEntry>>, ApiError> {
    let result = state
        .orchestrator
        .memories(user_id)
        .map(Json)
        .map_err(ApiError::from);
    record(&state, "list_memories", result)
}

pub async fn delete_memory(
    State(state): State<AppState>,
    Path((user_id, key)): Path<(i64, String)>,
) -> Result<Json<DeleteMemoryResponse>, ApiError> {
    let result = state
        .orchestrator
        .delete_memory(user_id, &key)
        .map(|()| Json(DeleteMemoryResponse { success: true }))
        .map_err(ApiError::from);
    record(&state, "delete_memory", result)
}
