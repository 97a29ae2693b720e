//! User lifecycle endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use super::{record, ApiError};
use crate::chat_db::schema::User;
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub success: bool,
    pub id: i64,
}

pub async fn create_user(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let result = state
        .orchestrator
        .create_user()
        .map(|user| (StatusCode::CREATED, Json(user)))
        .map_err(ApiError::from);
    record(&state, "create_user", result)
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<DeleteUserResponse>, ApiError> {
    info!("Deleting user {}", user_id);
    let result = state
        .orchestrator
        .delete_user(user_id)
        .map(|()| Json(DeleteUserResponse { success: true, id: user_id }))
        .map_err(ApiError::from);
    record(&state, "delete_user", result)
}
