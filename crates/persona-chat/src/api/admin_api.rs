//! Health and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use super::{record, ApiError};
use crate::chat_db::schema::DatabaseStats;
use crate::error::ChatError;
use crate::shared_state::{AppState, CounterSnapshot};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Absent when the server runs without SQLite.
    pub database: Option<DatabaseStats>,
    pub counters: CounterSnapshot,
    pub model: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let result = state
        .database
        .as_ref()
        .map(|db| db.get_stats())
        .transpose()
        .map(|database| {
            Json(StatsResponse {
                database,
                counters: state.counters.snapshot(),
                model: state.config.llm.model.clone(),
            })
        })
        .map_err(|e| ApiError::from(ChatError::from(e)));
    record(&state, "stats", result)
}
