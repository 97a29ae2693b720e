//! Persona create/update and lookup.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{not_blank, record, ApiError, ValidatedJson};
use crate::chat_db::schema::{Persona, PersonaInput};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PersonaRequest {
    pub user_id: i64,
    #[validate(length(max = 100), custom = "not_blank")]
    pub name: String,
    #[validate(length(max = 100), custom = "not_blank")]
    pub role: String,
    #[validate(custom = "not_blank")]
    pub personality: String,
    #[validate(length(max = 100), custom = "not_blank")]
    pub tone: String,
    pub likes: Option<String>,
    pub dislikes: Option<String>,
}

impl PersonaRequest {
    fn into_input(self) -> (i64, PersonaInput) {
        (
            self.user_id,
            PersonaInput {
                name: self.name.trim().to_string(),
                role: self.role.trim().to_string(),
                personality: self.personality.trim().to_string(),
                tone: self.tone.trim().to_string(),
                likes: self.likes,
                dislikes: self.dislikes,
            },
        )
    }
}

pub async fn upsert_persona(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<PersonaRequest>,
) -> Result<Json<Persona>, ApiError> {
    let (user_id, input) = payload.into_input();
    info!("Saving persona '{}' for user {}", input.name, user_id);
    let result = state
        .orchestrator
        .upsert_persona(user_id, &input)
        .map(Json)
        .map_err(ApiError::from);
    record(&state, "upsert_persona", result)
}

pub async fn get_persona(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Persona>, ApiError> {
    let result = state
        .orchestrator
        .get_persona(user_id)
        .map(Json)
        .map_err(ApiError::from);
    record(&state, "get_persona", result)
}
