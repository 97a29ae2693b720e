//! HTTP handlers for the persona chat API.

pub mod error;
pub mod user_api;
pub mod persona_api;
pub mod chat_api;
pub mod memory_api;
pub mod admin_api;

pub use error::{not_blank, ApiError, ValidatedJson};

use crate::metrics;
use crate::shared_state::AppState;

/// Counts the request and tags it with its outcome before handing the result back.
pub(crate) fn record<T>(state: &AppState, route: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    state.counters.inc_total_requests();
    let status = match &result {
        Ok(_) => "ok",
        Err(e) if e.status.is_client_error() => "client_error",
        Err(_) => "error",
    };
    metrics::inc_request(route, status);
    result
}
