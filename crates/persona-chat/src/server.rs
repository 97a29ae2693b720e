//! HTTP server startup and routing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    api::{admin_api, chat_api, memory_api, persona_api, user_api},
    chat_db::Database,
    config::Config,
    context_engine::create_orchestrator,
    llm::GeminiClient,
    metrics,
    shared_state::AppState,
};

/// Request bodies above this size are rejected before deserialization.
const MAX_BODY_BYTES: usize = 256 * 1024;

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let database = Arc::new(Database::new(Path::new(&cfg.database_path), cfg.db_pool_size)?);
    let model = Arc::new(GeminiClient::new(&cfg.llm)?);
    let orchestrator = Arc::new(create_orchestrator(database.clone(), model, &cfg));

    let addr = cfg.api_addr()?;
    let state = AppState::new(orchestrator, cfg).with_database(database);
    let app = build_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining connections");
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    Router::new()
        .route("/api/user", post(user_api::create_user))
        .route("/api/user/:id", delete(user_api::delete_user))
        .route("/api/persona", post(persona_api::upsert_persona))
        .route("/api/persona/:user_id", get(persona_api::get_persona))
        .route("/api/chat", post(chat_api::chat))
        .route("/api/chat/history/:user_id", get(chat_api::history))
        .route("/api/memory", post(memory_api::upsert_memory))
        .route("/api/memory/:user_id", get(memory_api::list_memories))
        .route("/api/memory/:user_id/:key", delete(memory_api::delete_memory))
        .route("/api/stats", get(admin_api::stats))
        .route("/api/health", get(admin_api::health))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(metrics::get_metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::context_engine::{ChatOrchestrator, PERSONA_MISSING_REPLY};
    use crate::llm::stub::StubModel;
    use crate::store::InMemoryChatStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            database_path: ":memory:".to_string(),
            db_pool_size: 1,
            llm: LlmConfig {
                api_key: "test-key".to_string(),
                model: "stub".to_string(),
                base_url: "http://localhost".to_string(),
                timeout_seconds: 5,
            },
            request_timeout_seconds: 30,
            history_limit: 50,
            serialize_user_turns: false,
        }
    }

    fn test_app(model: StubModel) -> (Router, Arc<StubModel>) {
        let model = Arc::new(model);
        let store = Arc::new(InMemoryChatStore::new());
        let orchestrator = Arc::new(ChatOrchestrator::new(store, model.clone()));
        (build_router(AppState::new(orchestrator, test_config())), model)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_user(app: &Router) -> i64 {
        let (status, body) = send(app, "POST", "/api/user", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    fn persona_body(user_id: i64) -> Value {
        json!({
            "user_id": user_id,
            "name": "Aria",
            "role": "friend",
            "personality": "cheerful",
            "tone": "playful",
            "likes": "jokes"
        })
    }

    #[tokio::test]
    async fn test_full_conversation_flow() {
        let (app, model) = test_app(StubModel::replying("Hey you!"));
        let user_id = create_user(&app).await;

        let (status, persona) = send(&app, "POST", "/api/persona", Some(persona_body(user_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(persona["name"], "Aria");
        assert_eq!(persona["user_id"], user_id);

        let (status, reply) = send(&app, "POST", "/api/chat", Some(json!({"user_id": user_id, "message": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["reply"], "Hey you!");
        assert_eq!(model.calls(), 1);

        let (status, history) = send(&app, "GET", &format!("/api/chat/history/{}", user_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["sender"], "user");
        assert_eq!(history[0]["message"], "hi");
        assert_eq!(history[1]["sender"], "ai");
        assert_eq!(history[1]["message"], "Hey you!");
        assert!(history[0]["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_history_limit_returns_latest_ascending() {
        let (app, _model) = test_app(StubModel::replying("ok"));
        let user_id = create_user(&app).await;
        send(&app, "POST", "/api/persona", Some(persona_body(user_id))).await;
        for i in 0..3 {
            send(&app, "POST", "/api/chat", Some(json!({"user_id": user_id, "message": format!("m{}", i)}))).await;
        }

        let (status, history) =
            send(&app, "GET", &format!("/api/chat/history/{}?limit=3", user_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let messages: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["message"].as_str().unwrap())
            .collect();
        assert_eq!(messages, vec!["ok", "m2", "ok"]);

        let (status, _) = send(&app, "GET", &format!("/api/chat/history/{}?limit=0", user_id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_for_unknown_user_is_empty() {
        let (app, _model) = test_app(StubModel::replying("ok"));
        let (status, history) = send(&app, "GET", "/api/chat/history/999", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn test_chat_without_persona_returns_instruction() {
        let (app, model) = test_app(StubModel::replying("unused"));
        let user_id = create_user(&app).await;

        let (status, reply) = send(&app, "POST", "/api/chat", Some(json!({"user_id": user_id, "message": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["reply"], PERSONA_MISSING_REPLY);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_responses() {
        let (app, _model) = test_app(StubModel::replying("unused"));

        let (status, body) = send(&app, "POST", "/api/chat", Some(json!({"user_id": 77, "message": "hi"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);

        let (status, _) = send(&app, "POST", "/api/persona", Some(persona_body(77))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let user_id = create_user(&app).await;
        let (status, body) = send(&app, "GET", &format!("/api/persona/{}", user_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Persona not found");
    }

    #[tokio::test]
    async fn test_validation_failures_are_bad_requests() {
        let (app, _model) = test_app(StubModel::replying("unused"));
        let user_id = create_user(&app).await;

        let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"user_id": user_id, "message": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"user_id": user_id}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut persona = persona_body(user_id);
        persona["name"] = json!("   ");
        let (status, body) = send(&app, "POST", "/api/persona", Some(persona)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn test_memory_endpoints() {
        let (app, model) = test_app(StubModel::replying("ok"));
        let user_id = create_user(&app).await;
        send(&app, "POST", "/api/persona", Some(persona_body(user_id))).await;

        send(&app, "POST", "/api/memory", Some(json!({"user_id": user_id, "key": "pet", "value": "cat"}))).await;
        let (status, entry) =
            send(&app, "POST", "/api/memory", Some(json!({"user_id": user_id, "key": "pet", "value": "dog"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["value"], "dog");

        let (_, memories) = send(&app, "GET", &format!("/api/memory/{}", user_id), None).await;
        assert_eq!(memories.as_array().unwrap().len(), 1);

        send(&app, "POST", "/api/chat", Some(json!({"user_id": user_id, "message": "hi"}))).await;
        assert!(model.prompts()[0].contains("pet: dog"));

        let (status, body) = send(&app, "DELETE", &format!("/api/memory/{}/pet", user_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let (status, _) = send(&app, "DELETE", &format!("/api/memory/{}/pet", user_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (app, _model) = test_app(StubModel::replying("ok"));
        let user_id = create_user(&app).await;

        let (status, body) = send(&app, "DELETE", &format!("/api/user/{}", user_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = send(&app, "DELETE", &format!("/api/user/{}", user_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_and_health() {
        let (app, _model) = test_app(StubModel::replying("ok"));
        create_user(&app).await;

        let (status, stats) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(stats["database"].is_null());
        assert_eq!(stats["model"], "stub");
        assert!(stats["counters"]["total_requests"].as_u64().unwrap() >= 1);

        let (status, health) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_with_sqlite_backend() {
        let database = Arc::new(Database::new_in_memory().unwrap());
        let model = Arc::new(StubModel::replying("ok"));
        let orchestrator = Arc::new(ChatOrchestrator::new(database.clone(), model));
        let app = build_router(AppState::new(orchestrator, test_config()).with_database(database));

        create_user(&app).await;
        let (status, stats) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["database"]["total_users"], 1);
    }
}
