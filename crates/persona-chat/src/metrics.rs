
use prometheus::{Encoder, TextEncoder, Registry, IntCounterVec, Histogram};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use tracing::error;
lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static CHAT_TURNS: OnceLock<IntCounterVec> = OnceLock::new();
static LLM_REQUEST_TIME: OnceLock<Histogram> = OnceLock::new();
pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .expect("valid requests_total metric")
    });

    let chat_turns = CHAT_TURNS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("chat_turns_total", "Chat turns by outcome"),
            &["outcome"],
        )
        .expect("valid chat_turns_total metric")
    });

    let llm_request_time = LLM_REQUEST_TIME.get_or_init(|| {
        Histogram::with_opts(prometheus::HistogramOpts::new(
            "llm_request_seconds",
            "Time spent waiting on the language model",
        ))
        .expect("valid llm_request_seconds metric")
    });

    // Re-registration fails harmlessly when init runs twice.
    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(chat_turns.clone())).ok();
    REGISTRY.register(Box::new(llm_request_time.clone())).ok();
}
pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}
pub fn inc_chat_turn(outcome: &str) {
    if let Some(counter) = CHAT_TURNS.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}
pub fn observe_llm_request(seconds: f64) {
    if let Some(histogram) = LLM_REQUEST_TIME.get() {
        histogram.observe(seconds);
    }
}
pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            b"metrics encoding failed".to_vec(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
