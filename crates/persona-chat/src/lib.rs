// persona-chat/crates/persona-chat/src/lib.rs

pub mod api;
pub mod chat_db;
pub mod config;
pub mod context_engine;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod server;
pub mod shared_state;
pub mod store;
pub mod telemetry;

// Public API exports
pub use config::{Config, LlmConfig};
pub use chat_db::Database;
pub use context_engine::{build_prompt, ChatOrchestrator, ChatReply, TurnOutcome};
pub use error::{ChatError, ChatResult};
pub use llm::{GeminiClient, Generation, LanguageModel};
pub use server::{build_router, run_server};
pub use shared_state::AppState;
pub use store::{ChatStore, InMemoryChatStore};
