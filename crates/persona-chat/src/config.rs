// persona-chat/crates/persona-chat/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::{info, warn};

/// Settings for the hosted language model client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// May be empty here; the client rejects it at construction.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: String,
    pub db_pool_size: u32,
    pub llm: LlmConfig,
    pub request_timeout_seconds: u64,
    pub history_limit: usize,
    pub serialize_user_turns: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env_or(key, default);
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let llm = LlmConfig {
            api_key: env_or("GEMINI_API_KEY", ""),
            model: env_or("GEMINI_MODEL", "gemini-2.5-flash-lite"),
            base_url: env_or("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com"),
            timeout_seconds: parse_env("LLM_TIMEOUT_SECONDS", "60")?,
        };

        Ok(Self {
            api_host: env_or("API_HOST", "127.0.0.1"),
            api_port: parse_env("API_PORT", "8000")?,
            database_path: env_or("DATABASE_PATH", "./data/persona_chat.db"),
            db_pool_size: parse_env("DB_POOL_SIZE", "10")?,
            llm,
            request_timeout_seconds: parse_env("REQUEST_TIMEOUT_SECONDS", "120")?,
            history_limit: parse_env("HISTORY_LIMIT", "50")?,
            serialize_user_turns: parse_env("SERIALIZE_USER_TURNS", "false")?,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Database: {} (pool size {})", self.database_path, self.db_pool_size);
        info!("- Model: {} via {}", self.llm.model, self.llm.base_url);
        info!("- Model API key: {}", mask_secret(&self.llm.api_key));
        info!("- Model Timeout: {}s", self.llm.timeout_seconds);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Default History Limit: {}", self.history_limit);
        info!("- Serialize Turns Per User: {}", self.serialize_user_turns);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "<not set>".to_string();
    }
    let visible: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", visible)
}
