//! Gemini `generateContent` client.
//!
//! Sends the whole persona prompt as a single user turn and returns the
//! concatenated text parts of the first candidate.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::LanguageModel;
use crate::config::LlmConfig;
use crate::error::ChatError;

/// Value shipped in the sample `.env`; treated the same as a missing key.
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// One entry of the `models.list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Fails immediately when the credential is missing or still the placeholder.
    pub fn new(config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() || api_key == PLACEHOLDER_API_KEY {
            return Err(ChatError::Setup(
                "Please set GEMINI_API_KEY in the environment or .env file".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ChatError::Setup(format!("Failed to build HTTP client: {}", e)))?;

        info!("Gemini client initialized with model: {}", config.model);
        Ok(Self {
            http_client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn models_url(&self) -> String {
        format!("{}/v1beta/models", self.base_url)
    }

    async fn error_from_response(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        anyhow::anyhow!("Gemini API returned {}: {}", status, message)
    }

    /// Models visible to the configured key.
    pub async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let response = self.http_client
            .get(self.models_url())
            .header("x-goog-api-key", &self.api_key)
            .query(&[("pageSize", "1000")])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Model listing request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let listing: ListModelsResponse = response.json().await
            .map_err(|e| anyhow::anyhow!("Failed to parse model listing: {}", e))?;
        Ok(listing.models)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn try_generate(&self, prompt: &str) -> anyhow::Result<String> {
        debug!("Sending prompt ({} chars) to {}", prompt.len(), self.model);
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response = self.http_client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Gemini request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let completion: GenerateContentResponse = response.json().await
            .map_err(|e| anyhow::anyhow!("Failed to parse Gemini response: {}", e))?;

        if let Some(reason) = completion.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(anyhow::anyhow!("Prompt blocked by model: {}", reason));
        }
        let candidate = completion.candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Gemini response contained no candidates"))?;
        let text: String = candidate.content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Gemini response contained no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash-lite:generateContent";

    fn test_config(base_url: &str, api_key: &str) -> LlmConfig {
        LlmConfig {
            api_key: api_key.to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            base_url: base_url.to_string(),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn test_missing_credential_is_setup_error() {
        let err = GeminiClient::new(&test_config("http://localhost", "")).err().unwrap();
        assert!(matches!(err, ChatError::Setup(_)));
    }

    #[test]
    fn test_placeholder_credential_is_setup_error() {
        let result = GeminiClient::new(&test_config("http://localhost", PLACEHOLDER_API_KEY));
        assert!(matches!(result, Err(ChatError::Setup(_))));
    }

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let client = GeminiClient::new(&test_config("http://localhost:9/", "key")).unwrap();
        assert_eq!(client.generate_url(), format!("http://localhost:9{}", GENERATE_PATH));
        assert_eq!(client.models_url(), "http://localhost:9/v1beta/models");
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", GENERATE_PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "say hi"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "Hi "}, {"text": "there!"}]},
                        "finishReason": "STOP"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GeminiClient::new(&test_config(&server.url(), "test-key")).unwrap();
        let text = client.try_generate("say hi").await.unwrap();

        assert_eq!(text, "Hi there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", GENERATE_PATH)
            .with_status(429)
            .with_body(json!({"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}}).to_string())
            .create_async()
            .await;

        let client = GeminiClient::new(&test_config(&server.url(), "test-key")).unwrap();
        let err = client.try_generate("hello").await.unwrap_err();
        assert!(err.to_string().contains("Resource exhausted"));

        let generation = client.generate("hello").await;
        assert!(generation.is_fallback());
        assert!(generation.reply().contains("Resource exhausted"));
    }

    #[tokio::test]
    async fn test_empty_candidates_are_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", GENERATE_PATH)
            .with_status(200)
            .with_body(json!({"candidates": []}).to_string())
            .create_async()
            .await;

        let client = GeminiClient::new(&test_config(&server.url(), "test-key")).unwrap();
        assert!(client.try_generate("hello").await.is_err());
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", GENERATE_PATH)
            .with_status(200)
            .with_body(json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string())
            .create_async()
            .await;

        let client = GeminiClient::new(&test_config(&server.url(), "test-key")).unwrap();
        let err = client.try_generate("hello").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_fallback() {
        let client = GeminiClient::new(&test_config("http://127.0.0.1:1", "test-key")).unwrap();
        let generation = client.generate("hello").await;
        assert!(generation.is_fallback());
        assert!(!generation.reply().is_empty());
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1beta/models")
            .match_query(Matcher::UrlEncoded("pageSize".into(), "1000".into()))
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_body(
                json!({
                    "models": [
                        {"name": "models/gemini-2.5-flash-lite", "displayName": "Gemini 2.5 Flash-Lite",
                         "supportedGenerationMethods": ["generateContent", "countTokens"]},
                        {"name": "models/text-embedding-004"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GeminiClient::new(&test_config(&server.url(), "test-key")).unwrap();
        let models = client.list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].display_name.as_deref(), Some("Gemini 2.5 Flash-Lite"));
        assert!(models[0].supported_generation_methods.contains(&"generateContent".to_string()));
        assert!(models[1].supported_generation_methods.is_empty());
    }
}
