//! Raw OpenRouter-compatible chat client. One HTTP call per [`LlmClient::complete`];
//! retry and circuit-breaking live one layer up in [`crate::llm::pool::LlmPool`].

use crate::error::{OntologyError, OntologyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// The triggering DAG's id, carried for audit tagging; never sent to the provider.
    pub workflow_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub token_counts: TokenCounts,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsageResponse>,
}

#[derive(Deserialize)]
struct UsageResponse {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Single-call chat completion contract. Implemented by [`OpenRouterClient`] in
/// production and by an in-memory stub in node executor tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> OntologyResult<LlmResponse>;
}

/// OpenAI-compatible client against OpenRouter.
pub struct OpenRouterClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { api_key: api_key.into(), model: DEFAULT_MODEL.to_string(), http }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENROUTER_API_KEY").ok()?;
        let key = key.trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, request: LlmRequest) -> OntologyResult<LlmResponse> {
        let url = format!("{}/chat/completions", OPENROUTER_API_BASE);
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let res = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                OntologyError::TransientExternal(format!("openrouter {status}: {text}"))
            } else {
                OntologyError::PermanentExternal(format!("openrouter {status}: {text}"))
            });
        }

        let parsed: ChatCompletionResponse = res.json().await?;
        let token_counts = parsed
            .usage
            .as_ref()
            .map(|u| TokenCounts {
                prompt: u.prompt_tokens,
                completion: u.completion_tokens,
                total: u.total_tokens,
            })
            .unwrap_or_default();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OntologyError::PermanentExternal("openrouter returned no choices".into()))?;

        Ok(LlmResponse { content, token_counts })
    }
}
