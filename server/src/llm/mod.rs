//! Abstract LLM client (spec.md §6: `executeChat(prompt, model, provider,
//! opts) → {response, message?, usage?}`). The core does not mandate a
//! protocol; the default implementation here speaks an OpenAI-compatible
//! chat-completions endpoint over HTTP, following the provider-call shape
//! this codebase already uses for its prompt client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppResult;
use crate::rate_limiters::LlmRateLimiter;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub response: String,
    pub message: Option<String>,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn execute_chat(&self, request: ChatRequest) -> AppResult<ChatResponse>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct PromptUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatApiResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatApiErrorBody {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error { error: ChatApiErrorBody },
}

/// Default HTTP implementation against an OpenAI-compatible
/// `/chat/completions` endpoint.
pub struct HttpLlmClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    rate_limiter: LlmRateLimiter,
}

impl HttpLlmClient {
    pub fn new(
        http_client: reqwest::Client,
        endpoint: String,
        api_key: String,
        rate_limiter: LlmRateLimiter,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            api_key,
            rate_limiter,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn execute_chat(&self, request: ChatRequest) -> AppResult<ChatResponse> {
        self.rate_limiter.acquire_one().await;

        let body = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
            "response_format": { "type": "json_object" }
        });

        let resp = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let parsed: ChatApiResponseOrError = serde_json::from_value(resp.clone())
            .map_err(|e| anyhow::anyhow!("could not parse chat response: {e}: {resp}"))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error { error } => {
                if error.message.to_lowercase().contains("rate limit") {
                    self.rate_limiter.trigger_backoff();
                }
                return Err(anyhow::anyhow!("LLM API error: {}", error.message).into());
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("LLM response had no choices"))?;

        Ok(ChatResponse {
            response: choice.message.content,
            message: None,
            usage: parsed.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}
