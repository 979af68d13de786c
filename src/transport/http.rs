use super::{Completion, CompletionClient, CompletionRequest, Usage};
use crate::config::GenerationConfig;
use crate::types::Message;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

const KEYRING_SERVICE: &str = "aion";
const KEYRING_USER: &str = "completion-api";

/// Chat completions client for OpenAI-compatible endpoints.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(
                env::var("AION_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(16),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    "failed to build HTTP client",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("http_transport"),
                )
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: Self::get_api_key(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Override the resolved API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn get_api_key() -> Option<String> {
        // 1. Try Keyring
        if let Ok(entry) = Entry::new(KEYRING_SERVICE, KEYRING_USER) {
            if let Ok(key) = entry.get_password() {
                return Some(key);
            }
        }

        // 2. Try Environment Variables
        env::var("AION_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
    }
}

/// Pull a human-readable message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| crate::error::snippet(body))
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = ChatBody {
            model: &self.model,
            messages: &request.messages,
            n: 1,
            temperature: request.temperature.or(self.temperature),
            max_tokens: request.max_tokens.or(self.max_tokens),
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(endpoint = %self.endpoint, model = %self.model, %request_id, "sending completion request");

        let mut req = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .header("x-aion-request-id", &request_id);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::upstream(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::upstream(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(Error::upstream(Some(status.as_u16()), error_message(&text)));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            Error::upstream(
                Some(status.as_u16()),
                format!("unexpected response body: {}", e),
            )
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::upstream(Some(status.as_u16()), "completion contained no choices"))?;

        Ok(Completion {
            text: content,
            model: parsed.model,
            usage: parsed.usage,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
