//! Text-generation transport.
//!
//! [`CompletionClient`] is the seam between the generation service and the
//! external model: it takes a prompt and returns free-form text. The HTTP
//! implementation speaks the OpenAI-compatible chat completions API.

mod http;

pub use http::HttpCompletionClient;

use crate::types::Message;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Single-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// A request carrying `prompt` as the only user message.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(text));
        self
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Token counts; providers that report only some of them leave the rest at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            usage: None,
        }
    }
}

/// External text-generation capability.
///
/// Implementations report every failure to produce text (unreachable host,
/// non-success status, empty choice list) as
/// [`Error::UpstreamUnavailable`](crate::Error::UpstreamUnavailable).
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    fn name(&self) -> &'static str;
}
