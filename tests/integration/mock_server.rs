//! Mock chat-completions server for integration tests

use aion_generation::transport::HttpCompletionClient;
use aion_generation::GenerationConfig;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const TEST_API_KEY: &str = "test-key";

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = format!("{}/v1", server.url());
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Configuration pointing at the mock server, caching in memory
    pub fn config(&self) -> GenerationConfig {
        GenerationConfig {
            base_url: self.base_url.clone(),
            model: "test-model".into(),
            timeout_secs: 5,
            ..GenerationConfig::default()
        }
    }

    pub fn client(&self) -> HttpCompletionClient {
        HttpCompletionClient::new(&self.config())
            .expect("client builds")
            .with_api_key(TEST_API_KEY)
    }

    /// Create a mock answering every completion request with `content`
    pub async fn mock_completion(&self, content: &str, expected_calls: usize) -> Mock {
        let body = json!({
            "id": "chatcmpl-test",
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 34, "total_tokens": 46}
        });
        let mut server = self.server.lock().await;
        server
            .mock("POST", COMPLETIONS_PATH)
            .match_header("authorization", format!("Bearer {}", TEST_API_KEY).as_str())
            .match_body(Matcher::PartialJson(json!({"model": "test-model", "n": 1})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(expected_calls)
            .create_async()
            .await
    }

    /// Create a mock for a raw JSON response
    pub async fn mock_json_response(&self, status: u16, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", COMPLETIONS_PATH)
            .with_status(status.into())
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}
