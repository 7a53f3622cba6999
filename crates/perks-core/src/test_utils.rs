//! Test utilities for perks-core
//!
//! This module provides testing infrastructure including a mock model server
//! speaking both the Ollama and the OpenAI-compatible chat API.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::oneshot;

use crate::ai::mock::echo_labels;

/// How the mock server answers completion requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockOllamaMode {
    /// Echo the prompt's reward labels as a fenced JSON reward object
    #[default]
    Rewards,
    /// Always 429
    RateLimited,
    /// Always 401
    Unauthorized,
}

/// Mock model server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with_mode(MockOllamaMode::Rewards).await
    }

    /// Start the mock server with a specific answer mode
    pub async fn start_with_mode(mode: MockOllamaMode) -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(mode);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Error response for the failure modes, `None` when the request should succeed
fn failure(mode: MockOllamaMode) -> Option<Response> {
    match mode {
        MockOllamaMode::Rewards => None,
        MockOllamaMode::RateLimited => Some(
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": "rate limit exceeded"})),
            )
                .into_response(),
        ),
        MockOllamaMode::Unauthorized => Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid api key"})),
            )
                .into_response(),
        ),
    }
}

/// Reward JSON wrapped in a markdown fence, as chatty models answer
fn fenced_rewards(prompt: &str) -> String {
    format!("```json\n{}\n```", echo_labels(prompt))
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
async fn handle_generate(
    State(mode): State<MockOllamaMode>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Some(response) = failure(mode) {
        return response;
    }
    Json(GenerateResponse {
        model: request.model,
        response: fenced_rewards(&request.prompt),
        done: true,
    })
    .into_response()
}

/// OpenAI-compatible model list (health check)
async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({"object": "list", "data": [{"id": "mock-model", "object": "model"}]}))
}

/// OpenAI-compatible chat completions endpoint
async fn handle_chat(
    State(mode): State<MockOllamaMode>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if let Some(response) = failure(mode) {
        return response;
    }
    let prompt = request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": fenced_rewards(&prompt)},
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
}

#[derive(Deserialize)]
struct ChatRequestMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIBackend, AIClient, OllamaBackend, OpenAICompatibleBackend};
    use crate::rewards::parse_reward_response;

    #[tokio::test]
    async fn test_mock_server_health_check() {
        let server = MockOllamaServer::start().await;
        let client = OllamaBackend::new(&server.url(), "test-model");
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_server_fenced_rewards_parse() {
        let server = MockOllamaServer::start().await;
        let client = OllamaBackend::new(&server.url(), "test-model");

        let text = "Points Earned: 750\nClosing Balance: 2,250";
        let raw = client.complete(text).await.unwrap();
        assert!(raw.starts_with("```json"));

        let result = parse_reward_response(&raw, text).unwrap();
        assert_eq!(result.reward_points.earned, Some(750.0));
        assert_eq!(result.reward_points.closing, Some(2250.0));
        assert_eq!(result.reward_points.opening, None);
    }

    #[tokio::test]
    async fn test_mock_server_openai_compatible() {
        let server = MockOllamaServer::start().await;
        let client = AIClient::OpenAICompatible(OpenAICompatibleBackend::new(
            &server.url(),
            "mock-model",
        ));

        assert!(client.health_check().await);
        let raw = client.complete("Opening Balance: 100").await.unwrap();
        let result = parse_reward_response(&raw, "Opening Balance: 100").unwrap();
        assert_eq!(result.reward_points.opening, Some(100.0));
    }
}
