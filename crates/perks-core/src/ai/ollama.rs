//! Ollama backend implementation
//!
//! HTTP client for the Ollama generate API. Requests ask for JSON output so
//! the model is constrained to a single object.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

use super::{http_client, status_error, AIBackend};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, default_model: &str) -> Self {
        Self {
            http_client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            default_model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: self.default_model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.1 },
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(
            model = %self.default_model,
            chars = ollama_response.response.len(),
            "Ollama response received"
        );

        Ok(ollama_response.response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.default_model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::{MockOllamaMode, MockOllamaServer};

    #[tokio::test]
    async fn test_complete_returns_raw_response() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        assert!(backend.health_check().await);
        let text = backend
            .complete("Opening Balance: 1,000\nClosing Balance: 1,500")
            .await
            .unwrap();
        assert!(text.contains("rewardPoints"));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error_kind() {
        let server = MockOllamaServer::start_with_mode(MockOllamaMode::RateLimited).await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let err = backend.complete("anything").await.unwrap_err();
        assert!(matches!(err, Error::ModelRateLimited(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockOllamaServer::start_with_mode(MockOllamaMode::Unauthorized).await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let err = backend.complete("anything").await.unwrap_err();
        assert!(matches!(err, Error::ModelAuth(_)));
    }

    #[tokio::test]
    async fn test_health_check_fails_without_server() {
        // Nothing listens on port 9 (discard) in the test environment
        let backend = OllamaBackend::new("http://127.0.0.1:9", "llama3.2");
        assert!(!backend.health_check().await);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
    }
}
