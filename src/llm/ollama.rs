// src/llm/ollama.rs
// Ollama backend via OpenAI-compatible endpoint (local LLM)

use crate::llm::http_client::BackendHttpClient;
use crate::llm::logging::{log_completion, log_failure};
use crate::llm::openai_compat::{ChatRequest, parse_chat_response};
use crate::llm::provider::{ModelBackend, Prompt, Provider};
use crate::pipeline::{FailureKind, TaskFailure};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{Span, instrument, warn};
use uuid::Uuid;

/// Normalize Ollama base URL by stripping trailing slashes and /v1 suffix
fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim_end_matches('/').to_string();
    if url.ends_with("/v1") {
        url.truncate(url.len() - 3);
    }
    url
}

/// Check if a URL points to a local address (localhost, 127.0.0.0/8, [::1])
fn is_local_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host() {
            Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => true,
        },
        // Malformed URLs fail at request time instead
        Err(_) => true,
    }
}

/// Ollama backend (OpenAI-compatible endpoint, no auth required)
pub struct OllamaClient {
    id: String,
    base_url: String,
    model: String,
    temperature: f32,
    http: BackendHttpClient,
}

impl OllamaClient {
    pub fn new(
        id: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        http: BackendHttpClient,
    ) -> Self {
        let normalized = normalize_base_url(base_url);

        if !is_local_url(&normalized) {
            warn!(
                "Ollama backend points to non-local address '{}'. Diffs will leave this machine.",
                normalized
            );
        }

        Self {
            id: id.into(),
            base_url: normalized,
            model: model.into(),
            temperature,
            http,
        }
    }

    /// Chat using Ollama model (non-streaming, OpenAI-compatible)
    #[instrument(skip(self, prompt), fields(request_id, backend = %self.id, model = %self.model))]
    pub async fn chat(&self, prompt: &Prompt, timeout: Duration) -> Result<String, TaskFailure> {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());
        let started = Instant::now();

        let request =
            ChatRequest::new(&self.model, prompt.to_messages()).with_temperature(self.temperature);
        let body = serde_json::to_string(&request)
            .map_err(|e| TaskFailure::new(FailureKind::Malformed, e.to_string()))?;
        let url = format!("{}/v1/chat/completions", self.base_url);

        // No auth header needed for local Ollama
        let result = self
            .http
            .execute(&request_id, timeout, |client| {
                client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .body(body)
            })
            .await
            .and_then(|response| parse_chat_response(&response));

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => log_completion(&request_id, &self.id, duration_ms, text.len()),
            Err(failure) => log_failure(&request_id, &self.id, duration_ms, failure),
        }
        result
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider_type(&self) -> Provider {
        Provider::Ollama
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn invoke(&self, prompt: &Prompt, timeout: Duration) -> Result<String, TaskFailure> {
        self.chat(prompt, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};

    fn client(base: &str) -> OllamaClient {
        OllamaClient::new("local", base, "llama3.3", 0.2, BackendHttpClient::default())
    }

    #[test]
    fn test_ollama_client_creation() {
        let c = client("http://localhost:11434");
        assert_eq!(c.model_name(), "llama3.3");
        assert_eq!(c.base_url, "http://localhost:11434");
        assert_eq!(c.provider_type(), Provider::Ollama);
        assert_eq!(c.id(), "local");
    }

    #[test]
    fn test_is_local_url() {
        assert!(is_local_url("http://localhost:11434"));
        assert!(is_local_url("http://127.0.0.1:11434"));
        assert!(is_local_url("http://[::1]:11434"));
        assert!(!is_local_url("http://192.168.1.100:11434"));
        assert!(!is_local_url("http://myhost:11434"));
        assert!(!is_local_url("https://ollama.example.com:11434"));
    }

    #[test]
    fn test_lookalike_hosts_are_remote() {
        assert!(!is_local_url("http://127.attacker.example:11434"));
        assert!(!is_local_url("http://localhost@remote.example:11434"));
        assert!(!is_local_url("http://localhost.example.com:11434"));
        assert!(is_local_url("http://127.1.2.3:11434"));
    }

    #[test]
    fn test_url_normalization() {
        assert_eq!(client("http://localhost:11434/v1").base_url, "http://localhost:11434");
        assert_eq!(client("http://localhost:11434/v1/").base_url, "http://localhost:11434");
        assert_eq!(client("http://localhost:11434/").base_url, "http://localhost:11434");
        assert_eq!(client("http://localhost:11434").base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_chat_against_mock_server() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let last = body["messages"].as_array().map(|m| m.len()).unwrap_or(0);
                Json(serde_json::json!({
                    "choices": [{"message": {"content": format!("saw {} messages", last)}}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let prompt = Prompt {
            system: Some("You review code".into()),
            instructions: None,
            user: "diff".into(),
        };
        let text = client(&format!("http://{}", addr))
            .invoke(&prompt, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "saw 2 messages");
    }
}
