// src/llm/gateway.rs
// Authenticated OpenAI-compatible gateway backend

use crate::llm::credentials::{AccessToken, CredentialCache};
use crate::llm::http_client::BackendHttpClient;
use crate::llm::logging::{log_completion, log_failure};
use crate::llm::openai_compat::{ChatRequest, parse_chat_response};
use crate::llm::provider::{ModelBackend, Prompt, Provider};
use crate::pipeline::{FailureKind, TaskFailure};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Span, info, instrument};
use uuid::Uuid;

/// Gateway backend settings
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub temperature: f32,
    /// Sent as `x-correlation-id`
    pub correlation_id: String,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            correlation_id: "pr-council".into(),
        }
    }
}

/// Model behind an authenticated OpenAI-compatible gateway.
///
/// A 401 triggers one token refresh and one retry.
pub struct GatewayClient {
    id: String,
    base_url: String,
    model: String,
    credential: Arc<CredentialCache>,
    options: GatewayOptions,
    http: BackendHttpClient,
}

impl GatewayClient {
    pub fn new(
        id: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        credential: Arc<CredentialCache>,
        options: GatewayOptions,
        http: BackendHttpClient,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            credential,
            options,
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        request_id: &str,
        token: &AccessToken,
        body: &str,
        timeout: Duration,
    ) -> Result<String, TaskFailure> {
        let url = self.endpoint();
        self.http
            .execute(request_id, timeout, |client| {
                client
                    .post(&url)
                    .bearer_auth(&token.value)
                    .header("x-correlation-id", &self.options.correlation_id)
                    .header("Content-Type", "application/json")
                    .body(body.to_string())
            })
            .await
    }

    /// Chat with the gateway model, refreshing the token once on 401
    #[instrument(skip(self, prompt), fields(request_id, backend = %self.id, model = %self.model))]
    pub async fn chat(&self, prompt: &Prompt, timeout: Duration) -> Result<String, TaskFailure> {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());
        let started = Instant::now();

        let request = ChatRequest::new(&self.model, prompt.to_messages())
            .with_temperature(self.options.temperature);
        let body = serde_json::to_string(&request)
            .map_err(|e| TaskFailure::new(FailureKind::Malformed, e.to_string()))?;

        let result = self.exchange(&request_id, &body, timeout, started).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => log_completion(&request_id, &self.id, duration_ms, text.len()),
            Err(failure) => log_failure(&request_id, &self.id, duration_ms, failure),
        }
        result
    }

    async fn exchange(
        &self,
        request_id: &str,
        body: &str,
        timeout: Duration,
        started: Instant,
    ) -> Result<String, TaskFailure> {
        let token = self.credential.token().await.map_err(auth_failure)?;

        let response = match self.send(request_id, &token, body, timeout).await {
            Err(failure) if failure.kind == FailureKind::AuthExpired => {
                info!(
                    request_id = %request_id,
                    credential = %self.credential.name(),
                    "Token rejected, refreshing once"
                );
                let fresh = self.credential.refresh(&token).await.map_err(auth_failure)?;
                let remaining = timeout.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(TaskFailure::new(
                        FailureKind::Timeout,
                        "no time left to retry after token refresh",
                    ));
                }
                self.send(request_id, &fresh, body, remaining).await?
            }
            other => other?,
        };

        parse_chat_response(&response)
    }
}

fn auth_failure(e: crate::error::CouncilError) -> TaskFailure {
    TaskFailure::new(FailureKind::AuthExpired, format!("token refresh failed: {}", e))
}

#[async_trait]
impl ModelBackend for GatewayClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider_type(&self) -> Provider {
        Provider::Gateway
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
    use crate::error::Result as CouncilResult;
    use crate::llm::credentials::TokenSource;
    use axum::http::{HeaderMap, StatusCode};
    use axum::{Json, Router, routing::post};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out token-1, token-2, ...
    struct SequenceSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for SequenceSource {
        async fn fetch(&self) -> CouncilResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{}", n))
        }
    }

    fn cache() -> (Arc<SequenceSource>, Arc<CredentialCache>) {
        let source = Arc::new(SequenceSource {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(CredentialCache::new("corp", source.clone()));
        (source, cache)
    }

    /// Accepts only `accepted_token`; echoes the correlation id and model
    async fn mock_gateway(accepted_token: &'static str) -> String {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != format!("Bearer {}", accepted_token) {
                    return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "expired"})));
                }
                let correlation = headers
                    .get("x-correlation-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let text = format!("{} via {} stream={}", body["model"], correlation, body["stream"]);
                (
                    StatusCode::OK,
                    Json(serde_json::json!({"choices": [{"message": {"content": text}}]})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1/", addr)
    }

    fn client(base: &str, credential: Arc<CredentialCache>) -> GatewayClient {
        GatewayClient::new(
            "llama",
            base,
            "llama-3-3-70b-instruct",
            credential,
            GatewayOptions {
                temperature: 0.2,
                correlation_id: "corr-1".into(),
            },
            BackendHttpClient::default(),
        )
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let (_, cache) = cache();
        let c = client("https://gw.example.com/v1/", cache);
        assert_eq!(c.endpoint(), "https://gw.example.com/v1/chat/completions");
        assert_eq!(c.provider_type(), Provider::Gateway);
        assert_eq!(c.id(), "llama");
    }

    #[tokio::test]
    async fn test_chat_sends_headers_and_body() {
        let base = mock_gateway("token-1").await;
        let (source, cache) = cache();
        let text = client(&base, cache)
            .invoke(&Prompt::new("diff"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "\"llama-3-3-70b-instruct\" via corr-1 stream=false");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once() {
        let base = mock_gateway("token-2").await;
        let (source, cache) = cache();
        let text = client(&base, cache)
            .invoke(&Prompt::new("diff"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(text.contains("corr-1"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_rejection_surfaces_auth_expired() {
        let base = mock_gateway("never").await;
        let (source, cache) = cache();
        let failure = client(&base, cache)
            .invoke(&Prompt::new("diff"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::AuthExpired);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let (_, cache) = cache();
        let failure = client("http://127.0.0.1:1", cache)
            .invoke(&Prompt::new("diff"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
    }
}
