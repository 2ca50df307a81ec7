// src/llm/http_client.rs
// Shared HTTP execution for model backends

use crate::pipeline::{FailureKind, TaskFailure};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Longest error body kept in a failure message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Shared HTTP client for all model backends.
///
/// Makes exactly one attempt per call. Rate-limit retries belong to the
/// dispatcher and auth retries to the gateway backend.
#[derive(Clone)]
pub struct BackendHttpClient {
    client: Client,
    pub connect_timeout: Duration,
}

impl BackendHttpClient {
    pub fn new(connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            connect_timeout,
        }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute one request built by `build_request` and return the body.
    ///
    /// Non-success statuses and transport errors are mapped onto
    /// [`FailureKind`]s.
    pub async fn execute<F>(
        &self,
        request_id: &str,
        timeout: Duration,
        build_request: F,
    ) -> Result<String, TaskFailure>
    where
        F: FnOnce(&Client) -> reqwest::RequestBuilder,
    {
        let response = build_request(&self.client)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(request_id = %request_id, error = %e, "Request failed");
                classify_transport_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(
                request_id = %request_id,
                status = %status,
                error = %truncate(&error_body),
                "Backend returned error status"
            );
            return Err(classify_status(status, &error_body));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TaskFailure::new(FailureKind::Timeout, format!("reading response: {}", e))
            } else {
                TaskFailure::new(FailureKind::Malformed, format!("reading response: {}", e))
            }
        })?;
        debug!(request_id = %request_id, bytes = body.len(), "Response received");
        Ok(body)
    }
}

impl Default for BackendHttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }
}

/// Map an HTTP error status onto a failure kind
pub fn classify_status(status: StatusCode, body: &str) -> TaskFailure {
    let kind = match status.as_u16() {
        401 => FailureKind::AuthExpired,
        429 => FailureKind::RateLimited,
        _ => FailureKind::Unavailable,
    };
    TaskFailure::new(kind, format!("HTTP {}: {}", status, truncate(body)))
}

fn classify_transport_error(e: &reqwest::Error) -> TaskFailure {
    let kind = if e.is_timeout() {
        FailureKind::Timeout
    } else if e.is_decode() {
        FailureKind::Malformed
    } else {
        FailureKind::Unavailable
    };
    TaskFailure::new(kind, e.to_string())
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode as AxumStatus, routing::post};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    // ========================================================================
    // Status classification
    // ========================================================================

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "").kind,
            FailureKind::AuthExpired
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").kind,
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "").kind,
            FailureKind::Unavailable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "").kind,
            FailureKind::Unavailable
        );
    }

    #[test]
    fn test_error_body_truncated() {
        let long = "e".repeat(2000);
        let failure = classify_status(StatusCode::INTERNAL_SERVER_ERROR, &long);
        assert!(failure.message.len() < 600);
        assert!(failure.message.ends_with("..."));
    }

    // ========================================================================
    // Live requests
    // ========================================================================

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let client = BackendHttpClient::new(Duration::from_millis(200));
        let result = client
            .execute("test", Duration::from_millis(500), |c| c.post("http://127.0.0.1:1"))
            .await;
        assert_eq!(result.unwrap_err().kind, FailureKind::Unavailable);
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let url = serve(Router::new().route("/", post(|| async { "hello" }))).await;
        let client = BackendHttpClient::default();
        let body = client
            .execute("test", Duration::from_secs(5), |c| c.post(&url))
            .await
            .unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_rate_limit_status_is_not_retried() {
        let url = serve(Router::new().route(
            "/",
            post(|| async { (AxumStatus::TOO_MANY_REQUESTS, "busy") }),
        ))
        .await;
        let client = BackendHttpClient::default();
        let failure = client
            .execute("test", Duration::from_secs(5), |c| c.post(&url))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert!(failure.message.contains("busy"));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let url = serve(Router::new().route(
            "/",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        ))
        .await;
        let client = BackendHttpClient::default();
        let failure = client
            .execute("test", Duration::from_millis(100), |c| c.post(&url))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
    }
}
