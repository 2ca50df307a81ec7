// src/llm/credentials.rs
// Access tokens for authenticated backends, with coalesced refresh

use crate::error::{CouncilError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Where access tokens come from
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a fresh token
    async fn fetch(&self) -> Result<String>;
}

/// A token issued out of band; refreshing returns the same value
pub struct PreissuedToken {
    token: String,
}

impl PreissuedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for PreissuedToken {
    async fn fetch(&self) -> Result<String> {
        if self.token.trim().is_empty() {
            return Err(CouncilError::Auth("pre-issued token is empty".into()));
        }
        Ok(self.token.clone())
    }
}

/// OAuth2 client-credentials grant
pub struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl ClientCredentials {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http,
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CouncilError::Auth(format!(
                "token endpoint returned {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CouncilError::Auth("token response has no access_token".into()))
    }
}

/// A token plus the refresh generation that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub generation: u64,
}

/// Process-scoped token cache for one named credential.
///
/// Concurrent callers that hit an expired token coalesce into a single
/// refresh: the first one fetches while holding the lock, the rest wait and
/// then see that the generation has moved past the token they held.
pub struct CredentialCache {
    name: String,
    source: Arc<dyn TokenSource>,
    state: Mutex<Option<AccessToken>>,
}

impl CredentialCache {
    pub fn new(name: impl Into<String>, source: Arc<dyn TokenSource>) -> Self {
        Self {
            name: name.into(),
            source,
            state: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current token, fetching one on first use
    pub async fn token(&self) -> Result<AccessToken> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.as_ref() {
            return Ok(token.clone());
        }
        let fresh = self.fetch_next(state.as_ref()).await?;
        *state = Some(fresh.clone());
        Ok(fresh)
    }

    /// Replace `stale` with a new token.
    ///
    /// If another caller already refreshed past `stale`, its token is
    /// returned without another fetch.
    #[instrument(skip(self, stale), fields(credential = %self.name, stale_generation = stale.generation))]
    pub async fn refresh(&self, stale: &AccessToken) -> Result<AccessToken> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.as_ref() {
            if current.generation > stale.generation {
                debug!(generation = current.generation, "Token already refreshed");
                return Ok(current.clone());
            }
        }
        let fresh = self.fetch_next(state.as_ref()).await?;
        *state = Some(fresh.clone());
        Ok(fresh)
    }

    async fn fetch_next(&self, current: Option<&AccessToken>) -> Result<AccessToken> {
        let generation = current.map(|t| t.generation + 1).unwrap_or(1);
        let value = self.source.fetch().await?;
        info!(credential = %self.name, generation, "Access token obtained");
        Ok(AccessToken { value, generation })
    }
}
