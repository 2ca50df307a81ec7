// src/llm/registry.rs
// Registry of configured model backends

use crate::config::{BackendConfig, CouncilConfig, CredentialConfig, CredentialMode};
use crate::error::{CouncilError, Result};
use crate::llm::credentials::{ClientCredentials, CredentialCache, PreissuedToken, TokenSource};
use crate::llm::gateway::{GatewayClient, GatewayOptions};
use crate::llm::http_client::BackendHttpClient;
use crate::llm::ollama::OllamaClient;
use crate::llm::provider::{ModelBackend, Provider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Backends by id. Gateways naming the same credential share one
/// [`CredentialCache`].
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured backend
    pub fn from_config(config: &CouncilConfig) -> Result<Self> {
        let http = BackendHttpClient::default();
        let options = GatewayOptions {
            temperature: config.review.temperature,
            correlation_id: config.review.correlation_id.clone(),
        };
        let mut caches: HashMap<String, Arc<CredentialCache>> = HashMap::new();
        let mut registry = Self::new();

        for backend in &config.backends {
            if registry.contains(&backend.id) {
                return Err(CouncilError::Config(format!(
                    "duplicate backend id '{}'",
                    backend.id
                )));
            }
            let client: Arc<dyn ModelBackend> = match backend.provider {
                Provider::Gateway => {
                    let cache = credential_for(backend, config, &http, &mut caches)?;
                    Arc::new(GatewayClient::new(
                        backend.id.clone(),
                        &backend.base_url,
                        backend.model_name(),
                        cache,
                        options.clone(),
                        http.clone(),
                    ))
                }
                Provider::Ollama => Arc::new(OllamaClient::new(
                    backend.id.clone(),
                    &backend.base_url,
                    backend.model_name(),
                    config.review.temperature,
                    http.clone(),
                )),
            };
            registry.insert(client);
        }

        info!(backends = ?registry.ids(), "Model backends available");
        Ok(registry)
    }

    pub fn insert(&mut self, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(backend.id().to_string(), backend);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.backends.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

fn credential_for(
    backend: &BackendConfig,
    config: &CouncilConfig,
    http: &BackendHttpClient,
    caches: &mut HashMap<String, Arc<CredentialCache>>,
) -> Result<Arc<CredentialCache>> {
    let name = backend.credential.as_deref().ok_or_else(|| {
        CouncilError::Config(format!("backend '{}' needs a credential", backend.id))
    })?;
    if let Some(cache) = caches.get(name) {
        return Ok(cache.clone());
    }
    let credential = config.credentials.get(name).ok_or_else(|| {
        CouncilError::Config(format!(
            "backend '{}' references undefined credential '{}'",
            backend.id, name
        ))
    })?;
    let cache = Arc::new(CredentialCache::new(name, token_source(name, credential, http)?));
    caches.insert(name.to_string(), cache.clone());
    Ok(cache)
}

fn token_source(
    name: &str,
    credential: &CredentialConfig,
    http: &BackendHttpClient,
) -> Result<Arc<dyn TokenSource>> {
    let require = |field: &Option<String>, label: &str| {
        field
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CouncilError::Config(format!("credential '{}' is missing {}", name, label)))
    };

    let source: Arc<dyn TokenSource> = match credential.mode {
        CredentialMode::Preissued => Arc::new(PreissuedToken::new(require(&credential.token, "token")?)),
        CredentialMode::ClientCredentials => Arc::new(ClientCredentials::new(
            require(&credential.token_url, "token_url")?,
            require(&credential.client_id, "client_id")?,
            require(&credential.client_secret, "client_secret")?,
            http.inner().clone(),
        )),
    };
    Ok(source)
}
