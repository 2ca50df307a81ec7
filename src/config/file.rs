// src/config/file.rs
// File-based configuration from ~/.pr-council/config.toml

use super::env::CredentialEnv;
use super::validation::ConfigValidation;
use crate::diff::GeneratedRules;
use crate::error::Result;
use crate::llm::Provider;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouncilConfig {
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialConfig>,
}

/// Review pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_chunk_bytes: usize,
    /// In-flight model calls across the whole review
    pub concurrency_limit: usize,
    /// Total attempts per task when rate limited
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub call_timeout_secs: u64,
    /// Overall deadline for one dispatch
    pub deadline_secs: u64,
    /// Backend ids to run; empty means every configured backend
    pub selected_backends: Vec<String>,
    pub synthesis_backend: Option<String>,
    pub temperature: f32,
    pub correlation_id: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 12_000,
            concurrency_limit: 8,
            max_attempts: 3,
            base_backoff_ms: 1_000,
            call_timeout_secs: 300,
            deadline_secs: 900,
            selected_backends: Vec::new(),
            synthesis_backend: None,
            temperature: 0.2,
            correlation_id: "pr-council".into(),
        }
    }
}

/// Generated-file filter section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub path_globs: Vec<String>,
    pub name_regexes: Vec<String>,
    pub header_markers: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let rules = GeneratedRules::default();
        Self {
            enabled: true,
            path_globs: rules.path_globs,
            name_regexes: rules.name_regexes,
            header_markers: rules.header_markers,
        }
    }
}

impl FilterConfig {
    pub fn rules(&self) -> GeneratedRules {
        GeneratedRules {
            path_globs: self.path_globs.clone(),
            name_regexes: self.name_regexes.clone(),
            header_markers: self.header_markers.clone(),
        }
    }
}

/// One `[[backends]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    pub provider: Provider,
    pub base_url: String,
    /// Model name sent upstream; defaults to `id`
    #[serde(default)]
    pub model: Option<String>,
    /// Name of a `[credentials.<name>]` section
    #[serde(default)]
    pub credential: Option<String>,
}

impl BackendConfig {
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    Preissued,
    ClientCredentials,
}

/// One `[credentials.<name>]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub mode: CredentialMode,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl CouncilConfig {
    /// Load config from `path`, or from ~/.pr-council/config.toml.
    ///
    /// An explicit path must exist and parse. The default path falls back
    /// to defaults when missing or unparsable.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)?;
            let config = Self::parse(&contents)?;
            debug!(path = %path.display(), "Loaded config from file");
            return Ok(config);
        }

        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    Ok(config)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Ok(Self::default())
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Directory holding config.toml and .env
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pr-council")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Fill credential fields missing from the file with environment values
    pub fn apply_env(&mut self, env: &CredentialEnv) {
        for credential in self.credentials.values_mut() {
            match credential.mode {
                CredentialMode::Preissued => {
                    if credential.token.is_none() {
                        credential.token = env.access_token.clone();
                    }
                }
                CredentialMode::ClientCredentials => {
                    if credential.client_id.is_none() {
                        credential.client_id = env.client_id.clone();
                    }
                    if credential.client_secret.is_none() {
                        credential.client_secret = env.client_secret.clone();
                    }
                }
            }
        }
    }

    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }

    /// Backends to run: the configured selection, or all of them
    pub fn selected_backends(&self) -> Vec<String> {
        if self.review.selected_backends.is_empty() {
            self.backends.iter().map(|b| b.id.clone()).collect()
        } else {
            self.review.selected_backends.clone()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();
        let review = &self.review;

        if review.max_chunk_bytes == 0 {
            validation.add_error("review.max_chunk_bytes", "must be greater than 0");
        }
        if review.concurrency_limit == 0 {
            validation.add_error("review.concurrency_limit", "must be greater than 0");
        }
        if review.max_attempts == 0 {
            validation.add_error("review.max_attempts", "must be at least 1");
        }
        if review.call_timeout_secs == 0 {
            validation.add_error("review.call_timeout_secs", "must be greater than 0");
        }
        if review.deadline_secs == 0 {
            validation.add_error("review.deadline_secs", "must be greater than 0");
        }
        if review.call_timeout_secs > review.deadline_secs {
            validation.add_warning(
                "review.call_timeout_secs",
                format!("{} exceeds review.deadline_secs ({})", review.call_timeout_secs, review.deadline_secs),
            );
        }
        if !(0.0..=2.0).contains(&review.temperature) {
            validation.add_warning(
                "review.temperature",
                format!("{} is outside 0.0..=2.0", review.temperature),
            );
        }

        if self.backends.is_empty() {
            validation.add_warning("backends", "no backends configured, add a [[backends]] section");
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            let field = |name: &str| format!("backends[{}].{}", backend.id, name);
            if !seen.insert(backend.id.as_str()) {
                validation.add_error(field("id"), format!("duplicate backend id '{}'", backend.id));
            }
            if backend.base_url.trim().is_empty() {
                validation.add_error(field("base_url"), "is empty");
            }
            match (&backend.credential, backend.provider.requires_credential()) {
                (None, true) => validation.add_error(
                    field("credential"),
                    format!("provider '{}' needs a credential but none is named", backend.provider),
                ),
                (Some(name), true) if !self.credentials.contains_key(name) => {
                    validation.add_error(field("credential"), format!("undefined credential '{}'", name))
                }
                (Some(name), false) => validation.add_warning(
                    field("credential"),
                    format!("'{}' is ignored, provider '{}' has no auth", name, backend.provider),
                ),
                _ => {}
            }
        }

        for id in &review.selected_backends {
            if self.backend(id).is_none() {
                validation.add_error(
                    "review.selected_backends",
                    format!("backend '{}' is not configured", id),
                );
            }
        }
        if let Some(id) = &review.synthesis_backend {
            if self.backend(id).is_none() {
                validation.add_error(
                    "review.synthesis_backend",
                    format!("backend '{}' is not configured", id),
                );
            }
        }

        for (name, credential) in &self.credentials {
            let field = |key: &str| format!("credentials.{}.{}", name, key);
            match credential.mode {
                CredentialMode::Preissued => {
                    if credential.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
                        validation.add_error(
                            field("token"),
                            "pre-issued credential has no token (set token or PR_COUNCIL_ACCESS_TOKEN)",
                        );
                    }
                }
                CredentialMode::ClientCredentials => {
                    for (key, value) in [
                        ("token_url", &credential.token_url),
                        ("client_id", &credential.client_id),
                        ("client_secret", &credential.client_secret),
                    ] {
                        if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                            validation.add_error(field(key), "is required for client_credentials");
                        }
                    }
                }
            }
        }

        validation
    }
}
