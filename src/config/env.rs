// src/config/env.rs
// Environment-based configuration: .env loading and credential overrides

use super::file::CouncilConfig;
use std::path::PathBuf;
use tracing::{debug, info};

/// Pre-issued access token (PR_COUNCIL_ACCESS_TOKEN)
pub const ACCESS_TOKEN_VAR: &str = "PR_COUNCIL_ACCESS_TOKEN";
/// Client-credentials id (PR_COUNCIL_CLIENT_ID)
pub const CLIENT_ID_VAR: &str = "PR_COUNCIL_CLIENT_ID";
/// Client-credentials secret (PR_COUNCIL_CLIENT_SECRET)
pub const CLIENT_SECRET_VAR: &str = "PR_COUNCIL_CLIENT_SECRET";

/// Load `.env` files: ~/.pr-council/.env first, then ./.env.
///
/// Existing environment variables are never overwritten. Returns the files
/// that were loaded; this runs before logging is set up, so the caller
/// logs them.
pub fn load_dotenv() -> Vec<PathBuf> {
    let global = CouncilConfig::config_dir().join(".env");
    load_env_files(&[global, PathBuf::from(".env")])
}

fn load_env_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| dotenvy::from_path(path).is_ok())
        .cloned()
        .collect()
}

/// Credential values taken from the environment
#[derive(Debug, Clone, Default)]
pub struct CredentialEnv {
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl CredentialEnv {
    /// Read credential overrides from environment variables
    pub fn from_env() -> Self {
        let env = Self {
            access_token: Self::read_key(ACCESS_TOKEN_VAR),
            client_id: Self::read_key(CLIENT_ID_VAR),
            client_secret: Self::read_key(CLIENT_SECRET_VAR),
        };
        env.log_status();
        env
    }

    /// Read a single variable, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Log which values are present (without exposing them)
    fn log_status(&self) {
        let mut present = Vec::new();
        if self.access_token.is_some() {
            present.push(ACCESS_TOKEN_VAR);
        }
        if self.client_id.is_some() {
            present.push(CLIENT_ID_VAR);
        }
        if self.client_secret.is_some() {
            present.push(CLIENT_SECRET_VAR);
        }
        if present.is_empty() {
            debug!("No credential overrides in environment");
        } else {
            info!(vars = ?present, "Credential overrides loaded from environment");
        }
    }
}
