// src/error.rs
// Standardized error types for pr-council

use thiserror::Error;

/// Main error type for the pr-council library.
///
/// Per-model failures never surface here: they travel as
/// [`TaskFailure`](crate::pipeline::TaskFailure) values inside the report.
/// This enum only covers conditions that stop a whole invocation.
#[derive(Error, Debug)]
pub enum CouncilError {
    #[error("no reviewable changes ({} generated file(s) excluded)", excluded.len())]
    EmptyInput { excluded: Vec<String> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("review cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using CouncilError
pub type Result<T> = std::result::Result<T, CouncilError>;

impl From<String> for CouncilError {
    fn from(s: String) -> Self {
        CouncilError::Other(s)
    }
}
