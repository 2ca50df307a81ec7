// src/llm/provider.rs
// Model backend abstraction layer

use crate::pipeline::TaskFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Authenticated OpenAI-compatible gateway
    Gateway,
    /// Local Ollama server, no auth
    Ollama,
}

impl Provider {
    /// Parse provider from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gateway" => Some(Self::Gateway),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn requires_credential(&self) -> bool {
        matches!(self, Self::Gateway)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway => write!(f, "gateway"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Chat message in OpenAI-compatible form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A rendered prompt ready to send to one backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    /// Sent as a second system message when present
    pub instructions: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(3);
        if let Some(system) = self.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(Message::system(system));
        }
        if let Some(instructions) = self.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(Message::system(instructions));
        }
        messages.push(Message::user(self.user.clone()));
        messages
    }
}

/// One model endpoint. Auth refresh is internal; callers see only text or
/// a typed failure.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Configured backend id
    fn id(&self) -> &str;

    fn provider_type(&self) -> Provider;

    fn model_name(&self) -> String;

    /// Send one prompt; `timeout` bounds the whole call
    async fn invoke(&self, prompt: &Prompt, timeout: Duration) -> Result<String, TaskFailure>;
}
