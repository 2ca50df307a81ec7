// src/llm/openai_compat/response.rs
// OpenAI-compatible chat response parsing

use crate::pipeline::{FailureKind, TaskFailure};
use serde::Deserialize;

/// Non-streaming chat response (OpenAI-compatible format)
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Extract the first choice's text, or a `Malformed` failure
pub fn parse_chat_response(response_body: &str) -> Result<String, TaskFailure> {
    let data: ChatResponse = serde_json::from_str(response_body).map_err(|e| {
        TaskFailure::new(
            FailureKind::Malformed,
            format!("Failed to parse chat response: {}", e),
        )
    })?;

    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| TaskFailure::new(FailureKind::Malformed, "response has no message content"))
}
