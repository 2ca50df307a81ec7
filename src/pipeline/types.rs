// src/pipeline/types.rs
// Per-task results and per-backend reports

use crate::llm::Prompt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a single (chunk, backend) task did not produce text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credentials rejected even after one refresh
    AuthExpired,
    RateLimited,
    Timeout,
    /// Response could not be decoded as text
    Malformed,
    /// Network failure or server error
    Unavailable,
    /// No result recorded for the slot
    Missing,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthExpired => write!(f, "auth_expired"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::Malformed => write!(f, "malformed"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal outcome of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Success { text: String },
    Failure(TaskFailure),
}

impl TaskResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success { text: text.into() }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(TaskFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success { text } => Some(text),
            Self::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&TaskFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(f) => Some(f),
        }
    }
}

impl From<Result<String, TaskFailure>> for TaskResult {
    fn from(result: Result<String, TaskFailure>) -> Self {
        match result {
            Ok(text) => Self::Success { text },
            Err(failure) => Self::Failure(failure),
        }
    }
}

/// Result key: one per submitted task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskKey {
    pub chunk_index: usize,
    pub backend_id: String,
}

impl TaskKey {
    pub fn new(chunk_index: usize, backend_id: impl Into<String>) -> Self {
        Self {
            chunk_index,
            backend_id: backend_id.into(),
        }
    }
}

/// One prompt bound for one backend
#[derive(Debug, Clone)]
pub struct BackendTask {
    pub chunk_index: usize,
    pub backend_id: String,
    pub prompt: Prompt,
}

impl BackendTask {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.chunk_index, self.backend_id.clone())
    }
}

/// Dispatcher output: exactly one result per submitted task
pub type TaskResults = BTreeMap<TaskKey, TaskResult>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutput {
    pub chunk_index: usize,
    pub result: TaskResult,
}

/// One backend's outputs, ordered by chunk index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendReport {
    pub backend_id: String,
    pub outputs: Vec<ChunkOutput>,
}

impl BackendReport {
    pub fn success_count(&self) -> usize {
        self.outputs.iter().filter(|o| o.result.is_success()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisResult {
    pub backend_id: String,
    pub result: TaskResult,
}
