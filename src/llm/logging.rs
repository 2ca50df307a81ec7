// src/llm/logging.rs
// Shared backend logging helpers

use crate::pipeline::TaskFailure;
use tracing::{info, warn};

/// Log completion summary for a backend call.
pub fn log_completion(request_id: &str, backend: &str, duration_ms: u64, content_len: usize) {
    info!(
        request_id = %request_id,
        duration_ms = duration_ms,
        content_len = content_len,
        "{} chat complete", backend
    );
}

/// Log a call that ended in a failure.
pub fn log_failure(request_id: &str, backend: &str, duration_ms: u64, failure: &TaskFailure) {
    warn!(
        request_id = %request_id,
        duration_ms = duration_ms,
        kind = %failure.kind,
        error = %failure.message,
        "{} chat failed", backend
    );
}
