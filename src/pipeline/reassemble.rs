// src/pipeline/reassemble.rs
// Ordered per-backend reports from unordered task results

use super::types::{BackendReport, ChunkOutput, FailureKind, TaskKey, TaskResult, TaskResults};
use tracing::warn;

/// Build one report per backend, in `backends` order, each with exactly
/// `chunk_count` outputs ordered by chunk index.
///
/// A slot with no recorded result becomes a `Missing` failure.
pub fn assemble(results: &TaskResults, backends: &[String], chunk_count: usize) -> Vec<BackendReport> {
    backends
        .iter()
        .map(|backend_id| {
            let outputs = (0..chunk_count)
                .map(|chunk_index| {
                    let key = TaskKey::new(chunk_index, backend_id.clone());
                    let result = match results.get(&key) {
                        Some(result) => result.clone(),
                        None => {
                            warn!(backend = %backend_id, chunk = chunk_index, "No result recorded for chunk");
                            TaskResult::failure(
                                FailureKind::Missing,
                                format!("no result for part {}", chunk_index + 1),
                            )
                        }
                    };
                    ChunkOutput {
                        chunk_index,
                        result,
                    }
                })
                .collect();
            BackendReport {
                backend_id: backend_id.clone(),
                outputs,
            }
        })
        .collect()
}

/// Join a backend's successful outputs into one document.
///
/// Failed slots become a visible "section unavailable" note.
pub fn render_backend_document(report: &BackendReport) -> String {
    let count = report.outputs.len();
    report
        .outputs
        .iter()
        .map(|output| {
            let body = match &output.result {
                TaskResult::Success { text } => text.trim().to_string(),
                TaskResult::Failure(failure) => format!(
                    "_Section unavailable: {} ({})_",
                    failure.kind, failure.message
                ),
            };
            if count > 1 {
                format!("#### Part {} of {}\n{}", output.chunk_index + 1, count, body)
            } else {
                body
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
