// src/pipeline/synthesis.rs
// Consolidating several backends' reports through one designated backend

use super::dispatch::Dispatcher;
use super::prompt::PromptTemplate;
use super::reassemble::render_backend_document;
use super::types::{BackendReport, BackendTask, FailureKind, SynthesisResult, TaskResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Concatenate every backend's document under a `### Model:` heading.
///
/// Returns `None` when no backend produced a single successful section.
pub fn synthesis_source(reports: &[BackendReport]) -> Option<String> {
    if reports.iter().all(|r| r.success_count() == 0) {
        return None;
    }
    let sections: Vec<String> = reports
        .iter()
        .map(|report| format!("### Model: {}\n{}", report.backend_id, render_backend_document(report)))
        .collect();
    Some(sections.join("\n\n"))
}

/// Send all reports to `backend_id` once for a consolidated narrative.
///
/// The call goes through the dispatcher, so rate-limit retries and the
/// deadline apply. Failure is returned as data and never affects `reports`.
#[instrument(skip(dispatcher, reports, template, cancel), fields(backend = %backend_id, sources = reports.len()))]
pub async fn synthesize(
    dispatcher: &Dispatcher,
    reports: &[BackendReport],
    backend_id: &str,
    template: &PromptTemplate,
    cancel: CancellationToken,
) -> SynthesisResult {
    let Some(source) = synthesis_source(reports) else {
        warn!("Skipping synthesis, no successful sections");
        return SynthesisResult {
            backend_id: backend_id.to_string(),
            result: TaskResult::failure(FailureKind::Missing, "no successful sections to synthesize"),
        };
    };

    let task = BackendTask {
        chunk_index: 0,
        backend_id: backend_id.to_string(),
        prompt: template.render(&source, 0, 1),
    };
    let key = task.key();
    let mut results = dispatcher.run(vec![task], cancel).await;
    let result = results.remove(&key).unwrap_or_else(|| {
        TaskResult::failure(FailureKind::Missing, "synthesis produced no result")
    });

    match &result {
        TaskResult::Success { text } => info!(content_len = text.len(), "Synthesis complete"),
        TaskResult::Failure(failure) => warn!(kind = %failure.kind, error = %failure.message, "Synthesis failed"),
    }

    SynthesisResult {
        backend_id: backend_id.to_string(),
        result,
    }
}
