// src/pipeline/mod.rs
// End-to-end review: filter, chunk, dispatch, reassemble, synthesize

mod dispatch;
mod prompt;
mod reassemble;
mod synthesis;
mod types;

pub use dispatch::{DispatchSettings, Dispatcher};
pub use prompt::{CONTENT_PLACEHOLDER, PART_PLACEHOLDER, PromptSet, PromptTemplate};
pub use reassemble::{assemble, render_backend_document};
pub use synthesis::{synthesis_source, synthesize};
pub use types::{
    BackendReport, BackendTask, ChunkOutput, FailureKind, SynthesisResult, TaskFailure, TaskKey,
    TaskResult, TaskResults,
};

use crate::config::CouncilConfig;
use crate::diff::{
    Chunk, CommitPatch, GeneratedFileFilter, GeneratedRules, chunk_segments, commit_segments,
    parse_unified_diff,
};
use crate::error::{CouncilError, Result};
use crate::llm::BackendRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Everything one review invocation needs
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub max_chunk_bytes: usize,
    /// Generated-file rules; `None` disables filtering
    pub filter: Option<GeneratedRules>,
    /// Backend ids to run, in report order
    pub backends: Vec<String>,
    pub synthesis_backend: Option<String>,
    pub dispatch: DispatchSettings,
    pub prompts: PromptSet,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 12_000,
            filter: Some(GeneratedRules::default()),
            backends: Vec::new(),
            synthesis_backend: None,
            dispatch: DispatchSettings::default(),
            prompts: PromptSet::default(),
        }
    }
}

impl ReviewSettings {
    pub fn from_config(config: &CouncilConfig) -> Self {
        let review = &config.review;
        Self {
            max_chunk_bytes: review.max_chunk_bytes,
            filter: config.filter.enabled.then(|| config.filter.rules()),
            backends: config.selected_backends(),
            synthesis_backend: review.synthesis_backend.clone(),
            dispatch: DispatchSettings {
                concurrency_limit: review.concurrency_limit,
                max_attempts: review.max_attempts,
                base_backoff: Duration::from_millis(review.base_backoff_ms),
                call_timeout: Duration::from_secs(review.call_timeout_secs),
                deadline: Duration::from_secs(review.deadline_secs),
            },
            prompts: PromptSet::default(),
        }
    }
}

/// What was reviewed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewMode {
    Diff,
    FileHistory { path: String },
}

/// Chunks to send, plus the generated files left out
#[derive(Debug, Clone)]
pub struct ReviewPlan {
    pub chunks: Vec<Chunk>,
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub paths: Vec<String>,
    pub approx_size_bytes: usize,
    pub oversized: bool,
}

impl From<&Chunk> for ChunkSummary {
    fn from(chunk: &Chunk) -> Self {
        Self {
            index: chunk.index,
            paths: chunk.paths().into_iter().map(str::to_string).collect(),
            approx_size_bytes: chunk.approx_size_bytes,
            oversized: chunk.oversized,
        }
    }
}

/// One failed section, for a "failed models" listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSection {
    pub backend_id: String,
    pub chunk_index: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// The pipeline's hand-off to whatever renders or stores the review
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub mode: ReviewMode,
    pub chunks: Vec<ChunkSummary>,
    pub excluded: Vec<String>,
    pub reports: Vec<BackendReport>,
    pub synthesis: Option<SynthesisResult>,
}

impl ReviewOutcome {
    /// Every failed (backend, chunk) slot, in report order
    pub fn failures(&self) -> Vec<FailedSection> {
        self.reports
            .iter()
            .flat_map(|report| {
                report.outputs.iter().filter_map(|output| {
                    output.result.as_failure().map(|failure| FailedSection {
                        backend_id: report.backend_id.clone(),
                        chunk_index: output.chunk_index,
                        kind: failure.kind,
                        message: failure.message.clone(),
                    })
                })
            })
            .collect()
    }

    /// True when every section and the synthesis (if requested) succeeded
    pub fn is_complete_success(&self) -> bool {
        self.failures().is_empty()
            && self
                .synthesis
                .as_ref()
                .is_none_or(|s| s.result.is_success())
    }
}

/// Runs reviews against a fixed set of backends
pub struct ReviewPipeline {
    registry: Arc<BackendRegistry>,
    dispatcher: Dispatcher,
    settings: ReviewSettings,
}

impl ReviewPipeline {
    pub fn new(registry: Arc<BackendRegistry>, settings: ReviewSettings) -> Self {
        let dispatcher = Dispatcher::new(registry.clone(), settings.dispatch.clone());
        Self {
            registry,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    /// Parse, filter and chunk a unified diff without calling any backend
    pub fn plan_diff(&self, diff_text: &str) -> Result<ReviewPlan> {
        let segments = parse_unified_diff(diff_text);

        let (kept, excluded) = match &self.settings.filter {
            Some(rules) => {
                let outcome = GeneratedFileFilter::new(rules).filter(segments);
                let excluded = outcome.excluded_paths();
                (outcome.kept, excluded)
            }
            None => (segments, Vec::new()),
        };

        let chunks = chunk_segments(kept, self.settings.max_chunk_bytes);
        if chunks.is_empty() {
            return Err(CouncilError::EmptyInput { excluded });
        }

        info!(
            chunks = chunks.len(),
            excluded = excluded.len(),
            oversized = chunks.iter().filter(|c| c.oversized).count(),
            "Diff planned"
        );
        Ok(ReviewPlan { chunks, excluded })
    }

    /// Review a pull request diff
    #[instrument(skip(self, diff_text, cancel), fields(bytes = diff_text.len()))]
    pub async fn review_diff(&self, diff_text: &str, cancel: CancellationToken) -> Result<ReviewOutcome> {
        let plan = self.plan_diff(diff_text)?;
        self.run_chunks(ReviewMode::Diff, plan, &self.settings.prompts.review, cancel)
            .await
    }

    /// Review the commits that touched one file, oldest first as given
    #[instrument(skip(self, commits, cancel), fields(commits = commits.len()))]
    pub async fn review_history(
        &self,
        file_path: &str,
        commits: &[CommitPatch],
        cancel: CancellationToken,
    ) -> Result<ReviewOutcome> {
        let segments = commit_segments(file_path, commits);
        let chunks = chunk_segments(segments, self.settings.max_chunk_bytes);
        if chunks.is_empty() {
            return Err(CouncilError::EmptyInput {
                excluded: Vec::new(),
            });
        }
        let plan = ReviewPlan {
            chunks,
            excluded: Vec::new(),
        };
        let mode = ReviewMode::FileHistory {
            path: file_path.to_string(),
        };
        self.run_chunks(mode, plan, &self.settings.prompts.history, cancel)
            .await
    }

    /// Selected backends, deduplicated, all known to the registry
    fn resolve_backends(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let backends: Vec<String> = self
            .settings
            .backends
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        if backends.is_empty() {
            return Err(CouncilError::Config("no backends selected".into()));
        }
        let known = backends
            .iter()
            .chain(self.settings.synthesis_backend.iter())
            .find(|id| !self.registry.contains(id));
        if let Some(unknown) = known {
            return Err(CouncilError::UnknownBackend(unknown.clone()));
        }
        Ok(backends)
    }

    async fn run_chunks(
        &self,
        mode: ReviewMode,
        plan: ReviewPlan,
        template: &PromptTemplate,
        cancel: CancellationToken,
    ) -> Result<ReviewOutcome> {
        let backends = self.resolve_backends()?;
        let count = plan.chunks.len();

        let tasks: Vec<BackendTask> = plan
            .chunks
            .iter()
            .flat_map(|chunk| {
                let prompt = template.render(&chunk.render(), chunk.index, count);
                backends.iter().map(move |backend_id| BackendTask {
                    chunk_index: chunk.index,
                    backend_id: backend_id.clone(),
                    prompt: prompt.clone(),
                })
            })
            .collect();

        info!(chunks = count, backends = backends.len(), tasks = tasks.len(), "Dispatching review");
        let results = self.dispatcher.run(tasks, cancel.clone()).await;
        let reports = assemble(&results, &backends, count);

        let synthesis = match &self.settings.synthesis_backend {
            Some(_) if cancel.is_cancelled() => {
                warn!("Review cancelled, skipping synthesis");
                None
            }
            Some(backend_id) => Some(
                synthesize(
                    &self.dispatcher,
                    &reports,
                    backend_id,
                    &self.settings.prompts.synthesis,
                    cancel,
                )
                .await,
            ),
            None => None,
        };

        Ok(ReviewOutcome {
            mode,
            chunks: plan.chunks.iter().map(ChunkSummary::from).collect(),
            excluded: plan.excluded,
            reports,
            synthesis,
        })
    }
}
