// src/pipeline/dispatch.rs
// Bounded concurrent dispatch of (chunk, backend) tasks

use super::types::{BackendTask, FailureKind, TaskKey, TaskResult, TaskResults};
use crate::llm::{BackendRegistry, ModelBackend, Prompt};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Dispatch policy for one review
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// In-flight backend calls across all tasks
    pub concurrency_limit: usize,
    /// Total attempts for a rate-limited task
    pub max_attempts: u32,
    /// First retry delay; doubles each attempt
    pub base_backoff: Duration,
    /// Bound on a single backend call
    pub call_timeout: Duration,
    /// Bound on the whole dispatch
    pub deadline: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            call_timeout: Duration::from_secs(300),
            deadline: Duration::from_secs(900),
        }
    }
}

/// Runs tasks against the registry's backends.
///
/// Every submitted task gets exactly one terminal result. A failing task
/// never cancels its siblings.
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(registry: Arc<BackendRegistry>, settings: DispatchSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Run all tasks until each has a result, the deadline elapses, or
    /// `cancel` fires. Unfinished tasks are recorded as `Timeout`.
    #[instrument(skip(self, tasks, cancel), fields(tasks = tasks.len(), limit = self.settings.concurrency_limit))]
    pub async fn run(&self, tasks: Vec<BackendTask>, cancel: CancellationToken) -> TaskResults {
        let mut results = TaskResults::new();
        let mut submitted = Vec::with_capacity(tasks.len());
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency_limit.max(1)));
        let mut pending = FuturesUnordered::new();

        for task in tasks {
            let key = task.key();
            submitted.push(key.clone());
            match self.registry.get(&task.backend_id) {
                Some(backend) => pending.push(run_task(
                    key,
                    backend,
                    task.prompt,
                    semaphore.clone(),
                    self.settings.clone(),
                )),
                None => {
                    warn!(backend = %task.backend_id, "Task targets unknown backend");
                    results.insert(
                        key,
                        TaskResult::failure(
                            FailureKind::Unavailable,
                            format!("backend '{}' is not configured", task.backend_id),
                        ),
                    );
                }
            }
        }

        // sleep() clamps durations past the timer's range
        let deadline = sleep(self.settings.deadline);
        tokio::pin!(deadline);
        let mut abandoned_reason = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(pending = pending.len(), "Dispatch cancelled");
                    abandoned_reason = Some("review cancelled before completion");
                    break;
                }
                _ = &mut deadline => {
                    warn!(pending = pending.len(), deadline = ?self.settings.deadline, "Dispatch deadline elapsed");
                    abandoned_reason = Some("overall deadline elapsed before completion");
                    break;
                }
                next = pending.next() => match next {
                    Some((key, result)) => {
                        results.insert(key, result);
                    }
                    None => break,
                },
            }
        }

        // Dropping in-flight futures aborts their HTTP requests
        drop(pending);

        let reason = abandoned_reason.unwrap_or("task did not complete");
        for key in submitted {
            results
                .entry(key)
                .or_insert_with(|| TaskResult::failure(FailureKind::Timeout, reason));
        }

        let succeeded = results.values().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Dispatch complete"
        );
        results
    }
}

/// One task: acquire a permit per attempt, retry only on rate limits
async fn run_task(
    key: TaskKey,
    backend: Arc<dyn ModelBackend>,
    prompt: Prompt,
    semaphore: Arc<Semaphore>,
    settings: DispatchSettings,
) -> (TaskKey, TaskResult) {
    let max_attempts = settings.max_attempts.max(1);
    let mut backoff = settings.base_backoff;
    let mut attempt = 1;

    loop {
        let outcome = {
            let Ok(_permit) = semaphore.acquire().await else {
                return (
                    key,
                    TaskResult::failure(FailureKind::Unavailable, "dispatcher closed"),
                );
            };
            debug!(chunk = key.chunk_index, backend = %key.backend_id, attempt, "Invoking backend");
            match timeout(settings.call_timeout, backend.invoke(&prompt, settings.call_timeout)).await {
                Ok(result) => result,
                Err(_) => {
                    return (
                        key,
                        TaskResult::failure(
                            FailureKind::Timeout,
                            format!("call exceeded {:?}", settings.call_timeout),
                        ),
                    );
                }
            }
        };

        match outcome {
            Ok(text) => return (key, TaskResult::success(text)),
            Err(failure) if failure.kind == FailureKind::RateLimited && attempt < max_attempts => {
                warn!(
                    chunk = key.chunk_index,
                    backend = %key.backend_id,
                    attempt,
                    "Rate limited, retrying in {:?}...",
                    backoff
                );
                sleep(backoff).await;
                attempt += 1;
                backoff = backoff.saturating_mul(2);
            }
            Err(failure) => return (key, TaskResult::Failure(failure)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;
    use crate::pipeline::TaskFailure;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend whose behavior is chosen per call number
    struct ScriptedBackend {
        id: String,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        script: fn(usize) -> Result<String, TaskFailure>,
    }

    impl ScriptedBackend {
        fn new(id: &str, delay: Duration, script: fn(usize) -> Result<String, TaskFailure>) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                delay,
                calls: AtomicUsize::new(0),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                script,
            })
        }

        /// Another backend counting into the same in-flight gauges
        fn sibling(&self, id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                delay: self.delay,
                calls: AtomicUsize::new(0),
                in_flight: self.in_flight.clone(),
                max_in_flight: self.max_in_flight.clone(),
                script: self.script,
            })
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn id(&self) -> &str {
            &self.id
        }

        fn provider_type(&self) -> Provider {
            Provider::Ollama
        }

        fn model_name(&self) -> String {
            self.id.clone()
        }

        async fn invoke(&self, prompt: &Prompt, _timeout: Duration) -> Result<String, TaskFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.script)(call).map(|text| format!("{}:{}", text, prompt.user))
        }
    }

    fn ok(_: usize) -> Result<String, TaskFailure> {
        Ok("ok".into())
    }

    fn unavailable(_: usize) -> Result<String, TaskFailure> {
        Err(TaskFailure::new(FailureKind::Unavailable, "connection refused"))
    }

    fn rate_limited(_: usize) -> Result<String, TaskFailure> {
        Err(TaskFailure::new(FailureKind::RateLimited, "429"))
    }

    fn rate_limited_twice(call: usize) -> Result<String, TaskFailure> {
        if call <= 2 { rate_limited(call) } else { ok(call) }
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            concurrency_limit: 4,
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
            call_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(10),
        }
    }

    fn dispatcher(backends: Vec<Arc<ScriptedBackend>>, settings: DispatchSettings) -> Dispatcher {
        let mut registry = BackendRegistry::new();
        for b in backends {
            registry.insert(b);
        }
        Dispatcher::new(Arc::new(registry), settings)
    }

    fn tasks(chunks: usize, backends: &[&str]) -> Vec<BackendTask> {
        (0..chunks)
            .flat_map(|i| {
                backends.iter().map(move |b| BackendTask {
                    chunk_index: i,
                    backend_id: b.to_string(),
                    prompt: Prompt::new(format!("chunk{}", i)),
                })
            })
            .collect()
    }

    // ========================================================================
    // Completeness and isolation
    // ========================================================================

    #[tokio::test]
    async fn test_one_result_per_task() {
        let d = dispatcher(
            vec![
                ScriptedBackend::new("a", Duration::from_millis(2), ok),
                ScriptedBackend::new("b", Duration::from_millis(1), ok),
            ],
            settings(),
        );
        let results = d.run(tasks(5, &["a", "b"]), CancellationToken::new()).await;
        assert_eq!(results.len(), 10);
        assert_eq!(
            results[&TaskKey::new(3, "b")].text(),
            Some("ok:chunk3")
        );
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_affect_others() {
        let good = ScriptedBackend::new("good", Duration::from_millis(1), ok);
        let bad = ScriptedBackend::new("bad", Duration::from_millis(1), unavailable);
        let d = dispatcher(vec![good, bad.clone()], settings());

        let results = d.run(tasks(4, &["good", "bad"]), CancellationToken::new()).await;

        assert_eq!(results.len(), 8);
        for i in 0..4 {
            assert!(results[&TaskKey::new(i, "good")].is_success());
            let failure = results[&TaskKey::new(i, "bad")].as_failure().unwrap();
            assert_eq!(failure.kind, FailureKind::Unavailable);
        }
        // non-rate-limit failures are not retried
        assert_eq!(bad.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_unknown_backend_recorded_as_unavailable() {
        let d = dispatcher(vec![ScriptedBackend::new("a", Duration::ZERO, ok)], settings());
        let results = d.run(tasks(1, &["a", "ghost"]), CancellationToken::new()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[&TaskKey::new(0, "ghost")].as_failure().unwrap().kind,
            FailureKind::Unavailable
        );
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let d = dispatcher(vec![], settings());
        assert!(d.run(Vec::new(), CancellationToken::new()).await.is_empty());
    }

    // ========================================================================
    // Concurrency bound
    // ========================================================================

    #[tokio::test]
    async fn test_concurrency_limit_is_global() {
        let a = ScriptedBackend::new("a", Duration::from_millis(20), ok);
        let b = a.sibling("b");
        let mut s = settings();
        s.concurrency_limit = 3;
        let d = dispatcher(vec![a.clone(), b], s);

        let results = d.run(tasks(10, &["a", "b"]), CancellationToken::new()).await;

        assert_eq!(results.len(), 20);
        assert!(results.values().all(|r| r.is_success()));
        let peak = a.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {}", peak);
        assert!(peak >= 2);
    }

    // ========================================================================
    // Rate-limit retries
    // ========================================================================

    #[tokio::test]
    async fn test_rate_limit_retried_until_success() {
        let backend = ScriptedBackend::new("a", Duration::ZERO, rate_limited_twice);
        let d = dispatcher(vec![backend.clone()], settings());
        let results = d.run(tasks(1, &["a"]), CancellationToken::new()).await;
        assert!(results[&TaskKey::new(0, "a")].is_success());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_attempts() {
        let backend = ScriptedBackend::new("a", Duration::ZERO, rate_limited);
        let d = dispatcher(vec![backend.clone()], settings());
        let results = d.run(tasks(1, &["a"]), CancellationToken::new()).await;
        assert_eq!(
            results[&TaskKey::new(0, "a")].as_failure().unwrap().kind,
            FailureKind::RateLimited
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    // ========================================================================
    // Deadline and cancellation
    // ========================================================================

    #[tokio::test]
    async fn test_deadline_records_pending_as_timeout() {
        let fast = ScriptedBackend::new("fast", Duration::from_millis(1), ok);
        let slow = ScriptedBackend::new("slow", Duration::from_secs(30), ok);
        let mut s = settings();
        s.deadline = Duration::from_millis(200);
        let d = dispatcher(vec![fast, slow], s);

        let started = std::time::Instant::now();
        let results = d.run(tasks(2, &["fast", "slow"]), CancellationToken::new()).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results.len(), 4);
        assert!(results[&TaskKey::new(0, "fast")].is_success());
        assert!(results[&TaskKey::new(1, "fast")].is_success());
        for i in 0..2 {
            let failure = results[&TaskKey::new(i, "slow")].as_failure().unwrap();
            assert_eq!(failure.kind, FailureKind::Timeout);
            assert!(failure.message.contains("deadline"));
        }
    }

    #[tokio::test]
    async fn test_call_timeout_bounds_single_call() {
        let slow = ScriptedBackend::new("slow", Duration::from_secs(30), ok);
        let mut s = settings();
        s.call_timeout = Duration::from_millis(50);
        let d = dispatcher(vec![slow], s);
        let results = d.run(tasks(1, &["slow"]), CancellationToken::new()).await;
        let failure = results[&TaskKey::new(0, "slow")].as_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("call exceeded"));
    }

    #[tokio::test]
    async fn test_unbounded_deadline_does_not_overflow() {
        let mut s = settings();
        s.deadline = Duration::from_secs(u64::MAX);
        s.call_timeout = Duration::from_secs(u64::MAX);
        let d = dispatcher(vec![ScriptedBackend::new("a", Duration::ZERO, ok)], s);

        assert!(d.run(Vec::new(), CancellationToken::new()).await.is_empty());
        let results = d.run(tasks(2, &["a"]), CancellationToken::new()).await;
        assert!(results.values().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_partial_results() {
        let fast = ScriptedBackend::new("fast", Duration::ZERO, ok);
        let slow = ScriptedBackend::new("slow", Duration::from_secs(30), ok);
        let d = dispatcher(vec![fast, slow], settings());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let results = d.run(tasks(1, &["fast", "slow"]), cancel).await;

        assert!(results[&TaskKey::new(0, "fast")].is_success());
        let failure = results[&TaskKey::new(0, "slow")].as_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("cancelled"));
    }
}
