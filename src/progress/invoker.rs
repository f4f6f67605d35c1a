use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::cleanup::CleanupScheduler;
use super::registry::TaskRegistry;
use super::types::{ProgressRecord, TaskId, TaskStatus};
use crate::observability::Metrics;

const INTERRUPTED_MESSAGE: &str = "Operation was interrupted";

/// Write handle a running operation uses to publish intermediate milestones
///
/// Without a task id every update is dropped. Once the task reached a
/// terminal record, later updates are ignored. Within one status phase
/// progress never goes backwards; a write with a lower value is dropped
/// until the status changes.
#[derive(Clone)]
pub struct TaskProgress {
    registry: Arc<TaskRegistry>,
    task_id: Option<TaskId>,
    finished: Arc<AtomicBool>,
    last: Arc<Mutex<Option<(TaskStatus, u8)>>>,
}

impl TaskProgress {
    fn new(registry: Arc<TaskRegistry>, task_id: Option<TaskId>) -> Self {
        Self {
            registry,
            task_id,
            finished: Arc::new(AtomicBool::new(false)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle that records nothing, for collaborators run outside an invoker
    pub fn detached() -> Self {
        Self::new(Arc::new(TaskRegistry::new()), None)
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    pub fn update(&self, record: ProgressRecord) {
        if record.is_terminal() {
            self.finish(record);
            return;
        }

        let Some(task_id) = &self.task_id else {
            return;
        };
        if self.finished.load(Ordering::Acquire) {
            return;
        }

        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((status, progress)) = *last {
            if status == record.status && record.progress < progress {
                debug!(
                    %task_id,
                    %status,
                    from = progress,
                    to = record.progress,
                    "Dropped regressing progress"
                );
                return;
            }
        }
        *last = Some((record.status, record.progress));
        self.registry.set(task_id, record);
    }

    pub fn processing(&self, progress: u8, message: impl Into<String>) {
        self.update(ProgressRecord::processing(progress, message));
    }

    pub fn downloading(&self, progress: u8, message: impl Into<String>) {
        self.update(ProgressRecord::downloading(progress, message));
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn finish(&self, record: ProgressRecord) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task_id) = &self.task_id {
            self.registry.set(task_id, record);
        }
    }
}

/// Runs one conversion or download and mirrors its lifecycle into the registry
#[derive(Clone)]
pub struct ConversionInvoker {
    registry: Arc<TaskRegistry>,
    cleanup: CleanupScheduler,
    metrics: Arc<Metrics>,
}

impl ConversionInvoker {
    pub fn new(registry: Arc<TaskRegistry>, cleanup: CleanupScheduler, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            cleanup,
            metrics,
        }
    }

    /// Run `operation` under `task_id`.
    ///
    /// `start` is written before the operation begins. Success writes
    /// `{100, complete, done_message}`; failure writes `{0, error, <error>}`
    /// and hands the error back unchanged. Removal of the entry is scheduled
    /// in every case, including when the returned future is dropped early.
    pub async fn run<T, E, F, Fut>(
        &self,
        task_id: Option<TaskId>,
        start: ProgressRecord,
        done_message: &str,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TaskProgress) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let progress = TaskProgress::new(Arc::clone(&self.registry), task_id);
        progress.update(start);
        self.metrics.conversion_started();

        let guard = Finalizer {
            progress: progress.clone(),
            cleanup: &self.cleanup,
        };

        let result = operation(progress.clone()).await;

        let task_id = progress.task_id().map(TaskId::as_str).unwrap_or("-");
        match &result {
            Ok(_) => {
                self.metrics.conversion_completed();
                info!(task_id, "Operation completed");
                progress.finish(ProgressRecord::complete(done_message));
            }
            Err(error) => {
                self.metrics.conversion_failed();
                warn!(task_id, %error, "Operation failed");
                progress.finish(ProgressRecord::error(error.to_string()));
            }
        }

        drop(guard);
        result
    }
}

/// Guarantees a terminal record and a scheduled removal once the run ends
struct Finalizer<'a> {
    progress: TaskProgress,
    cleanup: &'a CleanupScheduler,
}

impl Drop for Finalizer<'_> {
    fn drop(&mut self) {
        if !self.progress.is_finished() {
            self.progress.finish(ProgressRecord::error(INTERRUPTED_MESSAGE));
        }
        if let Some(task_id) = self.progress.task_id() {
            self.cleanup.schedule(task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<TaskRegistry>, ConversionInvoker, Arc<Metrics>) {
        let registry = Arc::new(TaskRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let (cleanup, _handle) = CleanupScheduler::spawn(
            Arc::clone(&registry),
            Duration::from_secs(5),
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        let invoker = ConversionInvoker::new(Arc::clone(&registry), cleanup, Arc::clone(&metrics));
        (registry, invoker, metrics)
    }

    fn task(id: &str) -> Option<TaskId> {
        Some(TaskId::parse(id).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_writes_complete_and_returns_output() {
        let (registry, invoker, metrics) = setup();

        let output = invoker
            .run(
                task("ok1"),
                ProgressRecord::processing(10, "Converting..."),
                "Done",
                |progress| {
                    let registry = Arc::clone(&registry);
                    async move {
                        assert_eq!(registry.get("ok1"), Some(ProgressRecord::processing(10, "Converting...")));
                        progress.processing(50, "Halfway");
                        assert_eq!(registry.get("ok1").unwrap().progress, 50);
                        Ok::<_, String>("/tmp/out.png")
                    }
                },
            )
            .await;

        assert_eq!(output, Ok("/tmp/out.png"));
        assert_eq!(registry.get("ok1"), Some(ProgressRecord::complete("Done")));
        assert_eq!(metrics.snapshot().conversions_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_writes_error_and_propagates() {
        let (registry, invoker, metrics) = setup();

        let result: Result<(), String> = invoker
            .run(
                task("bad1"),
                ProgressRecord::processing(10, "Converting video..."),
                "Done",
                |_| async { Err("ffmpeg exit 1".to_string()) },
            )
            .await;

        assert_eq!(result, Err("ffmpeg exit 1".to_string()));
        assert_eq!(registry.get("bad1"), Some(ProgressRecord::error("ffmpeg exit 1")));
        assert_eq!(metrics.snapshot().conversions_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_scheduled_after_both_outcomes() {
        let (registry, invoker, _metrics) = setup();

        let _ = invoker
            .run(task("a"), ProgressRecord::starting("Start"), "Done", |_| async {
                Ok::<_, String>(())
            })
            .await;
        let _ = invoker
            .run(task("b"), ProgressRecord::starting("Start"), "Done", |_| async {
                Err::<(), _>("boom".to_string())
            })
            .await;
        assert_eq!(registry.len(), 2);

        tokio::time::sleep(Duration::from_secs(6)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_after_terminal_are_ignored() {
        let (registry, invoker, _metrics) = setup();
        let mut leaked = None;

        let _ = invoker
            .run(task("t"), ProgressRecord::starting("Start"), "Done", |progress| {
                leaked = Some(progress.clone());
                async { Ok::<_, String>(()) }
            })
            .await;

        leaked.unwrap().processing(40, "Too late");
        assert_eq!(registry.get("t").unwrap().status, TaskStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_does_not_regress_within_a_phase() {
        let (registry, invoker, _metrics) = setup();

        let _ = invoker
            .run(task("yt"), ProgressRecord::starting("Start"), "Done", |progress| {
                let registry = Arc::clone(&registry);
                async move {
                    // Separate video and audio passes each count from 0
                    progress.downloading(100, "Downloading... 100%");
                    progress.downloading(3, "Downloading... 3%");
                    assert_eq!(
                        registry.get("yt"),
                        Some(ProgressRecord::downloading(100, "Downloading... 100%"))
                    );

                    progress.downloading(100, "Downloading... 100%");
                    assert_eq!(registry.get("yt").unwrap().progress, 100);
                    Ok::<_, String>(())
                }
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_change_may_lower_progress() {
        let (registry, invoker, _metrics) = setup();

        let _ = invoker
            .run(task("phase"), ProgressRecord::starting("Start"), "Done", |progress| {
                let registry = Arc::clone(&registry);
                async move {
                    progress.downloading(80, "Downloading... 80%");
                    progress.processing(10, "Merging...");
                    assert_eq!(registry.get("phase"), Some(ProgressRecord::processing(10, "Merging...")));

                    progress.downloading(5, "Downloading... 5%");
                    assert_eq!(registry.get("phase").unwrap().status, TaskStatus::Downloading);
                    assert_eq!(registry.get("phase").unwrap().progress, 5);
                    Ok::<_, String>(())
                }
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_records_interruption() {
        let (registry, invoker, _metrics) = setup();

        let run = invoker.run(task("cut"), ProgressRecord::starting("Start"), "Done", |_| async {
            std::future::pending::<Result<(), String>>().await
        });
        let _ = tokio::time::timeout(Duration::from_millis(10), run).await;

        assert_eq!(registry.get("cut"), Some(ProgressRecord::error(INTERRUPTED_MESSAGE)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_task_id_nothing_is_recorded() {
        let (registry, invoker, _metrics) = setup();

        let result = invoker
            .run(None, ProgressRecord::processing(10, "Converting..."), "Done", |progress| async move {
                progress.processing(50, "ignored");
                Ok::<_, String>(7)
            })
            .await;

        assert_eq!(result, Ok(7));
        assert!(registry.is_empty());
    }
}
