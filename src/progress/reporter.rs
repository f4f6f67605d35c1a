use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::registry::TaskRegistry;
use super::types::{ProgressRecord, TaskId};

pub const TIMEOUT_MESSAGE: &str = "Timed out waiting for task progress";

/// Turns registry state for one task into a stream of records
///
/// Every subscriber starts from whatever the registry holds when it
/// connects. Records are emitted when a new write lands for the task, so a
/// subscriber sees each write at most once and may skip writes that were
/// overwritten before it woke up. The stream ends right after a terminal
/// record.
#[derive(Clone)]
pub struct ProgressReporter {
    registry: Arc<TaskRegistry>,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
}

impl ProgressReporter {
    pub fn new(
        registry: Arc<TaskRegistry>,
        poll_interval: Duration,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            poll_interval,
            idle_timeout,
        }
    }

    /// Live record stream for `task_id`
    ///
    /// With no idle timeout a task that never shows up keeps the stream
    /// open forever. With one, the stream ends with a single `error` record
    /// after that long without a new write.
    pub fn subscribe(
        &self,
        task_id: TaskId,
    ) -> impl Stream<Item = ProgressRecord> + Send + 'static + use<> {
        let subscription = Subscription {
            changes: self.registry.subscribe(),
            registry: Arc::clone(&self.registry),
            task_id,
            poll_interval: self.poll_interval,
            idle_timeout: self.idle_timeout,
            deadline: self.idle_timeout.map(|timeout| Instant::now() + timeout),
            last_revision: None,
            notifications_open: true,
            finished: false,
        };

        futures::stream::unfold(subscription, |mut subscription| async move {
            let record = subscription.next_record().await?;
            Some((record, subscription))
        })
    }
}

struct Subscription {
    registry: Arc<TaskRegistry>,
    changes: watch::Receiver<u64>,
    task_id: TaskId,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
    deadline: Option<Instant>,
    last_revision: Option<u64>,
    notifications_open: bool,
    finished: bool,
}

impl Subscription {
    async fn next_record(&mut self) -> Option<ProgressRecord> {
        if self.finished {
            return None;
        }

        loop {
            // Mark the current revision seen before reading, so a write that
            // races with the read still wakes the wait below
            self.changes.borrow_and_update();

            if let Some(observed) = self.registry.observe(self.task_id.as_str()) {
                if self.last_revision != Some(observed.revision) {
                    self.last_revision = Some(observed.revision);
                    self.deadline = self.idle_timeout.map(|timeout| Instant::now() + timeout);

                    if observed.record.is_terminal() {
                        debug!(task_id = %self.task_id, status = %observed.record.status, "Progress stream finished");
                        self.finished = true;
                    }
                    return Some(observed.record);
                }
            }

            let deadline = self.deadline;
            tokio::select! {
                changed = self.changes.changed(), if self.notifications_open => {
                    if changed.is_err() {
                        self.notifications_open = false;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = wait_until(deadline) => {
                    debug!(task_id = %self.task_id, "Progress stream idle timeout");
                    self.finished = true;
                    return Some(ProgressRecord::error(TIMEOUT_MESSAGE));
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::types::TaskStatus;
    use futures::StreamExt;

    fn reporter(registry: &Arc<TaskRegistry>, idle_timeout: Option<Duration>) -> ProgressReporter {
        ProgressReporter::new(Arc::clone(registry), Duration::from_millis(300), idle_timeout)
    }

    fn task(id: &str) -> TaskId {
        TaskId::parse(id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_task_never_terminates() {
        let registry = Arc::new(TaskRegistry::new());
        let mut stream = Box::pin(reporter(&registry, None).subscribe(task("ghost")));

        let waited = tokio::time::timeout(Duration::from_secs(60), stream.next()).await;
        assert!(waited.is_err(), "stream must keep waiting for an unknown task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_emits_single_error() {
        let registry = Arc::new(TaskRegistry::new());
        let mut stream =
            Box::pin(reporter(&registry, Some(Duration::from_secs(2))).subscribe(task("ghost")));

        let record = stream.next().await.unwrap();
        assert_eq!(record, ProgressRecord::error(TIMEOUT_MESSAGE));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_each_write_then_closes_on_terminal() {
        let registry = Arc::new(TaskRegistry::new());
        let id = task("abc123");
        let mut stream = Box::pin(reporter(&registry, None).subscribe(id.clone()));

        registry.set(&id, ProgressRecord::processing(10, "Converting..."));
        assert_eq!(
            stream.next().await.unwrap(),
            ProgressRecord::processing(10, "Converting...")
        );

        registry.set(&id, ProgressRecord::complete("Done"));
        assert_eq!(stream.next().await.unwrap(), ProgressRecord::complete("Done"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_record_is_not_repeated() {
        let registry = Arc::new(TaskRegistry::new());
        let id = task("steady");
        registry.set(&id, ProgressRecord::processing(30, "Converting image..."));

        let mut stream = Box::pin(reporter(&registry, None).subscribe(id.clone()));
        assert_eq!(stream.next().await.unwrap().progress, 30);

        // Several poll intervals pass without a write
        let waited = tokio::time::timeout(Duration::from_secs(2), stream.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_starts_from_latest_record() {
        let registry = Arc::new(TaskRegistry::new());
        let id = task("late");
        registry.set(&id, ProgressRecord::downloading(10, "Downloading: 10%"));
        registry.set(&id, ProgressRecord::downloading(55, "Downloading: 55%"));

        let mut stream = Box::pin(reporter(&registry, None).subscribe(id.clone()));
        let first = stream.next().await.unwrap();
        assert_eq!(first.progress, 55);
        assert_eq!(first.status, TaskStatus::Downloading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_are_independent() {
        let registry = Arc::new(TaskRegistry::new());
        let id = task("shared");
        let reporter = reporter(&registry, None);

        let mut first = Box::pin(reporter.subscribe(id.clone()));
        registry.set(&id, ProgressRecord::processing(20, "Working"));
        assert_eq!(first.next().await.unwrap().progress, 20);

        let mut second = Box::pin(reporter.subscribe(id.clone()));
        assert_eq!(second.next().await.unwrap().progress, 20);

        registry.set(&id, ProgressRecord::error("ffmpeg exit 1"));
        assert_eq!(first.next().await.unwrap().status, TaskStatus::Error);
        assert_eq!(second.next().await.unwrap().status, TaskStatus::Error);
        assert!(first.next().await.is_none());
        assert!(second.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_outlives_reporter() {
        let registry = Arc::new(TaskRegistry::new());
        let id = task("owned");
        let mut stream = {
            let reporter = reporter(&registry, None);
            Box::pin(reporter.subscribe(id.clone()))
        };

        registry.set(&id, ProgressRecord::complete("Done"));
        assert_eq!(stream.next().await.unwrap(), ProgressRecord::complete("Done"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_wakes_stream_before_poll_tick() {
        let registry = Arc::new(TaskRegistry::new());
        let id = task("fast");
        let reporter = ProgressReporter::new(Arc::clone(&registry), Duration::from_secs(3600), None);
        let mut stream = Box::pin(reporter.subscribe(id.clone()));

        let writer = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                registry.set(&id, ProgressRecord::complete("Done"));
            })
        };

        let started = Instant::now();
        let record = stream.next().await.unwrap();
        assert_eq!(record.status, TaskStatus::Complete);
        assert!(started.elapsed() < Duration::from_secs(1));
        writer.await.unwrap();
    }
}
