//! Task lifecycle from submission to removal, driven through the library
//! API on a paused clock

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use convertbox::observability::Metrics;
use convertbox::progress::{
    CleanupScheduler, ConversionInvoker, ProgressRecord, ProgressReporter, TIMEOUT_MESSAGE,
    TaskId, TaskProgress, TaskRegistry,
};
use convertbox::tools::ToolError;

const CLEANUP_DELAY: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(300);

struct Harness {
    registry: Arc<TaskRegistry>,
    reporter: ProgressReporter,
    invoker: ConversionInvoker,
    metrics: Arc<Metrics>,
    _shutdown: CancellationToken,
}

fn harness(idle_timeout: Option<Duration>) -> Harness {
    let registry = Arc::new(TaskRegistry::new());
    let metrics = Arc::new(Metrics::new());
    let shutdown = CancellationToken::new();
    let (cleanup, _worker) = CleanupScheduler::spawn(
        Arc::clone(&registry),
        CLEANUP_DELAY,
        shutdown.clone(),
        Arc::clone(&metrics),
    );

    Harness {
        reporter: ProgressReporter::new(Arc::clone(&registry), POLL_INTERVAL, idle_timeout),
        invoker: ConversionInvoker::new(Arc::clone(&registry), cleanup, Arc::clone(&metrics)),
        registry,
        metrics,
        _shutdown: shutdown,
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_conversion_streams_two_messages() {
    let h = harness(None);
    let task_id = TaskId::parse("abc123").unwrap();

    let stream = h.reporter.subscribe(task_id.clone());
    let collected = tokio::spawn(stream.collect::<Vec<_>>());
    settle().await;

    let result = h
        .invoker
        .run(
            Some(task_id),
            ProgressRecord::processing(50, "Converting image..."),
            "Conversion complete",
            |_progress: TaskProgress| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ToolError>("out.png")
            },
        )
        .await;
    assert_eq!(result.unwrap(), "out.png");

    let records = collected.await.unwrap();
    assert_eq!(
        records,
        vec![
            ProgressRecord::processing(50, "Converting image..."),
            ProgressRecord::complete("Conversion complete"),
        ]
    );
    assert_eq!(h.metrics.snapshot().conversions_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_conversion_streams_one_error_then_is_removed() {
    let h = harness(None);
    let task_id = TaskId::parse("bad1").unwrap();

    let stream = h.reporter.subscribe(task_id.clone());
    let collected = tokio::spawn(stream.collect::<Vec<_>>());
    settle().await;

    let result: Result<(), ToolError> = h
        .invoker
        .run(
            Some(task_id),
            ProgressRecord::processing(10, "Converting audio..."),
            "Conversion complete",
            |_progress: TaskProgress| async {
                Err(ToolError::Failed {
                    program: "ffmpeg".to_string(),
                    code: Some(1),
                    stderr: String::new(),
                })
            },
        )
        .await;
    assert!(result.is_err());

    let records = collected.await.unwrap();
    assert_eq!(records, vec![ProgressRecord::error("ffmpeg exit 1")]);

    tokio::time::sleep(CLEANUP_DELAY - Duration::from_millis(10)).await;
    settle().await;
    assert_eq!(h.registry.get("bad1"), Some(ProgressRecord::error("ffmpeg exit 1")));

    tokio::time::sleep(Duration::from_millis(20)).await;
    settle().await;
    assert_eq!(h.registry.get("bad1"), None);
    assert_eq!(h.metrics.snapshot().cleanup_removals, 1);
}

#[tokio::test(start_paused = true)]
async fn test_intermediate_milestones_reach_subscriber() {
    let h = harness(None);
    let task_id = TaskId::parse("batch-7").unwrap();

    let stream = h.reporter.subscribe(task_id.clone());
    let collected = tokio::spawn(stream.collect::<Vec<_>>());
    settle().await;

    h.invoker
        .run(
            Some(task_id),
            ProgressRecord::processing(10, "Converting 2 images..."),
            "Conversion complete",
            |progress: TaskProgress| async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                progress.processing(45, "Converting 2/2...");
                tokio::time::sleep(Duration::from_secs(1)).await;
                progress.processing(85, "Creating archive...");
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ToolError>(())
            },
        )
        .await
        .unwrap();

    let progress: Vec<u8> = collected
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.progress)
        .collect();
    assert_eq!(progress, vec![10, 45, 85, 100]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_task_waits_until_idle_timeout() {
    let h = harness(Some(Duration::from_secs(60)));
    let started = tokio::time::Instant::now();

    let records: Vec<_> = h
        .reporter
        .subscribe(TaskId::parse("nobody-writes-this").unwrap())
        .collect()
        .await;

    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(records, vec![ProgressRecord::error(TIMEOUT_MESSAGE)]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_task_without_timeout_stays_open() {
    let h = harness(None);
    let mut stream = Box::pin(h.reporter.subscribe(TaskId::parse("ghost").unwrap()));

    let next = tokio::time::timeout(Duration::from_secs(3600), stream.next()).await;
    assert!(next.is_err(), "stream must keep waiting for an unknown task");
}
