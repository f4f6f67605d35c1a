use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, info};

use super::registry::TaskRegistry;
use super::types::TaskId;
use crate::observability::Metrics;

#[derive(Debug)]
struct Removal {
    task_id: TaskId,
    deadline: Instant,
}

/// Removes registry entries a fixed delay after their task finished
///
/// A single background worker owns a timer wheel of pending removals.
/// Handles are cheap to clone and never block: scheduling only enqueues a
/// message for the worker.
#[derive(Clone)]
pub struct CleanupScheduler {
    tx: mpsc::UnboundedSender<Removal>,
    delay: Duration,
}

impl CleanupScheduler {
    /// Start the worker on the current runtime. It stops when `shutdown` is
    /// cancelled or every handle has been dropped and the queue drained.
    pub fn spawn(
        registry: Arc<TaskRegistry>,
        delay: Duration,
        shutdown: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(registry, rx, shutdown, metrics));
        (Self { tx, delay }, handle)
    }

    /// Remove `task_id` from the registry once the delay has passed.
    /// Scheduling the same task again pushes its removal back.
    pub fn schedule(&self, task_id: &TaskId) {
        let removal = Removal {
            task_id: task_id.clone(),
            deadline: Instant::now() + self.delay,
        };

        if self.tx.send(removal).is_err() {
            debug!(%task_id, "Cleanup worker stopped, removal dropped");
        }
    }
}

async fn run_worker(
    registry: Arc<TaskRegistry>,
    mut rx: mpsc::UnboundedReceiver<Removal>,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
) {
    let mut queue: DelayQueue<TaskId> = DelayQueue::new();
    let mut pending: HashMap<TaskId, delay_queue::Key> = HashMap::new();
    let mut inbox_open = true;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(pending = queue.len(), "Cleanup worker shutting down");
                return;
            }
            removal = rx.recv(), if inbox_open => match removal {
                Some(Removal { task_id, deadline }) => match pending.get(&task_id) {
                    Some(key) => queue.reset_at(key, deadline),
                    None => {
                        let key = queue.insert_at(task_id.clone(), deadline);
                        pending.insert(task_id, key);
                    }
                },
                None => inbox_open = false,
            },
            Some(expired) = queue.next(), if !queue.is_empty() => {
                let task_id = expired.into_inner();
                pending.remove(&task_id);

                if registry.delete(task_id.as_str()) {
                    metrics.cleanup_removed();
                    debug!(%task_id, "Task entry removed");
                }
            }
        }

        if !inbox_open && queue.is_empty() {
            debug!("Cleanup worker drained");
            return;
        }
    }
}
