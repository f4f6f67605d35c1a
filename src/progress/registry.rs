use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::trace;

use super::types::{ProgressRecord, TaskId};

/// A record together with the write that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    /// Registry-wide write counter at the time of the write
    pub revision: u64,
    pub record: ProgressRecord,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TaskId, Observed>,
    revision: u64,
}

/// In-memory map of task id to its latest progress record
///
/// One record per task, overwritten on every write. Each write bumps a
/// registry-wide revision that is published on a watch channel, so
/// progress streams wake up on writes instead of waiting for their next
/// poll tick.
pub struct TaskRegistry {
    inner: Mutex<Inner>,
    changes: watch::Sender<u64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the map half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `record` for `task_id`, replacing whatever was there
    pub fn set(&self, task_id: &TaskId, record: ProgressRecord) {
        let revision = {
            let mut inner = self.lock();
            inner.revision += 1;
            let revision = inner.revision;
            inner
                .entries
                .insert(task_id.clone(), Observed { revision, record });
            revision
        };

        trace!(%task_id, revision, "Progress record written");
        self.changes.send_replace(revision);
    }

    pub fn get(&self, task_id: &str) -> Option<ProgressRecord> {
        self.lock()
            .entries
            .get(task_id)
            .map(|observed| observed.record.clone())
    }

    /// Current record plus the revision that wrote it
    pub fn observe(&self, task_id: &str) -> Option<Observed> {
        self.lock().entries.get(task_id).cloned()
    }

    /// Remove the entry. Returns whether one was present; absent ids are fine.
    pub fn delete(&self, task_id: &str) -> bool {
        let removed = self.lock().entries.remove(task_id).is_some();
        if removed {
            trace!(task_id, "Progress record removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver that changes whenever any record is written
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
