//! Process-wide counters surfaced on `/health`

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    conversions_started: AtomicU64,
    conversions_completed: AtomicU64,
    conversions_failed: AtomicU64,
    profile_rejections: AtomicU64,
    cleanup_removals: AtomicU64,
    streams_opened: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversion_started(&self) {
        self.conversions_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_started", "Metric incremented");
    }

    pub fn conversion_completed(&self) {
        self.conversions_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_completed", "Metric incremented");
    }

    pub fn conversion_failed(&self) {
        self.conversions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_failed", "Metric incremented");
    }

    pub fn profile_rejected(&self) {
        self.profile_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "profile_rejections", "Metric incremented");
    }

    pub fn cleanup_removed(&self) {
        self.cleanup_removals.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cleanup_removals", "Metric incremented");
    }

    pub fn stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "streams_opened", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            conversions_started: self.conversions_started.load(Ordering::Relaxed),
            conversions_completed: self.conversions_completed.load(Ordering::Relaxed),
            conversions_failed: self.conversions_failed.load(Ordering::Relaxed),
            profile_rejections: self.profile_rejections.load(Ordering::Relaxed),
            cleanup_removals: self.cleanup_removals.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub conversions_started: u64,
    pub conversions_completed: u64,
    pub conversions_failed: u64,
    pub profile_rejections: u64,
    pub cleanup_removals: u64,
    pub streams_opened: u64,
}
