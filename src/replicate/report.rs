//! Run result and the atomic counters behind it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic tallies shared by every worker in a run.
///
/// Kept separate from the checkpoint mutex so the hot per-tag paths stay
/// lock-free.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub images_replicated: AtomicU64,
    pub images_skipped: AtomicU64,
    pub images_failed: AtomicU64,
    /// Jobs drained from the queue, success or failure.
    pub completed_repos: AtomicU64,
    /// Jobs that ended in a per-repository failure.
    pub failed_repos: AtomicU64,
}

impl RunCounters {
    pub fn add_replicated(&self, n: u64) {
        self.images_replicated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: u64) {
        self.images_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_failed(&self, n: u64) {
        self.images_failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn repo_drained(&self, succeeded: bool) {
        self.completed_repos.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed_repos.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Outcome summary of one replication run.
///
/// Per-repository and per-tag failures never abort the run; they land
/// here (and in the checkpoint document) instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicationReport {
    /// Id of the durable checkpoint, when checkpointing was active.
    pub checkpoint_id: Option<String>,
    /// Size of the work set after repository filtering.
    pub repositories_total: usize,
    /// Jobs drained from the queue, success or failure.
    pub repositories_completed: u64,
    /// Jobs that ended in a per-repository failure.
    pub repositories_failed: u64,
    pub images_replicated: u64,
    pub images_skipped: u64,
    pub images_failed: u64,
    /// Wall-clock time for the run.
    pub duration: Duration,
    /// Drained fraction of the work set, `0.0..=100.0`.
    pub progress: f64,
    /// The governing cancellation fired during the run.
    pub interrupted: bool,
    /// The run was seeded from an existing checkpoint.
    pub resumed: bool,
}

impl ReplicationReport {
    pub(crate) fn from_counters(
        counters: &RunCounters,
        total: usize,
        duration: Duration,
    ) -> Self {
        let completed = counters.completed_repos.load(Ordering::Relaxed);
        let progress = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            checkpoint_id: None,
            repositories_total: total,
            repositories_completed: completed,
            repositories_failed: counters.failed_repos.load(Ordering::Relaxed),
            images_replicated: counters.images_replicated.load(Ordering::Relaxed),
            images_skipped: counters.images_skipped.load(Ordering::Relaxed),
            images_failed: counters.images_failed.load(Ordering::Relaxed),
            duration,
            progress,
            interrupted: false,
            resumed: false,
        }
    }

    /// True when any repository or image failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.repositories_failed > 0 || self.images_failed > 0
    }
}
