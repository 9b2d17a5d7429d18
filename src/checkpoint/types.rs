//! Persisted checkpoint shapes.
//!
//! These are explicit serde structs: every field that may be absent in
//! older documents carries `#[serde(default)]`, unknown fields are
//! ignored on read, and timestamps serialize as RFC 3339 strings via
//! chrono. Two generations of per-repository bookkeeping coexist: the
//! authoritative `repositories` map and the older, richer `repo_tasks`
//! list. New writes always populate `repositories`; readers tolerate
//! either.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ── Status ─────────────────────────────────────────────────────────────

/// Lifecycle state shared by runs, repositories, tags, and layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created but not yet started.
    #[default]
    Pending,
    /// Actively being processed.
    InProgress,
    /// Finished successfully. Terminal for runs.
    Completed,
    /// Finished with a fatal (for its scope) error.
    Failed,
    /// The governing cancellation fired while work was underway.
    Interrupted,
    /// Deliberately not processed (filtered out or already present).
    Skipped,
}

impl Status {
    /// Terminal states are excluded from resumable enumeration.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed)
    }

    /// States from which a run can be resumed.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Status::Pending | Status::InProgress | Status::Failed | Status::Interrupted
        )
    }

    /// Legal checkpoint-level transitions.
    ///
    /// `pending → in_progress`, any non-terminal state to `failed` or
    /// `interrupted`, and `in_progress → completed`. Self-transitions are
    /// allowed so repeated persistence of the same state is not an error.
    #[must_use]
    pub fn can_transition(&self, next: Status) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (Status::Completed, _) => false,
            (_, Status::Failed | Status::Interrupted) => true,
            (Status::Pending, Status::InProgress) => true,
            (Status::InProgress, Status::Completed) => true,
            (Status::Failed | Status::Interrupted, Status::InProgress) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Interrupted => "interrupted",
            Status::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

// ── Per-repository records ─────────────────────────────────────────────

/// Flat per-repository record in a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub status: Status,
    pub source_repo: String,
    pub dest_repo: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-layer progress inside a [`TagTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTask {
    pub digest: String,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-tag progress inside a [`RepoTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTask {
    pub tag: String,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub layers: Vec<LayerTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Richer per-repository task record carried by older checkpoints.
///
/// Resume logic only reads the outermost `status` and the repository
/// names; the nested tasks are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTask {
    pub source_repo: String,
    pub dest_repo: String,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<TagTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── TreeCheckpoint ─────────────────────────────────────────────────────

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Durable snapshot of one tree replication run.
///
/// Exactly one JSON document per run lives in the store, keyed by the
/// run's opaque `id`. All mutation goes through the helpers below, which
/// keep the projection invariants true: every name in
/// `completed_repositories` has a `Completed` entry in `repositories`,
/// and `progress` always equals the completed/total ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeCheckpoint {
    pub id: String,
    #[serde(default = "epoch")]
    pub start_time: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub last_updated: DateTime<Utc>,
    pub source_registry: String,
    pub source_prefix: String,
    pub dest_registry: String,
    pub dest_prefix: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_tasks: Option<Vec<RepoTask>>,
    #[serde(default)]
    pub repositories: FxHashMap<String, RepoStatus>,
    #[serde(default)]
    pub completed_repositories: Vec<String>,
    #[serde(default)]
    pub progress: f64,
}

impl TreeCheckpoint {
    /// Create a fresh checkpoint for a run that is about to start.
    #[must_use]
    pub fn new(
        source_registry: impl Into<String>,
        source_prefix: impl Into<String>,
        dest_registry: impl Into<String>,
        dest_prefix: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: now,
            last_updated: now,
            source_registry: source_registry.into(),
            source_prefix: source_prefix.into(),
            dest_registry: dest_registry.into(),
            dest_prefix: dest_prefix.into(),
            status: Status::Pending,
            last_error: None,
            repo_tasks: None,
            repositories: FxHashMap::default(),
            completed_repositories: Vec::new(),
            progress: 0.0,
        }
    }

    /// Insert or update a repository record, stamping both the record and
    /// the checkpoint.
    pub fn upsert_repo(
        &mut self,
        source_repo: impl Into<String>,
        dest_repo: impl Into<String>,
        status: Status,
    ) {
        let source_repo = source_repo.into();
        let now = Utc::now();
        self.repositories.insert(
            source_repo.clone(),
            RepoStatus {
                status,
                source_repo,
                dest_repo: dest_repo.into(),
                last_updated: now,
                error: None,
            },
        );
        self.last_updated = now;
        self.recompute_progress();
    }

    /// Mark a known repository `Completed` and fold it into the
    /// completed projection.
    pub fn mark_repo_completed(&mut self, source_repo: &str) {
        let now = Utc::now();
        if let Some(entry) = self.repositories.get_mut(source_repo) {
            entry.status = Status::Completed;
            entry.error = None;
            entry.last_updated = now;
        }
        if !self.completed_repositories.iter().any(|n| n == source_repo) {
            self.completed_repositories.push(source_repo.to_string());
        }
        self.last_updated = now;
        self.recompute_progress();
    }

    /// Mark a known repository `Failed` with an aggregated error message.
    pub fn mark_repo_failed(&mut self, source_repo: &str, error: impl Into<String>) {
        let now = Utc::now();
        if let Some(entry) = self.repositories.get_mut(source_repo) {
            entry.status = Status::Failed;
            entry.error = Some(error.into());
            entry.last_updated = now;
        }
        self.last_updated = now;
        self.recompute_progress();
    }

    /// Attempt a checkpoint-level status transition.
    ///
    /// Illegal transitions (anything out of `Completed`, or skipping the
    /// state machine) are rejected and logged rather than applied.
    pub fn transition(&mut self, next: Status) -> bool {
        if !self.status.can_transition(next) {
            tracing::warn!(
                checkpoint = %self.id,
                from = %self.status,
                to = %next,
                "rejected illegal checkpoint status transition"
            );
            return false;
        }
        self.status = next;
        self.last_updated = Utc::now();
        true
    }

    /// Transition into a terminal-or-resumable final state, recording the
    /// fatal error when there is one.
    pub fn finalize(&mut self, status: Status, last_error: Option<String>) -> bool {
        let applied = self.transition(status);
        if applied {
            self.last_error = last_error;
        }
        applied
    }

    /// Recompute `progress` from the completed/total ratio.
    pub fn recompute_progress(&mut self) {
        if self.repositories.is_empty() {
            return;
        }
        self.progress =
            self.completed_repositories.len() as f64 / self.repositories.len() as f64 * 100.0;
    }

    /// Wall-clock span covered by this checkpoint.
    ///
    /// Zero when either timestamp is unset (epoch) or the span would be
    /// negative, which can happen with clock skew across hosts.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        if self.start_time == epoch() || self.last_updated == epoch() {
            return chrono::Duration::zero();
        }
        let d = self.last_updated - self.start_time;
        if d < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            d
        }
    }
}

// ── Resume policy & projection ─────────────────────────────────────────

/// Policy for computing the remaining work set on resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumableOptions {
    /// Checkpoint id to resume.
    pub id: String,
    /// Leave `completed` repositories out of the remaining set.
    pub skip_completed: bool,
    /// Put `failed` repositories back into the remaining set.
    pub retry_failed: bool,
    /// Overwrite destination tags even when they already exist.
    pub force_overwrite: bool,
}

/// Summary row returned when listing resumable runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumableCheckpoint {
    pub id: String,
    pub source_registry: String,
    pub source_prefix: String,
    pub dest_registry: String,
    pub dest_prefix: String,
    pub status: Status,
    pub progress: f64,
    pub last_updated: DateTime<Utc>,
    pub total_repositories: usize,
    pub completed_repositories: usize,
    pub failed_repositories: usize,
    pub duration: chrono::Duration,
}

// ── Tests ──────────────────────────────────────────────────────────────
