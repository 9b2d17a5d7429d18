//! Pluggable checkpoint persistence.
//!
//! A [`CheckpointStore`] keeps one document per replication run, keyed by
//! the run's opaque id. Stores must be independently thread-safe and must
//! publish saves atomically: a concurrent load observes either the prior
//! committed document or the new one, never a torn read.

use async_trait::async_trait;
use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::RwLock;
use thiserror::Error;

use super::types::TreeCheckpoint;

/// Errors from checkpoint store operations.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// A caller-supplied precondition was violated (empty id, bad threshold).
    #[error("invalid input: {message}")]
    #[diagnostic(code(mirrortree::store::invalid_input))]
    InvalidInput { message: String },

    /// No checkpoint exists under the given id.
    #[error("checkpoint not found: {id}")]
    #[diagnostic(
        code(mirrortree::store::not_found),
        help("List resumable checkpoints to discover valid ids.")
    )]
    NotFound { id: String },

    /// Filesystem or backend failure.
    #[error("store backend failure: {message}")]
    #[diagnostic(code(mirrortree::store::backend))]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A persisted document could not be encoded or decoded.
    #[error("checkpoint serialization failed: {message}")]
    #[diagnostic(
        code(mirrortree::store::serialization),
        help("The document on disk does not match the checkpoint schema.")
    )]
    Serialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable storage for [`TreeCheckpoint`] documents.
///
/// # Contracts
///
/// - `save` stamps `last_updated = now` on the persisted document and
///   publishes it atomically with respect to concurrent readers.
/// - `load`/`delete` fail with [`StoreError::NotFound`] for unknown ids
///   and [`StoreError::InvalidInput`] for an empty id.
/// - `list` is best-effort: documents that fail to parse are skipped,
///   not fatal.
/// - `prune` removes every document whose `last_updated` is older than
///   the threshold; a non-positive threshold is rejected.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any existing document with the
    /// same id.
    async fn save(&self, checkpoint: &TreeCheckpoint) -> Result<()>;

    /// Load the checkpoint stored under `id`.
    async fn load(&self, id: &str) -> Result<TreeCheckpoint>;

    /// True when a document exists under `id`.
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Enumerate every decodable checkpoint in the store.
    async fn list(&self) -> Result<Vec<TreeCheckpoint>>;

    /// Remove the checkpoint stored under `id`.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Remove every checkpoint whose `last_updated` is older than
    /// `now − older_than`, returning how many were removed.
    async fn prune(&self, older_than: chrono::Duration) -> Result<usize>;
}

fn check_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StoreError::invalid("checkpoint id must not be empty"));
    }
    Ok(())
}

// ── In-memory store ────────────────────────────────────────────────────

/// Volatile process-local store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: RwLock<FxHashMap<String, TreeCheckpoint>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned(e: impl std::fmt::Display) -> StoreError {
        StoreError::Io {
            message: format!("lock poisoned: {e}"),
            source: None,
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &TreeCheckpoint) -> Result<()> {
        check_id(&checkpoint.id)?;
        let mut stamped = checkpoint.clone();
        stamped.last_updated = Utc::now();
        let mut map = self.inner.write().map_err(|e| Self::poisoned(e))?;
        map.insert(stamped.id.clone(), stamped);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<TreeCheckpoint> {
        check_id(id)?;
        let map = self.inner.read().map_err(|e| Self::poisoned(e))?;
        map.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        check_id(id)?;
        let map = self.inner.read().map_err(|e| Self::poisoned(e))?;
        Ok(map.contains_key(id))
    }

    async fn list(&self) -> Result<Vec<TreeCheckpoint>> {
        let map = self.inner.read().map_err(|e| Self::poisoned(e))?;
        Ok(map.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check_id(id)?;
        let mut map = self.inner.write().map_err(|e| Self::poisoned(e))?;
        map.remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn prune(&self, older_than: chrono::Duration) -> Result<usize> {
        if older_than <= chrono::Duration::zero() {
            return Err(StoreError::invalid("prune threshold must be positive"));
        }
        let cutoff = Utc::now() - older_than;
        let mut map = self.inner.write().map_err(|e| Self::poisoned(e))?;
        let before = map.len();
        map.retain(|_, cp| cp.last_updated >= cutoff);
        Ok(before - map.len())
    }
}
