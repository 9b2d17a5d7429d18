//! Durable, resumable replication state.
//!
//! One [`TreeCheckpoint`] document per run, persisted through a pluggable
//! [`CheckpointStore`]. The [`engine`] module holds the pure projection
//! logic: which runs are resumable, and which repositories remain to be
//! processed under a [`ResumableOptions`] policy.

pub mod engine;
mod fs_store;
mod store;
mod types;

pub use fs_store::FsCheckpointStore;
pub use store::{CheckpointStore, InMemoryCheckpointStore, StoreError};
pub use types::{
    LayerTask, RepoStatus, RepoTask, ResumableCheckpoint, ResumableOptions, Status, TagTask,
    TreeCheckpoint,
};
