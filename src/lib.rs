//! # Mirrortree: Tree-Scale Registry Replication
//!
//! Mirrortree replicates container images from one OCI/Docker-v2
//! registry to another at the scale of a *tree* of repositories sharing
//! a name prefix (`prod/*` → `mirror/prod/*`). The crate's value is the
//! orchestration around the copy: bounded concurrency across many
//! repositories and tags, glob filters for selecting what to replicate,
//! and durable, resumable checkpointing so an interrupted run picks up
//! where it left off instead of starting over.
//!
//! ## Core Concepts
//!
//! - **Registry seams**: the replicator consumes registries through the
//!   narrow [`registry::RegistryClient`] / [`registry::Repository`] /
//!   [`registry::Copier`] traits; client construction, authentication,
//!   and the byte-level transfer live behind them.
//! - **Checkpoints**: one [`checkpoint::TreeCheckpoint`] document per
//!   run, persisted through a [`checkpoint::CheckpointStore`]
//!   (filesystem JSON by default), projected by the
//!   [`checkpoint::engine`] into resumable listings and remaining-set
//!   computations.
//! - **Pattern caches**: [`patterns::PatternCache`] classifies glob
//!   filters by shape once and answers membership without regex cost
//!   for the common prefix/suffix/literal patterns.
//! - **The replicator**: [`replicate::TreeReplicator`] runs the worker
//!   pool and produces a [`replicate::ReplicationReport`].
//!
//! ## Replicating a tree
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mirrortree::checkpoint::FsCheckpointStore;
//! use mirrortree::replicate::{ReplicateTreeOptions, TreeReplicator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     source: Arc<dyn mirrortree::registry::RegistryClient>,
//! #     dest: Arc<dyn mirrortree::registry::RegistryClient>,
//! #     copier: Arc<dyn mirrortree::registry::Copier>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FsCheckpointStore::open("$HOME/.mirrortree/checkpoints").await?);
//! let replicator = TreeReplicator::new(source, dest, copier).with_store(store);
//!
//! let token = CancellationToken::new();
//! let report = replicator
//!     .replicate_tree(
//!         &token,
//!         ReplicateTreeOptions {
//!             source_prefix: "prod".into(),
//!             dest_prefix: "mirror/prod".into(),
//!             exclude_repos: vec!["*-scratch".into()],
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! println!(
//!     "replicated {} images across {} repositories",
//!     report.images_replicated, report.repositories_total
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Resuming after an interruption
//!
//! ```rust,no_run
//! use mirrortree::checkpoint::engine::resumable_checkpoints;
//! use mirrortree::replicate::ResumeTreeOptions;
//! use tokio_util::sync::CancellationToken;
//! # async fn example(
//! #     store: &dyn mirrortree::checkpoint::CheckpointStore,
//! #     replicator: mirrortree::replicate::TreeReplicator,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! for row in resumable_checkpoints(store).await? {
//!     println!("{} {} {:.1}%", row.id, row.status, row.progress);
//! }
//!
//! let token = CancellationToken::new();
//! let mut opts = ResumeTreeOptions::for_checkpoint("run-id");
//! opts.retry_failed = true;
//! let report = replicator.resume_tree_replication(&token, opts).await?;
//! assert!(report.resumed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`patterns`] - Bucketed glob matching for repository and tag filters
//! - [`registry`] - The consumed registry and copier capability traits
//! - [`checkpoint`] - Checkpoint documents, stores, and resume projections
//! - [`replicate`] - The orchestrator, worker pool, and resume driver

pub mod checkpoint;
pub mod patterns;
pub mod registry;
pub mod replicate;
