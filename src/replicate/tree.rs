//! The tree replication orchestrator.
//!
//! A [`TreeReplicator`] owns the registry and copier seams plus an
//! optional checkpoint store. One call to
//! [`replicate_tree`](TreeReplicator::replicate_tree) runs the whole
//! pipeline: enumerate, filter, dispatch a bounded worker pool, keep the
//! checkpoint current, and fold everything into a
//! [`ReplicationReport`].

use std::sync::Arc;
use std::time::Instant;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, Status, StoreError, TreeCheckpoint};
use crate::patterns::PatternCache;
use crate::registry::{Copier, RegistryClient, RegistryError};
use crate::replicate::options::{effective_worker_count, ReplicateTreeOptions};
use crate::replicate::repo::{or_cancelled, replicate_repository, RepoJob, RepoOutcome, RunContext};
use crate::replicate::report::{ReplicationReport, RunCounters};

/// Errors returned by [`TreeReplicator`] entry points.
///
/// Per-repository and per-tag failures are never surfaced here; they
/// accumulate in the [`ReplicationReport`] and the checkpoint document.
#[derive(Debug, Error, Diagnostic)]
pub enum ReplicateError {
    /// A caller-supplied precondition was violated.
    #[error("invalid input: {message}")]
    #[diagnostic(code(mirrortree::replicate::invalid_input))]
    InvalidInput { message: String },

    /// Repository enumeration failed; nothing was dispatched.
    #[error("repository enumeration failed: {source}")]
    #[diagnostic(
        code(mirrortree::replicate::enumeration),
        help("The run is marked failed in its checkpoint; fix registry access and retry.")
    )]
    Enumeration {
        #[source]
        source: RegistryError,
    },

    /// The governing cancellation token fired. The partial report is
    /// attached; the checkpoint (if any) is marked `interrupted`.
    #[error("replication run cancelled")]
    #[diagnostic(
        code(mirrortree::replicate::cancelled),
        help("Resume the run from its checkpoint to pick up the remaining repositories.")
    )]
    Cancelled { report: Box<ReplicationReport> },

    /// Checkpoint store failure on an operation that must succeed
    /// (loading the checkpoint to resume from).
    #[error(transparent)]
    #[diagnostic(code(mirrortree::replicate::store))]
    Store(#[from] StoreError),
}

/// Orchestrates tree replication between two registries.
pub struct TreeReplicator {
    pub(crate) source: Arc<dyn RegistryClient>,
    pub(crate) dest: Arc<dyn RegistryClient>,
    pub(crate) copier: Arc<dyn Copier>,
    pub(crate) store: Option<Arc<dyn CheckpointStore>>,
}

impl TreeReplicator {
    /// Build a replicator without durable checkpointing.
    #[must_use]
    pub fn new(
        source: Arc<dyn RegistryClient>,
        dest: Arc<dyn RegistryClient>,
        copier: Arc<dyn Copier>,
    ) -> Self {
        Self {
            source,
            dest,
            copier,
            store: None,
        }
    }

    /// Enable durable checkpointing through the given store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replicate every repository under `source_prefix` into the
    /// destination registry under `dest_prefix`.
    ///
    /// # Errors
    ///
    /// - [`ReplicateError::Enumeration`] when listing source
    ///   repositories fails (the checkpoint is marked `failed`);
    /// - [`ReplicateError::Cancelled`] when the token fires (the partial
    ///   report rides along and the checkpoint is marked `interrupted`).
    ///
    /// Everything else — unreachable repositories, failed copies — is
    /// reported through the returned [`ReplicationReport`].
    pub async fn replicate_tree(
        &self,
        token: &CancellationToken,
        opts: ReplicateTreeOptions,
    ) -> Result<ReplicationReport, ReplicateError> {
        let started = Instant::now();
        let token = token.child_token();

        // Checkpoint bootstrap. Failure here downgrades the run to
        // non-durable instead of aborting it.
        let mut store = self.store.clone();
        let mut checkpoint = None;
        if let Some(s) = &store {
            let mut cp = TreeCheckpoint::new(
                self.source.registry_name(),
                &opts.source_prefix,
                self.dest.registry_name(),
                &opts.dest_prefix,
            );
            cp.transition(Status::InProgress);
            match s.save(&cp).await {
                Ok(()) => checkpoint = Some(cp),
                Err(e) => {
                    warn!(error = %e, "checkpoint bootstrap failed; run will not be resumable");
                    store = None;
                }
            }
        }
        let checkpoint_id = checkpoint.as_ref().map(|cp| cp.id.clone());

        // Enumerate and filter the repository tree.
        let repos =
            match or_cancelled(&token, self.source.list_repositories(&opts.source_prefix)).await {
                Some(Ok(repos)) => repos,
                Some(Err(e)) => {
                    if let (Some(s), Some(cp)) = (&store, &mut checkpoint) {
                        cp.finalize(Status::Failed, Some(e.to_string()));
                        let _ = s.save(cp).await;
                    }
                    return Err(ReplicateError::Enumeration { source: e });
                }
                None => {
                    if let (Some(s), Some(cp)) = (&store, &mut checkpoint) {
                        cp.finalize(Status::Interrupted, None);
                        let _ = s.save(cp).await;
                    }
                    let mut report =
                        ReplicationReport::from_counters(&RunCounters::default(), 0, started.elapsed());
                    report.checkpoint_id = checkpoint_id;
                    report.progress = 0.0;
                    report.interrupted = true;
                    return Err(ReplicateError::Cancelled {
                        report: Box::new(report),
                    });
                }
            };

        let exclude_repos = PatternCache::new(&opts.exclude_repos);
        let work: Vec<RepoJob> = repos
            .into_iter()
            .filter(|name| !exclude_repos.matches(name))
            .map(|source_repo| {
                let dest_repo = source_repo.replacen(&opts.source_prefix, &opts.dest_prefix, 1);
                RepoJob {
                    source_repo,
                    dest_repo,
                }
            })
            .collect();

        info!(
            source = self.source.registry_name(),
            dest = self.dest.registry_name(),
            prefix = %opts.source_prefix,
            repositories = work.len(),
            "starting tree replication"
        );

        if work.is_empty() {
            if let (Some(s), Some(cp)) = (&store, &mut checkpoint) {
                cp.progress = 100.0;
                cp.finalize(Status::Completed, None);
                let _ = s.save(cp).await;
            }
            let mut report =
                ReplicationReport::from_counters(&RunCounters::default(), 0, started.elapsed());
            report.checkpoint_id = checkpoint_id;
            return Ok(report);
        }

        // Seed the checkpoint with the whole work set so repositories the
        // run never reaches are still part of the remaining set on resume.
        if let (Some(s), Some(cp)) = (&store, &mut checkpoint) {
            for job in &work {
                cp.upsert_repo(&job.source_repo, &job.dest_repo, Status::Pending);
            }
            if let Err(e) = s.save(cp).await {
                warn!(error = %e, "checkpoint persistence failed; continuing");
            }
        }

        let total = work.len();
        let ctx = Arc::new(RunContext {
            source: Arc::clone(&self.source),
            dest: Arc::clone(&self.dest),
            copier: Arc::clone(&self.copier),
            store,
            checkpoint: checkpoint.map(Mutex::new),
            counters: RunCounters::default(),
            include_tags: PatternCache::new(&opts.include_tags),
            exclude_tags: PatternCache::new(&opts.exclude_tags),
            dry_run: opts.dry_run,
            force_overwrite: opts.force_overwrite,
            tag_parallelism: opts.tag_parallelism,
            token: token.clone(),
        });

        run_worker_pool(Arc::clone(&ctx), work, effective_worker_count(opts.worker_count)).await;

        finish_run(&ctx, checkpoint_id, total, started, false).await
    }
}

/// Shared run epilogue for fresh and resumed runs: build the report,
/// settle the checkpoint's terminal status, and map cancellation.
pub(crate) async fn finish_run(
    ctx: &RunContext,
    checkpoint_id: Option<String>,
    total: usize,
    started: Instant,
    resumed: bool,
) -> Result<ReplicationReport, ReplicateError> {
    let mut report = ReplicationReport::from_counters(&ctx.counters, total, started.elapsed());
    report.checkpoint_id = checkpoint_id;
    report.resumed = resumed;

    if ctx.token.is_cancelled() {
        report.interrupted = true;
        ctx.with_checkpoint(|cp| {
            cp.finalize(Status::Interrupted, None);
        })
        .await;
        info!(
            replicated = report.images_replicated,
            failed = report.images_failed,
            progress = report.progress,
            "tree replication interrupted"
        );
        return Err(ReplicateError::Cancelled {
            report: Box::new(report),
        });
    }

    ctx.with_checkpoint(|cp| {
        cp.finalize(Status::Completed, None);
    })
    .await;
    info!(
        replicated = report.images_replicated,
        skipped = report.images_skipped,
        failed = report.images_failed,
        duration_ms = report.duration.as_millis() as u64,
        "tree replication finished"
    );
    Ok(report)
}

/// Drain `work` through `worker_count` workers sharing one bounded queue.
///
/// Each repository name is enqueued exactly once, so same-repository
/// operations are serial while distinct repositories proceed in
/// parallel. Workers stop pulling as soon as the run token fires;
/// in-flight per-repository work observes the token itself.
pub(crate) async fn run_worker_pool(ctx: Arc<RunContext>, work: Vec<RepoJob>, worker_count: usize) {
    let (tx, rx) = flume::bounded::<RepoJob>(worker_count * 2);

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let ctx = Arc::clone(&ctx);
        let rx = rx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = ctx.token.cancelled() => break,
                    job = rx.recv_async() => match job {
                        Ok(job) => job,
                        Err(_) => break, // queue drained and closed
                    },
                };
                match replicate_repository(&ctx, &job.source_repo, &job.dest_repo).await {
                    RepoOutcome::Completed => ctx.counters.repo_drained(true),
                    RepoOutcome::Failed => ctx.counters.repo_drained(false),
                    RepoOutcome::Cancelled => {}
                }
            }
        }));
    }
    drop(rx);

    for job in work {
        let send = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => Err(()),
            sent = tx.send_async(job) => sent.map_err(|_| ()),
        };
        if send.is_err() {
            break;
        }
    }
    drop(tx);

    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "replication worker panicked");
        }
    }
}
