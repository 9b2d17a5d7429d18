//! Resuming an interrupted or failed run from its checkpoint.
//!
//! The resume path re-enters the same worker pool as a fresh run, but
//! seeds it with the remaining set computed by the checkpoint engine and
//! re-uses the loaded checkpoint document. While workers run, a
//! heartbeat task re-stamps `last_updated` every 30 seconds so a
//! long-running resume stays visibly alive to `prune` and to operators
//! inspecting the store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::engine::remaining_repositories;
use crate::checkpoint::{ResumableOptions, Status};
use crate::patterns::PatternCache;
use crate::replicate::options::effective_worker_count;
use crate::replicate::repo::{RepoJob, RunContext};
use crate::replicate::report::{ReplicationReport, RunCounters};
use crate::replicate::tree::{finish_run, run_worker_pool, ReplicateError, TreeReplicator};

/// How often a resumed run re-stamps its checkpoint while workers drain.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Options for resuming a run from its checkpoint.
///
/// The registry prefixes come from the checkpoint itself; only the
/// resume policy and per-run tuning are supplied here.
#[derive(Debug, Clone)]
pub struct ResumeTreeOptions {
    /// Checkpoint id to resume.
    pub id: String,
    /// Leave `completed` repositories out of the remaining set.
    pub skip_completed: bool,
    /// Put `failed` repositories back into the remaining set.
    pub retry_failed: bool,
    /// Overwrite destination tags that already exist.
    pub force_overwrite: bool,
    /// Resolve and report without transferring bytes.
    pub dry_run: bool,
    /// Repository worker pool size; auto-tuned when unset.
    pub worker_count: Option<usize>,
    /// Concurrent tag copies per repository; auto-tuned when unset.
    pub tag_parallelism: Option<usize>,
    /// When non-empty, a tag must match one of these globs to replicate.
    pub include_tags: Vec<String>,
    /// Tags matching any of these globs are dropped.
    pub exclude_tags: Vec<String>,
}

impl Default for ResumeTreeOptions {
    fn default() -> Self {
        Self {
            id: String::new(),
            // Resuming means picking up where the run left off, so done
            // work stays done and failures stay parked unless asked for.
            skip_completed: true,
            retry_failed: false,
            force_overwrite: false,
            dry_run: false,
            worker_count: None,
            tag_parallelism: None,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
        }
    }
}

impl ResumeTreeOptions {
    /// Resume the named checkpoint with the default policy.
    #[must_use]
    pub fn for_checkpoint(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

impl TreeReplicator {
    /// Resume a previously checkpointed run.
    ///
    /// # Errors
    ///
    /// - [`ReplicateError::InvalidInput`] for an empty id or a
    ///   replicator built without a checkpoint store;
    /// - [`ReplicateError::Store`] when the checkpoint cannot be loaded
    ///   (including `NotFound`);
    /// - [`ReplicateError::Cancelled`] when the token fires mid-run.
    pub async fn resume_tree_replication(
        &self,
        token: &CancellationToken,
        opts: ResumeTreeOptions,
    ) -> Result<ReplicationReport, ReplicateError> {
        if opts.id.is_empty() {
            return Err(ReplicateError::InvalidInput {
                message: "checkpoint id must not be empty".into(),
            });
        }
        let store = self.store.clone().ok_or_else(|| ReplicateError::InvalidInput {
            message: "resume requires a checkpoint store".into(),
        })?;

        let started = Instant::now();
        let token = token.child_token();

        let mut cp = store.load(&opts.id).await?;
        cp.transition(Status::InProgress);
        if let Err(e) = store.save(&cp).await {
            warn!(checkpoint = %cp.id, error = %e, "checkpoint persistence failed; continuing");
        }

        let remaining = remaining_repositories(
            &cp,
            &ResumableOptions {
                id: opts.id.clone(),
                skip_completed: opts.skip_completed,
                retry_failed: opts.retry_failed,
                force_overwrite: opts.force_overwrite,
            },
        );

        // Destination names come from the checkpoint records when known,
        // otherwise from re-applying the prefix rewrite.
        let work: Vec<RepoJob> = remaining
            .into_iter()
            .map(|source_repo| {
                let dest_repo = cp
                    .repositories
                    .get(&source_repo)
                    .map(|r| r.dest_repo.clone())
                    .or_else(|| {
                        cp.repo_tasks.as_ref().and_then(|tasks| {
                            tasks
                                .iter()
                                .find(|t| t.source_repo == source_repo)
                                .map(|t| t.dest_repo.clone())
                        })
                    })
                    .unwrap_or_else(|| {
                        source_repo.replacen(&cp.source_prefix, &cp.dest_prefix, 1)
                    });
                RepoJob {
                    source_repo,
                    dest_repo,
                }
            })
            .collect();

        info!(
            checkpoint = %cp.id,
            remaining = work.len(),
            skip_completed = opts.skip_completed,
            retry_failed = opts.retry_failed,
            "resuming tree replication"
        );

        let total = work.len();
        let checkpoint_id = cp.id.clone();
        let ctx = Arc::new(RunContext {
            source: Arc::clone(&self.source),
            dest: Arc::clone(&self.dest),
            copier: Arc::clone(&self.copier),
            store: Some(store),
            checkpoint: Some(Mutex::new(cp)),
            counters: RunCounters::default(),
            include_tags: PatternCache::new(&opts.include_tags),
            exclude_tags: PatternCache::new(&opts.exclude_tags),
            dry_run: opts.dry_run,
            force_overwrite: opts.force_overwrite,
            tag_parallelism: opts.tag_parallelism,
            token: token.clone(),
        });

        // Heartbeat runs on its own stop token so it shuts down
        // deterministically whether the run drains or is cancelled.
        let heartbeat_stop = CancellationToken::new();
        let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&ctx), heartbeat_stop.clone()));

        if total > 0 {
            run_worker_pool(
                Arc::clone(&ctx),
                work,
                effective_worker_count(opts.worker_count),
            )
            .await;
        }

        heartbeat_stop.cancel();
        let _ = heartbeat.await;

        finish_run(&ctx, Some(checkpoint_id), total, started, true).await
    }
}

/// Re-stamp the checkpoint every [`HEARTBEAT_INTERVAL`] until stopped.
async fn heartbeat_loop(ctx: Arc<RunContext>, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick fires immediately; the run start already persisted.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                ctx.with_checkpoint(|cp| cp.last_updated = chrono::Utc::now()).await;
            }
        }
    }
}
