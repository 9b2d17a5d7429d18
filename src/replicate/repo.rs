//! The per-repository pipeline.
//!
//! One invocation owns one repository end to end: status upsert, handle
//! resolution, tag listing, filtering, bounded-concurrency tag copies,
//! and the completion rule. Per-tag failures stay local; they are
//! tallied and folded into the repository's checkpoint record.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointStore, Status, TreeCheckpoint};
use crate::patterns::PatternCache;
use crate::registry::{Copier, CopyError, CopyOptions, CopyRequest, RegistryClient};
use crate::replicate::options::effective_tag_parallelism;
use crate::replicate::report::RunCounters;

/// One unit of work for the repository pool.
#[derive(Debug, Clone)]
pub(crate) struct RepoJob {
    pub source_repo: String,
    pub dest_repo: String,
}

/// How a drained repository job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RepoOutcome {
    Completed,
    Failed,
    /// Cancellation fired before the repository reached a terminal
    /// state; its record stays `in_progress` for the resume pass.
    Cancelled,
}

/// Everything a worker needs, shared across the pool for one run.
pub(crate) struct RunContext {
    pub source: Arc<dyn RegistryClient>,
    pub dest: Arc<dyn RegistryClient>,
    pub copier: Arc<dyn Copier>,
    pub store: Option<Arc<dyn CheckpointStore>>,
    /// The run's checkpoint; every mutation and its persistence happen
    /// under this mutex so saved snapshots are internally consistent.
    pub checkpoint: Option<Mutex<TreeCheckpoint>>,
    pub counters: RunCounters,
    pub include_tags: PatternCache,
    pub exclude_tags: PatternCache,
    pub dry_run: bool,
    pub force_overwrite: bool,
    pub tag_parallelism: Option<usize>,
    pub token: CancellationToken,
}

impl RunContext {
    /// Mutate the checkpoint under its mutex and persist the result.
    ///
    /// Persistence failures are logged and swallowed: losing durable
    /// resume never aborts replication work.
    pub(crate) async fn with_checkpoint(&self, mutate: impl FnOnce(&mut TreeCheckpoint)) {
        let Some(checkpoint) = &self.checkpoint else {
            return;
        };
        let mut guard = checkpoint.lock().await;
        mutate(&mut guard);
        if let Some(store) = &self.store
            && let Err(e) = store.save(&guard).await
        {
            warn!(checkpoint = %guard.id, error = %e, "checkpoint persistence failed; continuing");
        }
    }
}

/// Race a future against the run's cancellation token.
///
/// `None` means the token fired first and the operation was abandoned.
pub(crate) async fn or_cancelled<T>(
    token: &CancellationToken,
    fut: impl std::future::Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

enum TagResult {
    Replicated,
    /// Destination already present and overwrite not forced, or dry run.
    Skipped,
    Failed(String),
    /// Cancellation fired before the copy started.
    NotAttempted,
}

/// Run pipeline steps P1–P6 for one repository.
pub(crate) async fn replicate_repository(
    ctx: &RunContext,
    source_repo: &str,
    dest_repo: &str,
) -> RepoOutcome {
    // P1: record the repository as in progress before touching the wire.
    ctx.with_checkpoint(|cp| cp.upsert_repo(source_repo, dest_repo, Status::InProgress))
        .await;

    // P2: resolve both repository handles.
    let src = match or_cancelled(&ctx.token, ctx.source.repository(source_repo)).await {
        Some(Ok(repo)) => repo,
        Some(Err(e)) => {
            return fail_repo(ctx, source_repo, format!("resolving source: {e}")).await;
        }
        None => return RepoOutcome::Cancelled,
    };
    let dst = match or_cancelled(&ctx.token, ctx.dest.repository(dest_repo)).await {
        Some(Ok(repo)) => repo,
        Some(Err(e)) => {
            return fail_repo(ctx, source_repo, format!("resolving destination: {e}")).await;
        }
        None => return RepoOutcome::Cancelled,
    };

    // P3: list tags.
    let tags = match or_cancelled(&ctx.token, src.list_tags()).await {
        Some(Ok(tags)) => tags,
        Some(Err(e)) => {
            return fail_repo(ctx, source_repo, format!("listing tags: {e}")).await;
        }
        None => return RepoOutcome::Cancelled,
    };

    // P4: filter. Exclusions win; a non-empty include set is a whitelist.
    let filtered: Vec<String> = tags
        .into_iter()
        .filter(|tag| {
            if !ctx.exclude_tags.is_empty() && ctx.exclude_tags.matches(tag) {
                return false;
            }
            if !ctx.include_tags.is_empty() && !ctx.include_tags.matches(tag) {
                return false;
            }
            true
        })
        .collect();

    if filtered.is_empty() {
        // The repository existed but yielded no work.
        ctx.with_checkpoint(|cp| cp.mark_repo_completed(source_repo))
            .await;
        return RepoOutcome::Completed;
    }

    // P5: bounded tag fan-out. In-flight copies are never raced against
    // the token; cancellation only prevents new copies from starting.
    let limit = effective_tag_parallelism(ctx.tag_parallelism, filtered.len());
    let semaphore = Arc::new(Semaphore::new(limit));
    let copies = filtered.iter().map(|tag| {
        let semaphore = Arc::clone(&semaphore);
        let src = Arc::clone(&src);
        let dst = Arc::clone(&dst);
        async move {
            let permit = match or_cancelled(&ctx.token, semaphore.acquire()).await {
                Some(Ok(permit)) => permit,
                _ => return TagResult::NotAttempted,
            };
            let _permit = permit;
            if ctx.token.is_cancelled() {
                return TagResult::NotAttempted;
            }
            let request = CopyRequest {
                source_ref: src.image_reference(tag),
                dest_ref: dst.image_reference(tag),
                source_options: src.remote_options(),
                dest_options: dst.remote_options(),
                options: CopyOptions {
                    dry_run: ctx.dry_run,
                    force_overwrite: ctx.force_overwrite,
                    source: ctx.source.registry_name().to_string(),
                    destination: ctx.dest.registry_name().to_string(),
                },
            };
            match ctx.copier.copy_image(request).await {
                Ok(outcome) if outcome.success => {
                    if ctx.dry_run {
                        ctx.counters.add_skipped(1);
                        TagResult::Skipped
                    } else {
                        debug!(
                            repo = source_repo,
                            tag = %tag,
                            bytes = outcome.stats.bytes_transferred,
                            layers = outcome.stats.layers,
                            "tag replicated"
                        );
                        ctx.counters.add_replicated(1);
                        TagResult::Replicated
                    }
                }
                Ok(_) => {
                    ctx.counters.add_failed(1);
                    TagResult::Failed(format!("{tag}: copier reported failure"))
                }
                Err(CopyError::AlreadyExists { .. }) => {
                    ctx.counters.add_skipped(1);
                    TagResult::Skipped
                }
                Err(e) => {
                    ctx.counters.add_failed(1);
                    TagResult::Failed(format!("{tag}: {e}"))
                }
            }
        }
    });
    let results = join_all(copies).await;

    // P6: completion rule. Any success completes the repository; a full
    // wipe-out fails it; an unfinished (cancelled) repository keeps its
    // in_progress record for resume.
    let mut succeeded = 0usize;
    let mut unattempted = 0usize;
    let mut failures: Vec<String> = Vec::new();
    for result in results {
        match result {
            TagResult::Replicated | TagResult::Skipped => succeeded += 1,
            TagResult::Failed(message) => failures.push(message),
            TagResult::NotAttempted => unattempted += 1,
        }
    }

    if succeeded > 0 || (failures.is_empty() && unattempted == 0) {
        ctx.with_checkpoint(|cp| cp.mark_repo_completed(source_repo))
            .await;
        RepoOutcome::Completed
    } else if unattempted == 0 {
        let error = aggregate_failures(&failures, filtered.len());
        fail_repo(ctx, source_repo, error).await
    } else {
        RepoOutcome::Cancelled
    }
}

async fn fail_repo(ctx: &RunContext, source_repo: &str, error: String) -> RepoOutcome {
    warn!(repo = source_repo, error = %error, "repository replication failed");
    ctx.with_checkpoint(|cp| cp.mark_repo_failed(source_repo, error))
        .await;
    RepoOutcome::Failed
}

/// Fold per-tag failures into one message, keeping the first few verbatim.
fn aggregate_failures(failures: &[String], attempted: usize) -> String {
    const SHOWN: usize = 5;
    let shown = failures
        .iter()
        .take(SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if failures.len() > SHOWN {
        format!(
            "{}/{attempted} tags failed: {shown}; and {} more",
            failures.len(),
            failures.len() - SHOWN
        )
    } else {
        format!("{}/{attempted} tags failed: {shown}", failures.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_aggregation_truncates() {
        let failures: Vec<String> = (0..8).map(|i| format!("t{i}: boom")).collect();
        let msg = aggregate_failures(&failures, 8);
        assert!(msg.starts_with("8/8 tags failed:"));
        assert!(msg.ends_with("and 3 more"));

        let short = aggregate_failures(&failures[..2], 4);
        assert_eq!(short, "2/4 tags failed: t0: boom; t1: boom");
    }
}
