//! Pure projection logic over checkpoint documents.
//!
//! Nothing here performs I/O except [`resumable_checkpoints`], which
//! enumerates a store and projects each document. The remaining-set
//! computation merges the two per-repository representations a document
//! may carry: the `repositories` map is authoritative, the older
//! `repo_tasks` list fills in names the map does not know, and
//! `completed_repositories` backstops names known nowhere else.

use rustc_hash::FxHashMap;

use super::store::{CheckpointStore, Result};
use super::types::{ResumableCheckpoint, ResumableOptions, Status, TreeCheckpoint};

/// Merge the per-repository representations into one `name → status` map.
fn merged_repo_statuses(cp: &TreeCheckpoint) -> FxHashMap<String, Status> {
    let mut statuses: FxHashMap<String, Status> = cp
        .repositories
        .iter()
        .map(|(name, repo)| (name.clone(), repo.status))
        .collect();
    if let Some(tasks) = &cp.repo_tasks {
        for task in tasks {
            statuses
                .entry(task.source_repo.clone())
                .or_insert(task.status);
        }
    }
    for name in &cp.completed_repositories {
        statuses.entry(name.clone()).or_insert(Status::Completed);
    }
    statuses
}

/// Compute the set of source repositories still to process under the
/// given resume policy. The returned order is unspecified.
///
/// Inclusion rules per status:
/// - `completed` — included unless `skip_completed`;
/// - `failed` — included only when `retry_failed`;
/// - `pending`, `in_progress`, `interrupted` — always included;
/// - anything else — included (safety default: unfinished until proven
///   otherwise).
#[must_use]
pub fn remaining_repositories(cp: &TreeCheckpoint, opts: &ResumableOptions) -> Vec<String> {
    merged_repo_statuses(cp)
        .into_iter()
        .filter(|(_, status)| match status {
            Status::Completed => !opts.skip_completed,
            Status::Failed => opts.retry_failed,
            _ => true,
        })
        .map(|(name, _)| name)
        .collect()
}

/// Project a checkpoint into its resumable-listing summary row.
#[must_use]
pub fn summarize(cp: &TreeCheckpoint) -> ResumableCheckpoint {
    let statuses = merged_repo_statuses(cp);
    let completed = statuses
        .values()
        .filter(|s| **s == Status::Completed)
        .count();
    let failed = statuses.values().filter(|s| **s == Status::Failed).count();
    ResumableCheckpoint {
        id: cp.id.clone(),
        source_registry: cp.source_registry.clone(),
        source_prefix: cp.source_prefix.clone(),
        dest_registry: cp.dest_registry.clone(),
        dest_prefix: cp.dest_prefix.clone(),
        status: cp.status,
        progress: cp.progress,
        last_updated: cp.last_updated,
        total_repositories: statuses.len(),
        completed_repositories: completed,
        failed_repositories: failed,
        duration: cp.duration(),
    }
}

/// List every run in the store that can be resumed.
///
/// Keeps documents whose status is `pending`, `in_progress`, `failed`,
/// or `interrupted`; completed runs are excluded.
///
/// # Errors
///
/// Propagates store enumeration failures; individual undecodable
/// documents are already skipped by the store's `list` contract.
pub async fn resumable_checkpoints(
    store: &dyn CheckpointStore,
) -> Result<Vec<ResumableCheckpoint>> {
    let mut rows: Vec<ResumableCheckpoint> = store
        .list()
        .await?
        .iter()
        .filter(|cp| cp.status.is_resumable())
        .map(summarize)
        .collect();
    // Most recently touched first; convenient for pick-one-to-resume UIs.
    rows.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    Ok(rows)
}

// ── Tests ──────────────────────────────────────────────────────────────
