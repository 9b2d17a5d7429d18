//! Run options and parallelism tuning.

use std::thread::available_parallelism;

/// Hard bounds on the repository worker pool.
const WORKER_FLOOR: usize = 1;
const WORKER_CEILING: usize = 100;

/// Bounds applied to the auto-tuned per-repository tag parallelism.
const TAG_AUTO_FLOOR: usize = 20;
const TAG_AUTO_CEILING: usize = 100;

/// Options for a fresh tree replication run.
///
/// Filters are glob lists compiled into
/// [`PatternCache`](crate::patterns::PatternCache)s at run start. Leaving
/// `worker_count` / `tag_parallelism` unset auto-tunes them from the
/// host's available parallelism.
#[derive(Debug, Clone, Default)]
pub struct ReplicateTreeOptions {
    /// Prefix selecting the source repository tree (e.g. `prod`).
    pub source_prefix: String,
    /// Prefix the source prefix is rewritten to (e.g. `mirror/prod`).
    pub dest_prefix: String,
    /// Repositories matching any of these globs are never dispatched.
    pub exclude_repos: Vec<String>,
    /// When non-empty, a tag must match one of these globs to replicate.
    pub include_tags: Vec<String>,
    /// Tags matching any of these globs are dropped.
    pub exclude_tags: Vec<String>,
    /// Repository worker pool size; auto-tuned when unset.
    pub worker_count: Option<usize>,
    /// Concurrent tag copies per repository; auto-tuned when unset.
    pub tag_parallelism: Option<usize>,
    /// Resolve and report without transferring bytes.
    pub dry_run: bool,
    /// Overwrite destination tags that already exist.
    pub force_overwrite: bool,
}

/// Resolve the repository worker pool size.
///
/// An explicit request is clamped to `[1, 100]`; otherwise twice the
/// available parallelism, same clamp.
#[must_use]
pub(crate) fn effective_worker_count(requested: Option<usize>) -> usize {
    let count = requested
        .unwrap_or_else(|| available_parallelism().map(|n| n.get()).unwrap_or(1) * 2);
    count.clamp(WORKER_FLOOR, WORKER_CEILING)
}

/// Resolve per-repository tag parallelism for a repository with
/// `tag_count` tags.
///
/// An explicit request is honoured (clamped to `[1, 100]`); the
/// auto-tune is eight times the available parallelism clamped to
/// `[20, 100]`. Either way the result never exceeds the tag count.
#[must_use]
pub(crate) fn effective_tag_parallelism(requested: Option<usize>, tag_count: usize) -> usize {
    let limit = match requested {
        Some(n) => n.clamp(1, TAG_AUTO_CEILING),
        None => (available_parallelism().map(|n| n.get()).unwrap_or(1) * 8)
            .clamp(TAG_AUTO_FLOOR, TAG_AUTO_CEILING),
    };
    limit.min(tag_count).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_worker_count_is_clamped() {
        assert_eq!(effective_worker_count(Some(0)), 1);
        assert_eq!(effective_worker_count(Some(7)), 7);
        assert_eq!(effective_worker_count(Some(10_000)), 100);
    }

    #[test]
    fn auto_tuned_worker_count_stays_in_bounds() {
        let n = effective_worker_count(None);
        assert!((1..=100).contains(&n));
    }

    #[test]
    fn tag_parallelism_respects_request_and_tag_count() {
        assert_eq!(effective_tag_parallelism(Some(4), 100), 4);
        assert_eq!(effective_tag_parallelism(Some(50), 3), 3);
        assert_eq!(effective_tag_parallelism(Some(0), 10), 1);
        let auto = effective_tag_parallelism(None, 1_000);
        assert!((20..=100).contains(&auto));
        assert_eq!(effective_tag_parallelism(None, 2), 2);
    }
}
