//! Tree replication orchestration.
//!
//! [`TreeReplicator`] drives the whole run: enumerate the source tree,
//! filter it, fan the work out over a bounded worker pool, keep the
//! checkpoint current, and settle into a [`ReplicationReport`]. The
//! [`resume`](TreeReplicator::resume_tree_replication) entry point
//! re-enters the same machinery seeded with a checkpoint's remaining
//! set.

mod options;
mod repo;
mod report;
mod resume;
mod tree;

pub use options::ReplicateTreeOptions;
pub use report::ReplicationReport;
pub use resume::ResumeTreeOptions;
pub use tree::{ReplicateError, TreeReplicator};
