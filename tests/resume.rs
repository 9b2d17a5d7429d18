mod common;

use std::sync::Arc;
use std::time::Duration;

use mirrortree::checkpoint::{
    CheckpointStore, InMemoryCheckpointStore, Status, StoreError, TreeCheckpoint,
};
use mirrortree::replicate::{
    ReplicateError, ReplicateTreeOptions, ResumeTreeOptions, TreeReplicator,
};
use tokio_util::sync::CancellationToken;

use common::{MockCopier, MockRegistry};

fn four_repo_source() -> MockRegistry {
    MockRegistry::new("source.example.com")
        .with_repo("prod/r1", &["latest"])
        .with_repo("prod/r2", &["latest"])
        .with_repo("prod/r3", &["latest"])
        .with_repo("prod/r4", &["latest"])
}

fn replicator_with(
    source: MockRegistry,
    copier: Arc<MockCopier>,
    store: Arc<InMemoryCheckpointStore>,
) -> TreeReplicator {
    TreeReplicator::new(
        Arc::new(source),
        Arc::new(MockRegistry::new("dest.example.com")),
        copier as Arc<dyn mirrortree::registry::Copier>,
    )
    .with_store(store as Arc<dyn CheckpointStore>)
}

/// An interrupted run: r1 done, r2 mid-flight, r3/r4 untouched.
async fn interrupted_checkpoint(store: &InMemoryCheckpointStore) -> TreeCheckpoint {
    let mut cp = TreeCheckpoint::new("source.example.com", "prod", "dest.example.com", "mirror/prod");
    cp.transition(Status::InProgress);
    for name in ["prod/r1", "prod/r2", "prod/r3", "prod/r4"] {
        cp.upsert_repo(name, name.replacen("prod", "mirror/prod", 1), Status::Pending);
    }
    cp.upsert_repo("prod/r2", "mirror/prod/r2", Status::InProgress);
    cp.mark_repo_completed("prod/r1");
    cp.transition(Status::Interrupted);
    store.save(&cp).await.unwrap();
    cp
}

#[tokio::test]
async fn resume_processes_only_the_remaining_set() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let cp = interrupted_checkpoint(&store).await;
    let copier = Arc::new(MockCopier::new());
    let replicator = replicator_with(four_repo_source(), Arc::clone(&copier), Arc::clone(&store));

    let mut opts = ResumeTreeOptions::for_checkpoint(&cp.id);
    opts.skip_completed = true;
    opts.retry_failed = true;
    opts.worker_count = Some(2);
    let report = replicator
        .resume_tree_replication(&CancellationToken::new(), opts)
        .await
        .unwrap();

    assert!(report.resumed);
    assert!(!report.interrupted);
    assert_eq!(report.repositories_total, 3);
    assert_eq!(report.images_replicated, 3);

    // r1 was not reprocessed.
    let sources: Vec<String> = copier
        .copied()
        .into_iter()
        .map(|(src, _)| src.repository)
        .collect();
    assert!(!sources.contains(&"prod/r1".to_string()));

    let reloaded = store.load(&cp.id).await.unwrap();
    assert_eq!(reloaded.status, Status::Completed);
    assert_eq!(reloaded.completed_repositories.len(), 4);
    assert!((reloaded.progress - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn retry_failed_controls_failed_repo_reprocessing() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut cp = TreeCheckpoint::new("source.example.com", "prod", "dest.example.com", "mirror/prod");
    cp.transition(Status::InProgress);
    for name in ["prod/r1", "prod/r2", "prod/r3"] {
        cp.upsert_repo(name, name.replacen("prod", "mirror/prod", 1), Status::Pending);
    }
    cp.mark_repo_completed("prod/r1");
    cp.mark_repo_completed("prod/r2");
    cp.mark_repo_failed("prod/r3", "all tags failed");
    cp.transition(Status::Failed);
    store.save(&cp).await.unwrap();

    // Without retry_failed the failed repo stays parked.
    let copier = Arc::new(MockCopier::new());
    let replicator = replicator_with(four_repo_source(), Arc::clone(&copier), Arc::clone(&store));
    let report = replicator
        .resume_tree_replication(
            &CancellationToken::new(),
            ResumeTreeOptions::for_checkpoint(&cp.id),
        )
        .await
        .unwrap();
    assert_eq!(report.repositories_total, 0);
    assert_eq!(copier.attempts(), 0);

    // With retry_failed it is reprocessed and recovers.
    store.save(&cp).await.unwrap();
    let copier = Arc::new(MockCopier::new());
    let replicator = replicator_with(four_repo_source(), Arc::clone(&copier), Arc::clone(&store));
    let mut opts = ResumeTreeOptions::for_checkpoint(&cp.id);
    opts.retry_failed = true;
    let report = replicator
        .resume_tree_replication(&CancellationToken::new(), opts)
        .await
        .unwrap();
    assert_eq!(report.repositories_total, 1);
    assert_eq!(report.images_replicated, 1);

    let reloaded = store.load(&cp.id).await.unwrap();
    assert_eq!(reloaded.repositories["prod/r3"].status, Status::Completed);
    assert!(reloaded.repositories["prod/r3"].error.is_none());
}

#[tokio::test]
async fn live_interrupt_then_resume_covers_the_whole_tree() {
    common::init_tracing();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let slow_copier = Arc::new(MockCopier::new().with_delay(Duration::from_millis(40)));
    let replicator = replicator_with(
        four_repo_source(),
        Arc::clone(&slow_copier),
        Arc::clone(&store),
    );

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        canceller.cancel();
    });

    let mut opts = ReplicateTreeOptions {
        source_prefix: "prod".into(),
        dest_prefix: "mirror/prod".into(),
        worker_count: Some(1),
        ..Default::default()
    };
    opts.tag_parallelism = Some(1);
    let err = replicator.replicate_tree(&token, opts).await.unwrap_err();
    let ReplicateError::Cancelled { report } = err else {
        panic!("expected cancellation");
    };
    assert!(report.interrupted);
    assert!(report.repositories_completed < 4);

    let id = report.checkpoint_id.clone().unwrap();
    let interrupted = store.load(&id).await.unwrap();
    assert_eq!(interrupted.status, Status::Interrupted);

    // Resume with a fresh copier and token; the union covers the tree.
    let fast_copier = Arc::new(MockCopier::new());
    let resumer = replicator_with(
        four_repo_source(),
        Arc::clone(&fast_copier),
        Arc::clone(&store),
    );
    let report = resumer
        .resume_tree_replication(
            &CancellationToken::new(),
            ResumeTreeOptions::for_checkpoint(&id),
        )
        .await
        .unwrap();
    assert!(report.resumed);

    let finished = store.load(&id).await.unwrap();
    assert_eq!(finished.status, Status::Completed);
    assert_eq!(finished.completed_repositories.len(), 4);
    for repo in finished.repositories.values() {
        assert_eq!(repo.status, Status::Completed);
    }
}

#[tokio::test]
async fn resume_requires_an_id_and_a_store() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let replicator = replicator_with(
        four_repo_source(),
        Arc::new(MockCopier::new()),
        Arc::clone(&store),
    );
    let err = replicator
        .resume_tree_replication(
            &CancellationToken::new(),
            ResumeTreeOptions::for_checkpoint(""),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReplicateError::InvalidInput { .. }));

    let storeless = TreeReplicator::new(
        Arc::new(four_repo_source()),
        Arc::new(MockRegistry::new("dest.example.com")),
        Arc::new(MockCopier::new()) as Arc<dyn mirrortree::registry::Copier>,
    );
    let err = storeless
        .resume_tree_replication(
            &CancellationToken::new(),
            ResumeTreeOptions::for_checkpoint("some-id"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReplicateError::InvalidInput { .. }));
}

#[tokio::test]
async fn resume_of_unknown_checkpoint_propagates_not_found() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let replicator = replicator_with(
        four_repo_source(),
        Arc::new(MockCopier::new()),
        Arc::clone(&store),
    );
    let err = replicator
        .resume_tree_replication(
            &CancellationToken::new(),
            ResumeTreeOptions::for_checkpoint("does-not-exist"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReplicateError::Store(StoreError::NotFound { .. })
    ));
}
