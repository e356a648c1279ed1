use std::sync::Arc;

use syncline::errors::SyncError;
use syncline::job::SyncJob;
use syncline::logger::{NoopSyncLogger, SkipReason};
use syncline::store::{InMemoryStateStore, StateStore};
use syncline::types::SyncItemStatus;

mod common;
use common::*;

#[tokio::test]
async fn batched_checkpoint_saves() {
    let store = Arc::new(RecordingStateStore::new());
    let job = SyncJob::new(
        "s",
        CountingSource::new(5),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    )
    .with_checkpoint_save_every(3);

    let result = job.run().await.unwrap();

    // Mid-batch, end-of-batch, end-of-run.
    assert_eq!(store.saved_checkpoints(), vec!["cp-3", "cp-5", "cp-5"]);
    assert_eq!(result.created, 5);
    assert_eq!(result.updated, 0);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.failed, 0);
    assert_eq!(result.total(), 5);
}

#[tokio::test]
async fn retryable_temp_error_blocks_checkpoint() {
    let store = Arc::new(RecordingStateStore::new());
    let job = SyncJob::new(
        "s",
        CountingSource::new(2),
        DummyMapper::new(),
        DummyTarget::failing_on("2"),
        Arc::clone(&store),
        NoopSyncLogger,
    )
    .with_checkpoint_save_every(1)
    .with_max_attempts(3);

    let result = job.run().await.unwrap();

    // The mid-run save for item 1 happened before the failure; neither the
    // batch flush nor the end-of-run save may advance past item 2.
    assert_eq!(store.saved_checkpoints(), vec!["cp-1"]);
    assert_eq!(result.failed, 1);
    assert_eq!(result.created, 1);
    assert_eq!(result.total(), 2);

    let state = store.get_item_state(&key("2")).await.unwrap().unwrap();
    assert_eq!(state.status, SyncItemStatus::TempError);
    assert_eq!(state.attempts, 1);
    assert!(state.last_error.unwrap().contains("temp fail"));
}

#[tokio::test]
async fn same_version_short_circuits_without_target_call() {
    let store = Arc::new(InMemoryStateStore::new());
    store
        .bind(&key("K"), "internal-K", Some("V"))
        .await
        .unwrap();
    let logger = Arc::new(RecordingLogger::new());
    let target = DummyTarget::new();
    let upserts = target.upsert_log();

    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "V", Some("cp-a")),
        DummyMapper::new(),
        target,
        Arc::clone(&store),
        Arc::clone(&logger),
    );
    let result = job.run().await.unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.total(), 1);
    assert!(upserts.lock().unwrap().is_empty());
    assert_eq!(
        logger.events(),
        vec![LogEvent::Skipped("K".into(), SkipReason::SameVersion)]
    );

    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!(state.status, SyncItemStatus::Success);
    assert_eq!(state.attempts, 1);
}

#[tokio::test]
async fn permanent_error_terminates_key_until_version_changes() {
    let store = Arc::new(InMemoryStateStore::new());

    // First run: the mapper rejects the payload outright.
    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "V", None),
        DummyMapper::rejecting("K"),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    let result = job.run().await.unwrap();
    assert_eq!(result.failed, 1);

    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!(state.status, SyncItemStatus::PermError);
    assert_eq!(state.attempts, 1);

    // Second run, same payload: skipped without another attempt.
    let logger = Arc::new(RecordingLogger::new());
    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "V", None),
        DummyMapper::rejecting("K"),
        DummyTarget::new(),
        Arc::clone(&store),
        Arc::clone(&logger),
    );
    let result = job.run().await.unwrap();
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(
        logger.events(),
        vec![LogEvent::Skipped("K".into(), SkipReason::PermError)]
    );
    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!(state.attempts, 1);

    // Third run, new version: the state machine resets and the item lands.
    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "V2", None),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    let result = job.run().await.unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.failed, 0);

    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!(state.status, SyncItemStatus::Success);
    assert_eq!(state.version, Some("V2".to_string()));
}

#[tokio::test]
async fn missing_required_checkpoint_aborts_run() {
    let store = Arc::new(RecordingStateStore::new());
    let logger = Arc::new(RecordingLogger::new());
    let job = SyncJob::new(
        "s",
        CheckpointRequiredSource::new(),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        Arc::clone(&logger),
    );

    let err = job.run().await.unwrap_err();
    assert!(matches!(err, SyncError::PermanentSource { .. }));
    assert!(err.to_string().contains("checkpoint required"));

    // Logged under the synthetic fetch key, and nothing was mutated.
    let events = logger.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], LogEvent::Error(key, _) if key == "__fetch__"));
    assert!(store.saved_checkpoints().is_empty());
}

#[tokio::test]
async fn temp_error_at_attempt_cap_stops_blocking_checkpoint() {
    let store = Arc::new(RecordingStateStore::new());
    let run = |logger: Arc<RecordingLogger>| {
        SyncJob::new(
            "s",
            FixedSource::single("1", "data", "v", Some("cp-a")),
            DummyMapper::new(),
            DummyTarget::failing_on("1"),
            Arc::clone(&store),
            logger,
        )
        .with_max_attempts(2)
    };

    // First run: attempt 1 of 2 is still retryable, checkpoint pinned.
    let result = run(Arc::new(RecordingLogger::new())).run().await.unwrap();
    assert_eq!(result.failed, 1);
    assert!(store.saved_checkpoints().is_empty());
    let state = store.get_item_state(&key("1")).await.unwrap().unwrap();
    assert_eq!((state.status, state.attempts), (SyncItemStatus::TempError, 1));

    // Second run: the budget is spent, nothing retryable remains.
    let result = run(Arc::new(RecordingLogger::new())).run().await.unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(store.saved_checkpoints(), vec!["cp-a"]);
    let state = store.get_item_state(&key("1")).await.unwrap().unwrap();
    assert_eq!((state.status, state.attempts), (SyncItemStatus::TempError, 2));

    // Third run: skipped outright, checkpoint still free to advance.
    let logger = Arc::new(RecordingLogger::new());
    let result = run(Arc::clone(&logger)).run().await.unwrap();
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(
        logger.events(),
        vec![LogEvent::Skipped("1".into(), SkipReason::MaxAttempts)]
    );
    assert_eq!(store.saved_checkpoints(), vec!["cp-a", "cp-a"]);
}

#[tokio::test]
async fn max_attempts_of_one_never_retries() {
    let store = Arc::new(RecordingStateStore::new());
    let run = || {
        SyncJob::new(
            "s",
            FixedSource::single("1", "data", "v", Some("cp-a")),
            DummyMapper::new(),
            DummyTarget::failing_on("1"),
            Arc::clone(&store),
            NoopSyncLogger,
        )
        .with_max_attempts(1)
    };

    // The single attempt is consumed immediately, so nothing retryable
    // remains and the checkpoint is free to advance.
    let result = run().run().await.unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(store.saved_checkpoints(), vec!["cp-a"]);

    let result = run().run().await.unwrap();
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 0);
}

#[tokio::test]
async fn second_run_with_no_new_data_is_idempotent() {
    let store = Arc::new(InMemoryStateStore::new());

    let job = SyncJob::new(
        "s",
        CountingSource::new(3),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    let first = job.run().await.unwrap();
    assert_eq!(first.created, 3);

    let target = DummyTarget::new();
    let upserts = target.upsert_log();
    let job = SyncJob::new(
        "s",
        CountingSource::new(3),
        DummyMapper::new(),
        target,
        Arc::clone(&store),
        NoopSyncLogger,
    );
    let second = job.run().await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(second.skipped, 3);
    assert!(upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn changed_version_takes_update_path() {
    let store = Arc::new(InMemoryStateStore::new());
    store
        .bind(&key("K"), "internal-K", Some("old"))
        .await
        .unwrap();
    let logger = Arc::new(RecordingLogger::new());

    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "new", None),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        Arc::clone(&logger),
    );
    let result = job.run().await.unwrap();

    assert_eq!(result.updated, 1);
    assert_eq!(result.created, 0);
    assert_eq!(
        logger.events(),
        vec![LogEvent::Updated("K".into(), "internal-K".into())]
    );

    let binding = store.get_binding(&key("K")).await.unwrap().unwrap();
    assert_eq!(binding.version, Some("new".to_string()));
}

#[tokio::test]
async fn empty_stream_advances_checkpoint_iff_resolved() {
    let store = Arc::new(RecordingStateStore::new());
    let job = SyncJob::new(
        "s",
        FixedSource::new(vec![], Some("cp-next")),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    job.run().await.unwrap();
    assert_eq!(store.saved_checkpoints(), vec!["cp-next"]);

    let store = Arc::new(RecordingStateStore::new());
    let job = SyncJob::new(
        "s",
        FixedSource::new(vec![], None),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    job.run().await.unwrap();
    assert!(store.saved_checkpoints().is_empty());

    // Deferred cell that never fills resolves to null: no save either.
    let store = Arc::new(RecordingStateStore::new());
    let job = SyncJob::new(
        "s",
        CountingSource::new(0),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    job.run().await.unwrap();
    assert!(store.saved_checkpoints().is_empty());
}

#[tokio::test]
async fn uncategorized_error_is_recorded_as_permanent() {
    let store = Arc::new(RecordingStateStore::new());
    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "V", Some("cp-a")),
        DummyMapper::new(),
        DummyTarget::failing_uncategorized("K"),
        Arc::clone(&store),
        NoopSyncLogger,
    );
    let result = job.run().await.unwrap();
    assert_eq!(result.failed, 1);

    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!(state.status, SyncItemStatus::PermError);

    // Not retryable, so the run's checkpoint still advances.
    assert_eq!(store.saved_checkpoints(), vec!["cp-a"]);
}

#[tokio::test]
async fn version_reset_applies_to_temp_errors_too() {
    let store = Arc::new(InMemoryStateStore::new());

    // Exhaust the budget for version v1.
    for _ in 0..2 {
        let job = SyncJob::new(
            "s",
            FixedSource::single("K", "data", "v1", None),
            DummyMapper::new(),
            DummyTarget::failing_on("K"),
            Arc::clone(&store),
            NoopSyncLogger,
        )
        .with_max_attempts(2);
        job.run().await.unwrap();
    }
    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!((state.status, state.attempts), (SyncItemStatus::TempError, 2));

    // A new version is processed despite the exhausted budget for v1.
    let job = SyncJob::new(
        "s",
        FixedSource::single("K", "data", "v2", None),
        DummyMapper::new(),
        DummyTarget::new(),
        Arc::clone(&store),
        NoopSyncLogger,
    )
    .with_max_attempts(2);
    let result = job.run().await.unwrap();
    assert_eq!(result.created, 1);

    let state = store.get_item_state(&key("K")).await.unwrap().unwrap();
    assert_eq!(state.status, SyncItemStatus::Success);
    assert_eq!(state.version, Some("v2".to_string()));
    // The stored row carried a different version, so the attempt counter
    // restarted with the new one.
    assert_eq!(state.attempts, 1);
}
