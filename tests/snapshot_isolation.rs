//! Snapshot isolation tests
//!
//! A Snapshot transaction fixes its visibility LSN at its first read and
//! keeps seeing that state:
//! - across later commits
//! - across checkpoints that consolidate the versions it reads
//! - until it ends, when retained versions are released

use std::sync::Arc;

use tierkv::{
    CancelToken, IsolationLevel, Lsn, ManualAvailability, ReadResult, Store, StoreConfig,
    Timeout, Transaction,
};

// =============================================================================
// Helper Functions
// =============================================================================

type TestStore = Store<u64, u64>;

fn open_store() -> TestStore {
    Store::open(StoreConfig::default(), Arc::new(ManualAvailability::primary())).unwrap()
}

async fn insert(store: &TestStore, key: u64, value: u64) -> Lsn {
    let mut txn = store.begin_transaction().unwrap();
    store
        .add(&mut txn, key, value, Timeout::IMMEDIATE, &CancelToken::none())
        .await
        .unwrap();
    txn.commit().unwrap()
}

async fn update(store: &TestStore, key: u64, value: u64) -> Lsn {
    let mut txn = store.begin_transaction().unwrap();
    assert!(store
        .conditional_update(&mut txn, key, value, Timeout::IMMEDIATE, &CancelToken::none(), None)
        .await
        .unwrap());
    txn.commit().unwrap()
}

async fn remove(store: &TestStore, key: u64) -> Lsn {
    let mut txn = store.begin_transaction().unwrap();
    assert!(store
        .conditional_remove(&mut txn, key, Timeout::IMMEDIATE, &CancelToken::none(), None)
        .await
        .unwrap());
    txn.commit().unwrap()
}

async fn get(
    store: &TestStore,
    txn: &mut Transaction<u64, u64>,
    key: u64,
) -> Option<ReadResult<u64>> {
    store
        .conditional_get(txn, &key, Timeout::IMMEDIATE, &CancelToken::none())
        .await
        .unwrap()
}

async fn read_committed(store: &TestStore, key: u64) -> Option<u64> {
    let mut txn = store.begin_transaction().unwrap();
    let result = get(store, &mut txn, key).await;
    txn.commit().unwrap();
    result.map(|read| read.value)
}

// =============================================================================
// Snapshot stability
// =============================================================================

/// Insert 6, snapshot reads, update to 7 then 8: the snapshot keeps 6 while
/// a fresh read sees 8.
#[tokio::test]
async fn test_snapshot_keeps_value_across_commits() {
    let store = open_store();
    let first = insert(&store, 5, 6).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    assert_eq!(get(&store, &mut snapshot, 5).await.unwrap().value, 6);
    assert_eq!(snapshot.visibility_lsn(), Some(first));

    update(&store, 5, 7).await;
    update(&store, 5, 8).await;

    assert_eq!(
        get(&store, &mut snapshot, 5).await,
        Some(ReadResult {
            lsn: first,
            value: 6,
        })
    );
    assert_eq!(read_committed(&store, 5).await, Some(8));
}

/// The same scenario with a checkpoint between the commits and the read.
#[tokio::test]
async fn test_snapshot_keeps_value_across_checkpoint() {
    let store = open_store();
    insert(&store, 5, 6).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    assert_eq!(get(&store, &mut snapshot, 5).await.unwrap().value, 6);

    update(&store, 5, 7).await;
    update(&store, 5, 8).await;
    let report = store.checkpoint_latest().await.unwrap();
    assert_eq!(report.checkpoint_lsn, Lsn::new(3));

    assert_eq!(get(&store, &mut snapshot, 5).await.unwrap().value, 6);
    assert_eq!(read_committed(&store, 5).await, Some(8));

    update(&store, 5, 9).await;
    store.checkpoint_latest().await.unwrap();
    assert_eq!(get(&store, &mut snapshot, 5).await.unwrap().value, 6);
}

/// A key inserted after the snapshot's first read stays invisible to it.
#[tokio::test]
async fn test_snapshot_does_not_see_later_inserts() {
    let store = open_store();
    insert(&store, 1, 1).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    assert!(get(&store, &mut snapshot, 2).await.is_none());

    insert(&store, 2, 2).await;
    assert!(get(&store, &mut snapshot, 2).await.is_none());
    assert_eq!(read_committed(&store, 2).await, Some(2));
}

/// A key removed after the snapshot's first read stays visible to it.
#[tokio::test]
async fn test_snapshot_still_sees_removed_key() {
    let store = open_store();
    let lsn = insert(&store, 1, 10).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    get(&store, &mut snapshot, 1).await;

    remove(&store, 1).await;
    store.checkpoint_latest().await.unwrap();

    assert!(read_committed(&store, 1).await.is_none());
    assert_eq!(
        get(&store, &mut snapshot, 1).await,
        Some(ReadResult { lsn, value: 10 })
    );
}

/// Visibility is fixed by the first read, not by begin.
#[tokio::test]
async fn test_visibility_fixed_at_first_read() {
    let store = open_store();
    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    assert_eq!(snapshot.visibility_lsn(), None);

    let lsn = insert(&store, 1, 1).await;
    assert_eq!(get(&store, &mut snapshot, 1).await.unwrap().lsn, lsn);
    assert_eq!(snapshot.visibility_lsn(), Some(lsn));
}

/// A snapshot sees its own writes over its fixed view.
#[tokio::test]
async fn test_snapshot_reads_own_writes() {
    let store = open_store();
    insert(&store, 1, 1).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    get(&store, &mut snapshot, 1).await;
    assert!(store
        .conditional_update(&mut snapshot, 1, 2, Timeout::IMMEDIATE, &CancelToken::none(), None)
        .await
        .unwrap());

    assert_eq!(
        get(&store, &mut snapshot, 1).await,
        Some(ReadResult {
            lsn: Lsn::UNCOMMITTED,
            value: 2,
        })
    );
}

/// A first read answered by the snapshot's own write still fixes its view.
#[tokio::test]
async fn test_own_write_read_fixes_visibility() {
    let store = open_store();
    let before = insert(&store, 1, 1).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    assert!(store
        .conditional_update(&mut snapshot, 1, 2, Timeout::IMMEDIATE, &CancelToken::none(), None)
        .await
        .unwrap());
    assert_eq!(get(&store, &mut snapshot, 1).await.unwrap().lsn, Lsn::UNCOMMITTED);
    assert_eq!(snapshot.visibility_lsn(), Some(before));
    assert_eq!(store.stats().live_snapshots, 1);

    insert(&store, 2, 20).await;
    assert!(get(&store, &mut snapshot, 2).await.is_none());
    assert_eq!(read_committed(&store, 2).await, Some(20));
}

// =============================================================================
// Atomic visibility
// =============================================================================

/// Readers see all or none of a multi-key commit.
#[tokio::test]
async fn test_multi_key_commit_is_atomic_for_snapshots() {
    let store = open_store();
    insert(&store, 1, 0).await;
    insert(&store, 2, 0).await;

    let mut before = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    get(&store, &mut before, 1).await;

    let mut batch = store.begin_transaction().unwrap();
    let cancel = CancelToken::none();
    for key in [1, 2] {
        store
            .conditional_update(&mut batch, key, 100, Timeout::IMMEDIATE, &cancel, None)
            .await
            .unwrap();
    }
    let lsn = batch.commit().unwrap();

    assert_eq!(get(&store, &mut before, 1).await.unwrap().value, 0);
    assert_eq!(get(&store, &mut before, 2).await.unwrap().value, 0);

    let mut after = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    for key in [1, 2] {
        let read = get(&store, &mut after, key).await.unwrap();
        assert_eq!(read.value, 100);
        assert_eq!(read.lsn, lsn);
    }
}

// =============================================================================
// Retention
// =============================================================================

/// Versions kept for a snapshot are released when it ends.
#[tokio::test]
async fn test_retained_versions_released_when_snapshot_ends() {
    let store = open_store();
    insert(&store, 5, 6).await;

    let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
    get(&store, &mut snapshot, 5).await;
    assert_eq!(store.stats().live_snapshots, 1);

    update(&store, 5, 7).await;
    update(&store, 5, 8).await;
    store.checkpoint_latest().await.unwrap();
    assert!(store.stats().retained_versions >= 1);

    snapshot.commit().unwrap();

    let stats = store.stats();
    assert_eq!(stats.live_snapshots, 0);
    assert_eq!(stats.retained_versions, 0);
    assert!(store.metrics().versions_released >= 1);
}

/// Without a live snapshot, superseded versions are not kept.
#[tokio::test]
async fn test_no_retention_without_snapshots() {
    let store = open_store();
    insert(&store, 1, 1).await;
    for value in 2..6 {
        update(&store, 1, value).await;
    }
    store.checkpoint_latest().await.unwrap();

    let stats = store.stats();
    assert_eq!(stats.retained_versions, 0);
    assert_eq!(stats.consolidated_keys, 1);
    assert_eq!(stats.differential_records, 0);
}

/// Dropping a snapshot transaction also releases what it pinned.
#[tokio::test]
async fn test_dropped_snapshot_releases_versions() {
    let store = open_store();
    insert(&store, 1, 1).await;
    {
        let mut snapshot = store.begin_transaction_with(IsolationLevel::Snapshot).unwrap();
        get(&store, &mut snapshot, 1).await;
        update(&store, 1, 2).await;
        update(&store, 1, 3).await;
    }

    let stats = store.stats();
    assert_eq!(stats.live_snapshots, 0);
    assert_eq!(stats.retained_versions, 0);
}
