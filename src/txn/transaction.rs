//! Transaction - buffered writes, held locks, atomic publication
//!
//! A transaction buffers its writes privately and holds the exclusive lock
//! of every key it wrote (and, under RepeatableRead, every key it read).
//!
//! Commit:
//! 1. Under the tier latch, take the next LSN from the sequence counter
//! 2. Publish every buffered write tagged with that single LSN
//! 3. Release the latch, then every held lock
//!
//! Because LSN assignment and publication happen in one latch-protected
//! step, no reader observes a subset of a commit and LSN order equals
//! publication order.
//!
//! Abort discards the buffer and releases the locks. Dropping an active
//! transaction aborts it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};
use std::sync::Arc;

use super::id::TransactionId;
use super::isolation::{IsolationLevel, TransactionState};
use crate::mvcc::{Lsn, VersionPayload, VersionRecord};
use crate::observability::{trace_event, Event};
use crate::store::{StoreError, StoreResult, StoreShared};
use crate::tiers::RetentionOutcome;

/// A write buffered until commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite<V> {
    Put(V),
    Delete,
}

impl<V> PendingWrite<V> {
    pub fn value(&self) -> Option<&V> {
        match self {
            PendingWrite::Put(value) => Some(value),
            PendingWrite::Delete => None,
        }
    }

    fn into_payload(self) -> VersionPayload<V> {
        match self {
            PendingWrite::Put(value) => VersionPayload::Value(value),
            PendingWrite::Delete => VersionPayload::Tombstone,
        }
    }
}

pub struct Transaction<K, V>
where
    K: Ord + Clone + Debug,
{
    id: TransactionId,
    isolation: IsolationLevel,
    state: TransactionState,
    visibility: Option<Lsn>,
    held: BTreeSet<K>,
    pending: BTreeMap<K, PendingWrite<V>>,
    shared: Arc<StoreShared<K, V>>,
}

impl<K, V> Transaction<K, V>
where
    K: Ord + Clone + Debug,
{
    pub(crate) fn new(id: TransactionId, isolation: IsolationLevel, shared: Arc<StoreShared<K, V>>) -> Self {
        Self {
            id,
            isolation,
            state: TransactionState::Active,
            visibility: None,
            held: BTreeSet::new(),
            pending: BTreeMap::new(),
            shared,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Snapshot visibility LSN, fixed at the first snapshot read.
    pub fn visibility_lsn(&self) -> Option<Lsn> {
        self.visibility
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Number of key locks held.
    pub fn held_locks(&self) -> usize {
        self.held.len()
    }

    /// Returns true if this transaction holds the lock on `key`.
    pub fn holds_lock(&self, key: &K) -> bool {
        self.held.contains(key)
    }

    /// Commits the buffered writes under one new LSN and returns it.
    ///
    /// A transaction with no writes consumes no LSN and returns the last
    /// committed LSN. A failed commit leaves the transaction active so the
    /// caller can abort it.
    pub fn commit(&mut self) -> StoreResult<Lsn> {
        self.ensure_active()?;
        let shared = Arc::clone(&self.shared);

        if self.pending.is_empty() {
            let lsn = shared.sequence.current();
            self.finish(TransactionState::Committed);
            shared.metrics.increment_read_only_commits();
            return Ok(lsn);
        }

        if shared.is_closed() {
            return Err(StoreError::Closed);
        }
        shared.check_writable()?;

        let writes = std::mem::take(&mut self.pending);
        let count = writes.len();
        let (lsn, retention) = {
            let mut tiers = shared.latch.write();
            let lsn = shared.sequence.advance();
            let mut retention = RetentionOutcome::default();
            for (key, write) in writes {
                let record = VersionRecord::new(write.into_payload(), lsn).shared();
                retention += tiers.publish(key, record);
            }
            (lsn, retention)
        };

        shared.metrics.increment_commits();
        shared.metrics.add_versions_retained(retention.retained as u64);
        shared.metrics.add_versions_discarded(retention.discarded as u64);
        trace_event(
            Event::TxnCommit,
            &[
                ("txn", &self.id.to_string()),
                ("lsn", &lsn.to_string()),
                ("writes", &count.to_string()),
            ],
        );

        self.finish(TransactionState::Committed);
        Ok(lsn)
    }

    /// Discards the buffered writes and releases every lock.
    pub fn abort(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.abort_now(Event::TxnAbort);
        Ok(())
    }

    /// Releases the locks taken by RepeatableRead reads on keys this
    /// transaction has not written. Returns how many were released.
    pub fn release_read_locks(&mut self) -> StoreResult<usize> {
        self.ensure_active()?;
        let readonly: Vec<K> = self
            .held
            .iter()
            .filter(|key| !self.pending.contains_key(*key))
            .cloned()
            .collect();
        for key in &readonly {
            self.held.remove(key);
            self.shared.locks.release(self.id, key);
        }
        Ok(readonly.len())
    }

    pub(crate) fn ensure_active(&self) -> StoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StoreError::InvalidTransactionState {
                txn: self.id,
                state: self.state,
            })
        }
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<StoreShared<K, V>>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    pub(crate) fn pending_for(&self, key: &K) -> Option<&PendingWrite<V>> {
        self.pending.get(key)
    }

    pub(crate) fn buffer(&mut self, key: K, write: PendingWrite<V>) {
        self.pending.insert(key, write);
    }

    pub(crate) fn discard_pending(&mut self, key: &K) {
        self.pending.remove(key);
    }

    pub(crate) fn track_lock(&mut self, key: K) {
        self.held.insert(key);
    }

    pub(crate) fn set_visibility(&mut self, lsn: Lsn) {
        self.visibility = Some(lsn);
    }

    /// Ends the transaction as aborted without the active-state check.
    pub(crate) fn abort_now(&mut self, event: Event) {
        self.finish(TransactionState::Aborted);
        self.shared.metrics.increment_aborts();
        trace_event(event, &[("txn", &self.id.to_string())]);
    }

    fn finish(&mut self, state: TransactionState) {
        self.pending.clear();

        if let Some(visibility) = self.visibility.take() {
            let released = self.shared.latch.write().release_snapshot(visibility);
            if released > 0 {
                self.shared.metrics.add_versions_released(released as u64);
                trace_event(
                    Event::SnapshotVersionsReleased,
                    &[
                        ("released", &released.to_string()),
                        ("visibility_lsn", &visibility.to_string()),
                    ],
                );
            }
        }

        for key in std::mem::take(&mut self.held) {
            self.shared.locks.release(self.id, &key);
        }

        self.state = state;
    }
}

impl<K, V> Drop for Transaction<K, V>
where
    K: Ord + Clone + Debug,
{
    fn drop(&mut self) {
        if self.is_active() {
            self.abort_now(Event::TxnDropped);
        }
    }
}

impl<K, V> fmt::Debug for Transaction<K, V>
where
    K: Ord + Clone + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .field("visibility", &self.visibility)
            .field("held_locks", &self.held.len())
            .field("pending_writes", &self.pending.len())
            .finish()
    }
}
