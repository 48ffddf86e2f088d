//! Store facade
//!
//! Entry point for every transactional operation. Each operation checks, in
//! order: store open, transaction ownership, transaction active, replica
//! availability. Only then does it touch locks or tiers.
//!
//! # Isolation
//!
//! | Level          | ConditionalGet resolves                 | Lock taken by reads |
//! |----------------|-----------------------------------------|---------------------|
//! | ReadCommitted  | own pending write, else latest commit   | none                |
//! | RepeatableRead | own pending write, else latest commit   | key lock until end  |
//! | Snapshot       | own pending write, else as of first read| none                |
//!
//! Own pending writes are reported with `Lsn::UNCOMMITTED`.
//!
//! # Write preconditions
//!
//! Every write first takes the key lock, then inspects the key. The state it
//! builds on is the transaction's own pending write if any, else the latest
//! committed version.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use super::shared::StoreShared;
use crate::availability::Availability;
use crate::checkpoint::{
    CheckpointError, CheckpointImage, CheckpointReport, Checkpointer, ImageEntry,
};
use crate::lock::{CancelToken, LockError, Timeout};
use crate::mvcc::{Lsn, SequenceCounter, SharedVersion, VersionRecord};
use crate::observability::{
    log_event_with_fields, trace_event, warn_event, Event, MetricsSnapshot,
};
use crate::tiers::{TierStats, VersionTiers};
use crate::txn::{IsolationLevel, PendingWrite, Transaction};

/// A value read through a transaction, with the LSN that committed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult<V> {
    /// Commit LSN, or `Lsn::UNCOMMITTED` for the transaction's own write.
    pub lsn: Lsn,
    pub value: V,
}

/// What a write builds on.
struct WriteBase {
    exists: bool,
    /// LSN of the latest committed live version.
    committed_lsn: Option<Lsn>,
}

/// Handle to a transactional store. Cheap to clone; clones share state.
pub struct Store<K, V> {
    shared: Arc<StoreShared<K, V>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Ord + Clone + Debug,
    V: Clone,
{
    /// Opens an empty store.
    pub fn open(config: StoreConfig, availability: Arc<dyn Availability>) -> StoreResult<Self> {
        config.validate()?;
        let tiers = VersionTiers::new(config.differential_versions_per_key);
        let store = Self::from_parts(config, availability, SequenceCounter::new(), tiers);
        log_event_with_fields(Event::StoreOpen, &[("store", &store.id().to_string())]);
        Ok(store)
    }

    /// Opens a store whose committed state is `image`. LSN assignment
    /// continues after the image's checkpoint LSN.
    pub fn open_from_image(
        config: StoreConfig,
        availability: Arc<dyn Availability>,
        image: CheckpointImage<K, V>,
    ) -> StoreResult<Self> {
        config.validate()?;
        image.validate()?;

        let checkpoint_lsn = image.checkpoint_lsn;
        let count = image.entries.len();
        let entries = image.entries.into_iter().map(|entry| {
            let record = VersionRecord::with_value(entry.value, entry.lsn).shared();
            (entry.key, record)
        });
        let tiers =
            VersionTiers::from_consolidated(config.differential_versions_per_key, checkpoint_lsn, entries);
        let store = Self::from_parts(
            config,
            availability,
            SequenceCounter::resume_from(checkpoint_lsn),
            tiers,
        );

        log_event_with_fields(
            Event::StoreOpenFromImage,
            &[
                ("checkpoint_lsn", &checkpoint_lsn.to_string()),
                ("entries", &count.to_string()),
                ("store", &store.id().to_string()),
            ],
        );
        Ok(store)
    }

    fn from_parts(
        config: StoreConfig,
        availability: Arc<dyn Availability>,
        sequence: SequenceCounter,
        tiers: VersionTiers<K, V>,
    ) -> Self {
        Self {
            shared: Arc::new(StoreShared::new(config, availability, sequence, tiers)),
        }
    }

    /// Closes the store. Queued lock waiters fail with `TransactionAborted`;
    /// later operations fail with `Closed`. Idempotent.
    pub fn close(&self) {
        if !self.shared.mark_closed() {
            return;
        }
        log_event_with_fields(Event::StoreCloseBegin, &[("store", &self.id().to_string())]);
        let released = self.shared.locks.close();
        log_event_with_fields(
            Event::StoreClosed,
            &[
                ("released_waiters", &released.to_string()),
                ("store", &self.id().to_string()),
            ],
        );
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// The configured lock wait for callers without their own.
    pub fn default_timeout(&self) -> Timeout {
        self.shared.config.default_lock_timeout()
    }

    pub fn last_committed_lsn(&self) -> Lsn {
        self.shared.sequence.current()
    }

    pub fn last_checkpoint_lsn(&self) -> Lsn {
        self.shared.latch.read().last_checkpoint_lsn()
    }

    pub fn stats(&self) -> TierStats {
        self.shared.latch.read().stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Begins a ReadCommitted transaction.
    pub fn begin_transaction(&self) -> StoreResult<Transaction<K, V>> {
        self.begin_transaction_with(IsolationLevel::default())
    }

    pub fn begin_transaction_with(&self, isolation: IsolationLevel) -> StoreResult<Transaction<K, V>> {
        self.shared.check_open()?;
        let id = self.shared.next_transaction_id();
        self.shared.metrics.increment_transactions_begun();
        trace_event(
            Event::TxnBegin,
            &[("isolation", isolation.as_str()), ("txn", &id.to_string())],
        );
        Ok(Transaction::new(id, isolation, Arc::clone(&self.shared)))
    }

    /// Buffers `value` for a key that has no value visible to `txn`.
    ///
    /// Fails with `Conflict` if the key has a committed value or a pending
    /// value in this transaction.
    pub async fn add(
        &self,
        txn: &mut Transaction<K, V>,
        key: K,
        value: V,
        timeout: Timeout,
        cancel: &CancelToken,
    ) -> StoreResult<()> {
        self.check_write(txn)?;
        self.lock_key(txn, &key, timeout, cancel).await?;

        if self.write_base(txn, &key).exists {
            self.shared.metrics.increment_conflicts();
            let key = format!("{:?}", key);
            trace_event(Event::WriteConflict, &[("key", &key), ("txn", &txn.id().to_string())]);
            return Err(StoreError::Conflict { key });
        }

        txn.buffer(key, PendingWrite::Put(value));
        Ok(())
    }

    /// Buffers a new value for an existing key.
    ///
    /// Returns false, buffering nothing, if the key does not exist or
    /// `expected_lsn` does not match the latest committed LSN.
    pub async fn conditional_update(
        &self,
        txn: &mut Transaction<K, V>,
        key: K,
        value: V,
        timeout: Timeout,
        cancel: &CancelToken,
        expected_lsn: Option<Lsn>,
    ) -> StoreResult<bool> {
        self.check_write(txn)?;
        self.lock_key(txn, &key, timeout, cancel).await?;

        if !self.write_allowed(txn, &key, expected_lsn) {
            return Ok(false);
        }
        txn.buffer(key, PendingWrite::Put(value));
        Ok(true)
    }

    /// Buffers a delete of an existing key.
    ///
    /// Returns false, buffering nothing, if the key does not exist or
    /// `expected_lsn` does not match the latest committed LSN.
    pub async fn conditional_remove(
        &self,
        txn: &mut Transaction<K, V>,
        key: K,
        timeout: Timeout,
        cancel: &CancelToken,
        expected_lsn: Option<Lsn>,
    ) -> StoreResult<bool> {
        self.check_write(txn)?;
        self.lock_key(txn, &key, timeout, cancel).await?;

        if !self.write_allowed(txn, &key, expected_lsn) {
            return Ok(false);
        }
        if self.write_base(txn, &key).committed_lsn.is_none() {
            // Only this transaction's own insert exists; forgetting it is
            // the whole delete.
            txn.discard_pending(&key);
        } else {
            txn.buffer(key, PendingWrite::Delete);
        }
        Ok(true)
    }

    /// Reads `key` under the transaction's isolation level.
    pub async fn conditional_get(
        &self,
        txn: &mut Transaction<K, V>,
        key: &K,
        timeout: Timeout,
        cancel: &CancelToken,
    ) -> StoreResult<Option<ReadResult<V>>> {
        self.check_read(txn)?;

        if txn.isolation_level() == IsolationLevel::Snapshot {
            self.fix_visibility(txn);
        }

        if let Some(pending) = txn.pending_for(key) {
            return Ok(pending.value().map(|value| ReadResult {
                lsn: Lsn::UNCOMMITTED,
                value: value.clone(),
            }));
        }

        let version = match txn.isolation_level() {
            IsolationLevel::ReadCommitted => self.read_latest(key),
            IsolationLevel::RepeatableRead => {
                self.lock_key(txn, key, timeout, cancel).await?;
                self.read_latest(key)
            }
            IsolationLevel::Snapshot => self.read_snapshot(txn, key),
        };

        Ok(version.and_then(|record| {
            record.value().map(|value| ReadResult {
                lsn: record.commit_lsn(),
                value: value.clone(),
            })
        }))
    }

    /// Consolidates every version committed at or below `up_to`.
    pub async fn checkpoint(&self, up_to: Lsn) -> StoreResult<CheckpointReport> {
        self.shared.check_open()?;
        let _gate = self.shared.checkpoint_gate.lock().await;
        self.shared.check_open()?;

        log_event_with_fields(Event::CheckpointBegin, &[("up_to", &up_to.to_string())]);
        let checkpointer = Checkpointer::new(
            &self.shared.locks,
            &self.shared.latch,
            &self.shared.sequence,
            self.shared.config.checkpoint_lock_timeout(),
        );

        match checkpointer.run(up_to).await {
            Ok(report) if report.skipped => {
                trace_event(
                    Event::CheckpointSkipped,
                    &[("checkpoint_lsn", &report.checkpoint_lsn.to_string())],
                );
                Ok(report)
            }
            Ok(report) => {
                let metrics = &self.shared.metrics;
                metrics.increment_checkpoints();
                metrics.add_records_consolidated(report.records_consolidated as u64);
                metrics.add_versions_retained(report.versions_retained as u64);
                metrics.add_versions_discarded(report.versions_discarded as u64);
                log_event_with_fields(
                    Event::CheckpointComplete,
                    &[
                        ("checkpoint_lsn", &report.checkpoint_lsn.to_string()),
                        ("duration_ms", &report.duration_ms.to_string()),
                        ("keys", &report.keys_migrated.to_string()),
                        ("records", &report.records_consolidated.to_string()),
                    ],
                );
                Ok(report)
            }
            Err(err) => {
                log_event_with_fields(
                    Event::CheckpointFailed,
                    &[("code", err.code().as_str()), ("error", err.message())],
                );
                Err(err.into())
            }
        }
    }

    /// Checkpoints everything committed so far.
    pub async fn checkpoint_latest(&self) -> StoreResult<CheckpointReport> {
        self.checkpoint(self.last_committed_lsn()).await
    }

    /// Checkpoints if the configured policy says the differential tier is
    /// due.
    pub async fn checkpoint_if_due(&self) -> StoreResult<Option<CheckpointReport>> {
        let policy = self.shared.config.checkpoint_policy();
        if !policy.should_checkpoint(&self.stats()) {
            return Ok(None);
        }
        self.checkpoint_latest().await.map(Some)
    }

    /// Exports the consolidated tier as of the last checkpoint LSN.
    ///
    /// Fails with a retryable error while a failed checkpoint has left
    /// some keys consolidated past that LSN; a completed checkpoint clears
    /// it.
    pub async fn checkpoint_image(&self) -> StoreResult<CheckpointImage<K, V>> {
        self.shared.check_open()?;
        let _gate = self.shared.checkpoint_gate.lock().await;

        let tiers = self.shared.latch.read();
        let checkpoint_lsn = tiers.last_checkpoint_lsn();
        if tiers.has_partial_checkpoint() {
            warn_event(
                Event::CheckpointImageRefused,
                &[("checkpoint_lsn", &checkpoint_lsn.to_string())],
            );
            return Err(CheckpointError::incomplete(format!(
                "checkpoint past {} did not finish; run a checkpoint before exporting",
                checkpoint_lsn
            ))
            .into());
        }

        let entries: Vec<ImageEntry<K, V>> = tiers
            .consolidated_entries()
            .filter_map(|(key, record)| {
                record.value().map(|value| ImageEntry {
                    key: key.clone(),
                    value: value.clone(),
                    lsn: record.commit_lsn(),
                })
            })
            .collect();
        Ok(CheckpointImage::new(checkpoint_lsn, entries))
    }

    fn check_transaction(&self, txn: &Transaction<K, V>) -> StoreResult<()> {
        self.shared.check_open()?;
        if !txn.belongs_to(&self.shared) {
            return Err(StoreError::ForeignTransaction { txn: txn.id() });
        }
        txn.ensure_active()
    }

    fn check_write(&self, txn: &Transaction<K, V>) -> StoreResult<()> {
        self.check_transaction(txn)?;
        self.shared.check_writable()
    }

    fn check_read(&self, txn: &Transaction<K, V>) -> StoreResult<()> {
        self.check_transaction(txn)?;
        self.shared.check_readable()
    }

    async fn lock_key(
        &self,
        txn: &mut Transaction<K, V>,
        key: &K,
        timeout: Timeout,
        cancel: &CancelToken,
    ) -> StoreResult<()> {
        if txn.holds_lock(key) {
            return Ok(());
        }

        let started = Instant::now();
        match self.shared.locks.acquire(txn.id(), key, timeout, cancel).await {
            Ok(_) => {
                txn.track_lock(key.clone());
                Ok(())
            }
            Err(err) => {
                let key_text = format!("{:?}", key);
                let txn_text = txn.id().to_string();
                let waited_ms = started.elapsed().as_millis().to_string();
                let fields = [
                    ("key", key_text.as_str()),
                    ("txn", txn_text.as_str()),
                    ("waited_ms", waited_ms.as_str()),
                ];
                let metrics = &self.shared.metrics;
                match err {
                    LockError::TimedOut => {
                        metrics.increment_lock_timeouts();
                        warn_event(Event::LockTimeout, &fields);
                    }
                    LockError::Cancelled => metrics.increment_lock_cancellations(),
                    LockError::Closed => {
                        metrics.increment_forced_lock_aborts();
                        warn_event(Event::LockForceReleased, &fields);
                        txn.abort_now(Event::TxnAbort);
                    }
                }
                Err(StoreError::from_lock(err, txn.id(), key_text))
            }
        }
    }

    fn read_latest(&self, key: &K) -> Option<SharedVersion<V>> {
        self.shared.latch.read().read_latest(key)
    }

    /// Reads as of the transaction's visibility LSN.
    fn read_snapshot(&self, txn: &mut Transaction<K, V>, key: &K) -> Option<SharedVersion<V>> {
        let visibility = self.fix_visibility(txn);
        self.shared.latch.read().read_as_of(key, visibility)
    }

    /// Returns the transaction's visibility LSN, fixing and registering it
    /// on first use.
    fn fix_visibility(&self, txn: &mut Transaction<K, V>) -> Lsn {
        if let Some(visibility) = txn.visibility_lsn() {
            return visibility;
        }
        // Registering under the write latch keeps commits from slipping in
        // between choosing the LSN and protecting its versions.
        let mut tiers = self.shared.latch.write();
        let visibility = self.shared.sequence.current();
        tiers.register_snapshot(visibility);
        txn.set_visibility(visibility);
        visibility
    }

    fn write_base(&self, txn: &Transaction<K, V>, key: &K) -> WriteBase {
        let committed_lsn = self
            .read_latest(key)
            .filter(|record| !record.is_tombstone())
            .map(|record| record.commit_lsn());
        let exists = match txn.pending_for(key) {
            Some(PendingWrite::Put(_)) => true,
            Some(PendingWrite::Delete) => false,
            None => committed_lsn.is_some(),
        };
        WriteBase {
            exists,
            committed_lsn,
        }
    }

    fn write_allowed(&self, txn: &Transaction<K, V>, key: &K, expected_lsn: Option<Lsn>) -> bool {
        let base = self.write_base(txn, key);
        if !base.exists {
            return false;
        }
        match expected_lsn {
            Some(expected) => base.committed_lsn == Some(expected),
            None => true,
        }
    }
}

impl<K, V> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.shared.id)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}
