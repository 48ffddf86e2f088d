//! State shared by a store and its transactions

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use crate::availability::Availability;
use crate::lock::LockManager;
use crate::mvcc::SequenceCounter;
use crate::observability::StoreMetrics;
use crate::tiers::{TierLatch, VersionTiers};
use crate::txn::TransactionId;

pub(crate) struct StoreShared<K, V> {
    pub(crate) id: Uuid,
    pub(crate) config: StoreConfig,
    pub(crate) availability: Arc<dyn Availability>,
    pub(crate) locks: LockManager<K>,
    pub(crate) sequence: SequenceCounter,
    pub(crate) latch: TierLatch<K, V>,
    pub(crate) metrics: StoreMetrics,
    /// Serialises checkpoint runs and image exports.
    pub(crate) checkpoint_gate: tokio::sync::Mutex<()>,
    next_txn: AtomicU64,
    closed: AtomicBool,
}

impl<K, V> StoreShared<K, V> {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<K, V> StoreShared<K, V>
where
    K: Ord + Clone + Debug,
{
    pub(crate) fn new(
        config: StoreConfig,
        availability: Arc<dyn Availability>,
        sequence: SequenceCounter,
        tiers: VersionTiers<K, V>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            availability,
            locks: LockManager::new(),
            sequence,
            latch: TierLatch::new(tiers),
            metrics: StoreMetrics::new(),
            checkpoint_gate: tokio::sync::Mutex::new(()),
            next_txn: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.next_txn.fetch_add(1, Ordering::Relaxed))
    }

    /// Marks the store closed; returns false if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn check_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_writable(&self) -> StoreResult<()> {
        if self.availability.write_status().is_granted() {
            Ok(())
        } else {
            Err(StoreError::NotPrimary)
        }
    }

    pub(crate) fn check_readable(&self) -> StoreResult<()> {
        if self.availability.read_status().is_granted() {
            Ok(())
        } else {
            Err(StoreError::NotReadable)
        }
    }
}
