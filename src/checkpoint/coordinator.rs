//! Checkpoint consolidation
//!
//! Checkpoint(up_to) folds every differential version with commit LSN
//! `<= up_to` into the consolidated tier:
//!
//! 1. Clamp `up_to` to the last committed LSN
//! 2. If the bound is already covered, report a skip
//! 3. Collect the keys with versions at or below the bound
//! 4. Per key: take the key lock, migrate under the tier latch, release
//! 5. Advance the last checkpoint LSN
//!
//! The LSN only advances after every key is migrated, so a failed run can
//! simply be repeated. Readers never observe a key in neither tier: the
//! move happens in one latch-protected step.

use std::fmt::Debug;
use std::time::Instant;

use super::errors::{CheckpointError, CheckpointResult};
use super::report::CheckpointReport;
use crate::lock::{CancelToken, LockError, LockManager, Timeout};
use crate::mvcc::{Lsn, SequenceCounter};
use crate::tiers::TierLatch;
use crate::txn::TransactionId;

/// Runs consolidation against one store's tiers.
pub struct Checkpointer<'a, K, V> {
    locks: &'a LockManager<K>,
    latch: &'a TierLatch<K, V>,
    sequence: &'a SequenceCounter,
    lock_timeout: Timeout,
}

impl<'a, K, V> Checkpointer<'a, K, V>
where
    K: Ord + Clone + Debug,
{
    pub fn new(
        locks: &'a LockManager<K>,
        latch: &'a TierLatch<K, V>,
        sequence: &'a SequenceCounter,
        lock_timeout: Timeout,
    ) -> Self {
        Self {
            locks,
            latch,
            sequence,
            lock_timeout,
        }
    }

    /// Consolidates everything committed at or below `up_to`.
    ///
    /// Callers serialise runs; two checkpoints must not interleave.
    pub async fn run(&self, up_to: Lsn) -> CheckpointResult<CheckpointReport> {
        let started = Instant::now();

        let (bound, previous, keys) = {
            let tiers = self.latch.read();
            let bound = up_to.min(self.sequence.current());
            let previous = tiers.last_checkpoint_lsn();
            if bound <= previous {
                return Ok(CheckpointReport::skipped(previous));
            }
            (bound, previous, tiers.keys_to_migrate(bound))
        };

        let mut report = CheckpointReport::begin(previous, bound);
        let cancel = CancelToken::none();

        for key in keys {
            let handle = self
                .locks
                .acquire(TransactionId::CHECKPOINT, &key, self.lock_timeout, &cancel)
                .await
                .map_err(|err| match err {
                    LockError::Closed => {
                        CheckpointError::store_closed("store closed during checkpoint")
                    }
                    LockError::TimedOut | LockError::Cancelled => CheckpointError::lock_timeout(
                        format!("could not lock key {:?} for checkpoint", key),
                    ),
                })?;

            let outcome = self.latch.write().migrate_key(&key, bound);
            self.locks.release_handle(&handle);
            report.record(outcome);
        }

        self.latch.write().advance_checkpoint(bound);
        Ok(report.finish(started.elapsed()))
    }
}
