//! Version tiers
//!
//! Committed state lives in three places:
//!
//! - `DifferentialTier` - the few most recent versions of each key
//! - `ConsolidatedTier` - one version per key as of the last checkpoint
//! - `SnapshotContainer` - superseded versions still needed by a live
//!   snapshot transaction
//!
//! `VersionTiers` combines them with the `SnapshotRegistry` and implements
//! the read rules:
//!
//! - latest read: differential if present, else consolidated
//! - as-of read at `L`: the newest version with commit LSN `<= L` across
//!   all three tiers
//!
//! Any version a live snapshot could need is always in one of the tiers;
//! the rest are discarded as soon as they are superseded.

mod consolidated;
mod differential;
mod snapshot_container;

pub use consolidated::ConsolidatedTier;
pub use differential::{DifferentialTier, Evicted};
pub use snapshot_container::{RetainedVersion, SnapshotContainer};

use std::ops::AddAssign;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::mvcc::{Lsn, SharedVersion, SnapshotRegistry, Visibility};

/// Where superseded versions went during a publish or a migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    /// Moved into the snapshot container.
    pub retained: usize,
    /// Dropped; no live snapshot needed them.
    pub discarded: usize,
}

impl AddAssign for RetentionOutcome {
    fn add_assign(&mut self, other: Self) {
        self.retained += other.retained;
        self.discarded += other.discarded;
    }
}

/// Result of folding one key's differential versions into the
/// consolidated tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Differential versions consumed.
    pub migrated: usize,
    pub retention: RetentionOutcome,
}

/// Point-in-time sizes of the tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub differential_keys: usize,
    pub differential_records: usize,
    pub consolidated_keys: usize,
    pub retained_versions: usize,
    pub live_snapshots: usize,
    pub last_checkpoint_lsn: Lsn,
}

#[derive(Debug)]
pub struct VersionTiers<K, V> {
    differential: DifferentialTier<K, V>,
    consolidated: ConsolidatedTier<K, V>,
    container: SnapshotContainer<K, V>,
    registry: SnapshotRegistry,
}

impl<K: Ord + Clone, V> VersionTiers<K, V> {
    pub fn new(differential_depth: usize) -> Self {
        Self {
            differential: DifferentialTier::new(differential_depth),
            consolidated: ConsolidatedTier::new(),
            container: SnapshotContainer::new(),
            registry: SnapshotRegistry::new(),
        }
    }

    /// Builds tiers whose consolidated state is `entries` as of
    /// `checkpoint_lsn`.
    pub fn from_consolidated<I>(differential_depth: usize, checkpoint_lsn: Lsn, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, SharedVersion<V>)>,
    {
        let mut tiers = Self::new(differential_depth);
        for (key, record) in entries {
            tiers.consolidated.install(key, record);
        }
        tiers.consolidated.advance_checkpoint(checkpoint_lsn);
        tiers
    }

    /// Latest committed version of `key`, tombstones included.
    pub fn read_latest(&self, key: &K) -> Option<SharedVersion<V>> {
        self.differential
            .latest(key)
            .or_else(|| self.consolidated.get(key))
            .map(Arc::clone)
    }

    /// Newest committed version of `key` with commit LSN `<= bound`,
    /// tombstones included.
    pub fn read_as_of(&self, key: &K, bound: Lsn) -> Option<SharedVersion<V>> {
        let consolidated = self
            .consolidated
            .get(key)
            .filter(|record| record.commit_lsn() <= bound);
        let candidate = Visibility::newer(self.differential.as_of(key, bound), consolidated);
        Visibility::newer(candidate, self.container.lookup(key, bound)).map(Arc::clone)
    }

    /// Publishes a committed version. Versions pushed out of the
    /// differential tier are retained only if a live snapshot needs them.
    pub fn publish(&mut self, key: K, record: SharedVersion<V>) -> RetentionOutcome {
        let evicted = self.differential.publish(key.clone(), record);
        let mut outcome = RetentionOutcome::default();
        for Evicted {
            record,
            superseded_at,
        } in evicted
        {
            outcome += self.supersede(&key, record, superseded_at);
        }
        outcome
    }

    /// Folds the versions of `key` with commit LSN `<= up_to` into the
    /// consolidated tier.
    ///
    /// The newest folded version becomes the consolidated version (a
    /// tombstone removes the key). The replaced consolidated version and the
    /// older folded versions are retained if a live snapshot needs them.
    pub fn migrate_key(&mut self, key: &K, up_to: Lsn) -> MigrationOutcome {
        let drained = self.differential.drain_key(key, up_to);
        let Some(newest) = drained.first().map(Arc::clone) else {
            return MigrationOutcome::default();
        };
        self.consolidated.note_folded(up_to);

        let mut outcome = MigrationOutcome {
            migrated: drained.len(),
            ..MigrationOutcome::default()
        };

        for pair in drained.windows(2) {
            let (newer, older) = (&pair[0], &pair[1]);
            outcome.retention += self.supersede(key, Arc::clone(older), newer.commit_lsn());
        }

        let oldest_drained = drained
            .last()
            .map(|v| v.commit_lsn())
            .unwrap_or_else(|| newest.commit_lsn());
        if let Some(replaced) = self.consolidated.install(key.clone(), newest) {
            outcome.retention += self.supersede(key, replaced, oldest_drained);
        }
        outcome
    }

    fn supersede(&mut self, key: &K, record: SharedVersion<V>, superseded_at: Lsn) -> RetentionOutcome {
        if self.registry.requires(record.commit_lsn(), superseded_at) {
            self.container.retain(key.clone(), record, superseded_at);
            RetentionOutcome {
                retained: 1,
                discarded: 0,
            }
        } else {
            RetentionOutcome {
                retained: 0,
                discarded: 1,
            }
        }
    }

    /// Registers a snapshot reading as of `visibility`.
    pub fn register_snapshot(&mut self, visibility: Lsn) {
        self.registry.register(visibility);
    }

    /// Unregisters a snapshot and drops the retained versions nobody else
    /// needs. Returns how many were dropped.
    pub fn release_snapshot(&mut self, visibility: Lsn) -> usize {
        self.registry.unregister(visibility);
        self.container.release_if_unused(visibility, &self.registry)
    }

    /// Keys with differential versions at or below `up_to`.
    pub fn keys_to_migrate(&self, up_to: Lsn) -> Vec<K> {
        self.differential.keys_up_to(up_to)
    }

    pub fn last_checkpoint_lsn(&self) -> Lsn {
        self.consolidated.checkpoint_lsn()
    }

    pub fn advance_checkpoint(&mut self, lsn: Lsn) {
        self.consolidated.advance_checkpoint(lsn);
    }

    /// True while a failed checkpoint has left some keys consolidated past
    /// the last checkpoint LSN.
    pub fn has_partial_checkpoint(&self) -> bool {
        self.consolidated.is_partial()
    }

    /// The consolidated state, in key order.
    pub fn consolidated_entries(&self) -> impl Iterator<Item = (&K, &SharedVersion<V>)> {
        self.consolidated.iter()
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            differential_keys: self.differential.key_count(),
            differential_records: self.differential.record_count(),
            consolidated_keys: self.consolidated.len(),
            retained_versions: self.container.len(),
            live_snapshots: self.registry.len(),
            last_checkpoint_lsn: self.consolidated.checkpoint_lsn(),
        }
    }
}

/// Short-held latch over the tiers.
///
/// Never held across an `.await`. Commit publication, snapshot registration
/// and per-key migration take it for writing; reads take it for reading.
#[derive(Debug)]
pub struct TierLatch<K, V> {
    tiers: RwLock<VersionTiers<K, V>>,
}

impl<K, V> TierLatch<K, V> {
    pub fn new(tiers: VersionTiers<K, V>) -> Self {
        Self {
            tiers: RwLock::new(tiers),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, VersionTiers<K, V>> {
        self.tiers.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, VersionTiers<K, V>> {
        self.tiers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::VersionRecord;

    fn value(v: u32, lsn: i64) -> SharedVersion<u32> {
        VersionRecord::with_value(v, Lsn::new(lsn)).shared()
    }

    fn tombstone(lsn: i64) -> SharedVersion<u32> {
        VersionRecord::tombstone(Lsn::new(lsn)).shared()
    }

    fn value_at(tiers: &VersionTiers<&'static str, u32>, bound: i64) -> Option<u32> {
        tiers
            .read_as_of(&"k", Lsn::new(bound))
            .and_then(|v| v.value().copied())
    }

    #[test]
    fn test_latest_prefers_differential() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 1));
        tiers.migrate_key(&"k", Lsn::new(1));
        tiers.publish("k", value(2, 2));
        assert_eq!(tiers.read_latest(&"k").unwrap().value(), Some(&2));
    }

    #[test]
    fn test_eviction_without_snapshot_discards() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 1));
        tiers.publish("k", value(2, 2));
        let outcome = tiers.publish("k", value(3, 3));
        assert_eq!(outcome.discarded, 1);
        assert_eq!(tiers.stats().retained_versions, 0);
    }

    #[test]
    fn test_eviction_with_snapshot_retains() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 1));
        tiers.register_snapshot(Lsn::new(1));
        tiers.publish("k", value(2, 2));
        let outcome = tiers.publish("k", value(3, 3));
        assert_eq!(outcome.retained, 1);
        assert_eq!(value_at(&tiers, 1), Some(1));
        assert_eq!(value_at(&tiers, 3), Some(3));

        assert_eq!(tiers.release_snapshot(Lsn::new(1)), 1);
        assert_eq!(tiers.stats().retained_versions, 0);
    }

    #[test]
    fn test_migration_installs_newest() {
        let mut tiers = VersionTiers::new(3);
        tiers.publish("k", value(1, 1));
        tiers.publish("k", value(2, 2));
        tiers.publish("k", value(3, 3));

        let outcome = tiers.migrate_key(&"k", Lsn::new(2));
        assert_eq!(outcome.migrated, 2);
        assert_eq!(outcome.retention.discarded, 1);

        let stats = tiers.stats();
        assert_eq!(stats.consolidated_keys, 1);
        assert_eq!(stats.differential_records, 1);
        assert_eq!(value_at(&tiers, 2), Some(2));
        assert_eq!(value_at(&tiers, 5), Some(3));
    }

    #[test]
    fn test_migration_of_tombstone_removes_key() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 1));
        tiers.migrate_key(&"k", Lsn::new(1));
        tiers.publish("k", tombstone(2));
        tiers.migrate_key(&"k", Lsn::new(2));

        assert!(tiers.read_latest(&"k").is_none());
        assert_eq!(tiers.stats().consolidated_keys, 0);
    }

    #[test]
    fn test_migration_retains_replaced_consolidated_for_snapshot() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 1));
        tiers.migrate_key(&"k", Lsn::new(1));
        tiers.register_snapshot(Lsn::new(1));

        tiers.publish("k", value(2, 2));
        let outcome = tiers.migrate_key(&"k", Lsn::new(2));
        assert_eq!(outcome.retention.retained, 1);

        assert_eq!(value_at(&tiers, 1), Some(1));
        assert_eq!(value_at(&tiers, 2), Some(2));
    }

    #[test]
    fn test_as_of_before_first_version_is_absent() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 5));
        assert!(tiers.read_as_of(&"k", Lsn::new(4)).is_none());
    }

    #[test]
    fn test_from_consolidated() {
        let tiers = VersionTiers::from_consolidated(2, Lsn::new(9), vec![("k", value(4, 7))]);
        assert_eq!(tiers.last_checkpoint_lsn(), Lsn::new(9));
        assert_eq!(value_at(&tiers, 9), Some(4));
    }

    #[test]
    fn test_unfinished_migration_is_partial() {
        let mut tiers = VersionTiers::new(2);
        tiers.publish("k", value(1, 1));
        tiers.migrate_key(&"k", Lsn::new(1));
        tiers.advance_checkpoint(Lsn::new(1));
        assert!(!tiers.has_partial_checkpoint());

        // A folded delete leaves no consolidated entry behind.
        tiers.publish("k", tombstone(2));
        tiers.migrate_key(&"k", Lsn::new(2));
        assert!(tiers.has_partial_checkpoint());

        tiers.advance_checkpoint(Lsn::new(2));
        assert!(!tiers.has_partial_checkpoint());
    }

    #[test]
    fn test_migration_with_nothing_to_fold_is_not_partial() {
        let mut tiers: VersionTiers<&str, u32> = VersionTiers::new(2);
        tiers.migrate_key(&"k", Lsn::new(4));
        assert!(!tiers.has_partial_checkpoint());
    }
}
