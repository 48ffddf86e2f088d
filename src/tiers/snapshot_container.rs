//! Snapshot container - superseded versions kept for live snapshots
//!
//! A version lands here when it is pushed out of the differential tier or
//! replaced during consolidation while some live snapshot's visibility LSN
//! falls inside its validity interval `[commit_lsn, superseded_at)`.
//! It leaves once no live snapshot reads inside that interval.

use std::collections::BTreeMap;

use crate::mvcc::{Lsn, SharedVersion, SnapshotRegistry, Visibility};

/// A retained version and the end of its validity interval.
#[derive(Debug, Clone)]
pub struct RetainedVersion<V> {
    pub record: SharedVersion<V>,
    pub superseded_at: Lsn,
}

impl<V> RetainedVersion<V> {
    /// Returns true if this version answers a read at `bound`.
    pub fn covers(&self, bound: Lsn) -> bool {
        Visibility::covers(self.record.commit_lsn(), self.superseded_at, bound)
    }
}

#[derive(Debug)]
pub struct SnapshotContainer<K, V> {
    versions: BTreeMap<K, Vec<RetainedVersion<V>>>,
    count: usize,
}

impl<K: Ord, V> SnapshotContainer<K, V> {
    pub fn new() -> Self {
        Self {
            versions: BTreeMap::new(),
            count: 0,
        }
    }

    /// Keeps a superseded version of `key`.
    pub fn retain(&mut self, key: K, record: SharedVersion<V>, superseded_at: Lsn) {
        let retained = self.versions.entry(key).or_default();
        if retained
            .iter()
            .any(|r| r.record.commit_lsn() == record.commit_lsn())
        {
            return;
        }
        retained.push(RetainedVersion {
            record,
            superseded_at,
        });
        self.count += 1;
    }

    /// The retained version of `key` answering a read at `bound`.
    pub fn lookup(&self, key: &K, bound: Lsn) -> Option<&SharedVersion<V>> {
        self.versions
            .get(key)?
            .iter()
            .filter(|r| r.covers(bound))
            .map(|r| &r.record)
            .max_by_key(|record| record.commit_lsn())
    }

    /// Drops the versions that served `released` and no longer serve any
    /// visibility LSN still in `registry`. Returns how many were dropped.
    pub fn release_if_unused(&mut self, released: Lsn, registry: &SnapshotRegistry) -> usize {
        let mut dropped = 0;
        self.versions.retain(|_, retained| {
            let before = retained.len();
            retained.retain(|r| {
                !r.covers(released) || registry.requires(r.record.commit_lsn(), r.superseded_at)
            });
            dropped += before - retained.len();
            !retained.is_empty()
        });
        self.count -= dropped;
        dropped
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<K: Ord, V> Default for SnapshotContainer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
