//! Differential tier - recent committed versions
//!
//! Holds, per key, a short newest-first chain of the most recently committed
//! versions that have not yet been consolidated. Publishing a version pushes
//! it onto the front of its key's chain; once the chain exceeds its depth the
//! oldest version is evicted and handed back to the caller together with the
//! LSN of the version that superseded it.

use std::collections::BTreeMap;

use crate::mvcc::{Lsn, SharedVersion, Visibility};

/// A version pushed out of the differential tier.
#[derive(Debug, Clone)]
pub struct Evicted<V> {
    pub record: SharedVersion<V>,
    /// Commit LSN of the next newer version of the same key.
    pub superseded_at: Lsn,
}

/// Recent versions keyed by user key, newest first.
#[derive(Debug)]
pub struct DifferentialTier<K, V> {
    chains: BTreeMap<K, Vec<SharedVersion<V>>>,
    depth: usize,
    records: usize,
}

impl<K: Ord + Clone, V> DifferentialTier<K, V> {
    /// Creates an empty tier keeping at most `depth` versions per key.
    pub fn new(depth: usize) -> Self {
        Self {
            chains: BTreeMap::new(),
            depth: depth.max(1),
            records: 0,
        }
    }

    /// Newest version of `key`, tombstones included.
    pub fn latest(&self, key: &K) -> Option<&SharedVersion<V>> {
        self.chains.get(key).and_then(|chain| chain.first())
    }

    /// Newest version of `key` with commit LSN `<= bound`.
    pub fn as_of(&self, key: &K, bound: Lsn) -> Option<&SharedVersion<V>> {
        self.chains
            .get(key)
            .and_then(|chain| Visibility::as_of(chain, bound).version())
    }

    /// Publishes a newly committed version and returns any versions evicted
    /// beyond the tier's depth, oldest first.
    pub fn publish(&mut self, key: K, record: SharedVersion<V>) -> Vec<Evicted<V>> {
        let chain = self.chains.entry(key).or_default();
        debug_assert!(chain
            .first()
            .map_or(true, |newest| newest.commit_lsn() < record.commit_lsn()));
        chain.insert(0, record);
        self.records += 1;

        let mut evicted = Vec::new();
        while chain.len() > self.depth {
            if let Some(oldest) = chain.pop() {
                let superseded_at = chain
                    .last()
                    .map(|newer| newer.commit_lsn())
                    .unwrap_or_else(|| oldest.commit_lsn());
                evicted.push(Evicted {
                    record: oldest,
                    superseded_at,
                });
                self.records -= 1;
            }
        }
        evicted.reverse();
        evicted
    }

    /// Removes and returns the versions of `key` with commit LSN `<= up_to`,
    /// newest first. Versions newer than `up_to` stay.
    pub fn drain_key(&mut self, key: &K, up_to: Lsn) -> Vec<SharedVersion<V>> {
        let Some(chain) = self.chains.get_mut(key) else {
            return Vec::new();
        };
        let split = chain
            .iter()
            .position(|v| v.commit_lsn() <= up_to)
            .unwrap_or(chain.len());
        let drained = chain.split_off(split);
        self.records -= drained.len();
        if chain.is_empty() {
            self.chains.remove(key);
        }
        drained
    }

    /// Keys holding at least one version with commit LSN `<= up_to`.
    pub fn keys_up_to(&self, up_to: Lsn) -> Vec<K> {
        self.chains
            .iter()
            .filter(|(_, chain)| chain.last().map_or(false, |v| v.commit_lsn() <= up_to))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of keys with at least one version.
    pub fn key_count(&self) -> usize {
        self.chains.len()
    }

    /// Number of versions held.
    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
