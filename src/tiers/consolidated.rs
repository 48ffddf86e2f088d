//! Consolidated tier - the checkpointed base state
//!
//! One live version per key as of the last checkpoint. Tombstones are never
//! stored here: consolidating a delete removes the key.

use std::collections::BTreeMap;

use crate::mvcc::{Lsn, SharedVersion};

#[derive(Debug)]
pub struct ConsolidatedTier<K, V> {
    entries: BTreeMap<K, SharedVersion<V>>,
    checkpoint_lsn: Lsn,
    /// Highest bound any migration has folded in, finished or not.
    folded_through: Lsn,
}

impl<K: Ord, V> ConsolidatedTier<K, V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            checkpoint_lsn: Lsn::UNCOMMITTED,
            folded_through: Lsn::UNCOMMITTED,
        }
    }

    pub fn get(&self, key: &K) -> Option<&SharedVersion<V>> {
        self.entries.get(key)
    }

    /// Installs the consolidated version of `key` and returns the one it
    /// replaces. A tombstone removes the key.
    pub fn install(&mut self, key: K, record: SharedVersion<V>) -> Option<SharedVersion<V>> {
        if record.is_tombstone() {
            self.entries.remove(&key)
        } else {
            self.entries.insert(key, record)
        }
    }

    /// LSN up to which the differential tier has been folded in.
    pub fn checkpoint_lsn(&self) -> Lsn {
        self.checkpoint_lsn
    }

    /// Advances the checkpoint LSN; never moves it backwards.
    pub fn advance_checkpoint(&mut self, lsn: Lsn) {
        if lsn > self.checkpoint_lsn {
            self.checkpoint_lsn = lsn;
        }
    }

    /// Records that versions up to `bound` were folded into some keys.
    pub fn note_folded(&mut self, bound: Lsn) {
        if bound > self.folded_through {
            self.folded_through = bound;
        }
    }

    /// True while a checkpoint folded some keys past the checkpoint LSN
    /// without finishing. The entries then mix two points in time.
    pub fn is_partial(&self) -> bool {
        self.folded_through > self.checkpoint_lsn
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &SharedVersion<V>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord, V> Default for ConsolidatedTier<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
