//! Snapshot registry - live visibility LSNs
//!
//! Tracks the visibility LSN of every live Snapshot transaction. A superseded
//! version with commit LSN `C`, replaced by a newer version at LSN `N`, is
//! still required iff some live visibility LSN `v` satisfies `C <= v < N`.
//!
//! Several snapshot transactions may share a visibility LSN, so the registry
//! is a multiset.

use std::collections::BTreeMap;

use super::Lsn;

/// Multiset of live snapshot visibility LSNs.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRegistry {
    live: BTreeMap<Lsn, usize>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a snapshot reading as of `visibility`.
    pub fn register(&mut self, visibility: Lsn) {
        *self.live.entry(visibility).or_insert(0) += 1;
    }

    /// Unregisters one snapshot reading as of `visibility`.
    ///
    /// Returns true if no live snapshot reads as of `visibility` any more.
    pub fn unregister(&mut self, visibility: Lsn) -> bool {
        match self.live.get_mut(&visibility) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.live.remove(&visibility);
                true
            }
            None => true,
        }
    }

    /// Returns true if a live snapshot reads as of an LSN in `[from, until)`.
    pub fn requires(&self, from: Lsn, until: Lsn) -> bool {
        if from >= until {
            return false;
        }
        self.live.range(from..until).next().is_some()
    }

    /// Number of live snapshot registrations.
    pub fn len(&self) -> usize {
        self.live.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
