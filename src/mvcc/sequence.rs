//! SequenceCounter - Commit LSN assignment
//!
//! The counter is initialized when the store opens (at zero, or at the
//! checkpoint LSN of the image the store was rebuilt from) and advanced only
//! inside the commit critical section, while the tier write latch is held.
//! That latch serializes assignment with publication, so no reader can
//! observe an assigned LSN whose writes are not yet visible.

use std::sync::atomic::{AtomicI64, Ordering};

use super::Lsn;

/// Monotonic source of commit LSNs.
#[derive(Debug)]
pub struct SequenceCounter {
    last_committed: AtomicI64,
}

impl SequenceCounter {
    /// Creates a counter for a fresh store. The first commit receives LSN 1.
    pub fn new() -> Self {
        Self::resume_from(Lsn::UNCOMMITTED)
    }

    /// Creates a counter that continues after `last_committed`.
    pub fn resume_from(last_committed: Lsn) -> Self {
        Self {
            last_committed: AtomicI64::new(last_committed.value()),
        }
    }

    /// Returns the LSN of the most recent commit, or `Lsn::UNCOMMITTED`.
    pub fn current(&self) -> Lsn {
        Lsn::new(self.last_committed.load(Ordering::Acquire))
    }

    /// Assigns the next LSN.
    ///
    /// Callers must hold the tier write latch.
    pub fn advance(&self) -> Lsn {
        Lsn::new(self.last_committed.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
