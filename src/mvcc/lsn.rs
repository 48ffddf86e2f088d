//! Lsn - Commit sequence number
//!
//! Every successful commit is stamped with exactly one LSN. LSNs are:
//! - Totally ordered across all commits of one store
//! - Strictly increasing with commit order
//! - Shared by every write of the same transaction
//!
//! `Lsn::UNCOMMITTED` (zero) is never assigned to a commit. It is reported
//! for a transaction's own pending writes and is the counter value of a
//! store that has not committed anything yet.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A log/commit sequence number.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lsn(i64);

impl Lsn {
    /// The LSN of a write that has not been committed yet.
    pub const UNCOMMITTED: Lsn = Lsn(0);

    /// Creates an LSN with the given value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Returns the LSN immediately after this one.
    #[inline]
    pub const fn next(&self) -> Lsn {
        Lsn(self.0 + 1)
    }

    /// Returns true if this LSN identifies a committed state transition.
    #[inline]
    pub const fn is_committed(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Lsn {
    fn from(value: i64) -> Self {
        Self(value)
    }
}
