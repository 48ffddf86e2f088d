//! Transaction identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a transaction as a lock owner.
///
/// Identifiers are assigned by the store from a counter starting at 1.
/// `CHECKPOINT` is reserved for the checkpointer's own key locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Lock owner used by checkpoint consolidation.
    pub const CHECKPOINT: TransactionId = TransactionId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}
