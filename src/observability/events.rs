//! Observable store events
//!
//! Every log line the store writes names one of these events.

use std::fmt;

/// Observable events in a store's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Store opened empty
    StoreOpen,
    /// Store reopened from a checkpoint image
    StoreOpenFromImage,
    /// Close requested
    StoreCloseBegin,
    /// Close complete, waiters released
    StoreClosed,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Transactions
    /// Transaction began
    TxnBegin,
    /// Transaction committed
    TxnCommit,
    /// Transaction aborted
    TxnAbort,
    /// Active transaction dropped without commit or abort
    TxnDropped,

    // Locking
    /// Lock wait exceeded its timeout
    LockTimeout,
    /// Lock waiter released by close
    LockForceReleased,

    // Write conflicts
    /// Add on a key that already exists
    WriteConflict,

    // Checkpoint
    /// Checkpoint started
    CheckpointBegin,
    /// Checkpoint complete
    CheckpointComplete,
    /// Checkpoint failed
    CheckpointFailed,
    /// Checkpoint bound already covered
    CheckpointSkipped,
    /// Image export refused after an unfinished checkpoint
    CheckpointImageRefused,

    // Snapshot retention
    /// Versions released after the last snapshot needing them ended
    SnapshotVersionsReleased,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpen => "STORE_OPEN",
            Event::StoreOpenFromImage => "STORE_OPEN_FROM_IMAGE",
            Event::StoreCloseBegin => "STORE_CLOSE_BEGIN",
            Event::StoreClosed => "STORE_CLOSED",

            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::TxnBegin => "TXN_BEGIN",
            Event::TxnCommit => "TXN_COMMIT",
            Event::TxnAbort => "TXN_ABORT",
            Event::TxnDropped => "TXN_DROPPED",

            Event::LockTimeout => "LOCK_TIMEOUT",
            Event::LockForceReleased => "LOCK_FORCE_RELEASED",

            Event::WriteConflict => "WRITE_CONFLICT",

            Event::CheckpointBegin => "CHECKPOINT_BEGIN",
            Event::CheckpointComplete => "CHECKPOINT_COMPLETE",
            Event::CheckpointFailed => "CHECKPOINT_FAILED",
            Event::CheckpointSkipped => "CHECKPOINT_SKIPPED",
            Event::CheckpointImageRefused => "CHECKPOINT_IMAGE_REFUSED",

            Event::SnapshotVersionsReleased => "SNAPSHOT_VERSIONS_RELEASED",
        }
    }

    /// Returns true if this event indicates a failed operation
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::CheckpointFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
