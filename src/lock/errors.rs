//! Lock acquisition errors

use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Why a lock request was not granted.
///
/// None of these leave the lock table in a partially updated state: a
/// failed request is removed from the key's wait queue before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// Not granted within the requested window. Transient.
    #[error("lock request timed out")]
    TimedOut,

    /// The caller's cancellation signal fired while waiting.
    #[error("lock request cancelled")]
    Cancelled,

    /// The lock manager was closed; the wait was force-released.
    #[error("lock manager closed while waiting")]
    Closed,
}
