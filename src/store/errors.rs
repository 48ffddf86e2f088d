//! Store operation errors
//!
//! Every error carries a TIERKV_* code. `is_retryable` separates transient
//! conditions (another transaction holds the key, the replica is not
//! currently primary or readable, the caller cancelled) from outcomes a
//! retry of the same operation will not change.

use thiserror::Error;

use super::config::ConfigError;
use crate::checkpoint::CheckpointError;
use crate::lock::LockError;
use crate::txn::{TransactionId, TransactionState};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Add on a key that already has a live value
    #[error("Key {key} already exists")]
    Conflict { key: String },

    /// The key lock was not granted in time
    #[error("Timed out waiting for the lock on key {key}")]
    LockTimeout { key: String },

    /// A lock wait was force-released because the store closed
    #[error("{txn} aborted: store closed while waiting for key {key}")]
    TransactionAborted { txn: TransactionId, key: String },

    /// The caller's cancellation signal fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Write attempted while the replica is not writable
    #[error("Replica is not primary")]
    NotPrimary,

    /// Read attempted while the replica is not readable
    #[error("Replica is not readable")]
    NotReadable,

    /// Operation on a transaction that is no longer active
    #[error("{txn} is {state}")]
    InvalidTransactionState {
        txn: TransactionId,
        state: TransactionState,
    },

    /// Transaction created by a different store
    #[error("{txn} does not belong to this store")]
    ForeignTransaction { txn: TransactionId },

    /// Store closed
    #[error("Store is closed")]
    Closed,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Maps a failed lock request on `key` by `txn`.
    pub(crate) fn from_lock(err: LockError, txn: TransactionId, key: String) -> Self {
        match err {
            LockError::TimedOut => StoreError::LockTimeout { key },
            LockError::Cancelled => StoreError::Cancelled,
            LockError::Closed => StoreError::TransactionAborted { txn, key },
        }
    }

    /// Error code string
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict { .. } => "TIERKV_CONFLICT",
            StoreError::LockTimeout { .. } => "TIERKV_LOCK_TIMEOUT",
            StoreError::TransactionAborted { .. } => "TIERKV_TRANSACTION_ABORTED",
            StoreError::Cancelled => "TIERKV_CANCELLED",
            StoreError::NotPrimary => "TIERKV_NOT_PRIMARY",
            StoreError::NotReadable => "TIERKV_NOT_READABLE",
            StoreError::InvalidTransactionState { .. } => "TIERKV_INVALID_TRANSACTION_STATE",
            StoreError::ForeignTransaction { .. } => "TIERKV_FOREIGN_TRANSACTION",
            StoreError::Closed => "TIERKV_CLOSED",
            StoreError::Checkpoint(err) => err.code().as_str(),
            StoreError::Config(_) => "TIERKV_CONFIG_INVALID",
        }
    }

    /// Returns true if retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::LockTimeout { .. }
            | StoreError::NotPrimary
            | StoreError::NotReadable
            | StoreError::Cancelled => true,
            StoreError::Checkpoint(err) => err.code().is_retryable(),
            _ => false,
        }
    }
}
