//! tierkv - transactional MVCC core for a replicated, ordered key-value store
//!
//! A store keeps every key's committed history in three tiers:
//! - differential: the newest few versions per key, written by commits
//! - consolidated: one version per key, produced by checkpoints
//! - snapshot container: older versions still visible to a live snapshot
//!
//! Transactions buffer writes under exclusive key locks and publish them
//! atomically under a single LSN. Reads follow one of three isolation
//! levels (ReadCommitted, RepeatableRead, Snapshot).

pub mod availability;
pub mod checkpoint;
pub mod cli;
pub mod lock;
pub mod mvcc;
pub mod observability;
pub mod store;
pub mod tiers;
pub mod txn;

pub use availability::{Availability, ManualAvailability, ReplicaRole, RoleAvailability};
pub use checkpoint::{CheckpointImage, CheckpointReport};
pub use lock::{CancelSource, CancelToken, Timeout};
pub use mvcc::Lsn;
pub use store::{ReadResult, Store, StoreConfig, StoreError, StoreResult};
pub use txn::{IsolationLevel, Transaction, TransactionId, TransactionState};
