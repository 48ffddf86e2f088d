//! Transactions
//!
//! - `Transaction` - isolation level, held locks, buffered writes
//! - `TransactionId` - lock owner identity
//! - `IsolationLevel` - ReadCommitted (default), RepeatableRead, Snapshot
//!
//! Transactions are created by `Store::begin_transaction` and driven
//! through the store's operations.

mod id;
mod isolation;
mod transaction;

pub use id::TransactionId;
pub use isolation::{IsolationLevel, TransactionState};
pub use transaction::{PendingWrite, Transaction};
