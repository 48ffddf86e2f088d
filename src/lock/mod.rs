//! Key-level locking
//!
//! - `LockManager` - exclusive per-key locks with FIFO wait queues
//! - `Timeout` - immediate, bounded or infinite waits
//! - `CancelSource` / `CancelToken` - caller-driven cancellation of waits
//!
//! Writers and RepeatableRead readers take the exclusive lock; Snapshot
//! readers never lock.

mod errors;
mod manager;
mod timeout;

pub use errors::{LockError, LockResult};
pub use manager::{LockHandle, LockManager};
pub use timeout::{CancelSource, CancelToken, Timeout};
