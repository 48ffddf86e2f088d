//! Transactional store
//!
//! - `Store` - open/close, transactions, operations, checkpoint
//! - `StoreConfig` - tunables loaded from JSON
//! - `StoreError` - operation error taxonomy
//!
//! # Error taxonomy
//!
//! Writes lock the key before inspecting it, so:
//!
//! - Add on a key held by another transaction fails with `LockTimeout`
//!   when the wait expires, whatever the key's state
//! - Add on a key that exists, committed or pending in this same
//!   transaction, fails with `Conflict`

mod config;
mod errors;
mod facade;
mod shared;

pub use config::{ConfigError, StoreConfig};
pub use errors::{StoreError, StoreResult};
pub use facade::{ReadResult, Store};

pub(crate) use shared::StoreShared;
