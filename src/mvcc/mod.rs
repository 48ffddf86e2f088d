//! MVCC domain types
//!
//! This module provides:
//! - `Lsn` - Totally ordered commit sequence number
//! - `VersionRecord` - Immutable committed version (value or tombstone)
//! - `SequenceCounter` - Commit LSN assignment
//! - `SnapshotRegistry` - Visibility LSNs of live snapshot transactions
//! - `Visibility` - The as-of visibility rule

mod lsn;
mod registry;
mod sequence;
mod version;
mod visibility;

pub use lsn::Lsn;
pub use registry::SnapshotRegistry;
pub use sequence::SequenceCounter;
pub use version::{SharedVersion, VersionPayload, VersionRecord};
pub use visibility::{Visibility, VisibilityResult};
