//! Replica availability gates
//!
//! A store does not decide on its own whether it may accept writes or serve
//! reads; the replication layer around it does. This module is the seam:
//!
//! - `Availability` - the two signals the store consults
//! - `ManualAvailability` - flags set directly (standalone use, tests)
//! - `RoleAvailability` - signals derived from the replica role
//!
//! Write operations check write status and fail with `NotPrimary`; read
//! operations check read status and fail with `NotReadable`.

mod errors;
mod role;

pub use errors::{AvailabilityError, AvailabilityResult};
pub use role::{ReplicaRole, RoleAvailability};

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether an operation class is currently permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Denied,
}

impl AccessStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessStatus::Granted)
    }
}

impl From<bool> for AccessStatus {
    fn from(granted: bool) -> Self {
        if granted {
            AccessStatus::Granted
        } else {
            AccessStatus::Denied
        }
    }
}

/// Source of the store's write and read status.
pub trait Availability: Send + Sync + Debug {
    fn write_status(&self) -> AccessStatus;
    fn read_status(&self) -> AccessStatus;
}

/// Availability flags toggled directly.
#[derive(Debug)]
pub struct ManualAvailability {
    writable: AtomicBool,
    readable: AtomicBool,
}

impl ManualAvailability {
    pub fn new(writable: bool, readable: bool) -> Self {
        Self {
            writable: AtomicBool::new(writable),
            readable: AtomicBool::new(readable),
        }
    }

    /// Writable and readable.
    pub fn primary() -> Self {
        Self::new(true, true)
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    pub fn set_readable(&self, readable: bool) {
        self.readable.store(readable, Ordering::SeqCst);
    }
}

impl Default for ManualAvailability {
    fn default() -> Self {
        Self::primary()
    }
}

impl Availability for ManualAvailability {
    fn write_status(&self) -> AccessStatus {
        self.writable.load(Ordering::SeqCst).into()
    }

    fn read_status(&self) -> AccessStatus {
        self.readable.load(Ordering::SeqCst).into()
    }
}
