//! Store metrics
//!
//! - Counters only
//! - Monotonic increase for the lifetime of a store
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one store.
///
/// All counters use Relaxed ordering; they are statistics, not
/// synchronisation.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    transactions_begun: AtomicU64,
    commits: AtomicU64,
    read_only_commits: AtomicU64,
    aborts: AtomicU64,
    conflicts: AtomicU64,
    lock_timeouts: AtomicU64,
    lock_cancellations: AtomicU64,
    forced_lock_aborts: AtomicU64,
    checkpoints: AtomicU64,
    records_consolidated: AtomicU64,
    versions_retained: AtomicU64,
    versions_released: AtomicU64,
    versions_discarded: AtomicU64,
}

impl StoreMetrics {
    /// Create a new metrics set with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_transactions_begun(&self) {
        self.transactions_begun.fetch_add(1, Ordering::Relaxed);
    }

    /// Commit that published at least one write
    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_only_commits(&self) {
        self.read_only_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_aborts(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lock_timeouts(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lock_cancellations(&self) {
        self.lock_cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Lock wait ended by store close
    pub fn increment_forced_lock_aborts(&self) {
        self.forced_lock_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_checkpoints(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_consolidated(&self, count: u64) {
        self.records_consolidated.fetch_add(count, Ordering::Relaxed);
    }

    /// Superseded versions moved into the snapshot container
    pub fn add_versions_retained(&self, count: u64) {
        self.versions_retained.fetch_add(count, Ordering::Relaxed);
    }

    /// Retained versions released once no snapshot needed them
    pub fn add_versions_released(&self, count: u64) {
        self.versions_released.fetch_add(count, Ordering::Relaxed);
    }

    /// Superseded versions dropped without retention
    pub fn add_versions_discarded(&self, count: u64) {
        self.versions_discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_begun: self.transactions_begun.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            read_only_commits: self.read_only_commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            lock_cancellations: self.lock_cancellations.load(Ordering::Relaxed),
            forced_lock_aborts: self.forced_lock_aborts.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            records_consolidated: self.records_consolidated.load(Ordering::Relaxed),
            versions_retained: self.versions_retained.load(Ordering::Relaxed),
            versions_released: self.versions_released.load(Ordering::Relaxed),
            versions_discarded: self.versions_discarded.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| String::from("{}"))
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_begun: u64,
    pub commits: u64,
    pub read_only_commits: u64,
    pub aborts: u64,
    pub conflicts: u64,
    pub lock_timeouts: u64,
    pub lock_cancellations: u64,
    pub forced_lock_aborts: u64,
    pub checkpoints: u64,
    pub records_consolidated: u64,
    pub versions_retained: u64,
    pub versions_released: u64,
    pub versions_discarded: u64,
}
