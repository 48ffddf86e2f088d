//! Checkpoint outcome and trigger policy

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mvcc::Lsn;
use crate::tiers::{MigrationOutcome, TierStats};

/// What one checkpoint did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointReport {
    /// Last checkpoint LSN before this run.
    pub previous_lsn: Lsn,
    /// Last checkpoint LSN after this run.
    pub checkpoint_lsn: Lsn,
    /// True if the bound was already covered and nothing moved.
    pub skipped: bool,
    pub keys_migrated: usize,
    pub records_consolidated: usize,
    pub versions_retained: usize,
    pub versions_discarded: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl CheckpointReport {
    pub(crate) fn begin(previous_lsn: Lsn, checkpoint_lsn: Lsn) -> Self {
        Self {
            previous_lsn,
            checkpoint_lsn,
            skipped: false,
            keys_migrated: 0,
            records_consolidated: 0,
            versions_retained: 0,
            versions_discarded: 0,
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }

    pub(crate) fn skipped(last_lsn: Lsn) -> Self {
        Self {
            skipped: true,
            ..Self::begin(last_lsn, last_lsn)
        }
    }

    pub(crate) fn record(&mut self, outcome: MigrationOutcome) {
        if outcome.migrated > 0 {
            self.keys_migrated += 1;
        }
        self.records_consolidated += outcome.migrated;
        self.versions_retained += outcome.retention.retained;
        self.versions_discarded += outcome.retention.discarded;
    }

    pub(crate) fn finish(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.completed_at = Utc::now();
        self
    }
}

/// Decides when the differential tier is large enough to checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    differential_threshold: usize,
}

impl CheckpointPolicy {
    pub fn new(differential_threshold: usize) -> Self {
        Self {
            differential_threshold,
        }
    }

    pub fn differential_threshold(&self) -> usize {
        self.differential_threshold
    }

    /// Returns true once the differential tier holds at least the threshold
    /// number of versions.
    pub fn should_checkpoint(&self, stats: &TierStats) -> bool {
        self.differential_threshold > 0 && stats.differential_records >= self.differential_threshold
    }
}
