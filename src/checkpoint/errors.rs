//! Checkpoint-specific error types
//!
//! - Structured error codes in TIERKV_CATEGORY_NAME format
//! - Explicit failure, never partial success reported as success
//!
//! A failed checkpoint leaves the store serving correctly: keys already
//! consolidated stay consolidated, the rest stay in the differential tier,
//! and the last checkpoint LSN does not move.

use std::fmt;
use std::io;

/// Checkpoint error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointErrorCode {
    /// A key lock could not be taken within the checkpoint lock timeout
    TierkvCheckpointLockTimeout,
    /// The store closed while the checkpoint was running
    TierkvCheckpointStoreClosed,
    /// A failed checkpoint left the consolidated tier part-way to its bound
    TierkvCheckpointIncomplete,
    /// A checkpoint image failed validation
    TierkvCheckpointImageInvalid,
    /// A checkpoint image could not be read or written
    TierkvCheckpointImageIo,
}

impl CheckpointErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointErrorCode::TierkvCheckpointLockTimeout => "TIERKV_CHECKPOINT_LOCK_TIMEOUT",
            CheckpointErrorCode::TierkvCheckpointStoreClosed => "TIERKV_CHECKPOINT_STORE_CLOSED",
            CheckpointErrorCode::TierkvCheckpointIncomplete => "TIERKV_CHECKPOINT_INCOMPLETE",
            CheckpointErrorCode::TierkvCheckpointImageInvalid => "TIERKV_CHECKPOINT_IMAGE_INVALID",
            CheckpointErrorCode::TierkvCheckpointImageIo => "TIERKV_CHECKPOINT_IMAGE_IO",
        }
    }

    /// Returns true if retrying the same checkpoint later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckpointErrorCode::TierkvCheckpointLockTimeout
                | CheckpointErrorCode::TierkvCheckpointIncomplete
        )
    }
}

impl fmt::Display for CheckpointErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checkpoint error with full context
#[derive(Debug)]
pub struct CheckpointError {
    code: CheckpointErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl CheckpointError {
    fn new(code: CheckpointErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::new(CheckpointErrorCode::TierkvCheckpointLockTimeout, message, None)
    }

    pub fn store_closed(message: impl Into<String>) -> Self {
        Self::new(CheckpointErrorCode::TierkvCheckpointStoreClosed, message, None)
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(CheckpointErrorCode::TierkvCheckpointIncomplete, message, None)
    }

    pub fn image_invalid(message: impl Into<String>) -> Self {
        Self::new(CheckpointErrorCode::TierkvCheckpointImageInvalid, message, None)
    }

    pub fn image_io(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(CheckpointErrorCode::TierkvCheckpointImageIo, message, Some(source))
    }

    pub fn code(&self) -> CheckpointErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Checkpoint errors are never fatal; the store keeps serving.
    pub fn is_fatal(&self) -> bool {
        false
    }
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;
