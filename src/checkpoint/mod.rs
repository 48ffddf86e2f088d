//! Checkpoint subsystem
//!
//! Checkpoint is the only path from the differential tier to the
//! consolidated tier.
//!
//! # Guarantees
//!
//! - Every version committed at or below the checkpoint bound ends up
//!   consolidated, retained for a live snapshot, or discarded as superseded
//! - The newest version of a key is never discarded
//! - Readers see every key throughout
//! - The last checkpoint LSN is monotonic and moves only on success
//!
//! # Images
//!
//! The consolidated tier can be exported as a `CheckpointImage` and a store
//! reopened from it.

mod coordinator;
mod errors;
mod image;
mod report;

pub use coordinator::Checkpointer;
pub use errors::{CheckpointError, CheckpointErrorCode, CheckpointResult};
pub use image::{CheckpointImage, ImageEntry, IMAGE_FORMAT_VERSION};
pub use report::{CheckpointPolicy, CheckpointReport};
