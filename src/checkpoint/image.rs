//! Checkpoint image
//!
//! A serializable copy of the consolidated tier: every live key with its
//! value and commit LSN, as of `checkpoint_lsn`. A store reopened from an
//! image serves exactly that state and continues LSN assignment after
//! `checkpoint_lsn`.
//!
//! On disk the image is a single JSON document, written to a sibling
//! temporary file, fsynced, then renamed into place.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::{CheckpointError, CheckpointResult};
use crate::mvcc::Lsn;

/// Current image format version
pub const IMAGE_FORMAT_VERSION: u8 = 1;

/// One consolidated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry<K, V> {
    pub key: K,
    pub value: V,
    pub lsn: Lsn,
}

/// Consolidated state of a store as of a checkpoint LSN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointImage<K, V> {
    pub format_version: u8,
    pub checkpoint_lsn: Lsn,
    pub created_at: DateTime<Utc>,
    /// Sorted by key, one entry per key.
    pub entries: Vec<ImageEntry<K, V>>,
}

impl<K, V> CheckpointImage<K, V> {
    pub fn new(checkpoint_lsn: Lsn, entries: Vec<ImageEntry<K, V>>) -> Self {
        Self {
            format_version: IMAGE_FORMAT_VERSION,
            checkpoint_lsn,
            created_at: Utc::now(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord, V> CheckpointImage<K, V> {
    /// Checks format version, key order and entry LSNs.
    pub fn validate(&self) -> CheckpointResult<()> {
        if self.format_version != IMAGE_FORMAT_VERSION {
            return Err(CheckpointError::image_invalid(format!(
                "unsupported image format version {}",
                self.format_version
            )));
        }
        if self.checkpoint_lsn.value() < 0 {
            return Err(CheckpointError::image_invalid(format!(
                "negative checkpoint lsn {}",
                self.checkpoint_lsn
            )));
        }
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.lsn.is_committed() || entry.lsn > self.checkpoint_lsn {
                return Err(CheckpointError::image_invalid(format!(
                    "entry {} has lsn {} outside (0, {}]",
                    index, entry.lsn, self.checkpoint_lsn
                )));
            }
            if index > 0 && self.entries[index - 1].key >= entry.key {
                return Err(CheckpointError::image_invalid(format!(
                    "entry {} is out of key order or duplicated",
                    index
                )));
            }
        }
        Ok(())
    }
}

impl<K: Serialize, V: Serialize> CheckpointImage<K, V> {
    pub fn to_json(&self) -> CheckpointResult<String> {
        serde_json::to_string(self).map_err(|e| {
            CheckpointError::image_invalid(format!("Failed to serialize checkpoint image: {}", e))
        })
    }

    /// Writes the image durably to `path`.
    pub fn write_to_file(&self, path: &Path) -> CheckpointResult<()> {
        let json = self.to_json()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CheckpointError::image_io(
                        format!("Failed to create image directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let staging = path.with_extension("tmp");
        let mut file = File::create(&staging).map_err(|e| {
            CheckpointError::image_io(
                format!("Failed to create image file: {}", staging.display()),
                e,
            )
        })?;
        file.write_all(json.as_bytes()).map_err(|e| {
            CheckpointError::image_io(format!("Failed to write image file: {}", staging.display()), e)
        })?;
        file.sync_all().map_err(|e| {
            CheckpointError::image_io(format!("Failed to fsync image file: {}", staging.display()), e)
        })?;

        fs::rename(&staging, path).map_err(|e| {
            CheckpointError::image_io(
                format!("Failed to move image into place: {}", path.display()),
                e,
            )
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let dir = OpenOptions::new().read(true).open(parent).map_err(|e| {
                CheckpointError::image_io(
                    format!("Failed to open image directory for fsync: {}", parent.display()),
                    e,
                )
            })?;
            // Directory fsync is not supported everywhere; the rename stands.
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

impl<K: DeserializeOwned + Ord, V: DeserializeOwned> CheckpointImage<K, V> {
    /// Parses and validates an image.
    pub fn from_json(json: &str) -> CheckpointResult<Self> {
        let image: Self = serde_json::from_str(json).map_err(|e| {
            CheckpointError::image_invalid(format!("Failed to parse checkpoint image: {}", e))
        })?;
        image.validate()?;
        Ok(image)
    }

    pub fn read_from_file(path: &Path) -> CheckpointResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            CheckpointError::image_io(format!("Failed to open image file: {}", path.display()), e)
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            CheckpointError::image_io(format!("Failed to read image file: {}", path.display()), e)
        })?;

        Self::from_json(&contents)
    }
}
