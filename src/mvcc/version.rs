//! VersionRecord - Immutable committed version of a key
//!
//! A version record is created exactly once, at commit time, and never
//! changes afterwards. Deletes are explicit tombstone records ordered in the
//! key's history like any other version.
//!
//! Records are shared between tiers (differential, consolidated, snapshot
//! container) through `Arc`, so moving a record between tiers never copies
//! the value.

use std::sync::Arc;

use super::Lsn;

/// The payload of a version: either a value or an explicit tombstone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionPayload<V> {
    /// A live value.
    Value(V),
    /// An explicit deletion marker.
    Tombstone,
}

impl<V> VersionPayload<V> {
    /// Returns true if this payload is a tombstone.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, VersionPayload::Tombstone)
    }

    /// Returns the value, if any.
    #[inline]
    pub fn value(&self) -> Option<&V> {
        match self {
            VersionPayload::Value(v) => Some(v),
            VersionPayload::Tombstone => None,
        }
    }
}

impl<V> From<Option<V>> for VersionPayload<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => VersionPayload::Value(v),
            None => VersionPayload::Tombstone,
        }
    }
}

/// A single immutable version of a key's value.
///
/// All fields are private; there are no setters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRecord<V> {
    payload: VersionPayload<V>,
    commit_lsn: Lsn,
}

/// A version record shared between tiers.
pub type SharedVersion<V> = Arc<VersionRecord<V>>;

impl<V> VersionRecord<V> {
    /// Creates a new version record.
    pub fn new(payload: VersionPayload<V>, commit_lsn: Lsn) -> Self {
        Self {
            payload,
            commit_lsn,
        }
    }

    /// Creates a version holding a value.
    pub fn with_value(value: V, commit_lsn: Lsn) -> Self {
        Self::new(VersionPayload::Value(value), commit_lsn)
    }

    /// Creates a tombstone version.
    pub fn tombstone(commit_lsn: Lsn) -> Self {
        Self::new(VersionPayload::Tombstone, commit_lsn)
    }

    /// Wraps this record for sharing between tiers.
    pub fn shared(self) -> SharedVersion<V> {
        Arc::new(self)
    }

    #[inline]
    pub fn payload(&self) -> &VersionPayload<V> {
        &self.payload
    }

    #[inline]
    pub fn value(&self) -> Option<&V> {
        self.payload.value()
    }

    #[inline]
    pub fn commit_lsn(&self) -> Lsn {
        self.commit_lsn
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_tombstone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_with_value() {
        let version = VersionRecord::with_value(6u32, Lsn::new(1));
        assert_eq!(version.value(), Some(&6));
        assert_eq!(version.commit_lsn(), Lsn::new(1));
        assert!(!version.is_tombstone());
    }

    #[test]
    fn test_tombstone_has_no_value() {
        let version: VersionRecord<u32> = VersionRecord::tombstone(Lsn::new(9));
        assert!(version.is_tombstone());
        assert_eq!(version.value(), None);
    }

    #[test]
    fn test_payload_from_option() {
        assert_eq!(VersionPayload::from(Some(3)), VersionPayload::Value(3));
        assert_eq!(VersionPayload::<u8>::from(None), VersionPayload::Tombstone);
    }

    #[test]
    fn test_shared_record_aliases_without_copy() {
        let shared = VersionRecord::with_value(String::from("v"), Lsn::new(2)).shared();
        let alias = Arc::clone(&shared);
        assert!(Arc::ptr_eq(&shared, &alias));
        assert_eq!(Arc::strong_count(&shared), 2);
    }
}
