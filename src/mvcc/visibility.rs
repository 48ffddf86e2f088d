//! Visibility rule
//!
//! Given a read bound `L` and a key's history, the visible version is the
//! version with the largest commit LSN `<= L`. If that version is a
//! tombstone the key is absent at `L`.
//!
//! Retained versions carry the LSN of the version that superseded them, so a
//! retained version `R` answers a read at `L` only when
//! `R.commit_lsn <= L < R.superseded_at`.

use super::{Lsn, SharedVersion};

/// Result of visibility evaluation for one key.
#[derive(Debug)]
pub enum VisibilityResult<'a, V> {
    /// A version (possibly a tombstone) answers the read.
    Version(&'a SharedVersion<V>),
    /// No version of this key is visible at the bound.
    Absent,
}

impl<'a, V> VisibilityResult<'a, V> {
    /// Returns the answering version, if any.
    pub fn version(&self) -> Option<&'a SharedVersion<V>> {
        match self {
            VisibilityResult::Version(v) => Some(v),
            VisibilityResult::Absent => None,
        }
    }

    /// Returns true if a live (non-tombstone) value is visible.
    pub fn is_visible(&self) -> bool {
        matches!(self, VisibilityResult::Version(v) if !v.is_tombstone())
    }
}

/// Stateless visibility resolver.
pub struct Visibility;

impl Visibility {
    /// Picks the newest version with `commit_lsn <= bound` from a
    /// newest-first chain fragment.
    pub fn as_of<V>(newest_first: &[SharedVersion<V>], bound: Lsn) -> VisibilityResult<'_, V> {
        match newest_first.iter().find(|v| v.commit_lsn() <= bound) {
            Some(version) => VisibilityResult::Version(version),
            None => VisibilityResult::Absent,
        }
    }

    /// Returns true if a version superseded at `superseded_at` answers a
    /// read at `bound`.
    #[inline]
    pub fn covers(commit_lsn: Lsn, superseded_at: Lsn, bound: Lsn) -> bool {
        commit_lsn <= bound && bound < superseded_at
    }

    /// Of two candidate answers, keeps the one with the larger commit LSN.
    pub fn newer<'a, V>(
        a: Option<&'a SharedVersion<V>>,
        b: Option<&'a SharedVersion<V>>,
    ) -> Option<&'a SharedVersion<V>> {
        match (a, b) {
            (Some(x), Some(y)) => Some(if y.commit_lsn() > x.commit_lsn() { y } else { x }),
            (x, None) => x,
            (None, y) => y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::VersionRecord;

    fn value(v: u32, lsn: i64) -> SharedVersion<u32> {
        VersionRecord::with_value(v, Lsn::new(lsn)).shared()
    }

    fn tombstone(lsn: i64) -> SharedVersion<u32> {
        VersionRecord::tombstone(Lsn::new(lsn)).shared()
    }

    #[test]
    fn test_selects_largest_lsn_within_bound() {
        let chain = vec![value(3, 30), value(2, 20), value(1, 10)];
        let result = Visibility::as_of(&chain, Lsn::new(25));
        assert_eq!(result.version().unwrap().commit_lsn(), Lsn::new(20));
    }

    #[test]
    fn test_future_versions_are_excluded() {
        let chain = vec![value(2, 50), value(1, 10)];
        let result = Visibility::as_of(&chain, Lsn::new(30));
        assert_eq!(result.version().unwrap().value(), Some(&1));
    }

    #[test]
    fn test_all_future_is_absent() {
        let chain = vec![value(2, 200), value(1, 100)];
        assert!(Visibility::as_of(&chain, Lsn::new(50)).version().is_none());
    }

    #[test]
    fn test_tombstone_answers_but_is_not_visible() {
        let chain = vec![tombstone(20), value(1, 10)];
        let result = Visibility::as_of(&chain, Lsn::new(25));
        assert!(result.version().is_some());
        assert!(!result.is_visible());
    }

    #[test]
    fn test_delete_then_reinsert() {
        let chain = vec![value(2, 30), tombstone(20), value(1, 10)];
        assert!(Visibility::as_of(&chain, Lsn::new(35)).is_visible());
        assert!(!Visibility::as_of(&chain, Lsn::new(25)).is_visible());
        assert!(Visibility::as_of(&chain, Lsn::new(15)).is_visible());
    }

    #[test]
    fn test_covers_is_half_open() {
        assert!(Visibility::covers(Lsn::new(5), Lsn::new(8), Lsn::new(5)));
        assert!(Visibility::covers(Lsn::new(5), Lsn::new(8), Lsn::new(7)));
        assert!(!Visibility::covers(Lsn::new(5), Lsn::new(8), Lsn::new(8)));
        assert!(!Visibility::covers(Lsn::new(5), Lsn::new(8), Lsn::new(4)));
    }

    #[test]
    fn test_newer_prefers_larger_lsn() {
        let a = value(1, 10);
        let b = value(2, 20);
        let picked = Visibility::newer(Some(&a), Some(&b)).unwrap();
        assert_eq!(picked.commit_lsn(), Lsn::new(20));
        assert!(Visibility::newer::<u32>(None, None).is_none());
    }
}
