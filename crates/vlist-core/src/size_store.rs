#![forbid(unsafe_code)]

//! Range-compressed store of measured item sizes.
//!
//! [`SizeStore`] maps item indices to pixel sizes. Runs of consecutive items
//! sharing a size are stored once, keyed by the first index of the run, in a
//! `BTreeMap`. The map is the single source of truth for every offset the
//! engine computes.
//!
//! # Invariants
//!
//! 1. An empty store means "nothing measured yet". A non-empty store always
//!    contains key `0`, so its ranges partition `[0, ∞)` without gaps.
//! 2. Two adjacent ranges never share a size; inserts merge neighbours.
//! 3. `version` increments exactly once per `report_sizes` call that changed
//!    the map, and never otherwise.
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `query` | O(log r) |
//! | `report_sizes` (one range) | O(log r + k), k = ranges overlapped |
//! | `ranges` | O(r) |
//!
//! where `r` is the number of stored ranges, which stays small when most
//! items share a handful of sizes.

use std::collections::BTreeMap;

use crate::error::SizeRangeError;
use crate::range::SizeRange;

/// Result of applying a batch of size ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeUpdate {
    /// Earliest index whose size may have changed, `None` when the store is
    /// unchanged.
    pub sync_start: Option<usize>,
}

impl SizeUpdate {
    /// Update that changed nothing.
    pub const UNCHANGED: Self = Self { sync_start: None };

    /// Whether the batch modified the store.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.sync_start.is_some()
    }
}

/// Interval map from item index to measured pixel size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeStore {
    tree: BTreeMap<usize, f64>,
    version: u64,
}

impl SizeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store by replaying `ranges` into a fresh store.
    ///
    /// This goes through [`SizeStore::report_sizes`], so the result obeys the
    /// same invariants as any incrementally built store.
    pub fn from_ranges(ranges: &[SizeRange]) -> Result<Self, SizeRangeError> {
        let mut store = Self::new();
        store.report_sizes(ranges)?;
        Ok(store)
    }

    /// Whether no size was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Number of stored ranges.
    #[must_use]
    pub fn range_count(&self) -> usize {
        self.tree.len()
    }

    /// Mutation counter, bumped once per changing `report_sizes` call.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Size of the item at `index`, `None` when nothing was measured.
    #[must_use]
    pub fn query(&self, index: usize) -> Option<f64> {
        self.query_max_key_at_most(index).map(|(_, size)| size)
    }

    /// The range start at or below `index` together with its size.
    #[must_use]
    pub fn query_max_key_at_most(&self, index: usize) -> Option<(usize, f64)> {
        self.tree
            .range(..=index)
            .next_back()
            .map(|(&start, &size)| (start, size))
    }

    /// Start index and size of the last stored range.
    #[must_use]
    pub fn last(&self) -> Option<(usize, f64)> {
        self.tree
            .last_key_value()
            .map(|(&start, &size)| (start, size))
    }

    /// Iterate stored range starts and sizes at or after `from`, in order.
    pub fn keys_from(&self, from: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.tree.range(from..).map(|(&start, &size)| (start, size))
    }

    /// All stored ranges in order; the last one is unbounded.
    #[must_use]
    pub fn ranges(&self) -> Vec<SizeRange> {
        self.ranges_within(0, SizeRange::UNBOUNDED)
    }

    /// Stored ranges intersecting `[low, high]`, with their full extents.
    #[must_use]
    pub fn ranges_within(&self, low: usize, high: usize) -> Vec<SizeRange> {
        let Some((first_start, _)) = self
            .query_max_key_at_most(low)
            .or_else(|| self.tree.first_key_value().map(|(&k, &v)| (k, v)))
        else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut iter = self.tree.range(first_start..).peekable();
        while let Some((&start, &size)) = iter.next() {
            if start > high {
                break;
            }
            let end_index = match iter.peek() {
                Some(&(&next, _)) => next - 1,
                None => SizeRange::UNBOUNDED,
            };
            out.push(SizeRange::new(start, end_index, size));
        }
        out
    }

    /// Apply a batch of measured ranges.
    ///
    /// The batch is validated up front; an invalid range rejects the whole
    /// batch and leaves the store untouched. The first range ever applied to
    /// an empty store seeds the size of the entire sequence.
    pub fn report_sizes(&mut self, ranges: &[SizeRange]) -> Result<SizeUpdate, SizeRangeError> {
        for range in ranges {
            range.validate()?;
        }

        let before = self.tree.clone();
        let mut sync_start: Option<usize> = None;
        for range in ranges {
            if self.tree.is_empty() {
                self.tree.insert(0, range.size);
                sync_start = Some(0);
                continue;
            }
            if self.insert_range(range) {
                sync_start = Some(sync_start.map_or(range.start_index, |s| s.min(range.start_index)));
            }
        }

        // Ranges can cancel each other out within one batch.
        if self.tree == before {
            return Ok(SizeUpdate::UNCHANGED);
        }
        self.version += 1;
        Ok(SizeUpdate { sync_start })
    }

    /// Overwrite everything at or after `total_count` with the size of the
    /// last stored range.
    ///
    /// Called when the sequence shrinks below the last range start so that no
    /// range keyed past the end of the sequence survives.
    pub fn truncate(&mut self, total_count: usize) -> SizeUpdate {
        let Some((last_start, last_size)) = self.last() else {
            return SizeUpdate::UNCHANGED;
        };
        if total_count == 0 || last_start < total_count {
            return SizeUpdate::UNCHANGED;
        }
        let tail = SizeRange::new(total_count, last_start, last_size);
        // The range is built from stored values and cannot fail validation.
        self.report_sizes(&[tail]).unwrap_or(SizeUpdate::UNCHANGED)
    }

    /// Insert one validated range into a non-empty store.
    ///
    /// Returns `false` when the store already held exactly this size for the
    /// whole range.
    fn insert_range(&mut self, range: &SizeRange) -> bool {
        let SizeRange {
            start_index: start,
            end_index: end,
            size,
        } = *range;

        let overlapping = self.ranges_within(start.saturating_sub(1), end.saturating_add(1));
        let already_covered = overlapping
            .iter()
            .any(|o| o.start_index <= start && o.end_index >= end && o.size == size);
        if already_covered {
            return false;
        }

        let mut should_insert = false;
        for (position, existing) in overlapping.iter().enumerate() {
            if position == 0 {
                should_insert = existing.size != size;
            } else if end >= existing.start_index || existing.size == size {
                self.tree.remove(&existing.start_index);
            }
            if existing.end_index > end && end >= existing.start_index && existing.size != size {
                self.tree.insert(end + 1, existing.size);
            }
        }
        if should_insert {
            self.tree.insert(start, size);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(ranges: &[SizeRange]) -> SizeStore {
        SizeStore::from_ranges(ranges).expect("valid ranges")
    }

    #[test]
    fn empty_store_has_no_sizes() {
        let store = SizeStore::new();
        assert!(store.is_empty());
        assert_eq!(store.query(10), None);
        assert!(store.ranges().is_empty());
    }

    #[test]
    fn first_report_seeds_whole_sequence() {
        let store = store_with(&[SizeRange::new(5, 9, 30.0)]);
        assert_eq!(store.ranges(), vec![SizeRange::tail(0, 30.0)]);
        assert_eq!(store.query(0), Some(30.0));
        assert_eq!(store.query(1_000_000), Some(30.0));
    }

    #[test]
    fn insert_in_the_middle_splits() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        let update = store.report_sizes(&[SizeRange::new(3, 5, 20.0)]).unwrap();
        assert_eq!(update.sync_start, Some(3));
        assert_eq!(
            store.ranges(),
            vec![
                SizeRange::new(0, 2, 10.0),
                SizeRange::new(3, 5, 20.0),
                SizeRange::tail(6, 10.0),
            ]
        );
    }

    #[test]
    fn insert_at_start_replaces_head() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store.report_sizes(&[SizeRange::new(0, 1, 20.0)]).unwrap();
        assert_eq!(
            store.ranges(),
            vec![SizeRange::new(0, 1, 20.0), SizeRange::tail(2, 10.0)]
        );
    }

    #[test]
    fn adjacent_equal_ranges_merge() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store.report_sizes(&[SizeRange::new(3, 5, 20.0)]).unwrap();
        store.report_sizes(&[SizeRange::new(6, 8, 20.0)]).unwrap();
        assert_eq!(
            store.ranges(),
            vec![
                SizeRange::new(0, 2, 10.0),
                SizeRange::new(3, 8, 20.0),
                SizeRange::tail(9, 10.0),
            ]
        );
        store.report_sizes(&[SizeRange::new(3, 8, 10.0)]).unwrap();
        assert_eq!(store.ranges(), vec![SizeRange::tail(0, 10.0)]);
    }

    #[test]
    fn left_merge_extends_neighbour() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store.report_sizes(&[SizeRange::new(2, 4, 20.0)]).unwrap();
        store.report_sizes(&[SizeRange::new(5, 5, 20.0)]).unwrap();
        assert_eq!(
            store.ranges(),
            vec![
                SizeRange::new(0, 1, 10.0),
                SizeRange::new(2, 5, 20.0),
                SizeRange::tail(6, 10.0),
            ]
        );
    }

    #[test]
    fn overlapping_report_replaces_several_ranges() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store
            .report_sizes(&[SizeRange::new(2, 3, 20.0), SizeRange::new(6, 7, 30.0)])
            .unwrap();
        store.report_sizes(&[SizeRange::new(1, 6, 40.0)]).unwrap();
        assert_eq!(
            store.ranges(),
            vec![
                SizeRange::single(0, 10.0),
                SizeRange::new(1, 6, 40.0),
                SizeRange::single(7, 30.0),
                SizeRange::tail(8, 10.0),
            ]
        );
    }

    #[test]
    fn unbounded_report_clears_tail() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store
            .report_sizes(&[SizeRange::new(5, 6, 20.0), SizeRange::new(9, 12, 30.0)])
            .unwrap();
        store.report_sizes(&[SizeRange::tail(4, 50.0)]).unwrap();
        assert_eq!(
            store.ranges(),
            vec![SizeRange::new(0, 3, 10.0), SizeRange::tail(4, 50.0)]
        );
    }

    #[test]
    fn repeated_report_is_unchanged() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        let batch = [SizeRange::new(3, 4, 25.0)];
        assert!(store.report_sizes(&batch).unwrap().changed());
        let version = store.version();
        let second = store.report_sizes(&batch).unwrap();
        assert!(!second.changed());
        assert_eq!(store.version(), version);
    }

    #[test]
    fn invalid_batch_is_rejected_atomically() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        let before = store.clone();
        let err = store
            .report_sizes(&[SizeRange::single(1, 20.0), SizeRange::new(8, 2, 5.0)])
            .unwrap_err();
        assert!(matches!(err, SizeRangeError::Inverted { .. }));
        assert_eq!(store, before);
    }

    #[test]
    fn truncate_rewrites_tail_with_last_size() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store
            .report_sizes(&[SizeRange::new(5, 6, 20.0), SizeRange::tail(20, 30.0)])
            .unwrap();
        let update = store.truncate(6);
        assert_eq!(update.sync_start, Some(6));
        assert_eq!(
            store.ranges(),
            vec![
                SizeRange::new(0, 4, 10.0),
                SizeRange::single(5, 20.0),
                SizeRange::tail(6, 30.0),
            ]
        );
    }

    #[test]
    fn truncate_past_last_key_is_noop() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store.report_sizes(&[SizeRange::new(5, 6, 20.0)]).unwrap();
        assert!(!store.truncate(100).changed());
        assert!(!store.truncate(0).changed());
    }

    #[test]
    fn ranges_within_includes_containing_range() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store.report_sizes(&[SizeRange::new(10, 19, 20.0)]).unwrap();
        assert_eq!(
            store.ranges_within(12, 25),
            vec![SizeRange::new(10, 19, 20.0), SizeRange::tail(20, 10.0)]
        );
        assert_eq!(store.ranges_within(3, 4), vec![SizeRange::new(0, 9, 10.0)]);
    }

    #[test]
    fn query_max_key_at_most_returns_range_start() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        store.report_sizes(&[SizeRange::new(10, 19, 20.0)]).unwrap();
        assert_eq!(store.query_max_key_at_most(15), Some((10, 20.0)));
        assert_eq!(store.query_max_key_at_most(9), Some((0, 10.0)));
        assert_eq!(store.query_max_key_at_most(25), Some((20, 10.0)));
    }

    #[test]
    fn batch_that_cancels_out_is_unchanged() {
        let mut store = store_with(&[SizeRange::single(0, 10.0)]);
        let batch = [SizeRange::single(26, 10.0), SizeRange::tail(0, 20.0)];
        assert!(store.report_sizes(&batch).unwrap().changed());
        let version = store.version();

        // Row 26 is split out and merged back within the same batch.
        let update = store.report_sizes(&batch).unwrap();
        assert!(!update.changed());
        assert_eq!(store.version(), version);
        assert_eq!(store.ranges(), vec![SizeRange::tail(0, 20.0)]);
    }
}
