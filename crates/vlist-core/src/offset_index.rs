#![forbid(unsafe_code)]

//! Cumulative offsets derived from a [`SizeStore`].
//!
//! [`OffsetIndex`] keeps one breakpoint per stored size range: the range's
//! first index, the pixel offset of that item, and the shared size. Any
//! item's offset is then a binary search plus one multiplication.
//!
//! # Invariants
//!
//! 1. `points[i].offset == points[i-1].offset
//!    + (points[i].index - points[i-1].index) * (points[i-1].size + gap)`.
//! 2. Points are strictly increasing by index and non-decreasing by offset.
//! 3. Rebuilding from `sync_start` reuses every point whose range ends before
//!    `sync_start`; only the suffix is re-derived.
//! 4. `generation` changes iff the points were rewritten.
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `offset_of` / `size_of` | O(log r) |
//! | `index_at_offset` | O(log r) |
//! | `rebuild_from(s)` | O(log r + ranges after s) |

#[cfg(feature = "tracing")]
use tracing::trace_span;

use crate::range::SizeRange;
use crate::size_store::SizeStore;

/// Breakpoint at the start of a size range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetPoint {
    /// First index of the range.
    pub index: usize,
    /// Pixel offset of the item at `index`.
    pub offset: f64,
    /// Size shared by every item of the range.
    pub size: f64,
}

/// A size range together with its breakpoint, as returned by
/// [`OffsetIndex::ranges_within_offsets`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetRange {
    /// First index of the range.
    pub start: usize,
    /// Last index of the range, [`SizeRange::UNBOUNDED`] for the tail.
    pub end: usize,
    /// Breakpoint of the range.
    pub point: OffsetPoint,
}

/// Breakpoint array mapping indices to pixel offsets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetIndex {
    points: Vec<OffsetPoint>,
    gap: f64,
    store_version: Option<u64>,
    generation: u64,
}

impl OffsetIndex {
    /// Create an index with no breakpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index for `store` from scratch.
    #[must_use]
    pub fn from_store(store: &SizeStore, gap: f64) -> Self {
        let mut index = Self::new();
        index.rebuild_from(0, store, gap);
        index
    }

    /// Breakpoints in index order.
    #[must_use]
    pub fn points(&self) -> &[OffsetPoint] {
        &self.points
    }

    /// Whether no breakpoint exists (nothing measured).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Gap the offsets were derived with.
    #[must_use]
    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Rebuild counter; equal generations mean identical breakpoints.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Re-derive breakpoints after the store changed at or after `sync_start`.
    ///
    /// Returns `true` when the breakpoints were rewritten. Calling this again
    /// with an unchanged store and gap is a no-op.
    pub fn rebuild_from(&mut self, sync_start: usize, store: &SizeStore, gap: f64) -> bool {
        #[cfg(feature = "tracing")]
        let _span = trace_span!("offset_rebuild", sync_start, ranges = store.range_count()).entered();

        let gap_changed = gap != self.gap;
        if !gap_changed && self.store_version == Some(store.version()) {
            return false;
        }
        self.store_version = Some(store.version());
        self.gap = gap;

        if store.is_empty() {
            let had_points = !self.points.is_empty();
            self.points.clear();
            if had_points {
                self.generation += 1;
            }
            return had_points;
        }

        let resume = if sync_start == 0 || gap_changed {
            None
        } else {
            self.resume_point(sync_start, store)
        };

        let next_key = match resume {
            Some(kept) => {
                self.points.truncate(kept);
                self.points.last().map_or(0, |p| p.index + 1)
            }
            None => {
                self.points.clear();
                0
            }
        };

        for (index, size) in store.keys_from(next_key) {
            let offset = match self.points.last() {
                Some(prev) => prev.offset + (index - prev.index) as f64 * (prev.size + gap),
                None => 0.0,
            };
            self.points.push(OffsetPoint {
                index,
                offset,
                size,
            });
        }
        self.generation += 1;
        true
    }

    /// Number of leading points still valid after a change at `sync_start`.
    fn resume_point(&self, sync_start: usize, store: &SizeStore) -> Option<usize> {
        let (k0, size) = store.query_max_key_at_most(sync_start - 1)?;
        let kept = self.points.partition_point(|p| p.index <= k0);
        let last = self.points.get(kept.checked_sub(1)?)?;
        (last.index == k0 && last.size == size).then_some(kept)
    }

    /// Position of the breakpoint at or below `index`.
    fn point_at_or_below(&self, index: usize) -> Option<usize> {
        self.points
            .partition_point(|p| p.index <= index)
            .checked_sub(1)
    }

    /// Pixel offset of the item at `index`; `0.0` when nothing is measured.
    #[must_use]
    pub fn offset_of(&self, index: usize) -> f64 {
        match self.point_at_or_below(index) {
            Some(pos) => {
                let p = &self.points[pos];
                p.offset + (index - p.index) as f64 * (p.size + self.gap)
            }
            None => 0.0,
        }
    }

    /// Size of the item at `index`, `None` when nothing is measured.
    #[must_use]
    pub fn size_of(&self, index: usize) -> Option<f64> {
        self.point_at_or_below(index).map(|pos| self.points[pos].size)
    }

    /// Index of the item whose slot (size plus trailing gap) contains
    /// `offset`. Offsets below zero map to index `0`.
    #[must_use]
    pub fn index_at_offset(&self, offset: f64) -> usize {
        let pos = match self.points.partition_point(|p| p.offset <= offset).checked_sub(1) {
            Some(pos) => pos,
            None => return 0,
        };
        // Zero-sized runs share one offset; the search above lands on the
        // last of them, which is the one that actually occupies `offset`.
        let p = &self.points[pos];
        let step = p.size + self.gap;
        if step <= 0.0 {
            return p.index;
        }
        let within = ((offset - p.offset) / step).floor() as usize;
        let index = p.index.saturating_add(within);
        match self.points.get(pos + 1) {
            Some(next) => index.min(next.index - 1),
            None => index,
        }
    }

    /// Bottom edge of the last item when the sequence holds `total_count`
    /// items.
    #[must_use]
    pub fn total_size(&self, total_count: usize) -> f64 {
        if total_count == 0 || self.points.is_empty() {
            return 0.0;
        }
        let last = total_count - 1;
        let size = self.size_of(last).unwrap_or(0.0);
        (self.offset_of(last) + size).max(0.0)
    }

    /// Size ranges whose pixel extent intersects `[low, high]`.
    ///
    /// `low` is raised to the breakpoint at or below `min_index` so that ranges
    /// entirely before a pinned prefix are skipped. The first returned range
    /// is the one containing `low`.
    #[must_use]
    pub fn ranges_within_offsets(&self, low: f64, high: f64, min_index: usize) -> Vec<OffsetRange> {
        if self.points.is_empty() {
            return Vec::new();
        }
        let mut low = low;
        if min_index > 0
            && let Some(pos) = self.point_at_or_below(min_index)
        {
            low = low.max(self.points[pos].offset);
        }

        let first = self
            .points
            .partition_point(|p| p.offset <= low)
            .saturating_sub(1);
        let mut out = Vec::new();
        for (pos, point) in self.points.iter().enumerate().skip(first) {
            if pos > first && point.offset > high {
                break;
            }
            let end = self
                .points
                .get(pos + 1)
                .map_or(SizeRange::UNBOUNDED, |next| next.index - 1);
            out.push(OffsetRange {
                start: point.index,
                end,
                point: *point,
            });
        }
        out
    }
}
