#![forbid(unsafe_code)]

//! Mapping between data items and the flat sequence with group headers.
//!
//! A grouped list interleaves one synthetic header row before the items of
//! every group. With counts `[2, 0, 3]` the flat sequence is
//!
//! ```text
//! flat:  0  1  2  3  4  5  6  7
//! row:   H0 i0 i1 H1 H2 i2 i3 i4
//! ```
//!
//! `GroupIndices::indices` holds the flat index of every header (`[0, 3, 4]`);
//! lookups are binary searches over it.

use crate::range::SizeRange;

/// Header positions derived from per-group item counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupIndices {
    indices: Vec<usize>,
    counts: Vec<usize>,
    /// Data index of the first item of each group (`indices[g] - g`).
    item_starts: Vec<usize>,
    total: usize,
}

impl GroupIndices {
    /// Derive header positions from the item count of every group.
    #[must_use]
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut indices = Vec::with_capacity(counts.len());
        let mut item_starts = Vec::with_capacity(counts.len());
        let mut total = 0usize;
        for (group, &count) in counts.iter().enumerate() {
            indices.push(total);
            item_starts.push(total - group);
            total += count + 1;
        }
        Self {
            indices,
            counts: counts.to_vec(),
            item_starts,
            total,
        }
    }

    /// Flat index of every group header.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Item count of every group.
    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.counts.len()
    }

    /// Whether there are no groups at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Length of the flat sequence: every item plus one header per group.
    #[must_use]
    pub fn total_flat_count(&self) -> usize {
        self.total
    }

    /// Number of data items, headers excluded.
    #[must_use]
    pub fn data_count(&self) -> usize {
        self.total - self.group_count()
    }

    /// Whether `flat` is a group header.
    #[must_use]
    pub fn is_header(&self, flat: usize) -> bool {
        self.indices.binary_search(&flat).is_ok()
    }

    /// Group whose header is the last one at or before `flat`.
    #[must_use]
    pub fn group_of(&self, flat: usize) -> Option<usize> {
        self.indices
            .partition_point(|&header| header <= flat)
            .checked_sub(1)
    }

    /// Flat index of the header of `group`.
    #[must_use]
    pub fn header_of(&self, group: usize) -> Option<usize> {
        self.indices.get(group).copied()
    }

    /// Data index of the first item of `group`.
    #[must_use]
    pub fn item_start(&self, group: usize) -> Option<usize> {
        self.item_starts.get(group).copied()
    }

    /// Group containing the data item `item`. Empty groups never contain
    /// anything, so the last group starting at or before `item` wins.
    #[must_use]
    pub fn group_of_item(&self, item: usize) -> Option<usize> {
        self.item_starts
            .partition_point(|&start| start <= item)
            .checked_sub(1)
    }

    /// Flat index of the data item `item`, skipping every header before it.
    #[must_use]
    pub fn flat_from_item(&self, item: usize) -> usize {
        let headers_before = self.item_starts.partition_point(|&start| start <= item);
        item + headers_before
    }

    /// Data index at `flat`, `None` for a header.
    #[must_use]
    pub fn item_from_flat(&self, flat: usize) -> Option<usize> {
        if self.is_header(flat) {
            return None;
        }
        let group = self.group_of(flat)?;
        Some(flat - group - 1)
    }

    /// Size ranges alternating `header_size` and `item_size` across every
    /// group; the last range is unbounded.
    #[must_use]
    pub fn seed_ranges(&self, header_size: f64, item_size: f64) -> Vec<SizeRange> {
        let mut ranges = Vec::with_capacity(self.group_count() * 2);
        for (&header, &count) in self.indices.iter().zip(&self.counts) {
            ranges.push(SizeRange::single(header, header_size));
            if count > 0 {
                ranges.push(SizeRange::new(header + 1, header + count, item_size));
            }
        }
        if let Some(last) = ranges.last_mut() {
            last.end_index = SizeRange::UNBOUNDED;
        }
        ranges
    }

    /// Turn the very first measurement of a grouped list into alternating
    /// header and item ranges.
    ///
    /// Returns `None` unless the report names both a header size and an
    /// item size.
    #[must_use]
    pub fn seed_from_report(&self, report: &[SizeRange]) -> Option<Vec<SizeRange>> {
        let mut header_size = None;
        let mut item_size = None;
        for range in report {
            for index in range.start_index..=range.end_index.min(range.start_index.saturating_add(1)) {
                if self.is_header(index) {
                    header_size.get_or_insert(range.size);
                } else {
                    item_size.get_or_insert(range.size);
                }
            }
        }
        Some(self.seed_ranges(header_size?, item_size?))
    }
}
