#![forbid(unsafe_code)]

//! Turning per-row measurements into size reports.

use vlist_core::{SizeRange, compress_measurements};

/// Compress `(flat_index, size)` measurements into size ranges.
///
/// Measurements are sorted and deduplicated first (the last size reported
/// for an index wins), so callers can pass rows in render order.
#[must_use]
pub fn compress_sizes(measurements: impl IntoIterator<Item = (usize, f64)>) -> Vec<SizeRange> {
    let mut rows: Vec<(usize, f64)> = measurements.into_iter().collect();
    rows.sort_by_key(|&(index, _)| index);
    rows.reverse();
    rows.dedup_by_key(|row| row.0);
    rows.reverse();
    compress_measurements(&rows)
}
