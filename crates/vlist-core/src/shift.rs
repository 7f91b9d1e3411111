#![forbid(unsafe_code)]

//! Re-keying measured sizes when items are added or dropped at the front.
//!
//! Changing the host's first item index moves every known measurement. The
//! functions here never touch a store: they return the size ranges of the
//! re-keyed store, which the caller replays into a fresh [`SizeStore`] via
//! [`SizeStore::from_ranges`]. Every measurement whose item survives the
//! shift is carried over to the item's new index.

use crate::groups::GroupIndices;
use crate::range::SizeRange;
use crate::size_store::SizeStore;

/// Ranges for a flat list after `count` items were prepended.
///
/// The new head `[0, count)` takes the size of the former first item.
#[must_use]
pub fn unshift_ranges(store: &SizeStore, count: usize) -> Vec<SizeRange> {
    let Some(head_size) = store.query(0) else {
        return Vec::new();
    };
    let mut ranges = Vec::with_capacity(store.range_count() + 1);
    if count > 0 {
        ranges.push(SizeRange::new(0, count - 1, head_size));
    }
    ranges.extend(store.ranges().into_iter().map(|range| SizeRange {
        start_index: range.start_index + count,
        end_index: if range.is_unbounded() {
            SizeRange::UNBOUNDED
        } else {
            range.end_index + count
        },
        size: range.size,
    }));
    ranges
}

/// Ranges for a flat list after `count` items were dropped from the front.
#[must_use]
pub fn shift_ranges(store: &SizeStore, count: usize) -> Vec<SizeRange> {
    store
        .ranges()
        .into_iter()
        .filter(|range| range.is_unbounded() || range.end_index >= count)
        .map(|range| SizeRange {
            start_index: range.start_index.saturating_sub(count),
            end_index: if range.is_unbounded() {
                SizeRange::UNBOUNDED
            } else {
                range.end_index - count
            },
            size: range.size,
        })
        .collect()
}

/// Ranges for a grouped list whose layout changed from `old` to `new`.
///
/// `item_delta` is how many data items were prepended (negative when items
/// were dropped from the front). Groups are matched from the end, so a
/// header keeps its size as long as its group survives. Headers of groups
/// that did not exist before take the size of the old first header, and
/// items that did not exist before take the size of the old first item.
/// Item sizes are copied run by run, which keeps partially shifted groups
/// exact.
#[must_use]
pub fn regroup_ranges(
    store: &SizeStore,
    old: &GroupIndices,
    new: &GroupIndices,
    item_delta: isize,
) -> Vec<SizeRange> {
    let Some(first_size) = store.query(0) else {
        return Vec::new();
    };
    let header_estimate = old
        .header_of(0)
        .and_then(|header| store.query(header))
        .unwrap_or(first_size);
    let item_estimate = if old.data_count() > 0 {
        store.query(old.flat_from_item(0)).unwrap_or(first_size)
    } else {
        first_size
    };
    let group_shift = new.group_count() as isize - old.group_count() as isize;
    let old_data_count = old.data_count();

    let mut ranges = Vec::new();
    for (group, (&header, &count)) in new.indices().iter().zip(new.counts()).enumerate() {
        let old_group = group as isize - group_shift;
        let header_size = usize::try_from(old_group)
            .ok()
            .and_then(|g| old.header_of(g))
            .and_then(|h| store.query(h))
            .unwrap_or(header_estimate);
        ranges.push(SizeRange::single(header, header_size));
        if count == 0 {
            continue;
        }

        let first_data = header - group;
        let end_data = first_data + count;
        let mut data = first_data;
        while data < end_data {
            let flat = data + group + 1;
            let old_data = data as isize - item_delta;
            if old_data < 0 {
                // Prepended items that have never been measured.
                let fresh_end = end_data.min((data as isize - old_data) as usize);
                ranges.push(SizeRange::new(flat, flat + (fresh_end - data) - 1, item_estimate));
                data = fresh_end;
                continue;
            }
            let old_data = old_data as usize;
            let Some(source) = old
                .group_of_item(old_data)
                .filter(|_| old_data < old_data_count)
            else {
                ranges.push(SizeRange::new(flat, flat + (end_data - data) - 1, item_estimate));
                break;
            };
            let source_end = old
                .item_start(source)
                .map_or(old_data + 1, |start| start + old.counts()[source]);
            let run = (end_data - data).min(source_end - old_data);
            let old_flat = old_data + source + 1;
            copy_run(store, old_flat, flat, run, &mut ranges);
            data += run;
        }
    }
    if let Some(last) = ranges.last_mut() {
        last.end_index = SizeRange::UNBOUNDED;
    }
    ranges
}

/// Append the stored sizes of `[from, from + len)` re-keyed to start at `to`.
fn copy_run(store: &SizeStore, from: usize, to: usize, len: usize, out: &mut Vec<SizeRange>) {
    let last = from + len - 1;
    for range in store.ranges_within(from, last) {
        let start = range.start_index.max(from);
        let end = range.end_index.min(last);
        out.push(SizeRange::new(to + (start - from), to + (end - from), range.size));
    }
}

/// Map a flat index across a layout change, `None` when the row was dropped.
///
/// Headers follow their group (matched from the end); items follow their
/// data index shifted by `item_delta`.
#[must_use]
pub fn remap_flat_index(
    flat: usize,
    old: Option<&GroupIndices>,
    new: Option<&GroupIndices>,
    item_delta: isize,
) -> Option<usize> {
    match (old, new) {
        (Some(old), Some(new)) => {
            let group_shift = new.group_count() as isize - old.group_count() as isize;
            match old.item_from_flat(flat) {
                Some(item) => {
                    let item = usize::try_from(item as isize + item_delta).ok()?;
                    (item < new.data_count()).then(|| new.flat_from_item(item))
                }
                None => {
                    let group = old.group_of(flat)? as isize + group_shift;
                    new.header_of(usize::try_from(group).ok()?)
                }
            }
        }
        _ => usize::try_from(flat as isize + item_delta).ok(),
    }
}

/// Scroll adjustment that keeps an anchor row visually in place when its
/// offset moves from `old_offset` to `new_offset`.
#[must_use]
pub fn compensating_delta(old_offset: f64, new_offset: f64) -> f64 {
    new_offset - old_offset
}

/// Result of planning a front shift.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftPlan {
    /// Ranges of the re-keyed store.
    pub ranges: Vec<SizeRange>,
    /// Item count change at the front, positive for a prepend.
    pub item_delta: isize,
}

impl ShiftPlan {
    /// Plan a shift of a flat list.
    #[must_use]
    pub fn flat(store: &SizeStore, item_delta: isize) -> Self {
        let ranges = if item_delta >= 0 {
            unshift_ranges(store, item_delta.unsigned_abs())
        } else {
            shift_ranges(store, item_delta.unsigned_abs())
        };
        Self { ranges, item_delta }
    }

    /// Plan a shift of a grouped list.
    #[must_use]
    pub fn grouped(
        store: &SizeStore,
        old: &GroupIndices,
        new: &GroupIndices,
        item_delta: isize,
    ) -> Self {
        Self {
            ranges: regroup_ranges(store, old, new, item_delta),
            item_delta,
        }
    }
}
