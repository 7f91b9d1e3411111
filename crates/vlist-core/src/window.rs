#![forbid(unsafe_code)]

//! Visible window calculation.
//!
//! [`compute_window`] turns an [`OffsetIndex`], a pixel boundary and the item
//! count into the ordered descriptors the host has to materialize, plus the
//! leading and trailing padding that stands in for everything else.
//!
//! # Invariants
//!
//! 1. Body descriptors are contiguous in flat index order.
//! 2. The first body descriptor's bottom edge lies below the boundary top,
//!    and every body descriptor starts above the boundary bottom.
//! 3. `offset_top + rendered extent + offset_bottom == total_size` whenever
//!    the window is not a probe.
//! 4. No descriptor ever names a flat index `>= total_count`.
//!
//! # Performance
//!
//! Cost is O(log r + rendered items): the start index inside a range is
//! computed arithmetically, never by scanning.

use crate::groups::GroupIndices;
use crate::offset_index::OffsetIndex;

/// Cap on how many consecutive zero-sized items a single range may render.
const ZERO_SIZED_RUN_LIMIT: usize = 16;

/// Last observed scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ScrollDirection {
    /// Scroll top decreased.
    Up,
    /// Scroll top increased. Also the initial direction.
    #[default]
    Down,
    /// No sample arrived for a while.
    None,
}

/// What a descriptor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A data item.
    Item,
    /// A synthetic group header row.
    Group,
}

/// One row the host has to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemDescriptor {
    /// Item or group header.
    pub kind: ItemKind,
    /// Position in the flat sequence (headers included).
    pub flat_index: usize,
    /// Host-facing index: `first_item_index` plus the data index for items,
    /// the group number for headers.
    pub display_index: usize,
    /// Group the row belongs to, when grouping is active.
    pub group_index: Option<usize>,
    /// Pixel offset of the row.
    pub offset: f64,
    /// Known size of the row; `0.0` for a probe.
    pub size: f64,
}

/// Output of one window pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderWindow {
    /// Scrollable rows.
    pub items: Vec<ItemDescriptor>,
    /// Pinned rows; offsets are relative to the pinned area.
    pub top_items: Vec<ItemDescriptor>,
    /// Height of the pinned area.
    pub top_list_height: f64,
    /// Padding before the first rendered row.
    pub offset_top: f64,
    /// Padding after the last rendered row.
    pub offset_bottom: f64,
    /// Height of the whole sequence.
    pub total_size: f64,
    /// Length of the flat sequence.
    pub total_count: usize,
    /// Host index of the first logical item.
    pub first_item_index: usize,
    /// The window holds unmeasured rows rendered only to be measured.
    pub probe: bool,
}

impl RenderWindow {
    /// A window with nothing to render.
    #[must_use]
    pub fn empty(first_item_index: usize) -> Self {
        Self {
            first_item_index,
            ..Self::default()
        }
    }

    /// Whether the window renders no row at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.top_items.is_empty()
    }

    /// Flat index of the first body row.
    #[must_use]
    pub fn first_flat_index(&self) -> Option<usize> {
        self.items.first().map(|item| item.flat_index)
    }

    /// Flat index of the last body row.
    #[must_use]
    pub fn last_flat_index(&self) -> Option<usize> {
        self.items.last().map(|item| item.flat_index)
    }

    /// Pixel extent `[top, bottom]` covered by the body rows.
    #[must_use]
    pub fn covered(&self) -> Option<(f64, f64)> {
        let first = self.items.first()?;
        let last = self.items.last()?;
        Some((first.offset, last.offset + last.size))
    }

    /// Body descriptor at `flat`, if rendered.
    #[must_use]
    pub fn find(&self, flat: usize) -> Option<&ItemDescriptor> {
        self.items.iter().find(|item| item.flat_index == flat)
    }
}

/// Pinned rows rendered outside the scrollable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopItems {
    /// Nothing pinned.
    #[default]
    None,
    /// The first `n` flat rows.
    Leading(usize),
    /// The header at this flat index, kept as a sticky group header.
    StickyGroup(usize),
}

/// Pixel range the body has to cover.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ListBoundary {
    /// Top edge, never negative.
    pub top: f64,
    /// Bottom edge.
    pub bottom: f64,
}

/// Extra pixels rendered beyond the viewport, split by scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Overscan {
    /// Pixels in the direction of scrolling.
    pub main: f64,
    /// Pixels against the direction of scrolling.
    pub reverse: f64,
}

impl Overscan {
    /// The same overscan in both directions.
    #[must_use]
    pub const fn uniform(px: f64) -> Self {
        Self {
            main: px,
            reverse: px,
        }
    }
}

/// Unconditional viewport expansion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ViewportIncrease {
    /// Pixels added above the viewport.
    pub top: f64,
    /// Pixels added below the viewport.
    pub bottom: f64,
}

/// Minimum number of items rendered beyond each viewport edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MinOverscanItemCount {
    /// Items above the viewport.
    pub top: usize,
    /// Items below the viewport.
    pub bottom: usize,
}

/// Everything that widens the boundary around the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundaryConfig {
    /// Directional overscan.
    pub overscan: Overscan,
    /// Unconditional expansion.
    pub increase_viewport_by: ViewportIncrease,
    /// Item-count floor, converted to pixels with an estimated item size.
    pub min_overscan_item_count: MinOverscanItemCount,
}

/// Expand the viewport `[scroll_top, scroll_top + viewport_height]` into the
/// boundary the body must cover.
///
/// Overscan `main` goes to the edge the list is scrolling towards. The
/// item-count floor is `count * estimated_item_size` pixels and only applies
/// when it exceeds the pixel expansion.
#[must_use]
pub fn expand_boundary(
    scroll_top: f64,
    viewport_height: f64,
    direction: ScrollDirection,
    config: &BoundaryConfig,
    estimated_item_size: f64,
) -> ListBoundary {
    let Overscan { main, reverse } = config.overscan;
    let (top_overscan, bottom_overscan) = match direction {
        ScrollDirection::Up => (main, reverse),
        ScrollDirection::Down | ScrollDirection::None => (reverse, main),
    };
    let floor = config.min_overscan_item_count;
    let top_extra = (top_overscan + config.increase_viewport_by.top)
        .max(floor.top as f64 * estimated_item_size);
    let bottom_extra = (bottom_overscan + config.increase_viewport_by.bottom)
        .max(floor.bottom as f64 * estimated_item_size);
    ListBoundary {
        top: (scroll_top - top_extra).max(0.0),
        bottom: scroll_top + viewport_height + bottom_extra,
    }
}

/// Whether `window` stopped covering the viewport and a new boundary is due.
///
/// The pinned area hides the top `top_list_height` pixels of the viewport, so
/// the body only has to start below it. Reaching the last item satisfies the
/// bottom edge regardless of the viewport.
#[must_use]
pub fn needs_new_boundary(window: &RenderWindow, scroll_top: f64, viewport_height: f64) -> bool {
    if window.probe {
        return true;
    }
    let Some((covered_top, covered_bottom)) = window.covered() else {
        return window.total_count > 0;
    };
    let top_ok = covered_top <= scroll_top.max(0.0) + window.top_list_height;
    let reached_end = window
        .last_flat_index()
        .is_some_and(|last| last + 1 >= window.total_count);
    let bottom_ok = reached_end || covered_bottom >= scroll_top + viewport_height;
    !(top_ok && bottom_ok)
}

/// Inputs of one window pass.
#[derive(Debug, Clone, Copy)]
pub struct WindowInput<'a> {
    /// Length of the flat sequence (headers included).
    pub total_count: usize,
    /// Offsets of the current size store.
    pub offsets: &'a OffsetIndex,
    /// Group layout, `None` for a flat list.
    pub groups: Option<&'a GroupIndices>,
    /// Pixel range to cover; `None` while the viewport is unknown.
    pub boundary: Option<ListBoundary>,
    /// Pinned rows.
    pub top_items: TopItems,
    /// Host index of the first logical item.
    pub first_item_index: usize,
    /// Flat index probed while nothing is measured.
    pub probe_index: usize,
}

/// Compute the rows to render.
#[must_use]
pub fn compute_window(input: &WindowInput<'_>) -> RenderWindow {
    let total_count = input.total_count;
    if total_count == 0 {
        return RenderWindow::empty(input.first_item_index);
    }
    if input.offsets.is_empty() {
        return probe_window(input);
    }

    let total_size = input.offsets.total_size(total_count);
    let (top_items, min_start) = pinned_items(input);
    let top_list_height = top_items.last().map_or(0.0, |d| d.offset + d.size);

    let items = match input.boundary {
        Some(boundary) => {
            let mut items = walk(input, boundary.top, boundary.bottom, min_start);
            if items.is_empty() && boundary.top >= total_size {
                // Scrolled past a shrunken list: show its tail instead.
                let height = (boundary.bottom - boundary.top).max(0.0);
                items = walk(input, (total_size - height).max(0.0), total_size, min_start);
            }
            items
        }
        None => Vec::new(),
    };

    let offset_top = items.first().map_or(0.0, |d| d.offset);
    let offset_bottom = items
        .last()
        .map_or(total_size, |d| (total_size - (d.offset + d.size)).max(0.0));

    RenderWindow {
        items,
        top_items,
        top_list_height,
        offset_top,
        offset_bottom,
        total_size,
        total_count,
        first_item_index: input.first_item_index,
        probe: false,
    }
}

fn describe(input: &WindowInput<'_>, flat: usize, offset: f64, size: f64) -> ItemDescriptor {
    let (kind, display_index, group_index) = match input.groups {
        Some(groups) => {
            let group = groups.group_of(flat).unwrap_or(0);
            if groups.is_header(flat) {
                (ItemKind::Group, group, Some(group))
            } else {
                let data_index = flat - group - 1;
                (
                    ItemKind::Item,
                    input.first_item_index + data_index,
                    Some(group),
                )
            }
        }
        None => (ItemKind::Item, input.first_item_index + flat, None),
    };
    ItemDescriptor {
        kind,
        flat_index: flat,
        display_index,
        group_index,
        offset,
        size,
    }
}

fn probe_window(input: &WindowInput<'_>) -> RenderWindow {
    let index = input.probe_index.min(input.total_count - 1);
    let mut flats = Vec::with_capacity(2);
    if let Some(groups) = input.groups
        && let Some(header) = groups.group_of(index).and_then(|g| groups.header_of(g))
    {
        // Measure a header and an item together so both sizes seed the store.
        flats.push(header);
        let item = if index == header { header + 1 } else { index };
        if item < input.total_count && !groups.is_header(item) {
            flats.push(item);
        }
    } else {
        flats.push(index);
    }
    RenderWindow {
        items: flats
            .into_iter()
            .map(|flat| describe(input, flat, 0.0, 0.0))
            .collect(),
        total_count: input.total_count,
        first_item_index: input.first_item_index,
        probe: true,
        ..RenderWindow::default()
    }
}

fn pinned_items(input: &WindowInput<'_>) -> (Vec<ItemDescriptor>, usize) {
    let offsets = input.offsets;
    match input.top_items {
        TopItems::None => (Vec::new(), 0),
        TopItems::Leading(count) => {
            let count = count.min(input.total_count);
            let items = (0..count)
                .map(|flat| {
                    let size = offsets.size_of(flat).unwrap_or(0.0);
                    describe(input, flat, offsets.offset_of(flat), size)
                })
                .collect();
            (items, count)
        }
        TopItems::StickyGroup(header) => {
            let is_header = input.groups.is_some_and(|g| g.is_header(header));
            if !is_header || header >= input.total_count {
                return (Vec::new(), 0);
            }
            let size = offsets.size_of(header).unwrap_or(0.0);
            (vec![describe(input, header, 0.0, size)], header + 1)
        }
    }
}

fn walk(input: &WindowInput<'_>, low: f64, high: f64, min_start: usize) -> Vec<ItemDescriptor> {
    let last_index = input.total_count - 1;
    let mut items = Vec::new();
    if min_start > last_index {
        return items;
    }
    let gap = input.offsets.gap();

    for range in input.offsets.ranges_within_offsets(low, high, min_start) {
        let size = range.point.size;
        let step = size + gap;
        let mut index = range.start.max(min_start);
        if index > range.end {
            continue;
        }
        let mut offset = range.point.offset + (index - range.start) as f64 * step;

        if offset < low {
            if step <= 0.0 {
                continue;
            }
            // Items whose bottom edge is at or above `low` are not visible.
            let skip = ((low - offset + gap) / step).floor() as usize;
            let room = range.end - index;
            if skip > room {
                continue;
            }
            index += skip;
            offset += skip as f64 * step;
        }

        let mut zero_run = 0usize;
        while index <= range.end && index <= last_index {
            if offset >= high {
                return items;
            }
            if step <= 0.0 {
                zero_run += 1;
                if zero_run > ZERO_SIZED_RUN_LIMIT {
                    break;
                }
            }
            items.push(describe(input, index, offset, size));
            offset += step;
            index += 1;
        }
        if index > last_index {
            break;
        }
    }
    items
}
