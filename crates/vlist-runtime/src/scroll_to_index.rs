#![forbid(unsafe_code)]

//! Scroll-to-index requests and their convergence state machine.
//!
//! Jumping to an item uses the sizes known at request time. Landing there
//! renders items that were never measured, and their real sizes can move
//! the target. [`ScrollToIndexController`] tracks one request at a time and
//! decides, after each settle window, whether the jump has to be re-issued.
//!
//! # State machine
//!
//! ```text
//! Idle ──request──▶ Pending ──settle window w/o change──▶ Converged
//!                      │  ▲
//!     settle window    │  │ re-issued
//!     with a change    ▼  │
//!                    Retrying
//!
//! Pending/Retrying ──watchdog | newer request | list emptied──▶ Cancelled
//! ```
//!
//! # Invariants
//!
//! 1. At most one request is active; a new one supersedes the old one.
//! 2. A retry happens at most once per settle window, however many
//!    measurements arrived inside it.
//! 3. The watchdog is counted from the original request and is never reset
//!    by retries.

use vlist_core::{GroupIndices, OffsetIndex};
use web_time::{Duration, Instant};

/// Which row a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ScrollIndex {
    /// A data item, by zero-based data index.
    Item(usize),
    /// The last row of the list.
    Last,
    /// The header of a group.
    Group(usize),
}

/// Where the target row ends up in the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Align {
    /// Row top at the viewport top, below any pinned rows.
    #[default]
    Start,
    /// Row centred in the viewport.
    Center,
    /// Row bottom at the viewport bottom.
    End,
}

/// How the container should scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Behavior {
    /// Jump immediately.
    #[default]
    Auto,
    /// Animate.
    Smooth,
}

/// A scroll-to-index request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct IndexLocation {
    /// Target row.
    pub index: ScrollIndex,
    /// Alignment in the viewport.
    pub align: Align,
    /// Scroll behaviour.
    pub behavior: Behavior,
    /// Extra pixels added to the computed target.
    pub offset: f64,
}

impl IndexLocation {
    /// Start-aligned, immediate jump to a data item.
    #[must_use]
    pub const fn item(index: usize) -> Self {
        Self {
            index: ScrollIndex::Item(index),
            align: Align::Start,
            behavior: Behavior::Auto,
            offset: 0.0,
        }
    }

    /// Jump to the last row.
    #[must_use]
    pub const fn last() -> Self {
        Self {
            index: ScrollIndex::Last,
            ..Self::item(0)
        }
    }

    /// Jump to a group header.
    #[must_use]
    pub const fn group(group: usize) -> Self {
        Self {
            index: ScrollIndex::Group(group),
            ..Self::item(0)
        }
    }

    /// Set the alignment.
    #[must_use]
    pub const fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    /// Set the behaviour.
    #[must_use]
    pub const fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Add a pixel offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

impl From<usize> for IndexLocation {
    fn from(index: usize) -> Self {
        Self::item(index)
    }
}

/// Resolved request: the flat row and the pixel scroll top to go to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTarget {
    /// Flat index of the target row.
    pub flat_index: usize,
    /// Scroll top to issue.
    pub top: f64,
    /// Scroll behaviour.
    pub behavior: Behavior,
}

/// Everything [`resolve_target`] reads.
#[derive(Debug, Clone, Copy)]
pub struct TargetContext<'a> {
    /// Length of the flat sequence.
    pub total_count: usize,
    /// Group layout, `None` for a flat list.
    pub groups: Option<&'a GroupIndices>,
    /// Offsets of the current size store.
    pub offsets: &'a OffsetIndex,
    /// Visible height.
    pub viewport_height: f64,
    /// Height of the pinned rows.
    pub top_list_height: f64,
    /// Largest reachable scroll top, when known.
    pub max_scroll_top: Option<f64>,
}

/// Flat index a location points at, clamped to the list.
#[must_use]
pub fn resolve_flat_index(
    index: ScrollIndex,
    total_count: usize,
    groups: Option<&GroupIndices>,
) -> Option<usize> {
    let last = total_count.checked_sub(1)?;
    let flat = match (index, groups) {
        (ScrollIndex::Last, _) => last,
        (ScrollIndex::Item(item), Some(groups)) => match groups.data_count().checked_sub(1) {
            Some(last_item) => groups.flat_from_item(item.min(last_item)),
            None => 0,
        },
        (ScrollIndex::Item(item), None) => item,
        (ScrollIndex::Group(group), Some(groups)) => groups
            .header_of(group.min(groups.group_count().saturating_sub(1)))
            .unwrap_or(0),
        (ScrollIndex::Group(_), None) => 0,
    };
    Some(flat.min(last))
}

/// Compute the scroll top for `location`; `None` for an empty list.
#[must_use]
pub fn resolve_target(location: &IndexLocation, ctx: &TargetContext<'_>) -> Option<ScrollTarget> {
    let flat_index = resolve_flat_index(location.index, ctx.total_count, ctx.groups)?;
    let item_top = ctx.offsets.offset_of(flat_index);
    let size = ctx.offsets.size_of(flat_index).unwrap_or(0.0);
    let mut top = match location.align {
        Align::Start => item_top - ctx.top_list_height,
        Align::End => item_top - ctx.viewport_height + size,
        Align::Center => item_top - ctx.viewport_height / 2.0 + size / 2.0,
    };
    top += location.offset;
    if let Some(max) = ctx.max_scroll_top {
        top = top.min(max);
    }
    Some(ScrollTarget {
        flat_index,
        top: top.max(0.0),
        behavior: location.behavior,
    })
}

/// Why a request ended without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer request replaced it.
    Superseded,
    /// The watchdog expired.
    TimedOut,
    /// The list became empty.
    ListEmptied,
}

/// Phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerPhase {
    /// No request.
    #[default]
    Idle,
    /// Issued once, waiting for the list to settle.
    Pending,
    /// Re-issued at least once.
    Retrying,
    /// The last request landed.
    Converged,
    /// The last request was abandoned.
    Cancelled,
}

/// What the owner of the controller has to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerEvent {
    /// Recompute the target and issue it again.
    Retry(IndexLocation),
    /// The request landed.
    Converged(IndexLocation),
    /// The request was abandoned.
    Cancelled(IndexLocation, CancelReason),
}

#[derive(Debug, Clone, Copy)]
struct ActiveRequest {
    location: IndexLocation,
    requested_at: Instant,
    issued_top: Option<f64>,
    settle_deadline: Option<Instant>,
    awaiting_refresh: bool,
    list_changed: bool,
    smooth_finished: bool,
    retries: u32,
}

/// Convergence state machine for one scroll-to-index request at a time.
#[derive(Debug, Clone)]
pub struct ScrollToIndexController {
    phase: ControllerPhase,
    active: Option<ActiveRequest>,
    settle: Duration,
    watchdog: Duration,
}

impl ScrollToIndexController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(settle: Duration, watchdog: Duration) -> Self {
        Self {
            phase: ControllerPhase::Idle,
            active: None,
            settle,
            watchdog,
        }
    }

    /// Replace the timings; applies to the next settle window.
    pub fn set_timings(&mut self, settle: Duration, watchdog: Duration) {
        self.settle = settle;
        self.watchdog = watchdog;
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    /// Whether a request is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The in-flight request.
    #[must_use]
    pub fn active_location(&self) -> Option<IndexLocation> {
        self.active.map(|a| a.location)
    }

    /// Scroll top issued for the in-flight request.
    #[must_use]
    pub fn issued_top(&self) -> Option<f64> {
        self.active.and_then(|a| a.issued_top)
    }

    /// Retries performed for the in-flight request.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.active.map_or(0, |a| a.retries)
    }

    /// Start tracking `location`. Returns the superseded request, if any.
    pub fn request(&mut self, location: IndexLocation, now: Instant) -> Option<ControllerEvent> {
        let superseded = self
            .active
            .take()
            .map(|old| ControllerEvent::Cancelled(old.location, CancelReason::Superseded));
        self.active = Some(ActiveRequest {
            location,
            requested_at: now,
            issued_top: None,
            settle_deadline: None,
            awaiting_refresh: false,
            list_changed: false,
            smooth_finished: false,
            retries: 0,
        });
        self.phase = ControllerPhase::Pending;
        superseded
    }

    /// Record the scroll top that was sent to the container.
    ///
    /// The settle window opens with the next list refresh.
    pub fn issued(&mut self, top: f64) {
        if let Some(active) = self.active.as_mut() {
            if active.issued_top.is_some() {
                active.retries += 1;
                self.phase = ControllerPhase::Retrying;
            }
            active.issued_top = Some(top);
            active.settle_deadline = None;
            active.awaiting_refresh = true;
            active.list_changed = false;
            active.smooth_finished = false;
        }
    }

    /// The list was recomputed; `changed` when measurements moved offsets.
    pub fn on_list_refresh(&mut self, changed: bool, now: Instant) {
        let settle = self.settle;
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.awaiting_refresh {
            return;
        }
        active.list_changed |= changed;
        if active.location.behavior == Behavior::Auto && active.settle_deadline.is_none() {
            active.settle_deadline = Some(now + settle);
        }
    }

    /// The container finished a smooth scroll animation.
    pub fn on_smooth_scroll_finished(&mut self, now: Instant) {
        if let Some(active) = self.active.as_mut()
            && active.location.behavior == Behavior::Smooth
            && active.issued_top.is_some()
        {
            active.smooth_finished = true;
            active.awaiting_refresh = true;
            if active.settle_deadline.is_none() {
                active.settle_deadline = Some(now);
            }
        }
    }

    /// Abandon the in-flight request.
    pub fn cancel(&mut self, reason: CancelReason) -> Option<ControllerEvent> {
        let active = self.active.take()?;
        self.phase = ControllerPhase::Cancelled;
        Some(ControllerEvent::Cancelled(active.location, reason))
    }

    /// Mark the in-flight request as converged without waiting.
    pub fn converge(&mut self) -> Option<ControllerEvent> {
        let active = self.active.take()?;
        self.phase = ControllerPhase::Converged;
        Some(ControllerEvent::Converged(active.location))
    }

    /// Apply the watchdog and close an elapsed settle window.
    pub fn tick(&mut self, now: Instant) -> Option<ControllerEvent> {
        let active = self.active?;
        if now.saturating_duration_since(active.requested_at) >= self.watchdog {
            return self.cancel(CancelReason::TimedOut);
        }
        let deadline = active.settle_deadline?;
        if now < deadline {
            return None;
        }
        if active.location.behavior == Behavior::Smooth && !active.smooth_finished {
            return None;
        }
        if active.list_changed {
            if let Some(active) = self.active.as_mut() {
                active.settle_deadline = None;
                active.awaiting_refresh = false;
            }
            Some(ControllerEvent::Retry(active.location))
        } else {
            self.converge()
        }
    }

    /// Earliest instant at which [`tick`](Self::tick) may produce an event.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let active = self.active?;
        let watchdog = active.requested_at + self.watchdog;
        Some(match active.settle_deadline {
            Some(settle) => settle.min(watchdog),
            None => watchdog,
        })
    }
}
