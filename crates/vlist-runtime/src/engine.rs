#![forbid(unsafe_code)]

//! The virtualization engine.
//!
//! [`Engine`] owns the size store, the offset index, the scroll flags and the
//! scroll-to-index controller of one list. Hosts feed it events through the
//! setters below and drain [`Output`]s after each call.
//!
//! # Update order
//!
//! Every inbound call ends in one commit that runs, in this order:
//!
//! 1. measured sizes are applied to the store (in the index space they were
//!    measured in),
//! 2. a pending front shift re-keys the store and compensates the scroll
//!    position,
//! 3. count changes are applied and the store tail truncated,
//! 4. the offset index is rebuilt from the earliest changed index,
//! 5. one window pass runs and its result is emitted if it differs from the
//!    last emitted window.
//!
//! [`Engine::batch`] defers the commit to the end of the closure. A front
//! shift outside a batch without the matching count leaves the engine in a
//! partial state: step 5 is skipped until the count arrives.
//!
//! # Time
//!
//! Methods ending in `_at` take the current instant explicitly; the others
//! reuse the last instant the engine saw. Hosts schedule one timer for
//! [`Engine::next_deadline`] and call [`Engine::tick_at`] when it fires.

use std::collections::VecDeque;

use vlist_core::{
    GroupIndices, ListBoundary, MinOverscanItemCount, OffsetIndex, Overscan, RenderWindow,
    ScrollDirection, ShiftPlan, SizeRange, SizeStore, TopItems, ViewportIncrease, WindowInput,
    compensating_delta, compute_window, expand_boundary, needs_new_boundary, remap_flat_index,
};
use web_time::Instant;

use crate::config::{EngineConfig, ScrollTimings, check_px};
use crate::diagnostics::{DiagnosticSink, LogLevel, Logger, TracingSink};
use crate::persistence::StateSnapshot;
use crate::scroll_state::{AtBottomState, FlagChanges, ScrollSample, ScrollStateFlags};
use crate::scroll_to_index::{
    Behavior, CancelReason, ControllerEvent, ControllerPhase, IndexLocation,
    ScrollToIndexController, TargetContext, resolve_flat_index, resolve_target,
};

/// Scroll positions closer than this are treated as equal.
const SCROLL_EPSILON: f64 = 0.5;

/// Something the host has to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Render these rows.
    RenderWindow(RenderWindow),
    /// Scroll the container to an absolute position.
    ScrollTo {
        /// Target scroll top.
        top: f64,
        /// How to get there.
        behavior: Behavior,
    },
    /// Scroll the container by a relative amount.
    ScrollBy {
        /// Pixels to add to the scroll top.
        top: f64,
        /// How to get there.
        behavior: Behavior,
    },
    /// The at-bottom flag flipped.
    AtBottomStateChanged(AtBottomState),
    /// The at-top flag flipped.
    AtTopStateChanged(bool),
    /// Scrolling started or stopped.
    ScrollingChanged(bool),
    /// The scroll direction changed.
    ScrollDirectionChanged(ScrollDirection),
    /// A new velocity sample, `0.0` once scrolling stops.
    ScrollVelocityChanged(f64),
    /// A scroll-to-index request landed.
    ScrollToIndexConverged {
        /// The request.
        location: IndexLocation,
    },
    /// A scroll-to-index request was abandoned.
    ScrollToIndexCancelled {
        /// The request.
        location: IndexLocation,
        /// Why it was abandoned.
        reason: CancelReason,
    },
}

/// Changes recorded since the last commit.
#[derive(Debug, Default)]
struct PendingChanges {
    sizes: Vec<SizeRange>,
    first_item_index: Option<usize>,
    total_count: Option<usize>,
    group_counts: Option<Vec<usize>>,
    /// Anything other than a plain scroll happened.
    structural: bool,
}

/// Incremental list virtualization engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    logger: Logger,
    store: SizeStore,
    offsets: OffsetIndex,
    pending_sync: Option<usize>,
    total_count: usize,
    groups: Option<GroupIndices>,
    first_item_index: usize,
    viewport: Option<ScrollSample>,
    scroll_top: f64,
    boundary: Option<ListBoundary>,
    flags: ScrollStateFlags,
    controller: ScrollToIndexController,
    window: RenderWindow,
    last_emitted: Option<RenderWindow>,
    outputs: VecDeque<Output>,
    pending: PendingChanges,
    batch_depth: usize,
    awaiting_count: bool,
    initial_scroll_done: bool,
    clock: Option<Instant>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create an engine that logs through `tracing`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sink(config, Box::new(TracingSink))
    }

    /// Create an engine that reports diagnostics to `sink`.
    #[must_use]
    pub fn with_sink(config: EngineConfig, sink: Box<dyn DiagnosticSink>) -> Self {
        let mut logger = Logger::new(sink, config.log_level);
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                logger.error("config", || format!("invalid configuration, using defaults: {err}"));
                let fallback = EngineConfig::default();
                logger.set_level(fallback.log_level);
                fallback
            }
        };
        let timings = config.timings;
        let mut engine = Self {
            logger,
            store: SizeStore::new(),
            offsets: OffsetIndex::new(),
            pending_sync: None,
            total_count: 0,
            groups: None,
            first_item_index: 0,
            viewport: None,
            scroll_top: 0.0,
            boundary: None,
            flags: ScrollStateFlags::new(
                config.at_top_threshold,
                config.at_bottom_threshold,
                timings,
            ),
            controller: ScrollToIndexController::new(
                timings.scroll_to_index_settle,
                timings.scroll_to_index_watchdog,
            ),
            window: RenderWindow::default(),
            last_emitted: None,
            outputs: VecDeque::new(),
            pending: PendingChanges::default(),
            batch_depth: 0,
            awaiting_count: false,
            initial_scroll_done: false,
            clock: None,
            config,
        };
        if let Some(size) = engine.config.default_item_size {
            engine.seed_default_size(size);
        }
        engine
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Active configuration, including values changed through setters.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The size store.
    #[must_use]
    pub fn store(&self) -> &SizeStore {
        &self.store
    }

    /// The offset index.
    #[must_use]
    pub fn offsets(&self) -> &OffsetIndex {
        &self.offsets
    }

    /// Group layout, `None` for a flat list.
    #[must_use]
    pub fn groups(&self) -> Option<&GroupIndices> {
        self.groups.as_ref()
    }

    /// Length of the flat sequence, group headers included.
    #[must_use]
    pub fn flat_count(&self) -> usize {
        self.groups
            .as_ref()
            .map_or(self.total_count, GroupIndices::total_flat_count)
    }

    /// Host index of the first logical item.
    #[must_use]
    pub fn first_item_index(&self) -> usize {
        self.first_item_index
    }

    /// The engine's current belief of the scroll top.
    #[must_use]
    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    /// Most recently computed window.
    #[must_use]
    pub fn window(&self) -> &RenderWindow {
        &self.window
    }

    /// Derived scroll flags.
    #[must_use]
    pub fn flags(&self) -> &ScrollStateFlags {
        &self.flags
    }

    /// Phase of the scroll-to-index controller.
    #[must_use]
    pub fn scroll_to_index_phase(&self) -> ControllerPhase {
        self.controller.phase()
    }

    /// Whether a front shift is waiting for its count.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.awaiting_count
    }

    /// Take every queued output.
    pub fn drain_outputs(&mut self) -> Vec<Output> {
        self.outputs.drain(..).collect()
    }

    /// Earliest instant at which [`tick_at`](Self::tick_at) has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.flags.next_deadline(), self.controller.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Inbound: data ───────────────────────────────────────────────────

    /// Set the number of items of a flat list.
    pub fn set_total_count(&mut self, count: usize) {
        if self.groups.is_some() {
            self.logger.warn("engine", || {
                format!("ignoring total count {count} on a grouped list; set group counts instead")
            });
            return;
        }
        self.pending.total_count = Some(count);
        self.pending.structural = true;
        self.commit();
    }

    /// Set per-group item counts. An empty slice turns grouping off.
    pub fn set_group_counts(&mut self, counts: &[usize]) {
        self.pending.group_counts = Some(counts.to_vec());
        self.pending.structural = true;
        self.commit();
    }

    /// Set the host index of the first logical item.
    ///
    /// A decrease means items were prepended, an increase means items were
    /// dropped from the front. Negative values are rejected.
    pub fn set_first_item_index(&mut self, index: i64) {
        let Ok(index) = usize::try_from(index) else {
            self.logger
                .error("engine", || format!("first item index {index} is negative; ignored"));
            return;
        };
        self.pending.first_item_index = Some(index);
        self.pending.structural = true;
        self.commit();
    }

    /// Report sizes measured by the host, keyed by flat index.
    pub fn report_measured_sizes(&mut self, ranges: &[SizeRange]) {
        if ranges.is_empty() {
            return;
        }
        self.pending.sizes.extend_from_slice(ranges);
        self.pending.structural = true;
        self.commit();
    }

    /// Feed a raw scroll container sample.
    pub fn set_viewport_at(&mut self, sample: ScrollSample, now: Instant) {
        self.clock = Some(now);
        let changes = self.flags.observe_at(sample, now);
        self.push_flag_changes(changes);
        let height_changed = self
            .viewport
            .is_none_or(|prev| prev.viewport_height != sample.viewport_height);
        self.viewport = Some(sample);
        self.scroll_top = sample.scroll_top;
        self.pending.structural |= height_changed;
        self.commit();
    }

    /// [`set_viewport_at`](Self::set_viewport_at) using the wall clock.
    pub fn set_viewport(&mut self, sample: ScrollSample) {
        self.set_viewport_at(sample, Instant::now());
    }

    /// Scroll so that `location` becomes visible.
    pub fn request_scroll_to_index_at(&mut self, location: IndexLocation, now: Instant) {
        self.clock = Some(now);
        if let Some(ControllerEvent::Cancelled(old, reason)) = self.controller.request(location, now)
        {
            self.push_cancelled(old, reason);
        }
        self.logger
            .debug("scroll_to_index", || format!("requested {location:?}"));
        self.issue_scroll(now);
    }

    /// [`request_scroll_to_index_at`](Self::request_scroll_to_index_at)
    /// using the wall clock.
    pub fn request_scroll_to_index(&mut self, location: IndexLocation) {
        self.request_scroll_to_index_at(location, Instant::now());
    }

    /// The container finished a smooth scroll animation.
    pub fn smooth_scroll_finished_at(&mut self, now: Instant) {
        self.clock = Some(now);
        self.controller.on_smooth_scroll_finished(now);
        self.drive_controller(now);
    }

    /// Apply idle timeouts and scroll-to-index deadlines.
    pub fn tick_at(&mut self, now: Instant) {
        self.clock = Some(now);
        let changes = self.flags.tick_at(now);
        self.push_flag_changes(changes);
        self.drive_controller(now);
    }

    /// Group several inbound calls into one commit.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.commit_now(true);
        }
        result
    }

    // ── Inbound: configuration ──────────────────────────────────────────

    /// Set the gap between items.
    pub fn set_gap(&mut self, gap: f64) {
        if let Err(err) = check_px("gap", gap) {
            self.logger.error("config", || err.to_string());
            return;
        }
        self.config.gap = gap;
        self.pending_sync = Some(0);
        self.pending.structural = true;
        self.commit();
    }

    /// Assume `size` for every item while nothing is measured.
    pub fn set_default_item_size(&mut self, size: f64) {
        if let Err(err) = check_px("default_item_size", size) {
            self.logger.error("config", || err.to_string());
            return;
        }
        self.config.default_item_size = Some(size);
        if self.store.is_empty() {
            self.seed_default_size(size);
        }
        self.pending.structural = true;
        self.commit();
    }

    /// Set the directional overscan.
    pub fn set_overscan(&mut self, overscan: Overscan) {
        self.config.overscan = overscan;
        self.pending.structural = true;
        self.commit();
    }

    /// Set the unconditional viewport expansion.
    pub fn set_increase_viewport_by(&mut self, increase: ViewportIncrease) {
        self.config.increase_viewport_by = increase;
        self.pending.structural = true;
        self.commit();
    }

    /// Set the item-count floor of the expansion.
    pub fn set_min_overscan_item_count(&mut self, floor: MinOverscanItemCount) {
        self.config.min_overscan_item_count = floor;
        self.pending.structural = true;
        self.commit();
    }

    /// Pin the first `count` rows.
    pub fn set_top_item_count(&mut self, count: usize) {
        self.config.top_item_count = count;
        self.pending.structural = true;
        self.commit();
    }

    /// Enable or disable sticky group headers.
    pub fn set_sticky_group_headers(&mut self, sticky: bool) {
        self.config.sticky_group_headers = sticky;
        self.pending.structural = true;
        self.commit();
    }

    /// Set the at-top and at-bottom thresholds.
    pub fn set_thresholds(&mut self, at_top: f64, at_bottom: f64) {
        self.config.at_top_threshold = at_top;
        self.config.at_bottom_threshold = at_bottom;
        self.flags.set_thresholds(at_top, at_bottom);
    }

    /// Replace the idle and scroll-to-index timings.
    ///
    /// A request already in flight keeps its watchdog origin; the new
    /// settle window applies from the next issued scroll.
    pub fn set_timings(&mut self, timings: ScrollTimings) {
        self.config.timings = timings;
        self.flags.set_timings(timings);
        self.controller
            .set_timings(timings.scroll_to_index_settle, timings.scroll_to_index_watchdog);
    }

    /// Enable or disable the upward scroll fix.
    pub fn set_fix_upward_scroll(&mut self, enabled: bool) {
        self.config.fix_upward_scroll = enabled;
    }

    /// Change the diagnostic level.
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.config.log_level = level;
        self.logger.set_level(level);
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Capture the measured sizes and the scroll position.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            ranges: self.store.ranges(),
            scroll_top: self.scroll_top,
        }
    }

    /// Replay a snapshot and scroll back to where it was taken.
    pub fn restore_at(&mut self, snapshot: &StateSnapshot, now: Instant) {
        self.clock = Some(now);
        if let Err(err) = snapshot.validate() {
            self.logger
                .error("persistence", || format!("rejected snapshot: {err}"));
            return;
        }
        self.batch(|engine| engine.report_measured_sizes(&snapshot.ranges));
        self.request_scroll_to_index_at(
            IndexLocation::item(0).with_offset(snapshot.scroll_top),
            now,
        );
    }

    // ── Commit pipeline ─────────────────────────────────────────────────

    fn now(&self) -> Instant {
        self.clock.unwrap_or_else(Instant::now)
    }

    fn commit(&mut self) {
        if self.batch_depth == 0 {
            self.commit_now(false);
        }
    }

    fn commit_now(&mut self, batch_end: bool) {
        let now = self.now();
        let pending = std::mem::take(&mut self.pending);
        let mut structural = pending.structural;
        let mut store_changed = false;

        if !pending.sizes.is_empty() {
            store_changed |= self.apply_sizes(&pending.sizes);
            self.sync_offsets();
        }

        let mut new_groups = pending.group_counts.as_deref().map(|counts| {
            (!counts.is_empty()).then(|| GroupIndices::from_counts(counts))
        });

        let mut shifted = false;
        let mut awaiting = self.awaiting_count;
        if let Some(first) = pending.first_item_index {
            let waiting_for_groups = self.groups.is_some() && new_groups.is_none();
            if waiting_for_groups && !batch_end {
                // Grouped shifts need the new layout; keep the request.
                self.pending.first_item_index = Some(first);
                awaiting = true;
            } else {
                let target_groups = match new_groups.take() {
                    Some(groups) => groups,
                    None => self.groups.clone(),
                };
                shifted = self.apply_shift(first, target_groups);
                awaiting = shifted && self.groups.is_none() && pending.total_count.is_none();
            }
        }

        if let Some(groups) = new_groups {
            self.apply_groups(groups);
            awaiting = false;
        }
        if let Some(count) = pending.total_count {
            self.apply_total_count(count);
            awaiting = false;
        }
        self.awaiting_count = awaiting && !batch_end;
        store_changed |= self.sync_offsets();
        structural |= store_changed || shifted;

        if self.awaiting_count {
            self.logger
                .debug("engine", || "front shift waiting for its count".to_string());
            return;
        }

        if store_changed && !shifted {
            self.fix_upward_scroll();
        }
        self.maybe_initial_scroll(now);
        self.recompute_window(structural);
        self.controller.on_list_refresh(store_changed, now);
        self.drive_controller(now);
    }

    fn seed_default_size(&mut self, size: f64) {
        match self.store.report_sizes(&[SizeRange::tail(0, size)]) {
            Ok(update) => {
                if let Some(start) = update.sync_start {
                    self.note_sync(start);
                }
            }
            Err(err) => self
                .logger
                .error("size_store", || format!("rejected default size: {err}")),
        }
        self.sync_offsets();
    }

    fn note_sync(&mut self, start: usize) {
        self.pending_sync = Some(self.pending_sync.map_or(start, |s| s.min(start)));
    }

    fn apply_sizes(&mut self, ranges: &[SizeRange]) -> bool {
        for range in ranges.iter().filter(|r| r.size == 0.0) {
            self.logger.warn("size_store", || {
                format!(
                    "zero size reported for items {}..={}",
                    range.start_index, range.end_index
                )
            });
        }
        // A grouped list seeds alternating header and item sizes first; the
        // report itself is replayed on top so every measurement survives.
        let seeded = match (&self.groups, self.store.is_empty()) {
            (Some(groups), true) => groups.seed_from_report(ranges).map(|mut seed| {
                seed.extend_from_slice(ranges);
                seed
            }),
            _ => None,
        };
        let to_apply = seeded.as_deref().unwrap_or(ranges);
        match self.store.report_sizes(to_apply) {
            Ok(update) => match update.sync_start {
                Some(start) => {
                    self.logger.debug("size_store", || {
                        format!("applied {} size ranges from index {start}", to_apply.len())
                    });
                    self.note_sync(start);
                    true
                }
                None => false,
            },
            Err(err) => {
                self.logger
                    .error("size_store", || format!("rejected size report: {err}"));
                false
            }
        }
    }

    /// Rebuild offsets from the earliest pending change. Returns whether the
    /// breakpoints changed.
    fn sync_offsets(&mut self) -> bool {
        let gap = self.config.gap;
        let start = self.pending_sync.take().unwrap_or(0);
        self.offsets.rebuild_from(start, &self.store, gap)
    }

    /// Flat index and offset of the row at the current scroll top.
    fn anchor(&self) -> Option<(usize, f64)> {
        let count = self.flat_count();
        if count == 0 || self.offsets.is_empty() {
            return None;
        }
        let flat = self.offsets.index_at_offset(self.scroll_top).min(count - 1);
        Some((flat, self.offsets.offset_of(flat)))
    }

    fn apply_shift(&mut self, first: usize, new_groups: Option<GroupIndices>) -> bool {
        let old_first = self.first_item_index;
        self.first_item_index = first;
        let item_delta = old_first as isize - first as isize;
        let old_groups = self.groups.clone();
        let layout_changed = new_groups != old_groups;

        if item_delta == 0 || self.store.is_empty() {
            if layout_changed {
                self.apply_groups(new_groups);
            }
            return false;
        }

        let anchor = self.anchor();
        let plan = match (&old_groups, &new_groups) {
            (Some(old), Some(new)) => ShiftPlan::grouped(&self.store, old, new, item_delta),
            _ => ShiftPlan::flat(&self.store, item_delta),
        };
        let store = match SizeStore::from_ranges(&plan.ranges) {
            Ok(store) => store,
            Err(err) => {
                self.logger
                    .error("shift", || format!("could not re-key sizes: {err}"));
                return false;
            }
        };
        self.logger.debug("shift", || {
            format!("re-keyed sizes for a front shift of {item_delta} items")
        });
        self.store = store;
        self.offsets = OffsetIndex::new();
        self.pending_sync = Some(0);
        self.groups = new_groups;
        self.sync_offsets();

        if let Some((old_flat, old_offset)) = anchor {
            match remap_flat_index(
                old_flat,
                old_groups.as_ref(),
                self.groups.as_ref(),
                item_delta,
            ) {
                Some(new_flat) => {
                    let delta = compensating_delta(
                        old_offset,
                        self.offsets.offset_of(new_flat),
                    );
                    self.compensate(delta);
                }
                None => self.logger.debug("shift", || {
                    format!("anchor row {old_flat} was dropped; no scroll compensation")
                }),
            }
        }
        true
    }

    fn compensate(&mut self, delta: f64) {
        if delta.abs() < f64::EPSILON {
            return;
        }
        self.scroll_top = (self.scroll_top + delta).max(0.0);
        self.flags.mark_programmatic_scroll();
        self.outputs.push_back(Output::ScrollBy {
            top: delta,
            behavior: Behavior::Auto,
        });
    }

    fn apply_groups(&mut self, groups: Option<GroupIndices>) {
        self.groups = groups;
        let count = self.flat_count();
        self.truncate_to(count);
    }

    fn apply_total_count(&mut self, count: usize) {
        self.total_count = count;
        self.truncate_to(count);
    }

    fn truncate_to(&mut self, count: usize) {
        if count == 0 {
            if let Some(ControllerEvent::Cancelled(location, reason)) =
                self.controller.cancel(CancelReason::ListEmptied)
            {
                self.push_cancelled(location, reason);
            }
            return;
        }
        let update = self.store.truncate(count);
        if let Some(start) = update.sync_start {
            self.logger
                .debug("size_store", || format!("truncated sizes at {count}"));
            self.note_sync(start);
        }
    }

    /// Keep the first visible row in place when rows above it were resized
    /// while scrolling up.
    fn fix_upward_scroll(&mut self) {
        if !self.config.fix_upward_scroll
            || self.flags.scroll_direction() != ScrollDirection::Up
            || self.controller.is_active()
        {
            return;
        }
        let scroll_top = self.scroll_top;
        let Some(anchor) = self
            .window
            .items
            .iter()
            .find(|item| item.offset + item.size > scroll_top)
            .copied()
        else {
            return;
        };
        let delta = self.offsets.offset_of(anchor.flat_index) - anchor.offset;
        if delta.abs() >= SCROLL_EPSILON {
            self.logger.debug("engine", || {
                format!("compensating {delta}px of size change above row {}", anchor.flat_index)
            });
            self.compensate(delta);
        }
    }

    fn maybe_initial_scroll(&mut self, now: Instant) {
        if self.initial_scroll_done || self.store.is_empty() || self.flat_count() == 0 {
            return;
        }
        let Some(location) = self.config.initial_top_most_item_index else {
            self.initial_scroll_done = true;
            return;
        };
        if self.viewport.is_none() {
            return;
        }
        self.initial_scroll_done = true;
        if let Some(ControllerEvent::Cancelled(old, reason)) = self.controller.request(location, now)
        {
            self.push_cancelled(old, reason);
        }
        if let Some(top) = self.issue_scroll(now) {
            // Build the first real window around the target right away.
            self.scroll_top = top;
        }
    }

    fn top_items(&self) -> TopItems {
        if let Some(groups) = &self.groups
            && self.config.sticky_group_headers
            && !self.offsets.is_empty()
        {
            let flat = self.offsets.index_at_offset(self.scroll_top);
            return groups
                .group_of(flat)
                .and_then(|g| groups.header_of(g))
                .map_or(TopItems::None, TopItems::StickyGroup);
        }
        if self.config.top_item_count > 0 {
            TopItems::Leading(self.config.top_item_count)
        } else {
            TopItems::None
        }
    }

    fn probe_index(&self) -> usize {
        self.config
            .initial_top_most_item_index
            .and_then(|location| {
                resolve_flat_index(location.index, self.flat_count(), self.groups.as_ref())
            })
            .unwrap_or(0)
    }

    fn recompute_window(&mut self, structural: bool) {
        if let Some(viewport) = self.viewport {
            let height = viewport.viewport_height;
            let stale = structural
                || self.boundary.is_none()
                || needs_new_boundary(&self.window, self.scroll_top, height);
            if stale {
                let estimate = self
                    .offsets
                    .size_of(self.offsets.index_at_offset(self.scroll_top))
                    .or(self.config.default_item_size)
                    .unwrap_or(0.0);
                self.boundary = Some(expand_boundary(
                    self.scroll_top,
                    height,
                    self.flags.scroll_direction(),
                    &self.config.boundary(),
                    estimate,
                ));
            }
        }

        let input = WindowInput {
            total_count: self.flat_count(),
            offsets: &self.offsets,
            groups: self.groups.as_ref(),
            boundary: self.boundary,
            top_items: self.top_items(),
            first_item_index: self.first_item_index,
            probe_index: self.probe_index(),
        };
        let window = compute_window(&input);
        if self.last_emitted.as_ref() != Some(&window) {
            self.last_emitted = Some(window.clone());
            self.outputs.push_back(Output::RenderWindow(window.clone()));
        }
        self.window = window;
    }

    // ── Scroll-to-index ─────────────────────────────────────────────────

    /// Resolve and issue the active request. Returns the issued scroll top.
    fn issue_scroll(&mut self, now: Instant) -> Option<f64> {
        let location = self.controller.active_location()?;
        let viewport_height = self.viewport.map_or(0.0, |v| v.viewport_height);
        let total_count = self.flat_count();
        let max_scroll_top = self
            .viewport
            .map(|_| (self.offsets.total_size(total_count) - viewport_height).max(0.0));
        let ctx = TargetContext {
            total_count,
            groups: self.groups.as_ref(),
            offsets: &self.offsets,
            viewport_height,
            top_list_height: self.window.top_list_height,
            max_scroll_top,
        };
        let Some(target) = resolve_target(&location, &ctx) else {
            if let Some(ControllerEvent::Cancelled(location, reason)) =
                self.controller.cancel(CancelReason::ListEmptied)
            {
                self.push_cancelled(location, reason);
            }
            return None;
        };

        if let Some(previous) = self.controller.issued_top()
            && (previous - target.top).abs() < SCROLL_EPSILON
        {
            // Re-evaluation landed on the same spot.
            if let Some(ControllerEvent::Converged(location)) = self.controller.converge() {
                self.push_converged(location);
            }
            return None;
        }

        self.logger.debug("scroll_to_index", || {
            format!("scrolling to row {} at {}", target.flat_index, target.top)
        });
        self.controller.issued(target.top);
        let moves = (target.top - self.scroll_top).abs() >= SCROLL_EPSILON;
        if moves {
            self.flags.mark_programmatic_scroll();
        }
        self.outputs.push_back(Output::ScrollTo {
            top: target.top,
            behavior: target.behavior,
        });
        if !moves {
            // The container will not move, so no sample will follow.
            self.controller.on_list_refresh(false, now);
            self.controller.on_smooth_scroll_finished(now);
        }
        Some(target.top)
    }

    fn drive_controller(&mut self, now: Instant) {
        match self.controller.tick(now) {
            Some(ControllerEvent::Retry(location)) => {
                self.logger.debug("scroll_to_index", || {
                    format!("sizes changed while landing on {location:?}; retrying")
                });
                self.issue_scroll(now);
            }
            Some(ControllerEvent::Converged(location)) => self.push_converged(location),
            Some(ControllerEvent::Cancelled(location, reason)) => {
                self.push_cancelled(location, reason);
            }
            None => {}
        }
    }

    fn push_converged(&mut self, location: IndexLocation) {
        self.logger
            .debug("scroll_to_index", || format!("landed on {location:?}"));
        self.outputs
            .push_back(Output::ScrollToIndexConverged { location });
    }

    fn push_cancelled(&mut self, location: IndexLocation, reason: CancelReason) {
        let level = if reason == CancelReason::TimedOut {
            LogLevel::Warn
        } else {
            LogLevel::Debug
        };
        self.logger.log(level, "scroll_to_index", || {
            format!("abandoned {location:?}: {reason:?}")
        });
        self.outputs
            .push_back(Output::ScrollToIndexCancelled { location, reason });
    }

    fn push_flag_changes(&mut self, changes: FlagChanges) {
        if let Some(state) = changes.at_bottom {
            self.outputs.push_back(Output::AtBottomStateChanged(state));
        }
        if let Some(at_top) = changes.at_top {
            self.outputs.push_back(Output::AtTopStateChanged(at_top));
        }
        if let Some(scrolling) = changes.scrolling {
            self.outputs.push_back(Output::ScrollingChanged(scrolling));
        }
        if let Some(direction) = changes.direction {
            self.outputs
                .push_back(Output::ScrollDirectionChanged(direction));
        }
        if let Some(velocity) = changes.velocity {
            self.outputs
                .push_back(Output::ScrollVelocityChanged(velocity));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::scroll_state::NotAtBottomReason;
    use web_time::Duration;

    fn engine_with_sink(config: EngineConfig) -> (Engine, MemorySink) {
        let sink = MemorySink::new();
        let engine = Engine::with_sink(config.with_log_level(LogLevel::Debug), Box::new(sink.clone()));
        (engine, sink)
    }

    fn last_window(outputs: &[Output]) -> Option<&RenderWindow> {
        outputs.iter().rev().find_map(|o| match o {
            Output::RenderWindow(w) => Some(w),
            _ => None,
        })
    }

    fn uniform_engine(count: usize, size: f64, viewport: f64, t0: Instant) -> Engine {
        let mut engine = Engine::new(EngineConfig::default());
        engine.set_total_count(count);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, viewport), t0);
        engine.report_measured_sizes(&[SizeRange::single(0, size)]);
        engine.drain_outputs();
        engine
    }

    #[test]
    fn first_window_is_a_probe() {
        let mut engine = Engine::default();
        engine.set_total_count(100);
        let outputs = engine.drain_outputs();
        let window = last_window(&outputs).unwrap();
        assert!(window.probe);
        assert_eq!(window.items.len(), 1);
    }

    #[test]
    fn measurement_fills_viewport() {
        let t0 = Instant::now();
        let engine = uniform_engine(1000, 30.0, 200.0, t0);
        let window = engine.window();
        assert!(!window.probe);
        assert_eq!(window.first_flat_index(), Some(0));
        assert_eq!(window.last_flat_index(), Some(6));
        assert_eq!(window.total_size, 30_000.0);
    }

    #[test]
    fn scroll_to_index_issues_offset_and_converges() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        engine.request_scroll_to_index_at(IndexLocation::item(300), t0);
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollTo {
            top: 9000.0,
            behavior: Behavior::Auto
        }));

        let t1 = t0 + Duration::from_millis(16);
        engine.set_viewport_at(ScrollSample::new(9000.0, 30_000.0, 200.0), t1);
        assert_eq!(engine.window().first_flat_index(), Some(300));

        engine.tick_at(t1 + Duration::from_millis(150));
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollToIndexConverged {
            location: IndexLocation::item(300)
        }));
        assert_eq!(engine.scroll_to_index_phase(), ControllerPhase::Converged);
    }

    #[test]
    fn unchanged_report_emits_nothing() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        engine.report_measured_sizes(&[SizeRange::new(0, 6, 30.0)]);
        assert!(engine.drain_outputs().is_empty());
    }

    #[test]
    fn prepend_rekeys_sizes_and_compensates() {
        let t0 = Instant::now();
        let mut engine = Engine::default();
        engine.set_first_item_index(4000);
        engine.set_total_count(100);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, 200.0), t0);
        engine.report_measured_sizes(&[SizeRange::single(0, 30.0), SizeRange::single(1, 50.0)]);
        engine.drain_outputs();

        engine.set_first_item_index(3995);
        assert!(engine.is_partial());
        assert_eq!(engine.store().query(0), Some(30.0));
        assert_eq!(engine.store().query(5), Some(30.0));
        assert_eq!(engine.store().query(6), Some(50.0));
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollBy {
            top: 150.0,
            behavior: Behavior::Auto
        }));
        assert!(last_window(&outputs).is_none());

        engine.set_total_count(105);
        assert!(!engine.is_partial());
        let window = engine.window();
        assert_eq!(window.first_flat_index(), Some(5));
        assert_eq!(window.items[0].display_index, 4000);
    }

    #[test]
    fn batched_prepend_renders_once() {
        let t0 = Instant::now();
        let mut engine = Engine::default();
        engine.batch(|e| {
            e.set_first_item_index(100);
            e.set_total_count(10);
        });
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, 200.0), t0);
        engine.report_measured_sizes(&[SizeRange::single(0, 30.0)]);
        engine.drain_outputs();

        engine.batch(|e| {
            e.set_first_item_index(95);
            e.set_total_count(15);
        });
        assert!(!engine.is_partial());
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollBy {
            top: 150.0,
            behavior: Behavior::Auto
        }));
        let windows = outputs
            .iter()
            .filter(|o| matches!(o, Output::RenderWindow(_)))
            .count();
        assert_eq!(windows, 1);
        assert_eq!(engine.window().items[0].display_index, 100);
    }

    #[test]
    fn unchanged_first_index_is_not_a_shift() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(10, 30.0, 200.0, t0);
        engine.set_first_item_index(0);
        assert!(!engine.is_partial());
        assert!(engine.drain_outputs().is_empty());
    }

    #[test]
    fn negative_first_index_is_rejected() {
        let (mut engine, sink) = engine_with_sink(EngineConfig::default());
        engine.set_first_item_index(-3);
        assert_eq!(engine.first_item_index(), 0);
        assert!(sink.at_level(LogLevel::Error)[0].message.contains("negative"));
    }

    #[test]
    fn invalid_sizes_are_logged_not_applied() {
        let (mut engine, sink) = engine_with_sink(EngineConfig::default());
        engine.set_total_count(10);
        engine.report_measured_sizes(&[SizeRange::new(5, 2, 10.0)]);
        assert!(engine.store().is_empty());
        assert!(sink.contains("rejected size report"));
    }

    #[test]
    fn zero_size_is_warned_and_kept() {
        let (mut engine, sink) = engine_with_sink(EngineConfig::default());
        engine.set_total_count(10);
        engine.report_measured_sizes(&[SizeRange::single(0, 0.0)]);
        assert_eq!(engine.store().query(0), Some(0.0));
        assert_eq!(sink.at_level(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn growing_content_is_reported() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(10, 30.0, 200.0, t0);
        engine.set_viewport_at(ScrollSample::new(100.0, 300.0, 200.0), t0);
        engine.drain_outputs();
        engine.set_viewport_at(
            ScrollSample::new(100.0, 400.0, 200.0),
            t0 + Duration::from_millis(10),
        );
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::AtBottomStateChanged(AtBottomState::NotAtBottom {
            because: NotAtBottomReason::SizeIncreased
        })));
    }

    #[test]
    fn emptied_list_cancels_scroll_to_index() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        engine.request_scroll_to_index_at(IndexLocation::item(500), t0);
        engine.set_total_count(0);
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollToIndexCancelled {
            location: IndexLocation::item(500),
            reason: CancelReason::ListEmptied
        }));
        assert!(engine.window().is_empty());
    }

    #[test]
    fn snapshot_restores_sizes_and_position() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        engine.report_measured_sizes(&[SizeRange::new(3, 4, 55.0)]);
        engine.set_viewport_at(ScrollSample::new(640.0, 30_050.0, 200.0), t0);
        let snapshot = engine.snapshot();

        let mut restored = Engine::default();
        restored.set_total_count(1000);
        restored.set_viewport_at(ScrollSample::new(0.0, 0.0, 200.0), t0);
        restored.restore_at(&snapshot, t0);
        assert_eq!(restored.store().ranges(), engine.store().ranges());
        assert!(restored.drain_outputs().contains(&Output::ScrollTo {
            top: 640.0,
            behavior: Behavior::Auto
        }));
    }

    #[test]
    fn initial_index_probes_and_scrolls_once() {
        let t0 = Instant::now();
        let config = EngineConfig::default().with_initial_top_most_item_index(IndexLocation::item(50));
        let mut engine = Engine::new(config);
        engine.set_total_count(100);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, 200.0), t0);
        assert_eq!(engine.window().first_flat_index(), Some(50));
        assert!(engine.window().probe);

        engine.report_measured_sizes(&[SizeRange::single(50, 20.0)]);
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollTo {
            top: 1000.0,
            behavior: Behavior::Auto
        }));
        assert_eq!(engine.window().first_flat_index(), Some(50));
    }

    #[test]
    fn upward_scroll_fix_compensates_growth_above() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        engine.set_viewport_at(ScrollSample::new(3000.0, 30_000.0, 200.0), t0);
        engine.set_viewport_at(
            ScrollSample::new(2990.0, 30_000.0, 200.0),
            t0 + Duration::from_millis(16),
        );
        assert_eq!(engine.flags().scroll_direction(), ScrollDirection::Up);
        engine.drain_outputs();

        // Row 98 sits above the viewport and grows by 20px.
        engine.report_measured_sizes(&[SizeRange::single(98, 50.0)]);
        let outputs = engine.drain_outputs();
        assert!(outputs.contains(&Output::ScrollBy {
            top: 20.0,
            behavior: Behavior::Auto
        }));
        assert_eq!(engine.scroll_top(), 3010.0);
    }

    fn grouped_engine(t0: Instant) -> Engine {
        let mut engine = Engine::default();
        engine.set_group_counts(&[3, 3]);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, 200.0), t0);
        engine.drain_outputs();
        engine
    }

    #[test]
    fn grouped_first_report_keeps_every_measurement() {
        let t0 = Instant::now();
        let mut engine = grouped_engine(t0);
        engine.report_measured_sizes(&[
            SizeRange::single(0, 30.0),
            SizeRange::single(1, 20.0),
            SizeRange::single(2, 50.0),
            SizeRange::single(3, 20.0),
            SizeRange::single(4, 30.0),
        ]);
        assert_eq!(engine.store().query(2), Some(50.0));
        // Unmeasured rows of the second group follow the seeded item size.
        assert_eq!(
            engine.store().ranges(),
            vec![
                SizeRange::single(0, 30.0),
                SizeRange::single(1, 20.0),
                SizeRange::single(2, 50.0),
                SizeRange::single(3, 20.0),
                SizeRange::single(4, 30.0),
                SizeRange::tail(5, 20.0),
            ]
        );
    }

    #[test]
    fn grouped_restore_replays_the_snapshot() {
        let t0 = Instant::now();
        let snapshot = StateSnapshot {
            ranges: vec![
                SizeRange::single(0, 30.0),
                SizeRange::single(1, 20.0),
                SizeRange::single(2, 50.0),
                SizeRange::single(3, 20.0),
                SizeRange::tail(4, 30.0),
            ],
            scroll_top: 0.0,
        };
        let mut engine = grouped_engine(t0);
        engine.restore_at(&snapshot, t0);
        assert_eq!(engine.store().ranges(), snapshot.ranges);
    }

    #[test]
    fn scroll_in_place_keeps_user_direction() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        engine.set_viewport_at(ScrollSample::new(3000.0, 30_000.0, 200.0), t0);
        assert_eq!(engine.flags().scroll_direction(), ScrollDirection::Down);

        // Row 100 already sits at the viewport top; the container stays put.
        engine.request_scroll_to_index_at(IndexLocation::item(100), t0 + Duration::from_millis(16));
        engine.set_viewport_at(
            ScrollSample::new(2990.0, 30_000.0, 200.0),
            t0 + Duration::from_millis(32),
        );
        assert_eq!(engine.flags().scroll_direction(), ScrollDirection::Up);
    }

    #[test]
    fn shorter_settle_window_converges_sooner() {
        let t0 = Instant::now();
        let mut engine = uniform_engine(1000, 30.0, 200.0, t0);
        let timings = ScrollTimings {
            scroll_to_index_settle: Duration::from_millis(50),
            ..ScrollTimings::default()
        };
        engine.set_timings(timings);
        assert_eq!(engine.config().timings, timings);

        engine.request_scroll_to_index_at(IndexLocation::item(300), t0);
        let t1 = t0 + Duration::from_millis(16);
        engine.set_viewport_at(ScrollSample::new(9000.0, 30_000.0, 200.0), t1);
        engine.tick_at(t1 + Duration::from_millis(50));
        assert_eq!(engine.scroll_to_index_phase(), ControllerPhase::Converged);
    }
}
