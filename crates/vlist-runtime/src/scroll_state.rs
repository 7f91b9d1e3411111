#![forbid(unsafe_code)]

//! Scroll position flags derived from raw container samples.
//!
//! [`ScrollStateFlags`] turns `{scroll_top, scroll_height, viewport_height}`
//! samples into the values follow-output and scroll-seek behaviours consume:
//! at-top, at-bottom with a reason, direction, velocity and whether the user
//! is scrolling at all.
//!
//! # Invariants
//!
//! 1. The at-bottom reason is always derived from the previous sample, never
//!    from the absolute position alone.
//! 2. A sample marked synthetic never changes the direction.
//! 3. Velocity is `0.0` whenever `is_scrolling` is false.
//! 4. [`FlagChanges`] only lists values that actually changed.

use vlist_core::ScrollDirection;
use web_time::Instant;

use crate::config::ScrollTimings;

/// One raw reading of the scroll container.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ScrollSample {
    /// Distance scrolled from the top.
    pub scroll_top: f64,
    /// Full scrollable height.
    pub scroll_height: f64,
    /// Visible height.
    pub viewport_height: f64,
}

impl ScrollSample {
    /// Create a sample.
    #[must_use]
    pub const fn new(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            viewport_height,
        }
    }

    /// Distance between the viewport bottom and the content bottom.
    #[must_use]
    pub fn offset_bottom(&self) -> f64 {
        self.scroll_height - (self.scroll_top + self.viewport_height)
    }
}

/// Why the list counts as being at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum AtBottomReason {
    /// The user scrolled down to the end.
    ScrolledDown,
    /// The content shrank up to the viewport.
    SizeDecreased,
}

/// Why the list does not count as being at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum NotAtBottomReason {
    /// Content grew below the viewport.
    SizeIncreased,
    /// The viewport got shorter.
    ViewportShrunk,
    /// The user scrolled up.
    ScrollingUp,
    /// The end of the list has not been reached yet.
    NotYetAtLastItem,
}

/// At-bottom flag with the reason it last changed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum AtBottomState {
    /// Within the threshold of the bottom.
    AtBottom {
        /// What brought the list there.
        because: AtBottomReason,
        /// `previous.scroll_top - current.scroll_top`.
        scroll_top_delta: f64,
    },
    /// Further from the bottom than the threshold.
    NotAtBottom {
        /// What moved the list away.
        because: NotAtBottomReason,
    },
}

impl AtBottomState {
    /// Whether this is the `AtBottom` variant.
    #[must_use]
    pub fn is_at_bottom(&self) -> bool {
        matches!(self, Self::AtBottom { .. })
    }
}

/// Values that changed in one observation or tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlagChanges {
    /// New at-bottom state, present when the flag flipped.
    pub at_bottom: Option<AtBottomState>,
    /// New at-top flag.
    pub at_top: Option<bool>,
    /// New direction.
    pub direction: Option<ScrollDirection>,
    /// New scrolling flag.
    pub scrolling: Option<bool>,
    /// New velocity.
    pub velocity: Option<f64>,
}

impl FlagChanges {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Derived scroll flags.
#[derive(Debug, Clone)]
pub struct ScrollStateFlags {
    at_top_threshold: f64,
    at_bottom_threshold: f64,
    timings: ScrollTimings,
    last: ScrollSample,
    at_top: bool,
    at_bottom: AtBottomState,
    direction: ScrollDirection,
    last_sample_at: Option<Instant>,
    last_scroll_at: Option<Instant>,
    scrolling: bool,
    velocity: f64,
    velocity_anchor: Option<(Instant, f64)>,
    synthetic_pending: bool,
}

impl ScrollStateFlags {
    /// Create flags with the given thresholds.
    #[must_use]
    pub fn new(at_top_threshold: f64, at_bottom_threshold: f64, timings: ScrollTimings) -> Self {
        Self {
            at_top_threshold,
            at_bottom_threshold,
            timings,
            last: ScrollSample::default(),
            at_top: true,
            at_bottom: AtBottomState::NotAtBottom {
                because: NotAtBottomReason::NotYetAtLastItem,
            },
            direction: ScrollDirection::Down,
            last_sample_at: None,
            last_scroll_at: None,
            scrolling: false,
            velocity: 0.0,
            velocity_anchor: None,
            synthetic_pending: false,
        }
    }

    /// Replace the thresholds; applies from the next sample on.
    pub fn set_thresholds(&mut self, at_top: f64, at_bottom: f64) {
        self.at_top_threshold = at_top;
        self.at_bottom_threshold = at_bottom;
    }

    /// Replace the timing constants.
    pub fn set_timings(&mut self, timings: ScrollTimings) {
        self.timings = timings;
    }

    /// The next sample is the result of a programmatic scroll.
    pub fn mark_programmatic_scroll(&mut self) {
        self.synthetic_pending = true;
    }

    /// Last observed sample.
    #[must_use]
    pub fn last_sample(&self) -> ScrollSample {
        self.last
    }

    /// Whether the list is within the at-top threshold.
    #[must_use]
    pub fn is_at_top(&self) -> bool {
        self.at_top
    }

    /// Current at-bottom state.
    #[must_use]
    pub fn at_bottom_state(&self) -> AtBottomState {
        self.at_bottom
    }

    /// Current scroll direction.
    #[must_use]
    pub fn scroll_direction(&self) -> ScrollDirection {
        self.direction
    }

    /// Scroll-top delta over the last velocity window.
    #[must_use]
    pub fn scroll_velocity(&self) -> f64 {
        self.velocity
    }

    /// Whether the scroll top changed within the scrolling-idle window.
    #[must_use]
    pub fn is_scrolling(&self) -> bool {
        self.scrolling
    }

    /// Process one sample.
    pub fn observe_at(&mut self, sample: ScrollSample, now: Instant) -> FlagChanges {
        let mut changes = FlagChanges::default();
        let prev = self.last;
        let synthetic = std::mem::take(&mut self.synthetic_pending);

        let at_bottom = self.derive_at_bottom(&prev, &sample);
        if at_bottom.is_at_bottom() != self.at_bottom.is_at_bottom() {
            changes.at_bottom = Some(at_bottom);
        }
        self.at_bottom = at_bottom;

        let at_top = sample.scroll_top <= self.at_top_threshold;
        if at_top != self.at_top {
            self.at_top = at_top;
            changes.at_top = Some(at_top);
        }

        let moved = sample.scroll_top != prev.scroll_top;
        if moved && !synthetic {
            let direction = if sample.scroll_top < prev.scroll_top {
                ScrollDirection::Up
            } else {
                ScrollDirection::Down
            };
            if direction != self.direction {
                self.direction = direction;
                changes.direction = Some(direction);
            }
        }

        if moved {
            self.last_scroll_at = Some(now);
            if !self.scrolling {
                self.scrolling = true;
                changes.scrolling = Some(true);
                self.velocity_anchor = Some((now, prev.scroll_top));
            }
            if let Some((anchor_at, anchor_top)) = self.velocity_anchor
                && now.saturating_duration_since(anchor_at) >= self.timings.velocity_sample
            {
                let velocity = sample.scroll_top - anchor_top;
                self.velocity_anchor = Some((now, sample.scroll_top));
                if velocity != self.velocity {
                    self.velocity = velocity;
                    changes.velocity = Some(velocity);
                }
            }
        }

        self.last = sample;
        self.last_sample_at = Some(now);
        changes
    }

    /// Apply idle timeouts.
    pub fn tick_at(&mut self, now: Instant) -> FlagChanges {
        let mut changes = FlagChanges::default();
        if self.direction != ScrollDirection::None
            && let Some(at) = self.last_sample_at
            && now.saturating_duration_since(at) >= self.timings.direction_idle
        {
            self.direction = ScrollDirection::None;
            changes.direction = Some(ScrollDirection::None);
        }
        if self.scrolling
            && let Some(at) = self.last_scroll_at
            && now.saturating_duration_since(at) >= self.timings.scrolling_idle
        {
            self.scrolling = false;
            self.velocity_anchor = None;
            changes.scrolling = Some(false);
            if self.velocity != 0.0 {
                self.velocity = 0.0;
                changes.velocity = Some(0.0);
            }
        }
        changes
    }

    /// Earliest instant at which [`tick_at`](Self::tick_at) may change a flag.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let direction = (self.direction != ScrollDirection::None)
            .then_some(self.last_sample_at)
            .flatten()
            .map(|at| at + self.timings.direction_idle);
        let scrolling = self
            .scrolling
            .then_some(self.last_scroll_at)
            .flatten()
            .map(|at| at + self.timings.scrolling_idle);
        match (direction, scrolling) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn derive_at_bottom(&self, prev: &ScrollSample, sample: &ScrollSample) -> AtBottomState {
        let is_at_bottom = sample.scroll_top + sample.viewport_height - sample.scroll_height
            > -self.at_bottom_threshold;
        if is_at_bottom {
            let delta = prev.scroll_top - sample.scroll_top;
            if sample.scroll_top > prev.scroll_top {
                return AtBottomState::AtBottom {
                    because: AtBottomReason::ScrolledDown,
                    scroll_top_delta: delta,
                };
            }
            let scroll_top_delta = match self.at_bottom {
                AtBottomState::AtBottom {
                    scroll_top_delta, ..
                } if delta == 0.0 => scroll_top_delta,
                _ => delta,
            };
            return AtBottomState::AtBottom {
                because: AtBottomReason::SizeDecreased,
                scroll_top_delta,
            };
        }

        let because = if sample.scroll_height > prev.scroll_height {
            NotAtBottomReason::SizeIncreased
        } else if sample.viewport_height < prev.viewport_height {
            NotAtBottomReason::ViewportShrunk
        } else if sample.scroll_top < prev.scroll_top {
            NotAtBottomReason::ScrollingUp
        } else {
            NotAtBottomReason::NotYetAtLastItem
        };
        AtBottomState::NotAtBottom { because }
    }
}
