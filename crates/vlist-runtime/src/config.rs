#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Every value here is only a construction-time default: the engine exposes
//! a setter for each one, callable at any time.

use std::fmt;

use vlist_core::{BoundaryConfig, MinOverscanItemCount, Overscan, ViewportIncrease};
use web_time::Duration;

use crate::diagnostics::LogLevel;
use crate::scroll_to_index::IndexLocation;

/// Timing constants for idle detection and scroll-to-index convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ScrollTimings {
    /// Silence after which the scroll direction becomes `None`.
    pub direction_idle: Duration,
    /// Minimum spacing of the samples a velocity is computed from.
    pub velocity_sample: Duration,
    /// Silence after which scrolling is considered stopped.
    pub scrolling_idle: Duration,
    /// Window after a scroll-to-index jump during which measurements are
    /// collected before deciding to retry.
    pub scroll_to_index_settle: Duration,
    /// Hard limit on a scroll-to-index request, counted from the request.
    pub scroll_to_index_watchdog: Duration,
}

impl Default for ScrollTimings {
    fn default() -> Self {
        Self {
            direction_idle: Duration::from_millis(50),
            velocity_sample: Duration::from_millis(100),
            scrolling_idle: Duration::from_millis(200),
            scroll_to_index_settle: Duration::from_millis(150),
            scroll_to_index_watchdog: Duration::from_millis(1200),
        }
    }
}

/// Construction-time defaults for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct EngineConfig {
    /// Minimum level of emitted diagnostics.
    pub log_level: LogLevel,
    /// `is_at_top` holds while `scroll_top <= at_top_threshold`.
    pub at_top_threshold: f64,
    /// Distance from the bottom still counted as "at bottom".
    pub at_bottom_threshold: f64,
    /// Directional overscan in pixels.
    pub overscan: Overscan,
    /// Unconditional viewport expansion in pixels.
    pub increase_viewport_by: ViewportIncrease,
    /// Item-count floor for the expansion.
    pub min_overscan_item_count: MinOverscanItemCount,
    /// Number of leading rows pinned at the top.
    pub top_item_count: usize,
    /// Keep the header of the topmost group pinned in grouped lists.
    pub sticky_group_headers: bool,
    /// Location scrolled to once, right after the first measurement.
    pub initial_top_most_item_index: Option<IndexLocation>,
    /// Size assumed for every item before anything is measured.
    pub default_item_size: Option<f64>,
    /// Pixels between consecutive items.
    pub gap: f64,
    /// Compensate size changes above the viewport while scrolling up.
    pub fix_upward_scroll: bool,
    /// Idle and convergence timings.
    pub timings: ScrollTimings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            at_top_threshold: 0.0,
            at_bottom_threshold: 4.0,
            overscan: Overscan::default(),
            increase_viewport_by: ViewportIncrease::default(),
            min_overscan_item_count: MinOverscanItemCount::default(),
            top_item_count: 0,
            sticky_group_headers: true,
            initial_top_most_item_index: None,
            default_item_size: None,
            gap: 0.0,
            fix_upward_scroll: true,
            timings: ScrollTimings::default(),
        }
    }
}

impl EngineConfig {
    /// Set the diagnostic level.
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the at-top and at-bottom thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, at_top: f64, at_bottom: f64) -> Self {
        self.at_top_threshold = at_top;
        self.at_bottom_threshold = at_bottom;
        self
    }

    /// Set the directional overscan.
    #[must_use]
    pub fn with_overscan(mut self, overscan: Overscan) -> Self {
        self.overscan = overscan;
        self
    }

    /// Set the unconditional viewport expansion.
    #[must_use]
    pub fn with_increase_viewport_by(mut self, increase: ViewportIncrease) -> Self {
        self.increase_viewport_by = increase;
        self
    }

    /// Set the item-count floor for the expansion.
    #[must_use]
    pub fn with_min_overscan_item_count(mut self, floor: MinOverscanItemCount) -> Self {
        self.min_overscan_item_count = floor;
        self
    }

    /// Pin the first `count` rows.
    #[must_use]
    pub fn with_top_item_count(mut self, count: usize) -> Self {
        self.top_item_count = count;
        self
    }

    /// Enable or disable sticky group headers.
    #[must_use]
    pub fn with_sticky_group_headers(mut self, sticky: bool) -> Self {
        self.sticky_group_headers = sticky;
        self
    }

    /// Scroll to `location` once the first measurement arrives.
    #[must_use]
    pub fn with_initial_top_most_item_index(mut self, location: IndexLocation) -> Self {
        self.initial_top_most_item_index = Some(location);
        self
    }

    /// Assume `size` for every item until something is measured.
    #[must_use]
    pub fn with_default_item_size(mut self, size: f64) -> Self {
        self.default_item_size = Some(size);
        self
    }

    /// Set the gap between items.
    #[must_use]
    pub fn with_gap(mut self, gap: f64) -> Self {
        self.gap = gap;
        self
    }

    /// Enable or disable the upward scroll fix.
    #[must_use]
    pub fn with_fix_upward_scroll(mut self, enabled: bool) -> Self {
        self.fix_upward_scroll = enabled;
        self
    }

    /// Replace the timing constants.
    #[must_use]
    pub fn with_timings(mut self, timings: ScrollTimings) -> Self {
        self.timings = timings;
        self
    }

    /// The boundary expansion settings as one value.
    #[must_use]
    pub fn boundary(&self) -> BoundaryConfig {
        BoundaryConfig {
            overscan: self.overscan,
            increase_viewport_by: self.increase_viewport_by,
            min_overscan_item_count: self.min_overscan_item_count,
        }
    }

    /// Check every numeric field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_px("at_top_threshold", self.at_top_threshold)?;
        check_px("at_bottom_threshold", self.at_bottom_threshold)?;
        check_px("overscan.main", self.overscan.main)?;
        check_px("overscan.reverse", self.overscan.reverse)?;
        check_px("increase_viewport_by.top", self.increase_viewport_by.top)?;
        check_px("increase_viewport_by.bottom", self.increase_viewport_by.bottom)?;
        check_px("gap", self.gap)?;
        if let Some(size) = self.default_item_size {
            check_px("default_item_size", size)?;
        }
        Ok(())
    }
}

/// Reject negative or non-finite pixel values.
pub(crate) fn check_px(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::new(
            field,
            value.to_string(),
            "expected a finite, non-negative pixel value",
        ))
    }
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Name of the rejected field or setter argument.
    pub field: &'static str,
    /// The rejected value, formatted.
    pub value: String,
    /// Why it was rejected.
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(
        field: &'static str,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ConfigError {}
