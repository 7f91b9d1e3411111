#![forbid(unsafe_code)]

//! Persisted list state.
//!
//! A [`StateSnapshot`] holds what an [`Engine`](crate::Engine) needs to put a
//! list back where it was: the measured sizes and the scroll position. With
//! the `state-persistence` feature it derives serde traits so hosts can store
//! it in whatever format they already use.

use vlist_core::{SizeRange, SizeRangeError};

/// Measured sizes plus scroll position.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct StateSnapshot {
    /// Size ranges in store order; the last one is unbounded.
    pub ranges: Vec<SizeRange>,
    /// Scroll top at capture time.
    pub scroll_top: f64,
}

impl StateSnapshot {
    /// Whether the snapshot carries no measurement.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Check every range before replaying it.
    pub fn validate(&self) -> Result<(), SizeRangeError> {
        self.ranges.iter().try_for_each(SizeRange::validate)
    }
}
