#![forbid(unsafe_code)]

//! Closed index ranges sharing one pixel size.

use crate::error::SizeRangeError;

/// A run of consecutive items `[start_index, end_index]` that share `size`.
///
/// `end_index == SizeRange::UNBOUNDED` denotes the open tail of the sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SizeRange {
    /// First index covered by the range.
    pub start_index: usize,
    /// Last index covered by the range (inclusive).
    pub end_index: usize,
    /// Pixel size of every item in the range.
    pub size: f64,
}

impl SizeRange {
    /// Sentinel end index for the tail range.
    pub const UNBOUNDED: usize = usize::MAX;

    /// Create a range covering `[start_index, end_index]`.
    #[must_use]
    pub const fn new(start_index: usize, end_index: usize, size: f64) -> Self {
        Self {
            start_index,
            end_index,
            size,
        }
    }

    /// Create a range covering a single index.
    #[must_use]
    pub const fn single(index: usize, size: f64) -> Self {
        Self::new(index, index, size)
    }

    /// Create a range from `start_index` to the end of the sequence.
    #[must_use]
    pub const fn tail(start_index: usize, size: f64) -> Self {
        Self::new(start_index, Self::UNBOUNDED, size)
    }

    /// Whether the range extends to the end of the sequence.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.end_index == Self::UNBOUNDED
    }

    /// Whether `index` falls inside the range.
    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        self.start_index <= index && index <= self.end_index
    }

    /// Number of items covered, `None` for the tail range.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        if self.is_unbounded() {
            None
        } else {
            Some(self.end_index - self.start_index + 1)
        }
    }

    /// Check that the range can be stored.
    pub fn validate(&self) -> Result<(), SizeRangeError> {
        if self.start_index > self.end_index {
            return Err(SizeRangeError::Inverted {
                start_index: self.start_index,
                end_index: self.end_index,
            });
        }
        if !self.size.is_finite() {
            return Err(SizeRangeError::NonFiniteSize {
                index: self.start_index,
            });
        }
        if self.size < 0.0 {
            return Err(SizeRangeError::NegativeSize {
                index: self.start_index,
                size: self.size,
            });
        }
        Ok(())
    }
}

/// Compress per-index measurements into ranges of equal size.
///
/// Consecutive indices with identical sizes are merged; a gap in the indices
/// starts a new range.
#[must_use]
pub fn compress_measurements(measurements: &[(usize, f64)]) -> Vec<SizeRange> {
    let mut ranges: Vec<SizeRange> = Vec::new();
    for &(index, size) in measurements {
        if let Some(last) = ranges.last_mut()
            && last.end_index.checked_add(1) == Some(index)
            && last.size == size
        {
            last.end_index = index;
            continue;
        }
        ranges.push(SizeRange::single(index, size));
    }
    ranges
}
