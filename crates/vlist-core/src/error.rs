#![forbid(unsafe_code)]

//! Error types for size reports.

use std::fmt;

/// A size range that cannot be applied to a [`SizeStore`](crate::SizeStore).
///
/// Size reports are validated as a whole before any range is applied, so a
/// batch that produces this error leaves the store untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeRangeError {
    /// `start_index` is greater than `end_index`.
    Inverted {
        /// First index of the offending range.
        start_index: usize,
        /// Last index of the offending range.
        end_index: usize,
    },
    /// The reported size is below zero.
    NegativeSize {
        /// First index of the offending range.
        index: usize,
        /// The reported size.
        size: f64,
    },
    /// The reported size is NaN or infinite.
    NonFiniteSize {
        /// First index of the offending range.
        index: usize,
    },
}

impl fmt::Display for SizeRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inverted {
                start_index,
                end_index,
            } => write!(
                f,
                "size range start {start_index} is after its end {end_index}"
            ),
            Self::NegativeSize { index, size } => {
                write!(f, "size range at {index} has negative size {size}")
            }
            Self::NonFiniteSize { index } => {
                write!(f, "size range at {index} has a non-finite size")
            }
        }
    }
}

impl std::error::Error for SizeRangeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_indices() {
        let err = SizeRangeError::Inverted {
            start_index: 9,
            end_index: 3,
        };
        assert_eq!(err.to_string(), "size range start 9 is after its end 3");
    }
}
