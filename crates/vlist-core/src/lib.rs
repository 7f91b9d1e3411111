#![forbid(unsafe_code)]

//! Core: size store, offset index, group mapping, windowing and shifts.
//!
//! # Role in vlist
//! `vlist-core` holds the pure data structures of list virtualization. It has
//! no clock, no output queue and no logging sink; every function is a
//! deterministic transformation of its inputs.
//!
//! # Primary responsibilities
//! - **SizeStore**: range-compressed map from item index to measured size.
//! - **OffsetIndex**: breakpoints turning indices into pixel offsets,
//!   rebuilt incrementally from the first changed index.
//! - **GroupIndices**: flat positions of group header rows.
//! - **Window calculation**: which rows to render for a pixel boundary.
//! - **Shifts**: re-keying measurements when the front of the list changes.
//!
//! # How it fits in the system
//! `vlist-runtime` owns one store and one offset index per list and drives
//! these kernels from host events. Hosts that want their own event loop can
//! use the kernels directly.

pub mod error;
pub mod groups;
pub mod offset_index;
pub mod range;
pub mod shift;
pub mod size_store;
pub mod window;

pub use error::SizeRangeError;
pub use groups::GroupIndices;
pub use offset_index::{OffsetIndex, OffsetPoint, OffsetRange};
pub use range::{SizeRange, compress_measurements};
pub use shift::{ShiftPlan, compensating_delta, remap_flat_index};
pub use size_store::{SizeStore, SizeUpdate};
pub use window::{
    BoundaryConfig, ItemDescriptor, ItemKind, ListBoundary, MinOverscanItemCount, Overscan,
    RenderWindow, ScrollDirection, TopItems, ViewportIncrease, WindowInput, compute_window,
    expand_boundary, needs_new_boundary,
};
