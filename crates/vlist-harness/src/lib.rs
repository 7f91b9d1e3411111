#![forbid(unsafe_code)]

//! Harness: a deterministic host for driving the engine in tests.
//!
//! # Role in vlist
//! Integration tests need something that behaves like a browser scroll
//! container: it renders windows, measures rows, clamps scroll positions and
//! reports samples. `vlist-harness` is that host, with a manual clock and a
//! true-size function in place of layout.
//!
//! # Primary responsibilities
//! - **ScrollContainerSim**: the simulated container and frame loop.
//! - **compress_sizes**: per-row measurements to size ranges.
//!
//! # How it fits in the system
//! Tests mount a list with [`ScrollContainerSim::mount`], act on it through
//! user scrolls and engine setters, and assert on the window on screen and
//! the recorded [`Output`](vlist_runtime::Output) history.

pub mod measure;
pub mod sim;

pub use measure::compress_sizes;
pub use sim::{ScrollContainerSim, SimConfig, TrueSize};
