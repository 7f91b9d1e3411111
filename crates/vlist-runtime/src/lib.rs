#![forbid(unsafe_code)]

//! Runtime: the stateful virtualization engine.
//!
//! # Role in vlist
//! `vlist-runtime` turns host events (item counts, measured sizes, scroll
//! samples, scroll-to-index requests, timer ticks) into render windows and
//! scroll commands. It owns everything with memory or time: the size store of
//! a list, the derived scroll flags and the scroll-to-index convergence loop.
//!
//! # Primary responsibilities
//! - **Engine**: commit pipeline, front shifts, window emission.
//! - **ScrollStateFlags**: at-top, at-bottom with reason, direction, velocity.
//! - **ScrollToIndexController**: issue, settle, retry, converge or cancel.
//! - **Diagnostics**: leveled messages routed to `tracing` or a custom sink.
//! - **Persistence**: snapshots of measured sizes and scroll position.
//!
//! # How it fits in the system
//! The host owns the real scroll container. It forwards samples and
//! measurements to an [`Engine`], drains [`Output`]s, renders the rows of each
//! [`RenderWindow`](vlist_core::RenderWindow) and applies scroll commands.
//! `vlist-harness` plays the host in tests.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod persistence;
pub mod scroll_state;
pub mod scroll_to_index;

pub use config::{ConfigError, EngineConfig, ScrollTimings};
pub use diagnostics::{
    Diagnostic, DiagnosticSink, LogLevel, Logger, MemorySink, NullSink, TracingSink,
};
pub use engine::{Engine, Output};
pub use persistence::StateSnapshot;
pub use scroll_state::{
    AtBottomReason, AtBottomState, FlagChanges, NotAtBottomReason, ScrollSample, ScrollStateFlags,
};
pub use scroll_to_index::{
    Align, Behavior, CancelReason, ControllerEvent, ControllerPhase, IndexLocation, ScrollIndex,
    ScrollTarget, ScrollToIndexController, TargetContext, resolve_flat_index, resolve_target,
};
