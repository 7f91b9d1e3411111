#![forbid(unsafe_code)]

//! vlist: incremental list virtualization.
//!
//! Hosts report item counts, measured sizes and scroll samples; the engine
//! answers with the rows to render and the scroll commands that keep the
//! list stable. See [`Engine`] for the full contract.
//!
//! ```
//! use vlist::prelude::*;
//! use web_time::Instant;
//!
//! let now = Instant::now();
//! let mut engine = Engine::default();
//! engine.set_total_count(1_000);
//! engine.set_viewport_at(ScrollSample::new(0.0, 0.0, 200.0), now);
//! engine.report_measured_sizes(&[SizeRange::single(0, 30.0)]);
//!
//! let window = engine.window();
//! assert_eq!(window.first_flat_index(), Some(0));
//! assert_eq!(window.last_flat_index(), Some(6));
//! ```

pub use vlist_core as core;
pub use vlist_runtime as runtime;

pub use vlist_core::{
    GroupIndices, ItemDescriptor, ItemKind, MinOverscanItemCount, OffsetIndex, Overscan,
    RenderWindow, ScrollDirection, SizeRange, SizeRangeError, SizeStore, TopItems,
    ViewportIncrease,
};
pub use vlist_runtime::{
    Align, AtBottomReason, AtBottomState, Behavior, CancelReason, ConfigError, ControllerPhase,
    Diagnostic, DiagnosticSink, Engine, EngineConfig, IndexLocation, LogLevel, MemorySink,
    NotAtBottomReason, NullSink, Output, ScrollIndex, ScrollSample, ScrollTimings, StateSnapshot,
    TracingSink,
};

/// Everything a host needs to drive an engine.
pub mod prelude {
    pub use crate::{
        Align, Behavior, Engine, EngineConfig, IndexLocation, Output, RenderWindow, ScrollSample,
        SizeRange,
    };
}
