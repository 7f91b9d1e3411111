#![forbid(unsafe_code)]

//! Simulated scroll container.
//!
//! [`ScrollContainerSim`] plays the host of an [`Engine`]: it renders every
//! window the engine emits, measures the rendered rows with a true-size
//! function, applies scroll commands the way a browser would (clamped to the
//! content height) and feeds the resulting samples back. Time only moves
//! when the test says so.
//!
//! # Frame model
//!
//! One [`pump`](ScrollContainerSim::pump) round is one frame: lay out the
//! newest window and report what its rows really measure, apply the scroll
//! commands, then send a sample if the position or content height changed.
//! Rounds repeat until the engine goes quiet or [`SimConfig::max_rounds`] is
//! reached.

use std::collections::BTreeMap;

use vlist_core::{ItemDescriptor, RenderWindow, SizeRange};
use vlist_runtime::{Behavior, Engine, EngineConfig, Output, ScrollSample};
use web_time::{Duration, Instant};

use crate::measure::compress_sizes;

/// True size of a rendered row.
pub type TrueSize = Box<dyn FnMut(&ItemDescriptor) -> f64>;

/// Simulator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Visible height of the container.
    pub viewport_height: f64,
    /// Clock step of [`ScrollContainerSim::advance_frame`].
    pub frame: Duration,
    /// Upper bound on pump rounds per call.
    pub max_rounds: usize,
    /// Upper bound on frames per [`ScrollContainerSim::settle`] call.
    pub max_settle_frames: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            viewport_height: 300.0,
            frame: Duration::from_millis(16),
            max_rounds: 32,
            max_settle_frames: 600,
        }
    }
}

impl SimConfig {
    /// Set the viewport height.
    #[must_use]
    pub fn with_viewport_height(mut self, height: f64) -> Self {
        self.viewport_height = height;
        self
    }

    /// Set the frame length.
    #[must_use]
    pub fn with_frame(mut self, frame: Duration) -> Self {
        self.frame = frame;
        self
    }
}

/// Deterministic stand-in for a browser scroll container.
pub struct ScrollContainerSim {
    engine: Engine,
    config: SimConfig,
    true_size: TrueSize,
    now: Instant,
    scroll_top: f64,
    window: RenderWindow,
    last_sample: Option<ScrollSample>,
    history: Vec<Output>,
}

impl std::fmt::Debug for ScrollContainerSim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollContainerSim")
            .field("scroll_top", &self.scroll_top)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl ScrollContainerSim {
    /// Mount a list: create the engine, let `setup` feed it counts, then
    /// send the first sample and pump.
    pub fn mount(
        engine_config: EngineConfig,
        config: SimConfig,
        true_size: impl FnMut(&ItemDescriptor) -> f64 + 'static,
        setup: impl FnOnce(&mut Engine),
    ) -> Self {
        let mut engine = Engine::new(engine_config);
        engine.batch(setup);
        let mut sim = Self {
            engine,
            config,
            true_size: Box::new(true_size),
            now: Instant::now(),
            scroll_top: 0.0,
            window: RenderWindow::default(),
            last_sample: None,
            history: Vec::new(),
        };
        sim.send_sample();
        sim.pump();
        sim
    }

    /// The engine under test.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Call an engine setter, then pump.
    pub fn update(&mut self, f: impl FnOnce(&mut Engine)) {
        f(&mut self.engine);
        self.pump();
    }

    /// Replace the true-size function; already rendered rows are re-measured.
    pub fn set_true_size(&mut self, true_size: impl FnMut(&ItemDescriptor) -> f64 + 'static) {
        self.true_size = Box::new(true_size);
        self.measure();
        self.pump();
    }

    /// Window currently on screen.
    pub fn window(&self) -> &RenderWindow {
        &self.window
    }

    /// Current scroll position of the container.
    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    /// Simulated clock.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Every output seen so far, in order.
    pub fn history(&self) -> &[Output] {
        &self.history
    }

    /// Forget the recorded history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Height of the content as laid out by the current window.
    pub fn scroll_height(&self) -> f64 {
        let rendered: f64 = self.window.items.iter().map(|item| item.size).sum();
        self.window.offset_top + rendered + self.window.offset_bottom
    }

    /// Largest reachable scroll position.
    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height() - self.config.viewport_height).max(0.0)
    }

    /// Rendered body row whose slot contains the viewport top.
    pub fn top_row(&self) -> Option<&ItemDescriptor> {
        let top = self.scroll_top;
        self.window
            .items
            .iter()
            .find(|item| item.offset + item.size > top)
    }

    /// User scroll to `top`.
    pub fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top.clamp(0.0, self.max_scroll_top());
        self.send_sample();
        self.pump();
    }

    /// User scroll by `delta`.
    pub fn scroll_by(&mut self, delta: f64) {
        self.scroll_to(self.scroll_top + delta);
    }

    /// Move the clock by `duration` and let the engine handle its timers.
    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
        self.engine.tick_at(self.now);
        self.pump();
    }

    /// Move the clock by one frame.
    pub fn advance_frame(&mut self) {
        self.advance(self.config.frame);
    }

    /// Advance frame by frame until no engine timer is pending.
    ///
    /// Returns the number of frames it took.
    pub fn settle(&mut self) -> usize {
        for frame in 0..self.config.max_settle_frames {
            if self.engine.next_deadline().is_none() {
                return frame;
            }
            self.advance_frame();
        }
        self.config.max_settle_frames
    }

    /// Process engine outputs until the engine goes quiet.
    ///
    /// Returns the number of rounds that produced output.
    pub fn pump(&mut self) -> usize {
        for round in 0..self.config.max_rounds {
            let outputs = self.engine.drain_outputs();
            if outputs.is_empty() {
                return round;
            }
            self.frame(&outputs);
            self.history.extend(outputs);
        }
        self.config.max_rounds
    }

    fn frame(&mut self, outputs: &[Output]) {
        let mut window_changed = false;
        for output in outputs {
            if let Output::RenderWindow(window) = output {
                self.window = window.clone();
                window_changed = true;
            }
        }
        if window_changed {
            self.measure();
        }

        let mut smooth = false;
        for output in outputs {
            match *output {
                Output::ScrollTo { top, behavior } => {
                    self.scroll_top = top.clamp(0.0, self.max_scroll_top());
                    smooth |= behavior == Behavior::Smooth;
                }
                Output::ScrollBy { top, behavior } => {
                    self.scroll_top = (self.scroll_top + top).clamp(0.0, self.max_scroll_top());
                    smooth |= behavior == Behavior::Smooth;
                }
                _ => {}
            }
        }
        if self.scroll_top > self.max_scroll_top() {
            // The content shrank under the viewport.
            self.scroll_top = self.max_scroll_top();
        }

        self.send_sample();
        if smooth {
            self.engine.smooth_scroll_finished_at(self.now);
        }
    }

    /// Report true sizes of every rendered row that the window got wrong.
    fn measure(&mut self) {
        let mut measured: BTreeMap<usize, f64> = BTreeMap::new();
        let mut stale = false;
        for item in self.window.top_items.iter().chain(self.window.items.iter()) {
            let size = (self.true_size)(item);
            stale |= self.window.probe || size != item.size;
            measured.insert(item.flat_index, size);
        }
        if !stale {
            return;
        }
        let ranges: Vec<SizeRange> = compress_sizes(measured);
        if ranges.is_empty() {
            return;
        }
        self.engine.report_measured_sizes(&ranges);
    }

    fn send_sample(&mut self) {
        let sample = ScrollSample::new(
            self.scroll_top,
            self.scroll_height(),
            self.config.viewport_height,
        );
        if self.last_sample == Some(sample) {
            return;
        }
        self.last_sample = Some(sample);
        self.engine.set_viewport_at(sample, self.now);
    }
}
