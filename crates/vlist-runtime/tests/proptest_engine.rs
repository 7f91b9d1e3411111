//! Property-based invariant tests for the engine.
//!
//! 1. Every emitted window is contiguous and covers the viewport.
//! 2. Scroll-to-index on a fully measured list lands on the target and
//!    converges after one settle window.
//! 3. Velocity is zero whenever scrolling stopped.
//! 4. Repeating the same size report never emits anything.

use proptest::prelude::*;
use vlist_core::{RenderWindow, SizeRange};
use vlist_runtime::{
    Engine, EngineConfig, IndexLocation, NullSink, Output, ScrollSample, ScrollStateFlags,
    ScrollTimings,
};
use web_time::{Duration, Instant};

const VIEWPORT: f64 = 200.0;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    Report(SizeRange),
    Scroll(f64),
}

fn size_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![Just(12.0), Just(30.0), Just(48.0), Just(75.5)]
}

fn step_strategy(count: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..count, 0usize..8, size_strategy()).prop_map(move |(start, len, size)| {
            Step::Report(SizeRange::new(start, (start + len).min(count - 1), size))
        }),
        (0.0f64..1.0).prop_map(Step::Scroll),
    ]
}

fn quiet_engine() -> Engine {
    Engine::with_sink(EngineConfig::default(), Box::new(NullSink))
}

fn assert_contiguous(window: &RenderWindow) {
    for pair in window.items.windows(2) {
        assert_eq!(pair[0].flat_index + 1, pair[1].flat_index);
        assert!(pair[0].offset <= pair[1].offset);
    }
}

fn assert_covers(engine: &Engine) {
    let window = engine.window();
    assert_contiguous(window);
    if window.probe || window.total_count == 0 {
        return;
    }
    let top = engine.scroll_top();
    let (covered_top, covered_bottom) = window.covered().expect("measured list renders rows");
    assert!(covered_top <= top, "window starts at {covered_top}, viewport at {top}");
    let reached_end = window.last_flat_index() == Some(window.total_count - 1);
    assert!(
        reached_end || covered_bottom >= top + VIEWPORT,
        "window ends at {covered_bottom}, viewport ends at {}",
        top + VIEWPORT
    );
}

// ═════════════════════════════════════════════════════════════════════════
// Window coverage
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn windows_cover_the_viewport(
        count in 1usize..300,
        steps in proptest::collection::vec(step_strategy(300), 1..40),
    ) {
        let t0 = Instant::now();
        let mut engine = quiet_engine();
        engine.set_total_count(count);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, VIEWPORT), t0);
        engine.report_measured_sizes(&[SizeRange::single(0, 30.0)]);

        for (i, step) in steps.into_iter().enumerate() {
            let now = t0 + Duration::from_millis(16 * (i as u64 + 1));
            match step {
                Step::Report(range) => {
                    let start = range.start_index.min(count - 1);
                    let end = range.end_index.min(count - 1).max(start);
                    engine.report_measured_sizes(&[SizeRange::new(start, end, range.size)]);
                }
                Step::Scroll(fraction) => {
                    let total = engine.offsets().total_size(count);
                    let top = ((total - VIEWPORT).max(0.0) * fraction).floor();
                    engine.set_viewport_at(ScrollSample::new(top, total, VIEWPORT), now);
                }
            }
            assert_covers(&engine);
            engine.drain_outputs();
        }
    }

    #[test]
    fn repeated_report_is_silent(
        count in 1usize..200,
        start in 0usize..200,
        size in size_strategy(),
    ) {
        let t0 = Instant::now();
        let mut engine = quiet_engine();
        engine.set_total_count(count);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, VIEWPORT), t0);
        engine.report_measured_sizes(&[SizeRange::single(0, 30.0)]);
        let start = start.min(count - 1);
        let report = [SizeRange::single(start, size)];
        engine.report_measured_sizes(&report);
        engine.drain_outputs();
        let version = engine.store().version();

        engine.report_measured_sizes(&report);
        prop_assert!(engine.drain_outputs().is_empty());
        prop_assert_eq!(engine.store().version(), version);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Scroll-to-index
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn scroll_to_index_lands_on_measured_target(
        sizes in proptest::collection::vec(size_strategy(), 1..120),
        target in 0usize..120,
    ) {
        let count = sizes.len();
        let target = target.min(count - 1);
        let t0 = Instant::now();
        let mut engine = quiet_engine();
        engine.set_total_count(count);
        engine.set_viewport_at(ScrollSample::new(0.0, 0.0, VIEWPORT), t0);
        let ranges: Vec<SizeRange> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| SizeRange::single(i, size))
            .collect();
        engine.report_measured_sizes(&ranges);
        engine.drain_outputs();

        engine.request_scroll_to_index_at(IndexLocation::item(target), t0);
        let issued = engine.drain_outputs().into_iter().find_map(|o| match o {
            Output::ScrollTo { top, .. } => Some(top),
            _ => None,
        });
        let top = issued.expect("request issues a scroll");
        let total = engine.offsets().total_size(count);
        prop_assert!(top <= (total - VIEWPORT).max(0.0) + f64::EPSILON);

        let t1 = t0 + Duration::from_millis(16);
        engine.set_viewport_at(ScrollSample::new(top, total, VIEWPORT), t1);
        prop_assert!(engine.window().find(target).is_some());

        engine.tick_at(t1 + Duration::from_millis(150));
        let converged = engine
            .drain_outputs()
            .iter()
            .any(|o| matches!(o, Output::ScrollToIndexConverged { .. }));
        prop_assert!(converged);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Scroll flags
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn velocity_is_zero_once_idle(
        tops in proptest::collection::vec(0.0f64..5000.0, 1..30),
        gaps in proptest::collection::vec(1u64..400, 1..30),
    ) {
        let timings = ScrollTimings::default();
        let mut flags = ScrollStateFlags::new(0.0, 4.0, timings);
        let mut now = Instant::now();
        for (top, gap) in tops.iter().zip(gaps.iter().cycle()) {
            now += Duration::from_millis(*gap);
            flags.tick_at(now);
            flags.observe_at(ScrollSample::new(*top, 6000.0, VIEWPORT), now);
            if !flags.is_scrolling() {
                prop_assert_eq!(flags.scroll_velocity(), 0.0);
            }
            prop_assert_eq!(flags.is_at_top(), *top <= 0.0);
        }
        flags.tick_at(now + timings.scrolling_idle);
        prop_assert!(!flags.is_scrolling());
        prop_assert_eq!(flags.scroll_velocity(), 0.0);
    }
}
