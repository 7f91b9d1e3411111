//! Scroll-to-index through a simulated container with unknown sizes.
//!
//! ## Test Categories
//!
//! 1. **Convergence** - the target lands where the alignment asks for it
//! 2. **Retries** - measurements near the target trigger re-issues
//! 3. **Watchdog** - an endlessly resizing list cancels the request

use vlist_core::ItemDescriptor;
use vlist_harness::{ScrollContainerSim, SimConfig};
use vlist_runtime::{Align, CancelReason, EngineConfig, IndexLocation, Output};

const VIEWPORT: f64 = 300.0;

fn varied(item: &ItemDescriptor) -> f64 {
    20.0 + ((item.display_index * 7) % 5) as f64 * 10.0
}

fn mount_varied(count: usize) -> ScrollContainerSim {
    ScrollContainerSim::mount(
        EngineConfig::default(),
        SimConfig::default().with_viewport_height(VIEWPORT),
        varied,
        |engine| engine.set_total_count(count),
    )
}

fn converged(sim: &ScrollContainerSim, location: IndexLocation) -> bool {
    sim.history()
        .contains(&Output::ScrollToIndexConverged { location })
}

// =============================================================================
// Convergence
// =============================================================================

#[test]
fn start_aligned_target_lands_at_viewport_top() {
    let mut sim = mount_varied(1000);
    let location = IndexLocation::item(500);
    let now = sim.now();
    sim.update(|engine| engine.request_scroll_to_index_at(location, now));
    sim.settle();

    assert!(converged(&sim, location), "history: {:?}", sim.history());
    let top = sim.top_row().expect("rows on screen");
    assert_eq!(top.flat_index, 500);
    assert_eq!(top.offset, sim.scroll_top());
    assert_eq!(top.size, varied(top));
}

#[test]
fn first_window_is_measured_before_anything_else() {
    let sim = mount_varied(1000);
    assert!(!sim.window().probe);
    for item in &sim.window().items {
        assert_eq!(item.size, varied(item), "row {} not measured", item.flat_index);
    }
    assert_eq!(sim.window().first_flat_index(), Some(0));
}

// =============================================================================
// Retries
// =============================================================================

#[test]
fn end_aligned_target_retries_until_bottom_edge_matches() {
    let mut sim = mount_varied(1000);
    let location = IndexLocation::item(300).with_align(Align::End);
    let now = sim.now();
    sim.update(|engine| engine.request_scroll_to_index_at(location, now));
    sim.settle();

    assert!(converged(&sim, location), "history: {:?}", sim.history());
    let target = sim.window().find(300).expect("target rendered");
    let bottom = target.offset + target.size;
    assert!(
        (bottom - (sim.scroll_top() + VIEWPORT)).abs() < 1.0,
        "target bottom {bottom}, viewport bottom {}",
        sim.scroll_top() + VIEWPORT
    );
}

#[test]
fn new_request_supersedes_the_old_one() {
    let mut sim = mount_varied(1000);
    let first = IndexLocation::item(200);
    let second = IndexLocation::item(700);
    let now = sim.now();
    sim.update(|engine| {
        engine.request_scroll_to_index_at(first, now);
        engine.request_scroll_to_index_at(second, now);
    });
    sim.settle();

    assert!(sim.history().contains(&Output::ScrollToIndexCancelled {
        location: first,
        reason: CancelReason::Superseded,
    }));
    assert!(converged(&sim, second));
    assert_eq!(sim.top_row().map(|row| row.flat_index), Some(700));
}

#[test]
fn last_index_is_clamped_to_the_end() {
    let mut sim = mount_varied(1000);
    let location = IndexLocation::last();
    let now = sim.now();
    sim.update(|engine| engine.request_scroll_to_index_at(location, now));
    sim.settle();

    assert!(converged(&sim, location));
    assert_eq!(sim.window().last_flat_index(), Some(999));
    assert!((sim.scroll_top() - sim.max_scroll_top()).abs() < 1.0);
}

// =============================================================================
// Watchdog
// =============================================================================

#[test]
fn endlessly_resizing_rows_time_out() {
    let mut sim = ScrollContainerSim::mount(
        EngineConfig::default(),
        SimConfig::default().with_viewport_height(VIEWPORT),
        |_: &ItemDescriptor| 30.0,
        |engine| engine.set_total_count(1000),
    );
    let location = IndexLocation::item(400).with_align(Align::Center);
    let now = sim.now();
    sim.update(|engine| engine.request_scroll_to_index_at(location, now));

    let timed_out = Output::ScrollToIndexCancelled {
        location,
        reason: CancelReason::TimedOut,
    };
    for frame in 0..120u32 {
        // Every row above the target grows a little each frame.
        let grown = 30.0 + f64::from(frame + 1) * 7.0;
        sim.set_true_size(move |item| if item.flat_index < 400 { grown } else { 30.0 });
        sim.advance_frame();
        if sim.history().contains(&timed_out) {
            break;
        }
    }

    assert!(sim.history().contains(&timed_out), "history: {:?}", sim.history());
    assert!(!converged(&sim, location));
    let elapsed = sim.now() - now;
    assert!(elapsed.as_millis() >= 1200, "cancelled after {elapsed:?}");
}
