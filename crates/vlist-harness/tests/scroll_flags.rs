//! Scroll flags seen by follow-output and scroll-seek consumers.

use vlist_core::{ItemDescriptor, ScrollDirection};
use vlist_harness::{ScrollContainerSim, SimConfig};
use vlist_runtime::{AtBottomReason, AtBottomState, EngineConfig, NotAtBottomReason, Output};

fn mount(count: usize) -> ScrollContainerSim {
    let mut sim = ScrollContainerSim::mount(
        EngineConfig::default(),
        SimConfig::default(),
        |_: &ItemDescriptor| 30.0,
        |engine| engine.set_total_count(count),
    );
    sim.settle();
    sim
}

fn last_at_bottom(sim: &ScrollContainerSim) -> Option<AtBottomState> {
    sim.history().iter().rev().find_map(|o| match o {
        Output::AtBottomStateChanged(state) => Some(*state),
        _ => None,
    })
}

#[test]
fn at_bottom_reasons_follow_the_content() {
    let mut sim = mount(50);

    sim.clear_history();
    sim.scroll_to(sim.max_scroll_top());
    assert_eq!(sim.scroll_top(), 1200.0);
    assert!(matches!(
        last_at_bottom(&sim),
        Some(AtBottomState::AtBottom {
            because: AtBottomReason::ScrolledDown,
            ..
        })
    ));

    sim.clear_history();
    sim.update(|engine| engine.set_total_count(60));
    assert_eq!(
        last_at_bottom(&sim),
        Some(AtBottomState::NotAtBottom {
            because: NotAtBottomReason::SizeIncreased
        })
    );

    sim.clear_history();
    sim.update(|engine| engine.set_total_count(50));
    assert!(matches!(
        last_at_bottom(&sim),
        Some(AtBottomState::AtBottom {
            because: AtBottomReason::SizeDecreased,
            ..
        })
    ));
}

#[test]
fn scrolling_up_leaves_the_bottom() {
    let mut sim = mount(50);
    sim.scroll_to(sim.max_scroll_top());
    sim.clear_history();
    sim.scroll_by(-100.0);
    assert_eq!(
        last_at_bottom(&sim),
        Some(AtBottomState::NotAtBottom {
            because: NotAtBottomReason::ScrollingUp
        })
    );
    assert_eq!(
        sim.engine().flags().scroll_direction(),
        ScrollDirection::Up
    );
}

#[test]
fn at_top_and_scrolling_flags_toggle() {
    let mut sim = mount(50);
    sim.clear_history();
    sim.scroll_to(300.0);
    assert!(sim.history().contains(&Output::AtTopStateChanged(false)));
    assert!(sim.history().contains(&Output::ScrollingChanged(true)));

    sim.settle();
    assert!(sim.history().contains(&Output::ScrollingChanged(false)));
    assert_eq!(
        sim.engine().flags().scroll_direction(),
        ScrollDirection::None
    );

    sim.clear_history();
    sim.scroll_to(0.0);
    assert!(sim.history().contains(&Output::AtTopStateChanged(true)));
}
