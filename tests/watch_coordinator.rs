// tests/watch_coordinator.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use assetdag::watch::{BindingState, WatchBinding, WatchCoordinator};

const DEBOUNCE: Duration = Duration::from_millis(100);

fn coordinator() -> WatchCoordinator {
    let bindings = vec![
        WatchBinding::new(0, "css", ["src/scss/**/*.scss"]).unwrap(),
        WatchBinding::new(1, "js", ["src/js/*.js"]).unwrap(),
    ];
    WatchCoordinator::new(Arc::from(bindings), DEBOUNCE)
}

/// Drive the coordinator as the engine would: expire timers and start a run
/// whenever one is due and none is active. Returns the number of runs.
fn drain_runs(c: &mut WatchCoordinator, mut now: Instant) -> usize {
    let mut runs = 0;
    loop {
        if let Some(deadline) = c.next_deadline() {
            now = now.max(deadline);
            c.expire(now);
        }
        if !c.has_due() {
            return runs;
        }
        c.take_due();
        runs += 1;
        c.on_run_finished();
    }
}

#[test]
fn three_changes_in_one_window_run_once() {
    let mut c = coordinator();
    let t0 = Instant::now();

    c.on_change(0, t0);
    c.on_change(0, t0 + Duration::from_millis(40));
    c.on_change(0, t0 + Duration::from_millis(80));

    assert!(matches!(c.state_of(0), Some(BindingState::Debouncing { .. })));
    assert_eq!(drain_runs(&mut c, t0), 1);
    assert!(c.is_quiet());
}

#[test]
fn changes_during_run_set_a_single_pending_rerun() {
    let mut c = coordinator();
    let t0 = Instant::now();

    c.on_change(0, t0);
    c.expire(t0 + DEBOUNCE);
    assert_eq!(c.take_due(), vec!["css"]);

    for i in 1..=5 {
        c.on_change(0, t0 + DEBOUNCE + Duration::from_millis(i));
    }
    assert_eq!(
        c.state_of(0),
        Some(BindingState::Running {
            in_flight: true,
            rerun_pending: true
        })
    );

    c.on_run_finished();
    assert!(c.has_due());
    assert_eq!(c.take_due(), vec!["css"]);
    c.on_run_finished();
    assert_eq!(c.state_of(0), Some(BindingState::Idle));
}

#[test]
fn unknown_binding_is_ignored() {
    let mut c = coordinator();
    c.on_change(7, Instant::now());
    assert!(c.is_quiet());
}

#[test]
fn bindings_due_together_start_one_merged_run() {
    let mut c = coordinator();
    let t0 = Instant::now();

    c.on_change(0, t0);
    c.on_change(1, t0 + Duration::from_millis(10));
    c.expire(t0 + Duration::from_millis(200));

    assert_eq!(c.take_due(), vec!["css", "js"]);
}

proptest! {
    #[test]
    fn any_burst_inside_one_window_runs_once(
        gaps in proptest::collection::vec(0u64..100, 1..20),
    ) {
        let mut c = coordinator();
        let t0 = Instant::now();
        let mut now = t0;
        for gap in gaps {
            now += Duration::from_millis(gap);
            c.on_change(0, now);
        }
        prop_assert_eq!(drain_runs(&mut c, t0), 1);
    }

    #[test]
    fn any_number_of_changes_during_a_run_adds_exactly_one_run(n in 1usize..50) {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.on_change(0, t0);
        c.expire(t0 + DEBOUNCE);
        c.take_due();

        for i in 0..n {
            c.on_change(0, t0 + DEBOUNCE + Duration::from_millis(i as u64));
        }
        c.on_run_finished();

        prop_assert_eq!(drain_runs(&mut c, t0 + DEBOUNCE * 2), 1);
    }
}
