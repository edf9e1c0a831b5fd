use std::sync::Arc;
use std::time::Duration;

use grinder_core::filter::Passthrough;
use grinder_core::mocks::ScriptedLoadCell;
use grinder_core::{
    FilteredWeight, GrindStatus, ScaleLoop, Shared, TareCfg, TareController, TareState, Timebase,
    WeightEstimator,
};
use grinder_traits::ManualClock;
use rstest::rstest;

fn ctl() -> TareController {
    TareController::new(TareCfg::default(), Duration::from_millis(300))
}

#[rstest]
#[case(GrindStatus::Grinding)]
#[case(GrindStatus::Finished)]
#[case(GrindStatus::Failed)]
fn never_outside_empty(#[case] status: GrindStatus) {
    let t = TareState {
        last_tared_ms: Some(0),
        tare_count: 1,
    };
    for g in [0.5f32, 1.0, 2.9, -0.4] {
        let w = FilteredWeight::ready(g, 60_000);
        assert!(!ctl().should_retare(status, &w, &t, 60_000), "{status} {g}");
    }
}

#[test]
fn never_while_sensor_lost() {
    let t = TareState {
        last_tared_ms: Some(0),
        tare_count: 1,
    };
    let w = FilteredWeight {
        sensor_ready: false,
        ..FilteredWeight::ready(1.0, 60_000)
    };
    assert!(!ctl().should_retare(GrindStatus::Empty, &w, &t, 60_000));
}

#[test]
fn never_twice_within_interval() {
    let clock = ManualClock::new();
    let time = Timebase::new(clock.clone());
    let shared = Shared::new(18.0);
    // a platform that keeps drifting back to +1 g
    let est = WeightEstimator::new(
        ScriptedLoadCell::constant(1.0),
        Box::new(Passthrough::default()),
        Duration::from_millis(300),
        Arc::clone(&shared),
        time.clone(),
    );
    let mut scale = ScaleLoop::new(est, ctl(), Arc::clone(&shared), time.clone());
    let c = ctl();

    let mut posted = Vec::new();
    while time.now_ms() < 60_000 {
        clock.advance_ms(50);
        scale.cycle();
        let now = time.now_ms();
        if c.maybe_request(&shared, GrindStatus::Empty, &shared.weight(), now) {
            posted.push(now);
        }
    }
    assert!(posted.len() >= 4, "{posted:?}");
    for pair in posted.windows(2) {
        assert!(pair[1] - pair[0] > 10_000, "{posted:?}");
    }
    assert_eq!(shared.tare_state().tare_count as usize, posted.len() + 1);
}

#[test]
fn startup_tare_blocks_auto_requests() {
    let shared = Shared::new(18.0);
    let w = FilteredWeight::ready(1.0, 0);
    for now in (0..60_000).step_by(500) {
        assert!(!ctl().maybe_request(&shared, GrindStatus::Empty, &w, now));
    }
}
