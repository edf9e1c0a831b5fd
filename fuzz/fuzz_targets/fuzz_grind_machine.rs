#![no_main]
use grinder_core::mocks::SpyActuator;
use grinder_core::{FilteredWeight, GrindCfg, GrindMachine, GrindStatus};
use libfuzzer_sys::{arbitrary, fuzz_target};

#[derive(Debug, arbitrary::Arbitrary)]
struct Tick {
    grams: f32,
    ready: bool,
    dt_ms: u16,
}

fuzz_target!(|ticks: Vec<Tick>| {
    let spy = SpyActuator::default();
    let mut m = GrindMachine::new(spy.clone(), GrindCfg::default());
    let mut now = 0u64;
    for t in ticks {
        now += u64::from(t.dt_ms);
        let w = FilteredWeight {
            grams: t.grams,
            updated_at_ms: Some(now),
            sensor_ready: t.ready,
        };
        let st = m.tick(&w, now).unwrap();
        assert_eq!(spy.is_on(), st == GrindStatus::Grinding);
    }
});
