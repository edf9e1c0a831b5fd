use std::time::{Duration, Instant};

use grinder_traits::Clock;

/// A clock plus the epoch all published millisecond timestamps count from.
#[derive(Debug, Clone)]
pub struct Timebase<C: Clock> {
    clock: C,
    epoch: Instant,
}

impl<C: Clock> Timebase<C> {
    pub fn new(clock: C) -> Self {
        let epoch = clock.now();
        Self { clock, epoch }
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    #[inline]
    pub fn sleep_ms(&self, ms: u64) {
        self.clock.sleep(Duration::from_millis(ms));
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
