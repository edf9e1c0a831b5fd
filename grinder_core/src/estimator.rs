//! Weight estimation: one raw read, one filter step, one published sample.

use std::sync::Arc;
use std::time::Duration;

use grinder_traits::{Clock, LoadCell};

use crate::filter::Estimator;
use crate::shared::{FilteredWeight, Shared};
use crate::timebase::Timebase;

pub struct WeightEstimator<L: LoadCell, C: Clock> {
    cell: L,
    filter: Box<dyn Estimator>,
    timeout: Duration,
    shared: Arc<Shared>,
    time: Timebase<C>,
    misses: u64,
    miss_streak: u32,
}

impl<L: LoadCell, C: Clock> core::fmt::Debug for WeightEstimator<L, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeightEstimator")
            .field("estimate", &self.filter.estimate())
            .field("timeout", &self.timeout)
            .field("misses", &self.misses)
            .field("miss_streak", &self.miss_streak)
            .finish()
    }
}

impl<L: LoadCell, C: Clock> WeightEstimator<L, C> {
    pub fn new(
        cell: L,
        filter: Box<dyn Estimator>,
        timeout: Duration,
        shared: Arc<Shared>,
        time: Timebase<C>,
    ) -> Self {
        Self {
            cell,
            filter,
            timeout,
            shared,
            time,
            misses: 0,
            miss_streak: 0,
        }
    }

    /// Read once and publish the result.
    ///
    /// A good read is folded into the filter and published with
    /// `sensor_ready = true`. A failed read leaves the estimate alone and
    /// only clears `sensor_ready`.
    pub fn poll(&mut self) -> FilteredWeight {
        match self.cell.read_grams(self.timeout) {
            Ok(raw) => {
                let grams = self.filter.update(raw);
                let w = FilteredWeight::ready(grams, self.time.now_ms());
                self.shared.publish_weight(w);
                if self.miss_streak > 0 {
                    tracing::info!(missed = self.miss_streak, "load cell responding again");
                }
                self.miss_streak = 0;
                tracing::trace!(raw_g = raw, filtered_g = grams, "sample");
                w
            }
            Err(e) => {
                self.misses = self.misses.saturating_add(1);
                self.miss_streak = self.miss_streak.saturating_add(1);
                if self.miss_streak == 1 {
                    tracing::warn!(error = %e, "load cell read failed");
                }
                self.shared.mark_sensor_lost()
            }
        }
    }

    /// Total failed reads since start.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Consecutive failed reads; zero after any good one.
    pub fn miss_streak(&self) -> u32 {
        self.miss_streak
    }

    pub fn estimate(&self) -> f32 {
        self.filter.estimate()
    }

    pub fn load_cell_mut(&mut self) -> &mut L {
        &mut self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Passthrough;
    use crate::mocks::ScriptedLoadCell;
    use grinder_traits::ManualClock;

    fn est(cell: ScriptedLoadCell) -> (WeightEstimator<ScriptedLoadCell, ManualClock>, Arc<Shared>) {
        let shared = Shared::new(18.0);
        let e = WeightEstimator::new(
            cell,
            Box::new(Passthrough::default()),
            Duration::from_millis(300),
            Arc::clone(&shared),
            Timebase::new(ManualClock::new()),
        );
        (e, shared)
    }

    #[test]
    fn miss_keeps_estimate_and_flags_sensor() {
        let (mut e, shared) = est(ScriptedLoadCell::new([Some(3.0), None, None, Some(4.0)]));
        assert!(e.poll().sensor_ready);
        let lost = e.poll();
        assert!(!lost.sensor_ready);
        assert_eq!(lost.grams, 3.0);
        e.poll();
        assert_eq!(e.miss_streak(), 2);
        assert!(!shared.weight().sensor_ready);

        let back = e.poll();
        assert!(back.sensor_ready);
        assert_eq!(back.grams, 4.0);
        assert_eq!(e.miss_streak(), 0);
        assert_eq!(e.misses(), 2);
    }
}
