//! Zeroing: the startup tare and the auto-tare drift policy.
//!
//! The decision loop decides *when* to tare (it owns the status), the scale
//! loop performs it (it owns the load cell). They meet through `TareState`:
//! clearing `last_tared_ms` is the request, setting it again is completion.

use std::time::Duration;

use grinder_traits::LoadCell;

use crate::config::TareCfg;
use crate::error::GrinderError;
use crate::hw_error::map_boxed;
use crate::shared::{FilteredWeight, Shared, TareState};
use crate::status::GrindStatus;

#[derive(Debug, Clone)]
pub struct TareController {
    cfg: TareCfg,
    timeout: Duration,
}

impl TareController {
    pub fn new(cfg: TareCfg, timeout: Duration) -> Self {
        Self { cfg, timeout }
    }

    pub fn cfg(&self) -> &TareCfg {
        &self.cfg
    }

    /// Zero the load cell using the configured sample count.
    pub fn tare<L: LoadCell + ?Sized>(&self, cell: &mut L) -> Result<(), GrinderError> {
        cell.tare(self.cfg.samples, self.timeout)
            .map_err(|e| map_boxed(&e))
    }

    /// Whether the empty platform has drifted enough to re-zero.
    ///
    /// Only an empty, responsive platform is ever re-tared, never more than
    /// once per `min_interval_ms`, and only when the reading sits in the
    /// small-drift band: a cup or a hand on the platform reads far above it.
    pub fn should_retare(
        &self,
        status: GrindStatus,
        weight: &FilteredWeight,
        tare: &TareState,
        now_ms: u64,
    ) -> bool {
        if status != GrindStatus::Empty || !weight.sensor_ready {
            return false;
        }
        let Some(last) = tare.last_tared_ms else {
            // already requested
            return false;
        };
        if now_ms.saturating_sub(last) <= self.cfg.min_interval_ms {
            return false;
        }
        let w = weight.grams;
        w.abs() > self.cfg.drift_min_g && w < self.cfg.drift_max_g
    }

    /// Apply the policy and post a request. Returns true if one was posted.
    pub fn maybe_request(
        &self,
        shared: &Shared,
        status: GrindStatus,
        weight: &FilteredWeight,
        now_ms: u64,
    ) -> bool {
        let tare = shared.tare_state();
        if !self.should_retare(status, weight, &tare, now_ms) {
            return false;
        }
        let posted = shared.request_tare();
        if posted {
            tracing::info!(weight_g = weight.grams, "zero drift, requesting tare");
        }
        posted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctl() -> TareController {
        TareController::new(TareCfg::default(), Duration::from_millis(300))
    }

    fn tared_at(ms: u64) -> TareState {
        TareState {
            last_tared_ms: Some(ms),
            tare_count: 1,
        }
    }

    #[test]
    fn drift_band_is_signed() {
        let c = ctl();
        let t = tared_at(0);
        let at = |g| FilteredWeight::ready(g, 20_000);
        assert!(c.should_retare(GrindStatus::Empty, &at(0.5), &t, 20_000));
        assert!(c.should_retare(GrindStatus::Empty, &at(-0.5), &t, 20_000));
        assert!(c.should_retare(GrindStatus::Empty, &at(-40.0), &t, 20_000));
        assert!(!c.should_retare(GrindStatus::Empty, &at(0.1), &t, 20_000));
        assert!(!c.should_retare(GrindStatus::Empty, &at(3.0), &t, 20_000));
    }

    #[test]
    fn interval_is_strict() {
        let c = ctl();
        let w = FilteredWeight::ready(1.0, 0);
        assert!(!c.should_retare(GrindStatus::Empty, &w, &tared_at(5_000), 15_000));
        assert!(c.should_retare(GrindStatus::Empty, &w, &tared_at(5_000), 15_001));
    }

    #[test]
    fn maybe_request_posts_once() {
        let c = ctl();
        let shared = Shared::new(18.0);
        shared.complete_tare(0);
        let w = FilteredWeight::ready(1.0, 11_000);
        assert!(c.maybe_request(&shared, GrindStatus::Empty, &w, 11_000));
        assert!(shared.tare_state().pending());
        assert!(!c.maybe_request(&shared, GrindStatus::Empty, &w, 11_050));
    }

    #[test]
    fn tare_maps_timeout() {
        let c = ctl();
        let mut cell = crate::mocks::NoopLoadCell;
        assert!(c.tare(&mut cell).unwrap_err().is_timeout());
    }
}
