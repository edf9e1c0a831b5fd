//! The grind state machine: Empty → Grinding → Finished | Failed → Empty.
//!
//! `tick` is the only entry point. It sees one filtered weight and the
//! current time, decides at most one transition, and keeps the relay in
//! lockstep with the status: the relay is on iff the status is `Grinding`.

use eyre::WrapErr;
use grinder_traits::Actuator;

use crate::config::GrindCfg;
use crate::error::Result;
use crate::hw_error::map_boxed;
use crate::shared::{FilteredWeight, StatusRecord};
use crate::status::{Checkpoint, FailureReason, GrindSession, GrindStatus};

pub struct GrindMachine<A: Actuator> {
    actuator: A,
    cfg: GrindCfg,
    status: GrindStatus,
    failure: Option<FailureReason>,
    session: GrindSession,
    // Last commanded relay level that the driver acknowledged
    actuator_on: bool,
    // An OFF command failed; retried every tick until it sticks
    off_pending: bool,
}

impl<A: Actuator> core::fmt::Debug for GrindMachine<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GrindMachine")
            .field("status", &self.status)
            .field("failure", &self.failure)
            .field("session", &self.session)
            .field("actuator_on", &self.actuator_on)
            .finish()
    }
}

impl<A: Actuator> GrindMachine<A> {
    pub fn new(actuator: A, cfg: GrindCfg) -> Self {
        Self {
            actuator,
            cfg,
            status: GrindStatus::Empty,
            failure: None,
            session: GrindSession::default(),
            actuator_on: false,
            off_pending: false,
        }
    }

    /// Force the relay off before the first tick.
    pub fn begin(&mut self) -> Result<()> {
        self.drive_off().wrap_err("switch grinder relay off at startup")
    }

    pub fn status(&self) -> GrindStatus {
        self.status
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn session(&self) -> &GrindSession {
        &self.session
    }

    pub fn actuator_on(&self) -> bool {
        self.actuator_on
    }

    pub fn cfg(&self) -> &GrindCfg {
        &self.cfg
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub(crate) fn record(&self, last_significant_change_ms: Option<u64>) -> StatusRecord {
        StatusRecord {
            status: self.status,
            failure: self.failure,
            session: self.session,
            last_significant_change_ms,
        }
    }

    /// Evaluate one decision cycle.
    ///
    /// Returns the status after this tick. An error means the relay could
    /// not be switched off; the status has still moved on and the OFF command
    /// is retried on the next tick.
    pub fn tick(&mut self, weight: &FilteredWeight, now_ms: u64) -> Result<GrindStatus> {
        if self.off_pending {
            self.drive_off()?;
        }
        let w = weight.grams;
        match self.status {
            GrindStatus::Empty => self.on_empty(weight, now_ms),
            GrindStatus::Grinding => self.on_grinding(weight, now_ms)?,
            GrindStatus::Finished => {
                if w < self.cfg.finished_reset_below_g {
                    tracing::info!(weight_g = w, "cup taken, back to empty");
                    self.reset();
                }
            }
            GrindStatus::Failed => {
                if w >= self.cfg.failed_reset_weight_g {
                    tracing::info!(weight_g = w, "failure acknowledged, back to empty");
                    self.reset();
                }
            }
        }
        Ok(self.status)
    }

    /// Switch the relay off and leave `Grinding` if we were in it.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.status == GrindStatus::Grinding {
            self.status = GrindStatus::Failed;
            self.failure = Some(FailureReason::Interrupted);
            tracing::warn!("stopped mid-grind");
        }
        self.drive_off()
    }

    fn on_empty(&mut self, weight: &FilteredWeight, now_ms: u64) {
        if !weight.sensor_ready || !weight.has_sample() {
            return;
        }
        let w = weight.grams;
        let in_band = (w - self.cfg.cup_weight_g).abs() < self.cfg.cup_tolerance_g;
        if !in_band {
            return;
        }

        self.session = GrindSession::start(w, now_ms);
        self.failure = None;
        match self.actuator.set_active(true) {
            Ok(()) => {
                self.actuator_on = true;
                self.status = GrindStatus::Grinding;
                tracing::info!(empty_cup_g = w, "cup detected, grinding");
            }
            Err(e) => {
                let err = map_boxed(&e);
                tracing::error!(error = %err, "grinder relay failed to switch on");
                // the driver may have latched the level anyway
                self.actuator_on = true;
                self.status = GrindStatus::Failed;
                self.failure = Some(FailureReason::Actuator);
                if let Err(off) = self.drive_off() {
                    tracing::warn!(error = %off, "relay off after failed start");
                }
            }
        }
    }

    fn on_grinding(&mut self, weight: &FilteredWeight, now_ms: u64) -> Result<()> {
        let w = weight.grams;
        let started = self.session.started_at_ms.unwrap_or(now_ms);
        let elapsed = now_ms.saturating_sub(started);
        let empty = self.session.empty_cup_g.unwrap_or(w);

        if !weight.sensor_ready {
            return self.fail(FailureReason::SensorLost, w, elapsed);
        }
        if elapsed > self.cfg.max_grind_ms {
            return self.fail(FailureReason::Timeout, w, elapsed);
        }
        if let Some(cp) = self.session.checkpoint
            && now_ms.saturating_sub(cp.at_ms) >= self.cfg.stall_window_ms
        {
            if w - cp.grams < self.cfg.stall_min_gain_g {
                return self.fail(FailureReason::Stall, w, elapsed);
            }
            tracing::debug!(weight_g = w, gained_g = w - cp.grams, "grind progress checkpoint");
            self.session.checkpoint = Some(Checkpoint {
                at_ms: now_ms,
                grams: w,
            });
        }
        if w < empty - self.cfg.cup_tolerance_g {
            return self.fail(FailureReason::CupRemoved, w, elapsed);
        }
        if w >= empty + self.cfg.dose_g {
            self.session.finished_at_ms = Some(now_ms);
            self.status = GrindStatus::Finished;
            tracing::info!(
                dose_g = w - empty,
                elapsed_ms = elapsed,
                "dose reached, grinding finished"
            );
            return self.drive_off().wrap_err("switch grinder relay off after dose");
        }
        Ok(())
    }

    fn fail(&mut self, reason: FailureReason, w: f32, elapsed_ms: u64) -> Result<()> {
        self.status = GrindStatus::Failed;
        self.failure = Some(reason);
        tracing::warn!(reason = %reason, weight_g = w, elapsed_ms, "grinding failed");
        self.drive_off().wrap_err("switch grinder relay off after failure")
    }

    fn reset(&mut self) {
        self.status = GrindStatus::Empty;
        self.failure = None;
        self.session = GrindSession::default();
    }

    fn drive_off(&mut self) -> Result<()> {
        match self.actuator.set_active(false) {
            Ok(()) => {
                self.actuator_on = false;
                self.off_pending = false;
                Ok(())
            }
            Err(e) => {
                self.off_pending = true;
                Err(eyre::Report::new(map_boxed(&e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::SpyActuator;

    fn ready(g: f32, at: u64) -> FilteredWeight {
        FilteredWeight::ready(g, at)
    }

    #[test]
    fn begin_forces_relay_off() {
        let spy = SpyActuator::default();
        let mut m = GrindMachine::new(spy.clone(), GrindCfg::default());
        m.begin().unwrap();
        assert_eq!(spy.writes(), 1);
        assert!(!spy.is_on());
    }

    #[test]
    fn stale_weight_does_not_start_a_grind() {
        let spy = SpyActuator::default();
        let mut m = GrindMachine::new(spy.clone(), GrindCfg::default());
        let lost = FilteredWeight {
            grams: 20.2,
            updated_at_ms: Some(0),
            sensor_ready: false,
        };
        assert_eq!(m.tick(&lost, 50).unwrap(), GrindStatus::Empty);
        assert!(!spy.is_on());
    }

    #[test]
    fn band_edges_are_exclusive() {
        let mut m = GrindMachine::new(SpyActuator::default(), GrindCfg::default());
        assert_eq!(m.tick(&ready(25.2, 0), 0).unwrap(), GrindStatus::Empty);
        assert_eq!(m.tick(&ready(15.1, 50), 50).unwrap(), GrindStatus::Empty);
        assert_eq!(m.tick(&ready(25.1, 100), 100).unwrap(), GrindStatus::Grinding);
    }

    #[test]
    fn nan_weight_is_not_a_cup() {
        let mut m = GrindMachine::new(SpyActuator::default(), GrindCfg::default());
        assert_eq!(m.tick(&ready(f32::NAN, 0), 0).unwrap(), GrindStatus::Empty);
    }

    #[test]
    fn failed_start_ends_in_failed_with_relay_off() {
        let spy = SpyActuator::default();
        spy.fail_on(true);
        let mut m = GrindMachine::new(spy.clone(), GrindCfg::default());
        assert_eq!(m.tick(&ready(20.2, 0), 0).unwrap(), GrindStatus::Failed);
        assert_eq!(m.failure(), Some(FailureReason::Actuator));
        assert!(!m.actuator_on());
        assert!(!spy.is_on());
    }

    #[test]
    fn failed_off_is_retried_next_tick() {
        let spy = SpyActuator::default();
        let mut m = GrindMachine::new(spy.clone(), GrindCfg::default());
        m.tick(&ready(20.2, 0), 0).unwrap();
        spy.fail_off(true);
        let err = m.tick(&ready(0.0, 50), 50).expect_err("relay stuck");
        assert!(format!("{err:#}").contains("relay off"));
        assert_eq!(m.status(), GrindStatus::Failed);
        assert!(m.actuator_on());

        spy.fail_off(false);
        m.tick(&ready(0.0, 100), 100).unwrap();
        assert!(!m.actuator_on());
        assert!(!spy.is_on());
    }

    #[test]
    fn shutdown_mid_grind_switches_off() {
        let spy = SpyActuator::default();
        let mut m = GrindMachine::new(spy.clone(), GrindCfg::default());
        m.tick(&ready(20.2, 0), 0).unwrap();
        assert!(spy.is_on());
        m.shutdown().unwrap();
        assert!(!spy.is_on());
        assert_ne!(m.status(), GrindStatus::Grinding);
    }
}
