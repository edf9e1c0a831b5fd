//! Simulated grinder bench: a load cell and a relay sharing one physical model.
//!
//! The model is a cup that appears at a fixed time, grounds that accumulate
//! while the relay is on, and an operator who takes the cup away shortly after
//! the grinder stops. Time comes from a `Clock`, so tests can drive it with
//! `ManualClock`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use grinder_traits::{Actuator, BoxError, Clock, LoadCell};

use crate::error::HwError;

#[derive(Debug, Clone)]
pub struct SimCfg {
    /// When the cup lands on the scale (ms after rig creation); None = never.
    pub place_cup_at_ms: Option<u64>,
    pub cup_g: f32,
    /// Grounds delivered per second while the relay is on.
    pub flow_gps: f32,
    /// Cup and grounds are lifted this long after the relay switches off.
    pub remove_after_ms: Option<u64>,
    /// HX711 output data rate (10 or 80 on real parts).
    pub sample_rate_hz: u32,
    /// Peak amplitude of the deterministic noise added to each sample.
    pub noise_g: f32,
    /// Slow zero drift in grams per second.
    pub drift_gps: f32,
    /// Every read times out.
    pub force_timeout: bool,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            place_cup_at_ms: Some(1_500),
            cup_g: 20.2,
            flow_gps: 4.0,
            remove_after_ms: Some(2_000),
            sample_rate_hz: 80,
            noise_g: 0.02,
            drift_gps: 0.0,
            force_timeout: false,
        }
    }
}

#[derive(Debug)]
struct RigState {
    cup_on_scale: bool,
    cup_lifted: bool,
    grounds_g: f32,
    extra_load_g: f32,
    zero_g: f32,
    relay_on: bool,
    relay_off_at: Option<Instant>,
    last_update: Instant,
    noise_state: u32,
    force_timeout: bool,
}

/// Shared bench state; hand out `load_cell()` and `relay()` to the controller.
#[derive(Clone)]
pub struct SimRig<C: Clock + Clone> {
    cfg: SimCfg,
    clock: C,
    epoch: Instant,
    state: Arc<Mutex<RigState>>,
}

impl<C: Clock + Clone> SimRig<C> {
    pub fn new(cfg: SimCfg, clock: C) -> Self {
        let epoch = clock.now();
        let state = RigState {
            cup_on_scale: false,
            cup_lifted: false,
            grounds_g: 0.0,
            extra_load_g: 0.0,
            zero_g: 0.0,
            relay_on: false,
            relay_off_at: None,
            last_update: epoch,
            noise_state: 0x2545_F491,
            force_timeout: cfg.force_timeout,
        };
        Self {
            cfg,
            clock,
            epoch,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn load_cell(&self) -> SimLoadCell<C> {
        SimLoadCell { rig: self.clone() }
    }

    pub fn relay(&self) -> SimRelay<C> {
        SimRelay { rig: self.clone() }
    }

    /// Additional load, e.g. an operator pressing on the platform.
    pub fn set_extra_load(&self, grams: f32) {
        self.lock().extra_load_g = grams;
    }

    pub fn set_force_timeout(&self, on: bool) {
        self.lock().force_timeout = on;
    }

    pub fn place_cup(&self) {
        let mut st = self.lock();
        st.cup_on_scale = true;
        st.cup_lifted = false;
    }

    pub fn remove_cup(&self) {
        let mut st = self.lock();
        st.cup_on_scale = false;
        st.cup_lifted = true;
        st.grounds_g = 0.0;
    }

    pub fn relay_on(&self) -> bool {
        self.lock().relay_on
    }

    pub fn grounds_g(&self) -> f32 {
        let now = self.clock.now();
        let mut st = self.lock();
        self.advance(&mut st, now);
        st.grounds_g
    }

    /// Gross weight on the platform, before zeroing and noise.
    pub fn gross_g(&self) -> f32 {
        let now = self.clock.now();
        let mut st = self.lock();
        self.advance(&mut st, now);
        self.gross(&st, now)
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ms_since_epoch(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.epoch).as_millis()).unwrap_or(u64::MAX)
    }

    /// Integrate flow and apply scheduled cup events up to `now`.
    fn advance(&self, st: &mut RigState, now: Instant) {
        let dt = now.saturating_duration_since(st.last_update).as_secs_f32();
        if st.relay_on && st.cup_on_scale {
            st.grounds_g += self.cfg.flow_gps * dt;
        }
        st.last_update = now;

        if !st.cup_on_scale
            && !st.cup_lifted
            && self
                .cfg
                .place_cup_at_ms
                .is_some_and(|at| self.ms_since_epoch(now) >= at)
        {
            st.cup_on_scale = true;
            tracing::debug!("sim: cup placed");
        }

        if let (Some(off_at), Some(after)) = (st.relay_off_at, self.cfg.remove_after_ms)
            && st.cup_on_scale
            && now.saturating_duration_since(off_at) >= Duration::from_millis(after)
        {
            st.cup_on_scale = false;
            st.cup_lifted = true;
            st.grounds_g = 0.0;
            st.relay_off_at = None;
            tracing::debug!("sim: cup removed");
        }
    }

    fn gross(&self, st: &RigState, now: Instant) -> f32 {
        let drift = self.cfg.drift_gps * now.saturating_duration_since(self.epoch).as_secs_f32();
        let cup = if st.cup_on_scale {
            self.cfg.cup_g + st.grounds_g
        } else {
            0.0
        };
        cup + st.extra_load_g + drift
    }

    fn noise(&self, st: &mut RigState) -> f32 {
        if self.cfg.noise_g == 0.0 {
            return 0.0;
        }
        // xorshift32
        let mut x = st.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        st.noise_state = x;
        let unit = (x as f32) / (u32::MAX as f32);
        (unit * 2.0 - 1.0) * self.cfg.noise_g
    }

    fn sample(&self) -> Result<f32, HwError> {
        let period = Duration::from_micros(1_000_000 / u64::from(self.cfg.sample_rate_hz.max(1)));
        if self.lock().force_timeout {
            self.clock.sleep(period.max(Duration::from_millis(1)));
            return Err(HwError::Timeout);
        }
        self.clock.sleep(period);
        let now = self.clock.now();
        let mut st = self.lock();
        self.advance(&mut st, now);
        let gross = self.gross(&st, now);
        let noise = self.noise(&mut st);
        Ok(gross - st.zero_g + noise)
    }
}

pub struct SimLoadCell<C: Clock + Clone> {
    rig: SimRig<C>,
}

impl<C: Clock + Clone> LoadCell for SimLoadCell<C> {
    fn read_grams(&mut self, timeout: Duration) -> Result<f32, BoxError> {
        if self.rig.lock().force_timeout {
            // behave like a missing HX711: the whole timeout elapses
            self.rig.clock.sleep(timeout);
            return Err(Box::new(HwError::Timeout));
        }
        let grams = self.rig.sample()?;
        tracing::trace!(grams, "sim sample");
        Ok(grams)
    }

    fn tare(&mut self, samples: u8, _timeout: Duration) -> Result<(), BoxError> {
        let n = samples.max(1);
        let mut sum = 0.0f32;
        for _ in 0..n {
            sum += self.rig.sample()?;
        }
        let mut st = self.rig.lock();
        st.zero_g += sum / f32::from(n);
        tracing::debug!(zero_g = st.zero_g, samples = n, "sim tare");
        Ok(())
    }
}

pub struct SimRelay<C: Clock + Clone> {
    rig: SimRig<C>,
}

impl<C: Clock + Clone> Actuator for SimRelay<C> {
    fn set_active(&mut self, on: bool) -> Result<(), BoxError> {
        let now = self.rig.clock.now();
        let mut st = self.rig.lock();
        self.rig.advance(&mut st, now);
        if st.relay_on && !on {
            st.relay_off_at = Some(now);
        }
        st.relay_on = on;
        tracing::debug!(on, "sim relay");
        Ok(())
    }
}
