//! Runtime configuration for the controller.
//!
//! These are the immutable structs handed to each component at startup.
//! They are separate from the TOML-deserialized config in `grinder_config`;
//! `Default` carries the stock firmware constants.

use crate::error::GrinderError;

/// Smoothing stage selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    #[default]
    Kalman,
    Passthrough,
}

/// Recursive filter parameters.
#[derive(Debug, Clone)]
pub struct FilterCfg {
    pub kind: FilterKind,
    /// Measurement uncertainty (g).
    pub measurement_error: f32,
    /// Estimation uncertainty seed; adapted on every update.
    pub estimation_error: f32,
    /// Process noise; how quickly the estimate is allowed to move.
    pub process_noise: f32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            kind: FilterKind::Kalman,
            measurement_error: 0.2,
            estimation_error: 0.2,
            process_noise: 0.05,
        }
    }
}

/// Zeroing policy.
#[derive(Debug, Clone)]
pub struct TareCfg {
    /// Readings averaged per tare.
    pub samples: u8,
    /// Minimum time between two automatic tares.
    pub min_interval_ms: u64,
    /// Auto-tare only when `|w| > drift_min_g`...
    pub drift_min_g: f32,
    /// ...and `w < drift_max_g` (signed).
    pub drift_max_g: f32,
}

impl Default for TareCfg {
    fn default() -> Self {
        Self {
            samples: 20,
            min_interval_ms: 10_000,
            drift_min_g: 0.2,
            drift_max_g: 3.0,
        }
    }
}

/// Cup detection, dosing and failure thresholds.
#[derive(Debug, Clone)]
pub struct GrindCfg {
    /// Reference weight of the empty cup.
    pub cup_weight_g: f32,
    /// Accept a cup within +/- this many grams of `cup_weight_g`; also the
    /// allowed drop below the empty-cup weight before "cup removed".
    pub cup_tolerance_g: f32,
    /// Grounds to deliver on top of the empty cup.
    pub dose_g: f32,
    /// Hard cap on a single grind.
    pub max_grind_ms: u64,
    /// Progress is checked once per window.
    pub stall_window_ms: u64,
    /// Minimum gain per window before the grind counts as stalled.
    pub stall_min_gain_g: f32,
    /// Finished returns to Empty once the weight falls below this.
    pub finished_reset_below_g: f32,
    /// Failed returns to Empty once the weight reaches this.
    pub failed_reset_weight_g: f32,
    /// Decision loop period.
    pub decision_period_ms: u64,
    /// Weight jumps larger than this count as activity.
    pub significant_change_g: f32,
}

impl Default for GrindCfg {
    fn default() -> Self {
        Self {
            cup_weight_g: 20.2,
            cup_tolerance_g: 5.0,
            dose_g: 18.0,
            max_grind_ms: 20_000,
            stall_window_ms: 2_000,
            stall_min_gain_g: 1.0,
            finished_reset_below_g: 5.0,
            failed_reset_weight_g: 500.0,
            decision_period_ms: 50,
            significant_change_g: 5.0,
        }
    }
}

/// Timeouts and watchdogs.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Max sensor wait per read (ms)
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 300 }
    }
}

fn positive(x: f32) -> bool {
    x.is_finite() && x > 0.0
}

/// Everything the runner needs, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct GrinderCfg {
    pub filter: FilterCfg,
    pub tare: TareCfg,
    pub grind: GrindCfg,
    pub timeouts: Timeouts,
}

impl GrinderCfg {
    /// Sanity checks that the state machine relies on.
    pub fn validate(&self) -> Result<(), GrinderError> {
        let g = &self.grind;
        if !positive(g.dose_g) {
            return Err(GrinderError::Config("dose_g must be > 0".into()));
        }
        if !positive(g.cup_tolerance_g) {
            return Err(GrinderError::Config("cup_tolerance_g must be > 0".into()));
        }
        if g.decision_period_ms == 0 {
            return Err(GrinderError::Config("decision_period_ms must be >= 1".into()));
        }
        if g.stall_window_ms == 0 {
            return Err(GrinderError::Config("stall_window_ms must be >= 1".into()));
        }
        if self.timeouts.sensor_ms == 0 {
            return Err(GrinderError::Config("sensor timeout must be >= 1 ms".into()));
        }
        if self.tare.samples == 0 {
            return Err(GrinderError::Config("tare samples must be >= 1".into()));
        }
        Ok(())
    }
}
