//! `From` implementations bridging `grinder_config` types to `grinder_core` types.

use crate::config::{FilterCfg, FilterKind, GrindCfg, GrinderCfg, TareCfg, Timeouts};

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&grinder_config::FilterCfg> for FilterCfg {
    fn from(c: &grinder_config::FilterCfg) -> Self {
        Self {
            kind: match c.kind {
                grinder_config::FilterKind::Kalman => FilterKind::Kalman,
                grinder_config::FilterKind::None => FilterKind::Passthrough,
            },
            measurement_error: c.measurement_error,
            estimation_error: c.estimation_error,
            process_noise: c.process_noise,
        }
    }
}

// ── TareCfg ──────────────────────────────────────────────────────────────────

impl From<&grinder_config::TareCfg> for TareCfg {
    fn from(c: &grinder_config::TareCfg) -> Self {
        Self {
            samples: c.samples,
            min_interval_ms: c.min_interval_ms,
            drift_min_g: c.drift_min_g,
            drift_max_g: c.drift_max_g,
        }
    }
}

// ── GrindCfg ─────────────────────────────────────────────────────────────────

impl From<&grinder_config::GrindCfg> for GrindCfg {
    fn from(c: &grinder_config::GrindCfg) -> Self {
        Self {
            cup_weight_g: c.cup_weight_g,
            cup_tolerance_g: c.cup_tolerance_g,
            dose_g: c.dose_g,
            max_grind_ms: c.max_grind_ms,
            stall_window_ms: c.stall_window_ms,
            stall_min_gain_g: c.stall_min_gain_g,
            finished_reset_below_g: c.finished_reset_below_g,
            failed_reset_weight_g: c.failed_reset_weight_g,
            decision_period_ms: c.decision_period_ms,
            significant_change_g: c.significant_change_g,
        }
    }
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&grinder_config::ScaleCfg> for Timeouts {
    fn from(c: &grinder_config::ScaleCfg) -> Self {
        Self {
            sensor_ms: c.sensor_read_timeout_ms,
        }
    }
}

// ── GrinderCfg ───────────────────────────────────────────────────────────────

impl From<&grinder_config::Config> for GrinderCfg {
    fn from(c: &grinder_config::Config) -> Self {
        Self {
            filter: (&c.filter).into(),
            tare: (&c.tare).into(),
            grind: (&c.grind).into(),
            timeouts: (&c.scale).into(),
        }
    }
}
