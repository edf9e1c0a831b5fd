//! Single-input recursive smoothing for load-cell readings.

use crate::config::{FilterCfg, FilterKind};

/// A scalar estimator fed one raw measurement at a time.
pub trait Estimator: Send {
    /// Fold in one measurement and return the new estimate.
    fn update(&mut self, measurement: f32) -> f32;
    /// Current estimate without consuming a measurement.
    fn estimate(&self) -> f32;
}

/// One-dimensional Kalman filter with adaptive estimation error.
///
///   k  = e / (e + m)
///   x' = x + k (z - x)
///   e' = (1 - k) e + |x - x'| q
///
/// The estimate starts at 0 g, which matches a freshly tared platform.
#[derive(Debug, Clone)]
pub struct SimpleKalman {
    measurement_error: f32,
    estimation_error: f32,
    process_noise: f32,
    last_estimate: f32,
}

impl SimpleKalman {
    pub fn new(measurement_error: f32, estimation_error: f32, process_noise: f32) -> Self {
        Self {
            measurement_error,
            estimation_error,
            process_noise,
            last_estimate: 0.0,
        }
    }

    pub fn estimation_error(&self) -> f32 {
        self.estimation_error
    }
}

impl Estimator for SimpleKalman {
    fn update(&mut self, measurement: f32) -> f32 {
        if !measurement.is_finite() {
            return self.last_estimate;
        }
        let gain = self.estimation_error / (self.estimation_error + self.measurement_error);
        let current = self.last_estimate + gain * (measurement - self.last_estimate);
        self.estimation_error = (1.0 - gain) * self.estimation_error
            + (self.last_estimate - current).abs() * self.process_noise;
        self.last_estimate = current;
        current
    }

    fn estimate(&self) -> f32 {
        self.last_estimate
    }
}

/// Filter disabled: the estimate is the last raw reading.
#[derive(Debug, Clone, Default)]
pub struct Passthrough {
    last: f32,
}

impl Estimator for Passthrough {
    fn update(&mut self, measurement: f32) -> f32 {
        if measurement.is_finite() {
            self.last = measurement;
        }
        self.last
    }

    fn estimate(&self) -> f32 {
        self.last
    }
}

/// Build the configured estimator.
pub fn from_cfg(cfg: &FilterCfg) -> Box<dyn Estimator> {
    match cfg.kind {
        FilterKind::Kalman => Box::new(SimpleKalman::new(
            cfg.measurement_error,
            cfg.estimation_error,
            cfg.process_noise,
        )),
        FilterKind::Passthrough => Box::new(Passthrough::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock() -> SimpleKalman {
        SimpleKalman::new(0.2, 0.2, 0.05)
    }

    #[test]
    fn first_update_moves_halfway() {
        // e == m so the first gain is exactly 0.5
        let mut k = stock();
        assert!((k.update(10.0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn converges_on_constant_input() {
        let mut k = stock();
        let mut x = 0.0;
        for _ in 0..200 {
            x = k.update(20.2);
        }
        assert!((x - 20.2).abs() < 0.01, "estimate {x}");
    }

    #[test]
    fn smooths_alternating_noise() {
        let mut k = stock();
        for _ in 0..200 {
            k.update(20.2);
        }
        let mut worst: f32 = 0.0;
        for i in 0..100 {
            let z = if i % 2 == 0 { 20.4 } else { 20.0 };
            worst = worst.max((k.update(z) - 20.2).abs());
        }
        assert!(worst < 0.2, "noise passed through: {worst}");
    }

    #[test]
    fn ignores_non_finite_measurements() {
        let mut k = stock();
        k.update(4.0);
        let before = k.estimate();
        assert_eq!(k.update(f32::NAN), before);
        assert_eq!(k.update(f32::INFINITY), before);
    }

    #[test]
    fn passthrough_returns_raw() {
        let mut p = Passthrough::default();
        assert_eq!(p.update(3.5), 3.5);
        assert_eq!(p.update(f32::NAN), 3.5);
        assert_eq!(p.estimate(), 3.5);
    }

    #[test]
    fn from_cfg_honours_kind() {
        let mut f = from_cfg(&FilterCfg {
            kind: FilterKind::Passthrough,
            ..FilterCfg::default()
        });
        assert_eq!(f.update(7.0), 7.0);
        let mut f = from_cfg(&FilterCfg::default());
        assert!(f.update(7.0) < 7.0);
    }
}
