//! Hardware seams for the grinder controller.
//!
//! Errors cross these boundaries as `Box<dyn Error + Send + Sync>` so drivers
//! keep their own error types; `grinder_core::hw_error` maps them back.
pub mod clock;

use std::time::Duration;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load-cell amplifier delivering calibrated weight samples.
pub trait LoadCell {
    /// Block until one sample is available or `timeout` expires.
    /// Returns grams relative to the current zero point.
    fn read_grams(&mut self, timeout: Duration) -> Result<f32, BoxError>;

    /// Re-zero the scale using the average of `samples` consecutive readings.
    fn tare(&mut self, samples: u8, timeout: Duration) -> Result<(), BoxError>;
}

/// Single boolean output driving the grinder motor relay.
pub trait Actuator {
    fn set_active(&mut self, on: bool) -> Result<(), BoxError>;
}

impl<T: LoadCell + ?Sized> LoadCell for Box<T> {
    fn read_grams(&mut self, timeout: Duration) -> Result<f32, BoxError> {
        (**self).read_grams(timeout)
    }

    fn tare(&mut self, samples: u8, timeout: Duration) -> Result<(), BoxError> {
        (**self).tare(samples, timeout)
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn set_active(&mut self, on: bool) -> Result<(), BoxError> {
        (**self).set_active(on)
    }
}
