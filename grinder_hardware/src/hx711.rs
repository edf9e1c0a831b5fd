use std::time::{Duration, Instant};
use tracing::trace;

use grinder_traits::{BoxError, LoadCell};
use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::error::{HwError, Result};
use crate::util::{sign_extend_24, wait_until_low_with_timeout};

/// Bit-banged HX711 amplifier (channel A, gain 128 by default).
pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8, // 1 = A/128, 2 = B/32, 3 = A/64
}

impl Hx711 {
    pub fn new(dt_pin: u8, sck_pin: u8, gain_pulses: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 dt pin {dt_pin}: {e}")))?
            .into_input();
        let mut sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 sck pin {sck_pin}: {e}")))?
            .into_output();
        sck.set_low(); // clock idle low
        Ok(Self {
            dt,
            sck,
            gain_pulses: gain_pulses.clamp(1, 3),
        })
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, Duration::from_micros(200))?;

        // Clock out 24 bits, MSB first
        let mut value: u32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            spin_delay_100ns();
            value = (value << 1) | u32::from(self.dt.is_high());
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Extra pulses select gain/channel for the next conversion
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            spin_delay_100ns();
            self.sck.set_low();
            spin_delay_100ns();
        }

        let raw = sign_extend_24(value);
        trace!(raw, "hx711 raw read");
        Ok(raw)
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    std::hint::spin_loop();
}

/// HX711 converted to grams: `(raw - offset) / scale_factor`.
pub struct Hx711LoadCell {
    hx711: Hx711,
    scale_factor: f32,
    offset: i64,
}

impl Hx711LoadCell {
    pub fn new(dt_pin: u8, sck_pin: u8, scale_factor: f32) -> Result<Self> {
        if !scale_factor.is_finite() || scale_factor == 0.0 {
            return Err(HwError::InvalidScaleFactor(scale_factor));
        }
        Ok(Self {
            hx711: Hx711::new(dt_pin, sck_pin, 1)?,
            scale_factor,
            offset: 0,
        })
    }

    fn to_grams(&self, raw: i32) -> f32 {
        ((i64::from(raw) - self.offset) as f32) / self.scale_factor
    }
}

impl LoadCell for Hx711LoadCell {
    fn read_grams(&mut self, timeout: Duration) -> std::result::Result<f32, BoxError> {
        let raw = self.hx711.read_with_timeout(timeout)?;
        Ok(self.to_grams(raw))
    }

    fn tare(&mut self, samples: u8, timeout: Duration) -> std::result::Result<(), BoxError> {
        let n = samples.max(1);
        let started = Instant::now();
        let mut sum: i64 = 0;
        for _ in 0..n {
            sum += i64::from(self.hx711.read_with_timeout(timeout)?);
        }
        self.offset = sum / i64::from(n);
        tracing::debug!(
            offset = self.offset,
            samples = n,
            took_ms = started.elapsed().as_millis() as u64,
            "hx711 tare offset"
        );
        Ok(())
    }
}
