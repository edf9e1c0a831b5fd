use grinder_traits::{Actuator, BoxError};
use rppal::gpio::{Gpio, OutputPin};

use crate::error::{HwError, Result};

/// GPIO output switching the grinder motor relay.
pub struct RelayPin {
    pin: OutputPin,
    active_low: bool,
}

impl RelayPin {
    pub fn new(pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Relay(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Relay(format!("open relay pin {pin}: {e}")))?
            .into_output();
        let mut relay = Self { pin, active_low };
        relay.write(false);
        Ok(relay)
    }

    fn write(&mut self, on: bool) {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

impl Actuator for RelayPin {
    fn set_active(&mut self, on: bool) -> std::result::Result<(), BoxError> {
        self.write(on);
        tracing::debug!(on, "grinder relay");
        Ok(())
    }
}

impl Drop for RelayPin {
    fn drop(&mut self) {
        self.write(false);
    }
}
