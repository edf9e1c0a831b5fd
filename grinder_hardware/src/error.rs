use thiserror::Error;

/// Faults raised by the scale and relay backends.
#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("relay error: {0}")]
    Relay(String),
    #[error("scale timeout")]
    Timeout,
    #[error("hx711 data-ready timeout")]
    DataReadyTimeout,
    /// Counts-per-gram must be finite and non-zero.
    #[error("invalid hx711 scale factor {0}")]
    InvalidScaleFactor(f32),
}

impl HwError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HwError::Timeout | HwError::DataReadyTimeout)
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
