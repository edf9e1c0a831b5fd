use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GrinderError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
}

impl GrinderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
