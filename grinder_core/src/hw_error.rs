//! Maps `Box<dyn Error>` from trait boundaries to typed `GrinderError`.
//!
//! The traits in `grinder_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `grinder_hardware::HwError` downcasting.

use crate::error::GrinderError;

/// Map a trait-boundary error to a typed `GrinderError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> GrinderError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<grinder_hardware::HwError>() {
            return match hw {
                hw if hw.is_timeout() => GrinderError::Timeout,
                grinder_hardware::HwError::InvalidScaleFactor(_) => {
                    GrinderError::Config(hw.to_string())
                }
                other => GrinderError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        GrinderError::Timeout
    } else {
        GrinderError::Hardware(s)
    }
}

/// Convenience for boxed errors coming straight out of a trait call.
pub fn map_boxed(e: &grinder_traits::BoxError) -> GrinderError {
    map_hw_error(e.as_ref())
}
