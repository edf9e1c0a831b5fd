//! Load-cell and relay backends for the grinder controller.
//!
//! - `sim`: host-side bench model, always available.
//! - `hx711` / `relay`: Raspberry Pi GPIO drivers behind the `hardware` feature.
pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod relay;

pub use error::HwError;
pub use sim::{SimCfg, SimLoadCell, SimRelay, SimRig};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use hx711::Hx711LoadCell;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use relay::RelayPin;
