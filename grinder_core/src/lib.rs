#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Grinder controller logic (hardware-agnostic).
//!
//! All hardware access goes through `grinder_traits::LoadCell` and
//! `grinder_traits::Actuator`; time goes through `grinder_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Filtering**: scalar Kalman smoothing of raw grams (`filter`)
//! - **Estimation**: bounded-wait reads feeding the filter (`estimator`)
//! - **Tare**: startup zeroing and the auto-tare drift policy (`tare`)
//! - **State machine**: Empty / Grinding / Finished / Failed (`machine`)
//! - **Publication**: synchronized records and read-only views (`shared`)
//! - **Runtime**: the scale and decision threads (`runner`)

pub mod config;
pub mod conversions;
pub mod error;
pub mod estimator;
pub mod filter;
pub mod hw_error;
pub mod machine;
pub mod mocks;
pub mod runner;
pub mod shared;
pub mod status;
pub mod tare;
pub mod timebase;

pub use config::{FilterCfg, FilterKind, GrindCfg, GrinderCfg, TareCfg, Timeouts};
pub use error::{GrinderError, Result};
pub use estimator::WeightEstimator;
pub use machine::GrindMachine;
pub use runner::{DecisionLoop, Runtime, ScaleLoop, spawn};
pub use shared::{FilteredWeight, Shared, StatusView, TareState};
pub use status::{FailureReason, GrindSession, GrindStatus, StatusSnapshot, TransitionEvent};
pub use tare::TareController;
pub use timebase::Timebase;
