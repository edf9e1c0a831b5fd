#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the grinder controller.
//!
//! `Config` and its sections are deserialized from TOML once at startup and
//! validated. Every section except `[pins]` may be omitted; defaults are the
//! stock firmware constants.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub grinder_relay: u8,
    /// Relay board energizes on a low level
    #[serde(default)]
    pub relay_active_low: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// HX711 counts per gram
    pub scale_factor: f32,
    /// Max time to wait for HX711 data-ready before reporting the sensor lost
    pub sensor_read_timeout_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            scale_factor: 1809.02,
            sensor_read_timeout_ms: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Kalman,
    None,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    pub kind: FilterKind,
    /// Expected spread of a single reading (g)
    pub measurement_error: f32,
    /// Initial estimation error; adapts after the first sample
    pub estimation_error: f32,
    /// How fast the true weight is expected to move
    pub process_noise: f32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            kind: FilterKind::Kalman,
            measurement_error: 0.2,
            estimation_error: 0.2,
            process_noise: 0.05,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TareCfg {
    /// Readings averaged per tare
    pub samples: u8,
    /// Auto-tare at most once per interval
    pub min_interval_ms: u64,
    /// Auto-tare when |weight| exceeds this...
    pub drift_min_g: f32,
    /// ...and weight stays below this
    pub drift_max_g: f32,
}

impl Default for TareCfg {
    fn default() -> Self {
        Self {
            samples: 20,
            min_interval_ms: 10_000,
            drift_min_g: 0.2,
            drift_max_g: 3.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GrindCfg {
    pub cup_weight_g: f32,
    pub cup_tolerance_g: f32,
    pub dose_g: f32,
    pub max_grind_ms: u64,
    pub stall_window_ms: u64,
    pub stall_min_gain_g: f32,
    pub finished_reset_below_g: f32,
    /// Press on the platform this hard to clear a failed grind
    pub failed_reset_weight_g: f32,
    pub decision_period_ms: u64,
    pub significant_change_g: f32,
}

impl Default for GrindCfg {
    fn default() -> Self {
        Self {
            cup_weight_g: 20.2,
            cup_tolerance_g: 5.0,
            dose_g: 18.0,
            max_grind_ms: 20_000,
            stall_window_ms: 2_000,
            stall_min_gain_g: 1.0,
            finished_reset_below_g: 5.0,
            failed_reset_weight_g: 500.0,
            decision_period_ms: 50,
            significant_change_g: 5.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayCfg {
    pub refresh_ms: u64,
    /// Blank the screen after this long without a significant weight change
    pub sleep_after_ms: u64,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            refresh_ms: 100,
            sleep_after_ms: 100_000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Simulation {
    /// None keeps the platform empty
    pub place_cup_at_ms: Option<u64>,
    pub cup_g: f32,
    pub flow_gps: f32,
    pub remove_after_ms: Option<u64>,
    pub sample_rate_hz: u32,
    pub noise_g: f32,
    pub drift_gps: f32,
    pub force_timeout: bool,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            place_cup_at_ms: Some(1_500),
            cup_g: 20.2,
            flow_gps: 4.0,
            remove_after_ms: Some(2_000),
            sample_rate_hz: 80,
            noise_g: 0.02,
            drift_gps: 0.0,
            force_timeout: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub scale: ScaleCfg,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub tare: TareCfg,
    #[serde(default)]
    pub grind: GrindCfg,
    #[serde(default)]
    pub display: DisplayCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: Simulation,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn positive_finite(x: f32) -> bool {
    x.is_finite() && x > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.hx711_dt == self.pins.hx711_sck {
            eyre::bail!("pins.hx711_dt and pins.hx711_sck must differ");
        }
        if self.pins.grinder_relay == self.pins.hx711_dt
            || self.pins.grinder_relay == self.pins.hx711_sck
        {
            eyre::bail!("pins.grinder_relay must not share a pin with the hx711");
        }

        // Scale
        if !self.scale.scale_factor.is_finite() || self.scale.scale_factor == 0.0 {
            eyre::bail!("scale.scale_factor must be finite and non-zero");
        }
        if self.scale.sensor_read_timeout_ms == 0 {
            eyre::bail!("scale.sensor_read_timeout_ms must be >= 1");
        }

        // Filter
        if self.filter.kind == FilterKind::Kalman {
            if !positive_finite(self.filter.measurement_error) {
                eyre::bail!("filter.measurement_error must be > 0");
            }
            if !positive_finite(self.filter.estimation_error) {
                eyre::bail!("filter.estimation_error must be > 0");
            }
            if !self.filter.process_noise.is_finite() || self.filter.process_noise < 0.0 {
                eyre::bail!("filter.process_noise must be >= 0");
            }
        }

        // Tare
        if self.tare.samples == 0 {
            eyre::bail!("tare.samples must be >= 1");
        }
        if self.tare.drift_min_g < 0.0 || self.tare.drift_min_g >= self.tare.drift_max_g {
            eyre::bail!("tare.drift_min_g must be in [0, tare.drift_max_g)");
        }

        // Grind
        let g = &self.grind;
        if !positive_finite(g.cup_weight_g) {
            eyre::bail!("grind.cup_weight_g must be > 0");
        }
        if !positive_finite(g.cup_tolerance_g) || g.cup_tolerance_g >= g.cup_weight_g {
            eyre::bail!("grind.cup_tolerance_g must be in (0, grind.cup_weight_g)");
        }
        if !positive_finite(g.dose_g) {
            eyre::bail!("grind.dose_g must be > 0");
        }
        if g.max_grind_ms == 0 {
            eyre::bail!("grind.max_grind_ms must be >= 1");
        }
        if g.stall_window_ms == 0 || g.stall_window_ms >= g.max_grind_ms {
            eyre::bail!("grind.stall_window_ms must be in [1, grind.max_grind_ms)");
        }
        if g.stall_min_gain_g < 0.0 {
            eyre::bail!("grind.stall_min_gain_g must be >= 0");
        }
        if g.finished_reset_below_g >= g.cup_weight_g - g.cup_tolerance_g {
            eyre::bail!("grind.finished_reset_below_g must be below the cup detection band");
        }
        if g.failed_reset_weight_g <= g.cup_weight_g + g.dose_g {
            eyre::bail!("grind.failed_reset_weight_g must exceed cup + dose weight");
        }
        if g.decision_period_ms == 0 || g.decision_period_ms > 1_000 {
            eyre::bail!("grind.decision_period_ms must be in [1, 1000]");
        }
        if !positive_finite(g.significant_change_g) {
            eyre::bail!("grind.significant_change_g must be > 0");
        }

        // Display
        if self.display.refresh_ms == 0 {
            eyre::bail!("display.refresh_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        if self.simulation.sample_rate_hz == 0 {
            eyre::bail!("simulation.sample_rate_hz must be > 0");
        }
        if self.simulation.flow_gps < 0.0 || self.simulation.noise_g < 0.0 {
            eyre::bail!("simulation.flow_gps and simulation.noise_g must be >= 0");
        }

        Ok(())
    }
}
