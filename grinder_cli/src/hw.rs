//! Hardware assembly: the simulated bench by default, GPIO with `--features hardware`.

use eyre::Result;
use grinder_config::Config;
use grinder_traits::{Actuator, LoadCell};

pub type Hardware = (Box<dyn LoadCell + Send>, Box<dyn Actuator + Send>);

/// Set to `1` to make every simulated read time out.
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub const SIM_TIMEOUT_ENV: &str = "GRINDER_SIM_TIMEOUT";

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn sim_cfg(cfg: &Config) -> grinder_hardware::SimCfg {
    let s = &cfg.simulation;
    let forced = std::env::var(SIM_TIMEOUT_ENV).is_ok_and(|v| v == "1");
    grinder_hardware::SimCfg {
        place_cup_at_ms: s.place_cup_at_ms,
        cup_g: s.cup_g,
        flow_gps: s.flow_gps,
        remove_after_ms: s.remove_after_ms,
        sample_rate_hz: s.sample_rate_hz,
        noise_g: s.noise_g,
        drift_gps: s.drift_gps,
        force_timeout: s.force_timeout || forced,
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn build(cfg: &Config) -> Result<Hardware> {
    let sim = sim_cfg(cfg);
    tracing::info!(
        force_timeout = sim.force_timeout,
        place_cup_at_ms = ?sim.place_cup_at_ms,
        "using simulated bench"
    );
    let rig = grinder_hardware::SimRig::new(sim, grinder_traits::MonotonicClock::new());
    Ok((Box::new(rig.load_cell()), Box::new(rig.relay())))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn build(cfg: &Config) -> Result<Hardware> {
    use eyre::WrapErr;

    let p = &cfg.pins;
    let cell = grinder_hardware::Hx711LoadCell::new(p.hx711_dt, p.hx711_sck, cfg.scale.scale_factor)
        .wrap_err("open hx711")?;
    let relay = grinder_hardware::RelayPin::new(p.grinder_relay, p.relay_active_low)
        .wrap_err("open relay pin")?;
    tracing::info!(
        dt = p.hx711_dt,
        sck = p.hx711_sck,
        relay = p.grinder_relay,
        "using GPIO hardware"
    );
    Ok((Box::new(cell), Box::new(relay)))
}
