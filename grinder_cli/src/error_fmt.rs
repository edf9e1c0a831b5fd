//! Human-readable error descriptions and structured JSON error formatting.

use grinder_core::GrinderError;
use serde_json::json;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ge) = err.downcast_ref::<GrinderError>() {
        return match ge {
            GrinderError::Timeout => "What happened: Scale read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify the DT/SCK pins and power, and consider raising scale.sensor_read_timeout_ms in the config.".to_string(),
            GrinderError::HardwareFault(msg) | GrinderError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: GPIO busy or not permitted, or a loose connection.\nHow to fix: Check the [pins] values and wiring; ensure the process may access GPIO."
            ),
            GrinderError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/grinder_config.toml for a sample."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with an existing TOML file. Original: {msg}"
        );
    }

    if lower.contains("parse config") || lower.contains(" must ") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [pins] (hx711_dt, hx711_sck, grinder_relay) or out-of-range values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    if lower.contains("open hx711") || lower.contains("open relay pin") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per failure class; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<GrinderError>() {
        Some(GrinderError::Config(_)) => 2,
        Some(GrinderError::Timeout) => 3,
        Some(GrinderError::Hardware(_) | GrinderError::HardwareFault(_)) => 4,
        None => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<GrinderError>() {
        Some(GrinderError::Config(_)) => "Config",
        Some(GrinderError::Timeout) => "Timeout",
        Some(GrinderError::Hardware(_) | GrinderError::HardwareFault(_)) => "Hardware",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
