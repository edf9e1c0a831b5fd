//! Controller session: hardware assembly, the refresh loop and self-check.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr};
use grinder_config::Config;
use grinder_core::hw_error::map_boxed;
use grinder_core::{GrinderCfg, StatusSnapshot, TransitionEvent};
use grinder_traits::{Clock, MonotonicClock};
use grinder_ui::{Screen, UiCfg, render};
use serde_json::json;

use crate::hw;

pub fn snapshot_json(snap: &StatusSnapshot, screen: &Screen) -> serde_json::Value {
    json!({
        "type": "status",
        "status": snap.status.as_str(),
        "failure": snap.failure.map(|f| f.as_str()),
        "weight_g": snap.filtered_weight_g,
        "sensor_ready": snap.sensor_ready,
        "weight_updated_at_ms": snap.weight_updated_at_ms,
        "empty_cup_g": snap.empty_cup_g,
        "dose_target_g": snap.dose_target_g,
        "started_at_ms": snap.started_at_ms,
        "finished_at_ms": snap.finished_at_ms,
        "last_tared_ms": snap.last_tared_ms,
        "screen": screen.lines,
    })
}

pub fn event_json(ev: &TransitionEvent) -> serde_json::Value {
    json!({
        "type": "transition",
        "at_ms": ev.at_ms,
        "from": ev.from.as_str(),
        "to": ev.to.as_str(),
        "weight_g": ev.weight_g,
        "failure": ev.failure.map(|f| f.as_str()),
    })
}

/// Run until Ctrl-C or `max_ms`, printing the screen whenever it changes.
pub fn run(cfg: &Config, max_ms: Option<u64>, json: bool) -> Result<()> {
    let core_cfg: GrinderCfg = cfg.into();
    let ui = UiCfg {
        sleep_after_ms: cfg.display.sleep_after_ms,
    };
    let refresh = Duration::from_millis(cfg.display.refresh_ms);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }

    let (cell, relay) = hw::build(cfg)?;
    let clock = MonotonicClock::new();
    let epoch = clock.now();
    let rt = grinder_core::spawn(cell, relay, core_cfg, clock)?;
    let view = rt.status();

    let mut last: Option<Screen> = None;
    loop {
        let now = clock.ms_since(epoch);
        if stop.load(Ordering::SeqCst) {
            tracing::info!("interrupted");
            break;
        }
        if max_ms.is_some_and(|max| now >= max) {
            tracing::debug!(now_ms = now, "run time limit reached");
            break;
        }

        for ev in rt.events().try_iter() {
            if json {
                println!("{}", event_json(&ev));
            }
        }

        let snap = view.snapshot();
        let screen = render(&snap, now, &ui);
        if last.as_ref() != Some(&screen) {
            if json {
                println!("{}", snapshot_json(&snap, &screen));
            } else if screen.is_blank() {
                println!("[display off]");
            } else {
                println!("{screen}\n");
            }
            last = Some(screen);
        }
        clock.sleep(refresh);
    }

    // stop both loops before the final report so the relay is already off
    rt.shutdown();
    if json {
        let snap = view.snapshot();
        let mut v = snapshot_json(&snap, &render(&snap, clock.ms_since(epoch), &ui));
        v["type"] = json!("final");
        println!("{v}");
    }
    Ok(())
}

/// One bounded read, one tare, one relay-off write.
pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let core_cfg: GrinderCfg = cfg.into();
    let timeout = Duration::from_millis(core_cfg.timeouts.sensor_ms);
    let (mut cell, mut relay) = hw::build(cfg)?;

    relay
        .set_active(false)
        .map_err(|e| map_boxed(&e))
        .wrap_err("switch relay off")?;
    let raw = cell
        .read_grams(timeout)
        .map_err(|e| map_boxed(&e))
        .wrap_err("read load cell")?;
    cell.tare(core_cfg.tare.samples, timeout)
        .map_err(|e| map_boxed(&e))
        .wrap_err("tare load cell")?;
    let zeroed = cell
        .read_grams(timeout)
        .map_err(|e| map_boxed(&e))
        .wrap_err("read load cell after tare")?;

    if json {
        println!(
            "{}",
            json!({ "type": "self_check", "status": "ok", "raw_g": raw, "zeroed_g": zeroed })
        );
    } else {
        println!("ok (read {raw:.2} g, {zeroed:.2} g after tare)");
    }
    Ok(())
}
