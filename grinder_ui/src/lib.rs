#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Text screens for the grinder's small status display.
//!
//! `render` is a pure function of a status snapshot and the current time;
//! the caller decides when to refresh and where the lines go.

use std::fmt;

use grinder_core::{GrindStatus, StatusSnapshot};

#[derive(Debug, Clone)]
pub struct UiCfg {
    /// Blank the screen after this long without a significant weight change
    /// while the grinder is idle.
    pub sleep_after_ms: u64,
}

impl Default for UiCfg {
    fn default() -> Self {
        Self {
            sleep_after_ms: 100_000,
        }
    }
}

/// Up to four lines of text. No lines means the display is off.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screen {
    pub lines: Vec<String>,
}

impl Screen {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn is_blank(&self) -> bool {
        self.lines.is_empty()
    }

    fn of(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

fn grams(g: f32) -> String {
    format!("{g:3.1}g")
}

fn seconds(ms: u64) -> String {
    format!("{:3.1}s", ms as f64 / 1000.0)
}

fn progress(snap: &StatusSnapshot) -> String {
    let ground = snap
        .session()
        .ground_g(snap.filtered_weight_g)
        .unwrap_or(0.0);
    format!("{} > {}", grams(ground), grams(snap.dose_target_g))
}

/// Whether an idle display should be switched off.
pub fn is_asleep(snap: &StatusSnapshot, now_ms: u64, cfg: &UiCfg) -> bool {
    snap.status == GrindStatus::Empty
        && snap
            .last_significant_change_ms
            .is_some_and(|t| now_ms.saturating_sub(t) > cfg.sleep_after_ms)
}

pub fn render(snap: &StatusSnapshot, now_ms: u64, cfg: &UiCfg) -> Screen {
    if snap.weight_updated_at_ms.is_none() {
        return Screen::of(["Init..."]);
    }
    if !snap.sensor_ready {
        return Screen::of(["SCALE ERROR"]);
    }
    let elapsed = snap.session().elapsed_ms(now_ms).unwrap_or(0);
    match snap.status {
        GrindStatus::Empty if is_asleep(snap, now_ms, cfg) => Screen::blank(),
        GrindStatus::Empty => Screen::of(["Weight:".to_owned(), grams(snap.filtered_weight_g)]),
        GrindStatus::Grinding => Screen::of(["Grinding...".to_owned(), progress(snap), seconds(elapsed)]),
        GrindStatus::Finished => Screen::of(["Finished!".to_owned(), progress(snap), seconds(elapsed)]),
        GrindStatus::Failed => Screen::of(["Grinding failed", "Press balance", "to reset"]),
    }
}
