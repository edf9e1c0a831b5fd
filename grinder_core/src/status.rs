//! Grind state, session record and the published views of both.

use std::fmt;

/// The state machine's discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrindStatus {
    /// Waiting for a cup.
    #[default]
    Empty,
    /// Relay on, grounds flowing.
    Grinding,
    /// Dose reached; waiting for the cup to be taken away.
    Finished,
    /// Aborted; waiting for the operator to press the platform.
    Failed,
}

impl GrindStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Grinding => "grinding",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GrindStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a grind ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The load cell stopped answering mid-grind.
    SensorLost,
    /// Dose not reached within `max_grind_ms`.
    Timeout,
    /// Less than `stall_min_gain_g` gained over a stall window.
    Stall,
    /// Weight fell below the empty cup.
    CupRemoved,
    /// The relay refused to switch on.
    Actuator,
    /// The controller stopped mid-grind.
    Interrupted,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SensorLost => "sensor_lost",
            Self::Timeout => "timeout",
            Self::Stall => "stall",
            Self::CupRemoved => "cup_removed",
            Self::Actuator => "actuator",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference sample for stall detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub at_ms: u64,
    pub grams: f32,
}

/// Per-grind bookkeeping; meaningful from cup detection until the machine
/// returns to `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GrindSession {
    pub empty_cup_g: Option<f32>,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub checkpoint: Option<Checkpoint>,
}

impl GrindSession {
    pub(crate) fn start(weight_g: f32, now_ms: u64) -> Self {
        Self {
            empty_cup_g: Some(weight_g),
            started_at_ms: Some(now_ms),
            finished_at_ms: None,
            checkpoint: Some(Checkpoint {
                at_ms: now_ms,
                grams: weight_g,
            }),
        }
    }

    /// Grounds in the cup, if a grind is in progress or just ended.
    pub fn ground_g(&self, weight_g: f32) -> Option<f32> {
        self.empty_cup_g.map(|cup| weight_g - cup)
    }

    /// Grind duration: running while grinding, frozen once finished.
    pub fn elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        let start = self.started_at_ms?;
        Some(self.finished_at_ms.unwrap_or(now_ms).saturating_sub(start))
    }
}

/// Consistent read-only view for display and telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub status: GrindStatus,
    pub failure: Option<FailureReason>,
    pub filtered_weight_g: f32,
    pub sensor_ready: bool,
    pub weight_updated_at_ms: Option<u64>,
    pub empty_cup_g: Option<f32>,
    pub dose_target_g: f32,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub last_tared_ms: Option<u64>,
    pub last_significant_change_ms: Option<u64>,
}

impl StatusSnapshot {
    pub fn session(&self) -> GrindSession {
        GrindSession {
            empty_cup_g: self.empty_cup_g,
            started_at_ms: self.started_at_ms,
            finished_at_ms: self.finished_at_ms,
            checkpoint: None,
        }
    }
}

/// One state change, emitted by the decision loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionEvent {
    pub at_ms: u64,
    pub from: GrindStatus,
    pub to: GrindStatus,
    pub weight_g: f32,
    pub failure: Option<FailureReason>,
}
