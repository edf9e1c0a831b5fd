//! Synchronized state shared by the scale loop, the decision loop and readers.
//!
//! Each record has exactly one writer:
//! - `FilteredWeight`: the scale loop;
//! - the status record: the decision loop;
//! - `TareState`: requested by the decision loop, completed by the scale loop.
//!
//! Records are plain `Copy` data behind their own mutex, so a reader always
//! sees a value that one writer finished writing. A poisoned lock still holds
//! a complete record and is recovered rather than propagated.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::status::{FailureReason, GrindSession, GrindStatus, StatusSnapshot};

/// Latest best-estimate weight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilteredWeight {
    pub grams: f32,
    /// When the estimate last changed; None until the first good sample.
    pub updated_at_ms: Option<u64>,
    /// False while the most recent read timed out.
    pub sensor_ready: bool,
}

impl FilteredWeight {
    pub fn ready(grams: f32, at_ms: u64) -> Self {
        Self {
            grams,
            updated_at_ms: Some(at_ms),
            sensor_ready: true,
        }
    }

    pub fn has_sample(&self) -> bool {
        self.updated_at_ms.is_some()
    }
}

/// Zeroing bookkeeping. `last_tared_ms == None` means "tare now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TareState {
    pub last_tared_ms: Option<u64>,
    pub tare_count: u32,
}

impl TareState {
    pub fn pending(&self) -> bool {
        self.last_tared_ms.is_none()
    }

    pub fn ever_tared(&self) -> bool {
        self.tare_count > 0
    }
}

/// Everything the decision loop publishes, written in one critical section.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusRecord {
    pub status: GrindStatus,
    pub failure: Option<FailureReason>,
    pub session: GrindSession,
    pub last_significant_change_ms: Option<u64>,
}

#[derive(Debug)]
pub struct Shared {
    weight: Mutex<FilteredWeight>,
    tare: Mutex<TareState>,
    status: Mutex<StatusRecord>,
    dose_target_g: f32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub fn new(dose_target_g: f32) -> Arc<Self> {
        Arc::new(Self {
            weight: Mutex::new(FilteredWeight::default()),
            tare: Mutex::new(TareState::default()),
            status: Mutex::new(StatusRecord::default()),
            dose_target_g,
        })
    }

    pub fn weight(&self) -> FilteredWeight {
        *lock(&self.weight)
    }

    pub fn tare_state(&self) -> TareState {
        *lock(&self.tare)
    }

    pub fn status_record(&self) -> StatusRecord {
        *lock(&self.status)
    }

    pub fn dose_target_g(&self) -> f32 {
        self.dose_target_g
    }

    pub(crate) fn publish_weight(&self, w: FilteredWeight) {
        *lock(&self.weight) = w;
    }

    /// Flag the sensor as not ready, keeping the last estimate.
    pub(crate) fn mark_sensor_lost(&self) -> FilteredWeight {
        let mut w = lock(&self.weight);
        w.sensor_ready = false;
        *w
    }

    /// Ask the scale loop for a tare. Returns false when one is already pending.
    pub(crate) fn request_tare(&self) -> bool {
        let mut t = lock(&self.tare);
        if t.pending() {
            return false;
        }
        t.last_tared_ms = None;
        true
    }

    pub(crate) fn complete_tare(&self, at_ms: u64) {
        let mut t = lock(&self.tare);
        t.last_tared_ms = Some(at_ms);
        t.tare_count = t.tare_count.saturating_add(1);
    }

    pub(crate) fn publish_status(&self, rec: StatusRecord) {
        *lock(&self.status) = rec;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let rec = self.status_record();
        let w = self.weight();
        let tare = self.tare_state();
        StatusSnapshot {
            status: rec.status,
            failure: rec.failure,
            filtered_weight_g: w.grams,
            sensor_ready: w.sensor_ready,
            weight_updated_at_ms: w.updated_at_ms,
            empty_cup_g: rec.session.empty_cup_g,
            dose_target_g: self.dose_target_g,
            started_at_ms: rec.session.started_at_ms,
            finished_at_ms: rec.session.finished_at_ms,
            last_tared_ms: tare.last_tared_ms,
            last_significant_change_ms: rec.last_significant_change_ms,
        }
    }
}

/// Cloneable read-only handle for display and telemetry.
#[derive(Debug, Clone)]
pub struct StatusView {
    shared: Arc<Shared>,
}

impl StatusView {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    pub fn status(&self) -> GrindStatus {
        self.shared.status_record().status
    }

    pub fn weight(&self) -> FilteredWeight {
        self.shared.weight()
    }
}
