//! Test doubles for the hardware traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use grinder_traits::{Actuator, BoxError, LoadCell};

/// A load cell that never answers. Reads time out after a short wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLoadCell;

impl LoadCell for NoopLoadCell {
    fn read_grams(&mut self, timeout: Duration) -> Result<f32, BoxError> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Err("scale timeout".into())
    }

    fn tare(&mut self, _samples: u8, _timeout: Duration) -> Result<(), BoxError> {
        Err("scale timeout".into())
    }
}

/// One scripted read result. `None` is a timeout.
pub type Reading = Option<f32>;

/// Replays a fixed list of readings, then repeats the last one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLoadCell {
    inner: Arc<Mutex<Script>>,
}

#[derive(Debug, Default)]
struct Script {
    readings: VecDeque<Reading>,
    last: Reading,
    tares: u32,
    fail_tare: bool,
}

impl ScriptedLoadCell {
    pub fn new(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                readings: readings.into_iter().collect(),
                ..Script::default()
            })),
        }
    }

    /// A cell that always reads `grams`.
    pub fn constant(grams: f32) -> Self {
        Self::new([Some(grams)])
    }

    pub fn push(&self, r: Reading) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.readings.push_back(r);
    }

    pub fn tares(&self) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tares
    }

    pub fn fail_tare(&self, fail: bool) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_tare = fail;
    }
}

impl LoadCell for ScriptedLoadCell {
    fn read_grams(&mut self, _timeout: Duration) -> Result<f32, BoxError> {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let r = match s.readings.pop_front() {
            Some(r) => {
                s.last = r;
                r
            }
            None => s.last,
        };
        r.ok_or_else(|| "scale timeout".into())
    }

    fn tare(&mut self, _samples: u8, _timeout: Duration) -> Result<(), BoxError> {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if s.fail_tare {
            return Err("scale timeout".into());
        }
        s.tares += 1;
        Ok(())
    }
}

/// Records relay commands; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SpyActuator {
    on: Arc<AtomicBool>,
    writes: Arc<AtomicU32>,
    fail_on: Arc<AtomicBool>,
    fail_off: Arc<AtomicBool>,
}

impl SpyActuator {
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    /// Successful writes so far.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_on(&self, fail: bool) {
        self.fail_on.store(fail, Ordering::SeqCst);
    }

    pub fn fail_off(&self, fail: bool) {
        self.fail_off.store(fail, Ordering::SeqCst);
    }
}

impl Actuator for SpyActuator {
    fn set_active(&mut self, on: bool) -> Result<(), BoxError> {
        let fail = if on { &self.fail_on } else { &self.fail_off };
        if fail.load(Ordering::SeqCst) {
            return Err("relay gpio write failed".into());
        }
        self.on.store(on, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
