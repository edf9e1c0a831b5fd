//! The two control loops and the runtime that owns their threads.
//!
//! - `grinder-scale` owns the load cell: services tare requests, then polls.
//! - `grinder-decide` owns the relay: auto-tare policy, state machine tick,
//!   status publication, then sleeps one decision period.
//!
//! Both threads stop when the `Runtime` is dropped. The decision thread
//! switches the relay off on its way out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use grinder_traits::{Actuator, Clock, LoadCell};

use crate::config::GrinderCfg;
use crate::error::Result;
use crate::estimator::WeightEstimator;
use crate::filter;
use crate::machine::GrindMachine;
use crate::shared::{FilteredWeight, Shared, StatusView};
use crate::status::{GrindStatus, TransitionEvent};
use crate::tare::TareController;
use crate::timebase::Timebase;

/// Transition events buffered for slow consumers; older ones win.
pub const EVENT_CAPACITY: usize = 64;

/// Pause after a failed read so a dead sensor does not spin the thread.
const FAILED_READ_BACKOFF_MS: u64 = 10;

/// One estimator-loop cycle at a time.
pub struct ScaleLoop<L: LoadCell, C: Clock> {
    estimator: WeightEstimator<L, C>,
    tare: TareController,
    shared: Arc<Shared>,
    time: Timebase<C>,
    tare_failures: u32,
}

impl<L: LoadCell, C: Clock> ScaleLoop<L, C> {
    pub fn new(
        estimator: WeightEstimator<L, C>,
        tare: TareController,
        shared: Arc<Shared>,
        time: Timebase<C>,
    ) -> Self {
        Self {
            estimator,
            tare,
            shared,
            time,
            tare_failures: 0,
        }
    }

    /// Service a pending tare, then take one reading.
    pub fn cycle(&mut self) -> FilteredWeight {
        if self.shared.tare_state().pending() {
            self.service_tare();
        }
        self.estimator.poll()
    }

    pub fn estimator(&self) -> &WeightEstimator<L, C> {
        &self.estimator
    }

    fn service_tare(&mut self) {
        if self.estimator.miss_streak() > 0 {
            tracing::debug!("sensor not ready, tare deferred");
            return;
        }
        match self.tare.tare(self.estimator.load_cell_mut()) {
            Ok(()) => {
                let now = self.time.now_ms();
                self.shared.complete_tare(now);
                self.tare_failures = 0;
                tracing::info!(at_ms = now, "tare complete");
            }
            Err(e) => {
                self.tare_failures = self.tare_failures.saturating_add(1);
                if self.tare_failures == 1 {
                    tracing::warn!(error = %e, "tare failed, will retry");
                } else {
                    tracing::debug!(error = %e, attempts = self.tare_failures, "tare retry failed");
                }
            }
        }
    }
}

/// One decision-loop tick at a time.
pub struct DecisionLoop<A: Actuator, C: Clock> {
    machine: GrindMachine<A>,
    tare: TareController,
    shared: Arc<Shared>,
    time: Timebase<C>,
    events: Option<xch::Sender<TransitionEvent>>,
    significant_change_g: f32,
    prev_weight_g: Option<f32>,
    last_significant_change_ms: Option<u64>,
}

impl<A: Actuator, C: Clock> DecisionLoop<A, C> {
    pub fn new(
        machine: GrindMachine<A>,
        tare: TareController,
        shared: Arc<Shared>,
        time: Timebase<C>,
        events: Option<xch::Sender<TransitionEvent>>,
    ) -> Self {
        let significant_change_g = machine.cfg().significant_change_g;
        Self {
            machine,
            tare,
            shared,
            time,
            events,
            significant_change_g,
            prev_weight_g: None,
            last_significant_change_ms: None,
        }
    }

    pub fn machine(&self) -> &GrindMachine<A> {
        &self.machine
    }

    /// Run one decision cycle against the latest published weight.
    ///
    /// Nothing happens until the first tare has completed and a sample
    /// exists. The status record is published even when the relay write
    /// failed, so readers see the state the machine is actually in.
    pub fn tick(&mut self) -> Result<GrindStatus> {
        let now = self.time.now_ms();
        let w = self.shared.weight();
        if !self.shared.tare_state().ever_tared() || !w.has_sample() {
            return Ok(self.machine.status());
        }

        self.track_activity(&w, now);

        let from = self.machine.status();
        if from == GrindStatus::Empty {
            self.tare.maybe_request(&self.shared, from, &w, now);
        }
        let res = self.machine.tick(&w, now);
        let to = self.machine.status();
        self.shared
            .publish_status(self.machine.record(self.last_significant_change_ms));

        if to != from {
            self.emit(TransitionEvent {
                at_ms: now,
                from,
                to,
                weight_g: w.grams,
                failure: self.machine.failure(),
            });
        }
        res
    }

    /// Relay off and publish the final state.
    pub fn shutdown(&mut self) -> Result<()> {
        let from = self.machine.status();
        let res = self.machine.shutdown();
        self.shared
            .publish_status(self.machine.record(self.last_significant_change_ms));
        if self.machine.status() != from {
            self.emit(TransitionEvent {
                at_ms: self.time.now_ms(),
                from,
                to: self.machine.status(),
                weight_g: self.shared.weight().grams,
                failure: self.machine.failure(),
            });
        }
        res
    }

    fn track_activity(&mut self, w: &FilteredWeight, now: u64) {
        let moved = match self.prev_weight_g {
            Some(prev) => (w.grams - prev).abs() > self.significant_change_g,
            // first sample starts the idle timer
            None => true,
        };
        if moved {
            self.last_significant_change_ms = Some(now);
        }
        self.prev_weight_g = Some(w.grams);
    }

    fn emit(&self, ev: TransitionEvent) {
        let Some(tx) = &self.events else { return };
        match tx.try_send(ev) {
            Ok(()) | Err(xch::TrySendError::Disconnected(_)) => {}
            Err(xch::TrySendError::Full(_)) => {
                tracing::debug!(to = %ev.to, "event queue full, transition not delivered");
            }
        }
    }
}

/// Handle to the running controller. Dropping it stops both loops.
pub struct Runtime {
    shared: Arc<Shared>,
    events: xch::Receiver<TransitionEvent>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl core::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runtime")
            .field("threads", &self.handles.len())
            .field("stopping", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Runtime {
    pub fn status(&self) -> StatusView {
        StatusView::new(Arc::clone(&self.shared))
    }

    pub fn events(&self) -> &xch::Receiver<TransitionEvent> {
        &self.events
    }

    /// Stop both loops and wait for them.
    pub fn shutdown(self) {
        drop(self);
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("grinder").to_owned();
            match handle.join() {
                Ok(()) => tracing::trace!(thread = %name, "joined"),
                Err(e) => tracing::warn!(thread = %name, ?e, "control thread panicked"),
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Validate `cfg`, switch the relay off and start both loops.
///
/// The time base for every published timestamp is taken from `clock` at
/// this call.
pub fn spawn<L, A, C>(cell: L, actuator: A, cfg: GrinderCfg, clock: C) -> Result<Runtime>
where
    L: LoadCell + Send + 'static,
    A: Actuator + Send + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    cfg.validate().wrap_err("invalid controller configuration")?;

    let shared = Shared::new(cfg.grind.dose_g);
    let time = Timebase::new(clock);
    let timeout = Duration::from_millis(cfg.timeouts.sensor_ms);
    let tare = TareController::new(cfg.tare.clone(), timeout);

    let mut machine = GrindMachine::new(actuator, cfg.grind.clone());
    machine.begin()?;

    let (tx, rx) = xch::bounded(EVENT_CAPACITY);
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut runtime = Runtime {
        shared: Arc::clone(&shared),
        events: rx,
        shutdown: Arc::clone(&shutdown),
        handles: Vec::with_capacity(2),
    };

    let estimator = WeightEstimator::new(
        cell,
        filter::from_cfg(&cfg.filter),
        timeout,
        Arc::clone(&shared),
        time.clone(),
    );
    let mut scale = ScaleLoop::new(estimator, tare.clone(), Arc::clone(&shared), time.clone());
    let flag = Arc::clone(&shutdown);
    let scale_time = time.clone();
    let handle = thread::Builder::new()
        .name("grinder-scale".into())
        .spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if !scale.cycle().sensor_ready {
                    scale_time.sleep_ms(FAILED_READ_BACKOFF_MS);
                }
            }
            tracing::debug!(misses = scale.estimator().misses(), "scale loop exiting");
        })
        .wrap_err("spawn scale thread")?;
    runtime.handles.push(handle);

    let period_ms = cfg.grind.decision_period_ms;
    let mut decide = DecisionLoop::new(machine, tare, shared, time.clone(), Some(tx));
    let flag = Arc::clone(&shutdown);
    // on error the runtime drop stops the scale thread
    let handle = thread::Builder::new()
        .name("grinder-decide".into())
        .spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if let Err(e) = decide.tick() {
                    tracing::error!(error = %format!("{e:#}"), "decision tick failed");
                }
                time.sleep_ms(period_ms);
            }
            if let Err(e) = decide.shutdown() {
                tracing::error!(error = %format!("{e:#}"), "relay off at shutdown failed");
            }
            tracing::debug!("decision loop exiting");
        })
        .wrap_err("spawn decision thread")?;
    runtime.handles.push(handle);

    tracing::info!(
        dose_g = cfg.grind.dose_g,
        cup_g = cfg.grind.cup_weight_g,
        period_ms,
        "controller started"
    );
    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GrindCfg, TareCfg};
    use crate::filter::Passthrough;
    use crate::mocks::{ScriptedLoadCell, SpyActuator};
    use crate::status::FailureReason;
    use grinder_traits::ManualClock;

    struct Bench {
        clock: ManualClock,
        shared: Arc<Shared>,
        spy: SpyActuator,
        decide: DecisionLoop<SpyActuator, ManualClock>,
        rx: xch::Receiver<TransitionEvent>,
    }

    fn bench() -> Bench {
        let clock = ManualClock::new();
        let shared = Shared::new(18.0);
        let spy = SpyActuator::default();
        let (tx, rx) = xch::bounded(EVENT_CAPACITY);
        let decide = DecisionLoop::new(
            GrindMachine::new(spy.clone(), GrindCfg::default()),
            TareController::new(TareCfg::default(), Duration::from_millis(300)),
            Arc::clone(&shared),
            Timebase::new(clock.clone()),
            Some(tx),
        );
        Bench {
            clock,
            shared,
            spy,
            decide,
            rx,
        }
    }

    impl Bench {
        fn step(&mut self, grams: f32) -> GrindStatus {
            self.clock.advance_ms(50);
            let now = self.clock.ms_since(self.clock.origin());
            self.shared.publish_weight(FilteredWeight::ready(grams, now));
            self.decide.tick().unwrap()
        }
    }

    #[test]
    fn no_decision_before_first_tare() {
        let mut b = bench();
        assert_eq!(b.step(20.2), GrindStatus::Empty);
        assert!(!b.spy.is_on());
        b.shared.complete_tare(60);
        assert_eq!(b.step(20.2), GrindStatus::Grinding);
        assert!(b.spy.is_on());
    }

    #[test]
    fn transitions_are_published_and_emitted() {
        let mut b = bench();
        b.shared.complete_tare(0);
        b.step(20.2);
        let snap = b.shared.snapshot();
        assert_eq!(snap.status, GrindStatus::Grinding);
        assert_eq!(snap.empty_cup_g, Some(20.2));
        let ev = b.rx.try_recv().unwrap();
        assert_eq!((ev.from, ev.to), (GrindStatus::Empty, GrindStatus::Grinding));

        b.step(2.0);
        let ev = b.rx.try_recv().unwrap();
        assert_eq!(ev.to, GrindStatus::Failed);
        assert_eq!(ev.failure, Some(FailureReason::CupRemoved));
        assert!(b.rx.try_recv().is_err());
    }

    #[test]
    fn significant_change_is_tracked() {
        let mut b = bench();
        b.shared.complete_tare(0);
        b.step(0.0);
        let first = b.shared.snapshot().last_significant_change_ms;
        assert_eq!(first, Some(50));
        b.step(4.0);
        assert_eq!(b.shared.snapshot().last_significant_change_ms, first);
        b.step(300.0);
        assert_eq!(b.shared.snapshot().last_significant_change_ms, Some(150));
    }

    #[test]
    fn drift_requests_tare_only_when_empty() {
        let mut b = bench();
        b.shared.complete_tare(0);
        b.clock.advance_ms(10_000);
        b.step(1.0);
        assert!(b.shared.tare_state().pending());
    }

    #[test]
    fn shutdown_mid_grind_emits_failure() {
        let mut b = bench();
        b.shared.complete_tare(0);
        b.step(20.2);
        b.decide.shutdown().unwrap();
        assert!(!b.spy.is_on());
        let snap = b.shared.snapshot();
        assert_eq!(snap.status, GrindStatus::Failed);
        assert_eq!(snap.failure, Some(FailureReason::Interrupted));
    }

    fn scale_loop(cell: ScriptedLoadCell) -> (ScaleLoop<ScriptedLoadCell, ManualClock>, Arc<Shared>) {
        let shared = Shared::new(18.0);
        let time = Timebase::new(ManualClock::new());
        let timeout = Duration::from_millis(300);
        let est = WeightEstimator::new(
            cell,
            Box::new(Passthrough::default()),
            timeout,
            Arc::clone(&shared),
            time.clone(),
        );
        let tare = TareController::new(TareCfg::default(), timeout);
        (ScaleLoop::new(est, tare, Arc::clone(&shared), time), shared)
    }

    #[test]
    fn startup_tare_runs_before_first_poll() {
        let cell = ScriptedLoadCell::constant(0.1);
        let (mut s, shared) = scale_loop(cell.clone());
        s.cycle();
        assert_eq!(cell.tares(), 1);
        assert!(shared.tare_state().ever_tared());
        s.cycle();
        assert_eq!(cell.tares(), 1);
    }

    #[test]
    fn tare_waits_for_sensor() {
        let cell = ScriptedLoadCell::new([None, None, Some(0.0)]);
        cell.fail_tare(true);
        let (mut s, shared) = scale_loop(cell.clone());
        // tare attempted and failed, read fails
        s.cycle();
        cell.fail_tare(false);
        // deferred: the last read failed
        s.cycle();
        assert!(shared.tare_state().pending());
        // still deferred, this read succeeds
        s.cycle();
        assert!(shared.tare_state().pending());
        s.cycle();
        assert_eq!(cell.tares(), 1);
        assert!(!shared.tare_state().pending());
    }
}
