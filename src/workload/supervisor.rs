//! Workload supervisor.
//!
//! Owns every workload unit for one run: starts them together on their own
//! threads, shares a single cancellation signal with them, and joins each
//! with a bounded wait. A unit that does not report back in time is
//! abandoned (left running, never killed) and the abandonment is recorded.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::model::{average_interval, next_event, Event, WorkloadKind, WorkloadState};
use crate::service::ServiceTag;

/// Set-once cancellation flag that sleeping units can wait on
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter
    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `timeout` unless the signal is raised first.
    ///
    /// Returns true if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// One independently running load process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadUnit {
    pub name: String,
    pub kind: WorkloadKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceTag>,
    pub source: String,
    pub destination: String,
    pub seed: u64,
}

impl WorkloadUnit {
    /// Log target this unit writes its events under
    pub fn log_target(&self) -> String {
        format!("qosnet::workload::{}", self.name)
    }
}

/// Destination for emitted events (the traffic emission boundary)
pub trait EventSink: Send {
    /// `at` is the time since the supervisor started the run
    fn emit(&mut self, unit: &WorkloadUnit, at: Duration, event: &Event);
}

/// Sink that writes each event to the unit's own log target
#[derive(Debug)]
pub struct LogSink {
    target: String,
}

impl LogSink {
    pub fn new(unit: &WorkloadUnit) -> Self {
        Self {
            target: unit.log_target(),
        }
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, _unit: &WorkloadUnit, at: Duration, event: &Event) {
        log::debug!(target: self.target.as_str(), "[{:>9.3}s] {}", at.as_secs_f64(), event.kind);
    }
}

/// What a unit reported when it stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub kind: WorkloadKind,
    pub source: String,
    pub destination: String,
    pub events: u64,
    /// Time the unit ran for, in workload time (before scaling)
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// True if cancellation stopped the unit before its window closed
    pub stopped_early: bool,
    /// Observed average interval between periodic ticks
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub average_interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_quality: Option<String>,
}

/// A unit the supervisor gave up waiting for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abandonment {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupervisorOutcome {
    pub completed: Vec<UnitReport>,
    pub abandoned: Vec<Abandonment>,
}

/// Runs workload units for a shared window
#[derive(Debug, Clone)]
pub struct Supervisor {
    cancel: CancelSignal,
    join_timeout: Duration,
    time_scale: f64,
}

impl Supervisor {
    /// `time_scale` multiplies every wall-clock wait (1.0 = real time)
    pub fn new(join_timeout: Duration, time_scale: f64) -> Self {
        Self {
            cancel: CancelSignal::new(),
            join_timeout,
            time_scale,
        }
    }

    /// Handle for stopping the run from elsewhere
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Run all units for `duration` (workload time), then stop and join them.
    ///
    /// Returns early if the cancellation signal is raised.
    pub fn run<F>(&self, units: Vec<WorkloadUnit>, duration: Duration, mut make_sink: F) -> SupervisorOutcome
    where
        F: FnMut(&WorkloadUnit) -> Box<dyn EventSink>,
    {
        let (tx, rx) = mpsc::channel::<UnitReport>();
        let window = scale_wait(duration, self.time_scale);
        let epoch = Instant::now();
        let mut outcome = SupervisorOutcome::default();
        let mut pending: BTreeMap<String, JoinHandle<()>> = BTreeMap::new();

        log::info!(
            "Starting {} workload units for {:?} (time scale {})",
            units.len(),
            duration,
            self.time_scale
        );

        for unit in units {
            let name = unit.name.clone();
            let sink = make_sink(&unit);
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            let time_scale = self.time_scale;

            let spawned = thread::Builder::new()
                .name(format!("workload-{}", name))
                .spawn(move || {
                    let report = run_unit(&unit, sink, &cancel, window, time_scale, epoch);
                    // The supervisor may have stopped listening after abandoning us.
                    let _ = tx.send(report);
                });

            match spawned {
                Ok(handle) => {
                    pending.insert(name, handle);
                }
                Err(e) => {
                    log::error!("Failed to start workload unit {}: {}", name, e);
                    outcome.abandoned.push(Abandonment {
                        name,
                        reason: format!("failed to start: {}", e),
                    });
                }
            }
        }
        drop(tx);

        if self.cancel.wait_timeout(window) {
            log::info!("Workload run cancelled after {:?}", epoch.elapsed());
        }
        self.cancel.cancel();

        while !pending.is_empty() {
            match rx.recv_timeout(self.join_timeout) {
                Ok(report) => {
                    if let Some(handle) = pending.remove(&report.name) {
                        if handle.join().is_err() {
                            log::warn!("Workload unit {} panicked after reporting", report.name);
                        }
                    }
                    log::info!(
                        "Workload unit {} finished: {} events in {:.2}s",
                        report.name,
                        report.events,
                        report.elapsed.as_secs_f64()
                    );
                    outcome.completed.push(report);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    for (name, handle) in std::mem::take(&mut pending) {
                        let reason = if handle.is_finished() {
                            match handle.join() {
                                Err(_) => "panicked before reporting".to_string(),
                                Ok(()) => "exited without reporting".to_string(),
                            }
                        } else {
                            format!("did not stop within {:?}", self.join_timeout)
                        };
                        log::warn!("Abandoning workload unit {}: {}", name, reason);
                        outcome.abandoned.push(Abandonment { name, reason });
                    }
                }
            }
        }

        outcome.completed.sort_by(|a, b| a.name.cmp(&b.name));
        outcome.abandoned.sort_by(|a, b| a.name.cmp(&b.name));
        outcome
    }
}

/// Scale a workload-time wait to wall-clock time, saturating at `Duration::MAX`
pub fn scale_wait(wait: Duration, time_scale: f64) -> Duration {
    Duration::try_from_secs_f64(wait.as_secs_f64() * time_scale).unwrap_or(Duration::MAX)
}

fn run_unit(
    unit: &WorkloadUnit,
    mut sink: Box<dyn EventSink>,
    cancel: &CancelSignal,
    window: Duration,
    time_scale: f64,
    epoch: Instant,
) -> UnitReport {
    let target = unit.log_target();
    let mut rng = StdRng::seed_from_u64(unit.seed);
    let mut state = WorkloadState::initial(unit.kind, &mut rng);
    let started = Instant::now();
    let mut events = 0u64;

    log::info!(
        target: target.as_str(),
        "{} traffic {} -> {} started",
        unit.kind,
        unit.source,
        unit.destination
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let remaining = window.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }

        let (event, next) = next_event(state, &mut rng);
        sink.emit(unit, epoch.elapsed(), &event);
        events += 1;
        state = next;

        let pause = scale_wait(event.wait, time_scale).min(remaining);
        if cancel.wait_timeout(pause) {
            break;
        }
    }

    let wall = started.elapsed();
    let elapsed = if time_scale > 0.0 {
        wall.div_f64(time_scale)
    } else {
        wall
    };
    let average = match state {
        WorkloadState::Periodic { ticks } => average_interval(elapsed, ticks),
        _ => None,
    };

    log::info!(
        target: target.as_str(),
        "Total events: {}, elapsed {:.2}s{}",
        events,
        elapsed.as_secs_f64(),
        average
            .map(|a| format!(", average interval {:.2}s", a.as_secs_f64()))
            .unwrap_or_default()
    );

    UnitReport {
        name: unit.name.clone(),
        kind: unit.kind,
        source: unit.source.clone(),
        destination: unit.destination.clone(),
        events,
        elapsed,
        stopped_early: wall < window,
        average_interval: average,
        final_quality: state.quality().map(|q| q.name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<(String, Instant)>>>;

    struct RecordingSink {
        log: Log,
    }

    impl EventSink for RecordingSink {
        fn emit(&mut self, unit: &WorkloadUnit, _at: Duration, _event: &Event) {
            self.log.lock().unwrap().push((unit.name.clone(), Instant::now()));
        }
    }

    /// Never returns from `emit` until released, to simulate a stuck unit
    struct StuckSink {
        release: CancelSignal,
    }

    impl EventSink for StuckSink {
        fn emit(&mut self, _unit: &WorkloadUnit, _at: Duration, _event: &Event) {
            while !self.release.wait_timeout(Duration::from_millis(50)) {}
        }
    }

    fn unit(name: &str, kind: WorkloadKind, seed: u64) -> WorkloadUnit {
        WorkloadUnit {
            name: name.to_string(),
            kind,
            service: None,
            source: "h1".to_string(),
            destination: "h2".to_string(),
            seed,
        }
    }

    fn all_kinds() -> Vec<WorkloadUnit> {
        vec![
            unit("bulk", WorkloadKind::Bulk, 1),
            unit("realtime", WorkloadKind::Realtime, 2),
            unit("periodic", WorkloadKind::Periodic, 3),
            unit("cross", WorkloadKind::CrossTraffic, 4),
        ]
    }

    #[test]
    fn test_cancel_signal_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let woke = waiter.wait_timeout(Duration::from_secs(30));
            (woke, start.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        signal.cancel();
        let (woke, waited) = handle.join().unwrap();
        assert!(woke);
        assert!(waited < Duration::from_secs(5));
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_scale_wait_saturates() {
        assert_eq!(scale_wait(Duration::from_secs(10), 0.5), Duration::from_secs(5));
        assert_eq!(scale_wait(Duration::from_secs(u64::MAX), 2.0), Duration::MAX);
        assert_eq!(scale_wait(Duration::from_secs(1), f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_units_run_for_the_window() {
        // 5 s of workload time compressed into 50 ms.
        let supervisor = Supervisor::new(Duration::from_secs(5), 0.01);
        let log: Log = Arc::default();
        let outcome = supervisor.run(all_kinds(), Duration::from_secs(5), |_| {
            Box::new(RecordingSink { log: log.clone() })
        });

        assert!(outcome.abandoned.is_empty());
        assert_eq!(outcome.completed.len(), 4);
        for report in &outcome.completed {
            assert!(report.events >= 1, "{} emitted nothing", report.name);
        }
        let realtime = outcome.completed.iter().find(|r| r.name == "realtime").unwrap();
        assert!(realtime.final_quality.is_some());
        let periodic = outcome.completed.iter().find(|r| r.name == "periodic").unwrap();
        assert!(periodic.average_interval.is_some());
        assert_eq!(log.lock().unwrap().len() as u64, outcome.completed.iter().map(|r| r.events).sum::<u64>());
    }

    #[test]
    fn test_no_events_after_cancellation() {
        // One tick is at most 5 s of workload time = 50 ms of wall time.
        let supervisor = Supervisor::new(Duration::from_secs(5), 0.01);
        let cancel = supervisor.cancel_signal();
        let log: Log = Arc::default();
        let sink_log = log.clone();

        let runner = thread::spawn(move || {
            supervisor.run(all_kinds(), Duration::from_secs(3600), move |_| {
                Box::new(RecordingSink { log: sink_log.clone() })
            })
        });

        thread::sleep(Duration::from_millis(200));
        cancel.cancel();
        let cancelled_at = Instant::now();
        let outcome = runner.join().unwrap();

        assert!(outcome.abandoned.is_empty());
        assert!(outcome.completed.iter().all(|r| r.stopped_early));
        let tick = Duration::from_millis(50);
        for (name, at) in log.lock().unwrap().iter() {
            assert!(
                *at <= cancelled_at + tick,
                "{} emitted {:?} after cancellation",
                name,
                at.duration_since(cancelled_at)
            );
        }
    }

    #[test]
    fn test_stuck_unit_is_abandoned() {
        let supervisor = Supervisor::new(Duration::from_millis(100), 0.01);
        let release = CancelSignal::new();
        let stuck_release = release.clone();
        let log: Log = Arc::default();

        let units = vec![unit("stuck", WorkloadKind::Bulk, 1), unit("fine", WorkloadKind::Periodic, 2)];
        let outcome = supervisor.run(units, Duration::from_secs(1), |u| {
            if u.name == "stuck" {
                Box::new(StuckSink {
                    release: stuck_release.clone(),
                })
            } else {
                Box::new(RecordingSink { log: log.clone() })
            }
        });
        release.cancel();

        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.completed[0].name, "fine");
        assert_eq!(outcome.abandoned.len(), 1);
        assert_eq!(outcome.abandoned[0].name, "stuck");
        assert!(outcome.abandoned[0].reason.contains("did not stop"));
    }
}
