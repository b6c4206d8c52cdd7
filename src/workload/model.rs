//! Stochastic load processes, one per service class.
//!
//! Each process is a pure state machine: [`next_event`] takes the current
//! state and a random source and returns the event to emit now plus the
//! state to continue from. The event carries how long to wait before the
//! next tick; timing is the scheduler's business.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Request sizes for bulk request/response cycles, in bytes
pub const BULK_REQUEST_SIZE: (u32, u32) = (100, 1_000);
/// Response sizes for bulk request/response cycles, in bytes
pub const BULK_RESPONSE_SIZE: (u32, u32) = (1_000, 100_000);
/// Server processing delay between a request and its response, in seconds
pub const BULK_PROCESSING_DELAY: (f64, f64) = (0.01, 0.1);
/// Think time between bulk request cycles, in seconds
pub const BULK_THINK_TIME: (f64, f64) = (0.5, 2.0);

/// Probability that a realtime tick switches to another quality rung
pub const QUALITY_CHANGE_PROBABILITY: f64 = 0.1;
/// Interval between realtime and cross-traffic ticks
pub const STREAM_TICK: Duration = Duration::from_secs(1);

/// Periodic telemetry payload sizes, in bytes
pub const TELEMETRY_SIZE: (u32, u32) = (50, 200);
/// Interval between periodic telemetry reports, in seconds
pub const TELEMETRY_INTERVAL: (f64, f64) = (1.0, 5.0);

/// Cross-class transfer rates, in Mbit/s
pub const CROSS_RATE_MBPS: (u32, u32) = (1, 10);

/// Rung of the adaptive-bitrate quality ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityLevel {
    pub name: &'static str,
    pub bitrate_kbps: u32,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} kbit/s)", self.name, self.bitrate_kbps)
    }
}

/// Video quality ladder: 480p, 720p, 1080p, 4k
pub const QUALITY_LADDER: [QualityLevel; 4] = [
    QualityLevel { name: "480p", bitrate_kbps: 2_500 },
    QualityLevel { name: "720p", bitrate_kbps: 5_000 },
    QualityLevel { name: "1080p", bitrate_kbps: 8_000 },
    QualityLevel { name: "4k", bitrate_kbps: 25_000 },
];

/// Streams start at 720p
pub const INITIAL_RUNG: usize = 1;

/// Which load process a workload unit runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// Request/response cycles with think time
    Bulk,
    /// Adaptive-bitrate stream
    Realtime,
    /// Small periodic sensor reports
    Periodic,
    /// Constant-rate transfer between two service classes
    CrossTraffic,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bulk => "bulk",
            Self::Realtime => "realtime",
            Self::Periodic => "periodic",
            Self::CrossTraffic => "cross-traffic",
        };
        f.write_str(name)
    }
}

/// What a workload emits on one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Request { size: u32 },
    Response { size: u32 },
    Stream { bitrate_kbps: u32 },
    QualityChange { from: QualityLevel, to: QualityLevel },
    Telemetry { size: u32, sequence: u64 },
    Transfer { rate_mbps: u32 },
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { size } => write!(f, "Request sent: {} bytes", size),
            Self::Response { size } => write!(f, "Response size: {} bytes", size),
            Self::Stream { bitrate_kbps } => write!(f, "Streaming at {} kbit/s", bitrate_kbps),
            Self::QualityChange { from, to } => write!(f, "Quality changed from {} to {}", from, to),
            Self::Telemetry { size, sequence } => write!(f, "Sensor update {}: {} bytes", sequence, size),
            Self::Transfer { rate_mbps } => write!(f, "Cross traffic at {} Mbit/s", rate_mbps),
        }
    }
}

/// A workload event plus the pause before the next tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(with = "humantime_serde")]
    pub wait: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPhase {
    Request,
    Respond { size: u32 },
}

/// Per-process state
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadState {
    Bulk { phase: BulkPhase, cycles: u64 },
    Realtime { rung: usize, changes: u64 },
    Periodic { ticks: u64 },
    CrossTraffic { rate_mbps: u32 },
}

impl WorkloadState {
    /// Starting state for a process kind
    pub fn initial<R: Rng + ?Sized>(kind: WorkloadKind, rng: &mut R) -> Self {
        match kind {
            WorkloadKind::Bulk => Self::Bulk {
                phase: BulkPhase::Request,
                cycles: 0,
            },
            WorkloadKind::Realtime => Self::Realtime {
                rung: INITIAL_RUNG,
                changes: 0,
            },
            WorkloadKind::Periodic => Self::Periodic { ticks: 0 },
            WorkloadKind::CrossTraffic => Self::CrossTraffic {
                rate_mbps: rng.gen_range(CROSS_RATE_MBPS.0..=CROSS_RATE_MBPS.1),
            },
        }
    }

    /// Current quality of a realtime stream
    pub fn quality(&self) -> Option<QualityLevel> {
        match self {
            Self::Realtime { rung, .. } => Some(QUALITY_LADDER[*rung]),
            _ => None,
        }
    }
}

fn uniform_secs<R: Rng + ?Sized>(rng: &mut R, range: (f64, f64)) -> Duration {
    Duration::from_secs_f64(rng.gen_range(range.0..=range.1))
}

/// Advance a workload process by one tick
pub fn next_event<R: Rng + ?Sized>(state: WorkloadState, rng: &mut R) -> (Event, WorkloadState) {
    match state {
        WorkloadState::Bulk {
            phase: BulkPhase::Request,
            cycles,
        } => {
            let size = rng.gen_range(BULK_REQUEST_SIZE.0..=BULK_REQUEST_SIZE.1);
            let response = rng.gen_range(BULK_RESPONSE_SIZE.0..=BULK_RESPONSE_SIZE.1);
            let event = Event {
                kind: EventKind::Request { size },
                wait: uniform_secs(rng, BULK_PROCESSING_DELAY),
            };
            let next = WorkloadState::Bulk {
                phase: BulkPhase::Respond { size: response },
                cycles,
            };
            (event, next)
        }
        WorkloadState::Bulk {
            phase: BulkPhase::Respond { size },
            cycles,
        } => {
            let event = Event {
                kind: EventKind::Response { size },
                wait: uniform_secs(rng, BULK_THINK_TIME),
            };
            let next = WorkloadState::Bulk {
                phase: BulkPhase::Request,
                cycles: cycles + 1,
            };
            (event, next)
        }
        WorkloadState::Realtime { rung, changes } => {
            if rng.gen_bool(QUALITY_CHANGE_PROBABILITY) {
                // Pick uniformly among the other rungs.
                let mut target = rng.gen_range(0..QUALITY_LADDER.len() - 1);
                if target >= rung {
                    target += 1;
                }
                let event = Event {
                    kind: EventKind::QualityChange {
                        from: QUALITY_LADDER[rung],
                        to: QUALITY_LADDER[target],
                    },
                    wait: STREAM_TICK,
                };
                let next = WorkloadState::Realtime {
                    rung: target,
                    changes: changes + 1,
                };
                (event, next)
            } else {
                let event = Event {
                    kind: EventKind::Stream {
                        bitrate_kbps: QUALITY_LADDER[rung].bitrate_kbps,
                    },
                    wait: STREAM_TICK,
                };
                (event, WorkloadState::Realtime { rung, changes })
            }
        }
        WorkloadState::Periodic { ticks } => {
            let event = Event {
                kind: EventKind::Telemetry {
                    size: rng.gen_range(TELEMETRY_SIZE.0..=TELEMETRY_SIZE.1),
                    sequence: ticks + 1,
                },
                wait: uniform_secs(rng, TELEMETRY_INTERVAL),
            };
            (event, WorkloadState::Periodic { ticks: ticks + 1 })
        }
        WorkloadState::CrossTraffic { rate_mbps } => {
            let event = Event {
                kind: EventKind::Transfer { rate_mbps },
                wait: STREAM_TICK,
            };
            (event, WorkloadState::CrossTraffic { rate_mbps })
        }
    }
}

/// Observed average interval between periodic ticks.
///
/// `None` when no tick was emitted.
pub fn average_interval(elapsed: Duration, ticks: u64) -> Option<Duration> {
    if ticks == 0 {
        return None;
    }
    let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
    Some(elapsed / ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run(kind: WorkloadKind, seed: u64, ticks: usize) -> Vec<Event> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = WorkloadState::initial(kind, &mut rng);
        let mut events = Vec::new();
        for _ in 0..ticks {
            let (event, next) = next_event(state, &mut rng);
            events.push(event);
            state = next;
        }
        events
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        for kind in [
            WorkloadKind::Bulk,
            WorkloadKind::Realtime,
            WorkloadKind::Periodic,
            WorkloadKind::CrossTraffic,
        ] {
            assert_eq!(run(kind, 7, 50), run(kind, 7, 50), "{kind} not reproducible");
        }
    }

    #[test]
    fn test_bulk_alternates_request_and_response() {
        let events = run(WorkloadKind::Bulk, 1, 40);
        for pair in events.chunks(2) {
            match (&pair[0].kind, &pair[1].kind) {
                (EventKind::Request { size: req }, EventKind::Response { size: resp }) => {
                    assert!((100..=1_000).contains(req));
                    assert!((1_000..=100_000).contains(resp));
                }
                other => panic!("unexpected pair {other:?}"),
            }
            assert!(pair[0].wait <= Duration::from_millis(100));
            assert!(pair[1].wait >= Duration::from_millis(500));
            assert!(pair[1].wait <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_realtime_quality_changes_move_to_another_rung() {
        let events = run(WorkloadKind::Realtime, 3, 500);
        let mut current = QUALITY_LADDER[INITIAL_RUNG];
        let mut changes = 0;
        for event in &events {
            assert_eq!(event.wait, STREAM_TICK);
            match &event.kind {
                EventKind::Stream { bitrate_kbps } => assert_eq!(*bitrate_kbps, current.bitrate_kbps),
                EventKind::QualityChange { from, to } => {
                    assert_eq!(*from, current);
                    assert_ne!(from, to);
                    current = *to;
                    changes += 1;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        // 10% of 500 ticks; generous bounds.
        assert!((20..=90).contains(&changes), "{changes} changes");
    }

    #[test]
    fn test_periodic_payload_and_interval_ranges() {
        for (i, event) in run(WorkloadKind::Periodic, 11, 100).iter().enumerate() {
            match event.kind {
                EventKind::Telemetry { size, sequence } => {
                    assert!((50..=200).contains(&size));
                    assert_eq!(sequence, i as u64 + 1);
                }
                ref other => panic!("unexpected event {other:?}"),
            }
            assert!(event.wait >= Duration::from_secs(1));
            assert!(event.wait <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_cross_traffic_rate_is_fixed_for_the_run() {
        let events = run(WorkloadKind::CrossTraffic, 5, 10);
        let first = events[0].kind.clone();
        assert!(matches!(first, EventKind::Transfer { rate_mbps } if (1..=10).contains(&rate_mbps)));
        assert!(events.iter().all(|e| e.kind == first));
    }

    #[test]
    fn test_average_interval_guards_zero_ticks() {
        assert_eq!(average_interval(Duration::from_secs(60), 0), None);
        assert_eq!(
            average_interval(Duration::from_secs(60), 20),
            Some(Duration::from_secs(3))
        );
    }
}
