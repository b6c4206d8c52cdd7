//! Synthetic workload generation.

pub mod model;
pub mod supervisor;

pub use model::{
    average_interval, next_event, Event, EventKind, QualityLevel, WorkloadKind, WorkloadState,
    QUALITY_LADDER,
};
pub use supervisor::{
    scale_wait, Abandonment, CancelSignal, EventSink, LogSink, Supervisor, SupervisorOutcome, UnitReport,
    WorkloadUnit,
};
