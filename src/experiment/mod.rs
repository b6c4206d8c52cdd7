//! Experiment runs: single, full suite and demo.

pub mod routing;
pub mod runner;
pub mod summary;

pub use routing::{flow_path, static_routes, RoutingMode};
pub use runner::{
    ExperimentRunner, RunOptions, RunOutcome, SuiteEntry, DEMO_DURATION, SETTLE_TIME,
};
pub use summary::{render_suite_summary, write_suite_summary};
