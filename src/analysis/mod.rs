//! Traffic statistics for a run.
//!
//! Folds capture records into an aggregate, resolves service classes and
//! renders the run report and chart data.

pub mod aggregate;
pub mod artifacts;
pub mod lookup;
pub mod percent;
pub mod report;

pub use aggregate::{aggregate, AggregateReport, ClassLookup};
pub use artifacts::{ChartData, ChartSeries, RunArtifacts};
pub use lookup::{RangeClassLookup, TopologyClassLookup};
pub use percent::Percentage;
pub use report::{
    generate_json_report, generate_text_report, print_summary, render_json, render_text, Exclusion,
    ExclusionKind, RouteEntry, RunMetadata, RunReport,
};
