//! Capture record ingestion.
//!
//! Turns per-capture raw summaries into [`CaptureRecord`]s. Packet capture
//! itself happens outside the crate; [`tap`] provides an in-process stand-in
//! fed from workload events.

pub mod batch;
pub mod ingest;
pub mod naming;
pub mod record;
pub mod tap;
pub mod tcpdump;

pub use batch::{discover_captures, ingest_directory, ingest_file, CaptureFailure, IngestOutcome};
pub use ingest::{parse, render, IngestError};
pub use naming::{capture_file_name, capture_point_from_filename, SUMMARY_EXTENSION};
pub use record::{AddressCounters, CaptureRecord, KNOWN_PROTOCOLS, OTHER_PROTOCOL};
pub use tap::{CaptureTap, FlowPath, TapSink};
pub use tcpdump::summarize_tcpdump;
