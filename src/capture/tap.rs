//! Capture points fed from workload events.
//!
//! Stands in for packet capture on the aggregation points: every event a
//! workload unit emits is counted as one frame at each aggregation point on
//! its path, and the tap writes one raw summary per point when the run ends.

use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use color_eyre::eyre::{Context, Result};

use super::ingest::render;
use super::naming::capture_file_name;
use super::record::{AddressCounters, CaptureRecord};
use crate::workload::{Event, EventSink, WorkloadKind, WorkloadUnit};

/// Frame protocol a workload kind is carried over
pub fn transport_for(kind: WorkloadKind) -> &'static str {
    match kind {
        WorkloadKind::Bulk | WorkloadKind::CrossTraffic => "TCP",
        WorkloadKind::Realtime | WorkloadKind::Periodic => "UDP",
    }
}

/// One flow as seen by the capture points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPath {
    pub source: IpAddr,
    pub destination: IpAddr,
    /// Aggregation points the flow crosses
    pub points: Vec<String>,
}

/// Shared frame counters for every capture point
#[derive(Debug, Clone, Default)]
pub struct CaptureTap {
    records: Arc<Mutex<BTreeMap<String, CaptureRecord>>>,
}

impl CaptureTap {
    /// Tap with an (initially empty) record for each point
    pub fn new<I, S>(points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = points
            .into_iter()
            .map(|p| {
                let p = p.into();
                (p.clone(), CaptureRecord::empty(p))
            })
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    /// Count one frame of `protocol` along `path`
    pub fn observe(&self, path: &FlowPath, protocol: &str) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for point in &path.points {
            let record = records
                .entry(point.clone())
                .or_insert_with(|| CaptureRecord::empty(point.clone()));
            record.total += 1;
            *record.protocols.entry(protocol.to_string()).or_insert(0) += 1;
            record
                .addresses
                .entry(path.source)
                .or_insert_with(AddressCounters::default)
                .sent += 1;
            record
                .addresses
                .entry(path.destination)
                .or_insert_with(AddressCounters::default)
                .received += 1;
        }
    }

    /// Current records, one per capture point
    pub fn snapshot(&self) -> Vec<CaptureRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.values().cloned().collect()
    }

    /// Write one raw summary per capture point into `dir`
    pub fn write_summaries(&self, dir: &Path, timestamp: NaiveDateTime) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create capture directory {}", dir.display()))?;
        let mut written = Vec::new();
        for record in self.snapshot() {
            let path = dir.join(capture_file_name(&record.source, timestamp));
            fs::write(&path, render(&record))
                .with_context(|| format!("Failed to write capture summary {}", path.display()))?;
            written.push(path);
        }
        log::info!("Wrote {} capture summaries to {}", written.len(), dir.display());
        Ok(written)
    }

    /// Event sink that counts a unit's events on this tap
    pub fn sink(&self, path: FlowPath, kind: WorkloadKind) -> TapSink {
        TapSink {
            tap: self.clone(),
            path,
            protocol: transport_for(kind),
        }
    }
}

/// Event sink feeding a [`CaptureTap`] and the unit's log target
#[derive(Debug)]
pub struct TapSink {
    tap: CaptureTap,
    path: FlowPath,
    protocol: &'static str,
}

impl EventSink for TapSink {
    fn emit(&mut self, unit: &WorkloadUnit, at: Duration, event: &Event) {
        self.tap.observe(&self.path, self.protocol);
        log::debug!(
            target: unit.log_target().as_str(),
            "[{:>9.3}s] {}",
            at.as_secs_f64(),
            event.kind
        );
    }
}
