//! Run report generation.
//!
//! Rendering is pure formatting of an [`AggregateReport`] plus run metadata:
//! identical inputs give byte-identical text and JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::aggregate::AggregateReport;
use super::percent::Percentage;
use crate::capture::CaptureFailure;
use crate::qos::{InstallationFailure, ShapingError};
use crate::service::ServiceTag;
use crate::workload::{Abandonment, UnitReport};

/// What kind of input was left out of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionKind {
    Capture,
    AttachmentPoint,
    WorkloadUnit,
}

impl ExclusionKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::AttachmentPoint => "attachment point",
            Self::WorkloadUnit => "workload unit",
        }
    }
}

/// An input excluded from the run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub kind: ExclusionKind,
    pub subject: String,
    pub reason: String,
}

impl Exclusion {
    pub fn capture(failure: &CaptureFailure) -> Self {
        Self {
            kind: ExclusionKind::Capture,
            subject: failure.file.clone(),
            reason: failure.error.to_string(),
        }
    }

    pub fn shaping(attachment: &str, error: &ShapingError) -> Self {
        Self {
            kind: ExclusionKind::AttachmentPoint,
            subject: attachment.to_string(),
            reason: error.to_string(),
        }
    }

    pub fn installation(failure: &InstallationFailure) -> Self {
        Self {
            kind: ExclusionKind::AttachmentPoint,
            subject: failure.attachment.clone(),
            reason: failure.to_string(),
        }
    }

    pub fn workload(abandonment: &Abandonment) -> Self {
        Self {
            kind: ExclusionKind::WorkloadUnit,
            subject: abandonment.name.clone(),
            reason: abandonment.reason.clone(),
        }
    }
}

/// Path taken between two attachment points under static routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub source: String,
    pub destination: String,
    pub path: Vec<String>,
}

/// Run parameters recorded alongside the aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub qos_enabled: bool,
    pub routing: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub timestamp: String,
    /// Shaped attachment points and the classes on each
    pub shaping: BTreeMap<String, Vec<ServiceTag>>,
    pub routes: Vec<RouteEntry>,
    pub workloads: Vec<UnitReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub aggregate: AggregateReport,
    pub exclusions: Vec<Exclusion>,
}

impl RunReport {
    /// Exclusions are kept sorted so rendering does not depend on arrival order
    pub fn new(metadata: RunMetadata, aggregate: AggregateReport, mut exclusions: Vec<Exclusion>) -> Self {
        exclusions.sort_by(|a, b| (a.kind, &a.subject).cmp(&(b.kind, &b.subject)));
        Self {
            metadata,
            aggregate,
            exclusions,
        }
    }
}

const UNCLASSIFIED_NOTE: &str = "  Note: class totals cover only addresses with a known service class.\n        Unclassified traffic is still counted in the global totals.";

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push("-".repeat(80));
    lines.push(title.to_string());
    lines.push("-".repeat(80));
}

/// Render the human-readable report
pub fn render_text(report: &RunReport) -> String {
    let meta = &report.metadata;
    let agg = &report.aggregate;
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(80));
    lines.push("                      MULTI-SERVICE QOS TRAFFIC ANALYSIS".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    lines.push(format!("Run: {}", meta.run_id));
    lines.push(format!(
        "QoS Shaping: {}",
        if meta.qos_enabled { "enabled" } else { "disabled" }
    ));
    lines.push(format!("Routing: {}", meta.routing));
    lines.push(format!("Duration: {}s", meta.duration.as_secs()));
    lines.push(format!("Timestamp: {}", meta.timestamp));
    lines.push(format!("Captures Analyzed: {}", agg.capture_count));
    lines.push(format!("Total Frames: {}", agg.total_frames));
    lines.push(String::new());

    section(&mut lines, "PROTOCOL DISTRIBUTION");
    if agg.protocol_totals.is_empty() {
        lines.push("  (no frames captured)".to_string());
    }
    for (protocol, count) in &agg.protocol_totals {
        lines.push(format!(
            "  {:<10}{:>10}  {}",
            protocol,
            count,
            Percentage::of(*count, agg.total_frames)
        ));
    }
    lines.push(String::new());

    section(&mut lines, "TRAFFIC BY CAPTURE POINT");
    if agg.per_point_totals.is_empty() {
        lines.push("  (no captures)".to_string());
    }
    for (point, count) in &agg.per_point_totals {
        lines.push(format!(
            "  {:<10}{:>10}  {}",
            point,
            count,
            Percentage::of(*count, agg.total_frames)
        ));
        if let Some(protocols) = agg.per_point_protocols.get(point).filter(|p| !p.is_empty()) {
            let breakdown: Vec<String> = protocols.iter().map(|(p, c)| format!("{} {}", p, c)).collect();
            lines.push(format!("      {}", breakdown.join(", ")));
        }
    }
    lines.push(String::new());

    section(&mut lines, "HOST TRAFFIC");
    if agg.address_totals.is_empty() {
        lines.push("  (no addresses observed)".to_string());
    }
    for (address, counters) in &agg.address_totals {
        lines.push(format!(
            "  {:<16}sent {:>8}  received {:>8}",
            address.to_string(),
            counters.sent,
            counters.received
        ));
    }
    lines.push(String::new());

    section(&mut lines, "SERVICE CLASS TRAFFIC");
    let volume = agg.address_volume();
    for (tag, counters) in &agg.class_totals {
        lines.push(format!(
            "  {:<10}sent {:>8}  received {:>8}  {}",
            tag.as_str(),
            counters.sent,
            counters.received,
            Percentage::of(counters.volume(), volume)
        ));
    }
    lines.push(format!(
        "  unclassified  {} frames from {} addresses  {}",
        agg.unclassified_volume,
        agg.unclassified_addresses.len(),
        Percentage::of(agg.unclassified_volume, volume)
    ));
    lines.push(UNCLASSIFIED_NOTE.to_string());
    lines.push(String::new());

    if !meta.shaping.is_empty() {
        section(&mut lines, "SHAPING");
        for (attachment, classes) in &meta.shaping {
            let classes: Vec<&str> = classes.iter().map(|c| c.as_str()).collect();
            lines.push(format!("  {}: {}", attachment, classes.join(", ")));
        }
        lines.push(String::new());
    }

    if !meta.routes.is_empty() {
        section(&mut lines, "ROUTES");
        for route in &meta.routes {
            lines.push(format!(
                "  {} -> {}: {}",
                route.source,
                route.destination,
                route.path.join(" ")
            ));
        }
        lines.push(String::new());
    }

    if !meta.workloads.is_empty() {
        section(&mut lines, "WORKLOADS");
        for unit in &meta.workloads {
            let mut line = format!(
                "  {} ({} {} -> {}): {} events in {:.1}s",
                unit.name,
                unit.kind,
                unit.source,
                unit.destination,
                unit.events,
                unit.elapsed.as_secs_f64()
            );
            if let Some(interval) = unit.average_interval {
                line.push_str(&format!(", average interval {:.2}s", interval.as_secs_f64()));
            }
            if let Some(ref quality) = unit.final_quality {
                line.push_str(&format!(", final quality {}", quality));
            }
            if unit.stopped_early {
                line.push_str(", stopped early");
            }
            lines.push(line);
        }
        lines.push(String::new());
    }

    section(&mut lines, "EXCLUSIONS");
    if report.exclusions.is_empty() {
        lines.push("  none".to_string());
    }
    for exclusion in &report.exclusions {
        lines.push(format!(
            "  [{}] {}: {}",
            exclusion.kind.label(),
            exclusion.subject,
            exclusion.reason
        ));
    }

    lines.push("=".repeat(80));
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Render the structured report
pub fn render_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
}

/// Generate JSON report
pub fn generate_json_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json = render_json(report)?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate human-readable text report
pub fn generate_text_report(report: &RunReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &RunReport) {
    let agg = &report.aggregate;
    println!("\n=== TRAFFIC ANALYSIS SUMMARY: {} ===\n", report.metadata.run_id);
    println!("Captures: {}", agg.capture_count);
    println!("Total frames: {}", agg.total_frames);

    if !agg.protocol_totals.is_empty() {
        println!("\nProtocols:");
        for (protocol, count) in &agg.protocol_totals {
            println!("  {}: {} ({})", protocol, count, Percentage::of(*count, agg.total_frames));
        }
    }

    if !agg.per_point_totals.is_empty() {
        println!("\nCapture points:");
        for (point, count) in &agg.per_point_totals {
            println!("  {}: {} frames", point, count);
        }
    }

    if !agg.class_totals.is_empty() {
        println!("\nService classes:");
        for (tag, counters) in &agg.class_totals {
            println!("  {}: {} frames", tag, counters.volume());
        }
    }

    if !report.exclusions.is_empty() {
        println!("\nExclusions: {}", report.exclusions.len());
    }

    println!();
}
