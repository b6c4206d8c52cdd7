//! Run artifact layout and chart data.
//!
//! All artifacts of a run live in `<results_dir>/<run_id>/` under fixed
//! names, so their paths are known before the run starts.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::aggregate::AggregateReport;
use super::report::{generate_json_report, generate_text_report, RunReport};

/// One named data series of a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<u64>,
}

/// Data behind one chart image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartData {
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

impl ChartData {
    pub fn protocol_distribution(aggregate: &AggregateReport) -> Self {
        Self {
            title: "Protocol Distribution".to_string(),
            labels: aggregate.protocol_totals.keys().cloned().collect(),
            series: vec![ChartSeries {
                name: "frames".to_string(),
                values: aggregate.protocol_totals.values().copied().collect(),
            }],
        }
    }

    pub fn traffic_by_point(aggregate: &AggregateReport) -> Self {
        Self {
            title: "Traffic by Capture Point".to_string(),
            labels: aggregate.per_point_totals.keys().cloned().collect(),
            series: vec![ChartSeries {
                name: "frames".to_string(),
                values: aggregate.per_point_totals.values().copied().collect(),
            }],
        }
    }

    pub fn host_traffic(aggregate: &AggregateReport) -> Self {
        Self {
            title: "Host Traffic".to_string(),
            labels: aggregate.address_totals.keys().map(|a| a.to_string()).collect(),
            series: vec![
                ChartSeries {
                    name: "sent".to_string(),
                    values: aggregate.address_totals.values().map(|c| c.sent).collect(),
                },
                ChartSeries {
                    name: "received".to_string(),
                    values: aggregate.address_totals.values().map(|c| c.received).collect(),
                },
            ],
        }
    }
}

/// Deterministic artifact paths for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub run_dir: PathBuf,
    pub text_report: PathBuf,
    pub json_report: PathBuf,
    pub protocol_chart: PathBuf,
    pub point_chart: PathBuf,
    pub host_chart: PathBuf,
}

impl RunArtifacts {
    pub fn new(results_dir: &Path, run_id: &str) -> Self {
        let run_dir = results_dir.join(run_id);
        Self {
            text_report: run_dir.join("analysis_report.txt"),
            json_report: run_dir.join("analysis_report.json"),
            protocol_chart: run_dir.join("protocol_distribution.json"),
            point_chart: run_dir.join("traffic_by_point.json"),
            host_chart: run_dir.join("host_traffic.json"),
            run_dir,
        }
    }

    /// Directory for scripts and captures produced during the run
    pub fn subdir(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }

    /// Write the reports and chart data
    pub fn write(&self, report: &RunReport) -> Result<()> {
        fs::create_dir_all(&self.run_dir)
            .with_context(|| format!("Failed to create run directory {}", self.run_dir.display()))?;

        generate_text_report(report, &self.text_report)?;
        generate_json_report(report, &self.json_report)?;

        let charts = [
            (&self.protocol_chart, ChartData::protocol_distribution(&report.aggregate)),
            (&self.point_chart, ChartData::traffic_by_point(&report.aggregate)),
            (&self.host_chart, ChartData::host_traffic(&report.aggregate)),
        ];
        for (path, chart) in charts {
            let json = serde_json::to_string_pretty(&chart).context("Failed to serialize chart data")?;
            fs::write(path, json)
                .with_context(|| format!("Failed to write chart data to {}", path.display()))?;
        }
        log::debug!("Chart data written to {}", self.run_dir.display());
        Ok(())
    }
}
