//! Experiment orchestration.
//!
//! A run installs shaping (when enabled), pins routes (static mode), drives
//! the workload units for the configured window, then ingests the captures
//! and writes the run report. The pure pieces (shaping plan, aggregation,
//! report rendering) are computed here and handed to the effectful writers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use log::{info, warn};

use super::routing::{flow_path, static_routes, RoutingMode};
use crate::analysis::{
    aggregate, ClassLookup, Exclusion, RangeClassLookup, RunArtifacts, RunMetadata, RunReport,
    TopologyClassLookup,
};
use crate::capture::{ingest_directory, CaptureTap, FlowPath, IngestOutcome};
use crate::config::Config;
use crate::qos::{build_shaping_plan, install_tree, DryRunInstaller, ShapingPlan, TcRenderer};
use crate::service::ServiceTag;
use crate::workload::{
    scale_wait, CancelSignal, EventSink, LogSink, Supervisor, WorkloadKind, WorkloadUnit,
};

/// Window of the demo run
pub const DEMO_DURATION: Duration = Duration::from_secs(30);

/// Pause between consecutive runs of the full suite
pub const SETTLE_TIME: Duration = Duration::from_secs(10);

/// Parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub qos: bool,
    pub routing: RoutingMode,
    pub duration: Duration,
}

impl RunOptions {
    /// `qos_<routing>` or `no_qos_<routing>`
    pub fn run_id(&self) -> String {
        format!("{}_{}", if self.qos { "qos" } else { "no_qos" }, self.routing)
    }

    pub fn label(&self) -> String {
        format!("QoS={}, Routing={}", self.qos, self.routing)
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub artifacts: RunArtifacts,
    pub report: RunReport,
}

/// Per-combination result of the full suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteEntry {
    pub run_id: String,
    pub label: String,
    pub error: Option<String>,
}

/// Signals cancellation when dropped so no unit outlives its run
struct CleanupGuard {
    cancel: CancelSignal,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
        }
        log::debug!("Run cleanup complete");
    }
}

/// Drives experiment runs for one configuration
pub struct ExperimentRunner {
    config: Config,
}

impl ExperimentRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shaping plan for the configured assignments
    pub fn plan(&self) -> Result<ShapingPlan> {
        let plan = build_shaping_plan(
            &self.config.topology,
            &self.config.policies,
            &self.config.assignments(),
        )
        .wrap_err("Failed to build shaping plan")?;
        Ok(plan)
    }

    /// Shaping plan rendered as `tc` commands, one block per attachment point
    pub fn plan_commands(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let plan = self.plan()?;
        Ok(plan
            .trees
            .iter()
            .map(|(attachment, tree)| (attachment.clone(), TcRenderer::render(tree)))
            .collect())
    }

    /// Workload units in configuration order, with per-unit seeds
    pub fn workload_units(&self) -> Vec<WorkloadUnit> {
        let base_seed = self.config.general.seed.unwrap_or_else(rand::random);
        let workloads = &self.config.workloads;

        let per_class = workloads.units.iter().filter_map(|unit| {
            let kind = unit.resolved_kind()?;
            Some((unit.name.clone(), kind, Some(unit.service.clone()), &unit.source, &unit.destination))
        });
        let cross = workloads.cross_pairs.iter().map(|pair| {
            (
                pair.name.clone(),
                WorkloadKind::CrossTraffic,
                None::<ServiceTag>,
                &pair.source,
                &pair.destination,
            )
        });

        per_class
            .chain(cross)
            .enumerate()
            .map(|(index, (name, kind, service, source, destination))| WorkloadUnit {
                name,
                kind,
                service,
                source: source.clone(),
                destination: destination.clone(),
                seed: base_seed.wrapping_add(index as u64),
            })
            .collect()
    }

    /// Service class resolution: configured CIDR ranges, else the attachment point assignments
    pub fn class_lookup(&self) -> Box<dyn ClassLookup> {
        if self.config.service_ranges.is_empty() {
            Box::new(TopologyClassLookup::new(
                &self.config.topology,
                &self.config.assignments(),
            ))
        } else {
            Box::new(RangeClassLookup::new(
                self.config
                    .service_ranges
                    .iter()
                    .map(|(net, tag)| (*net, tag.clone())),
            ))
        }
    }

    /// Build the shaping trees and hand them to the dry-run installer
    fn install_shaping(
        &self,
        artifacts: &RunArtifacts,
        exclusions: &mut Vec<Exclusion>,
    ) -> Result<BTreeMap<String, Vec<ServiceTag>>> {
        let plan = self.plan()?;
        for (attachment, error) in &plan.failures {
            exclusions.push(Exclusion::shaping(attachment, error));
        }

        let script_dir = artifacts.subdir("shaping");
        fs::create_dir_all(&script_dir)
            .with_context(|| format!("Failed to create {}", script_dir.display()))?;

        let mut shaped = BTreeMap::new();
        for (attachment, tree) in &plan.trees {
            let mut installer = DryRunInstaller::new();
            match install_tree(tree, &mut installer) {
                Ok(_) => {
                    installer.write_script(&script_dir.join(format!("{}.sh", tree.interface())))?;
                    let classes = tree.leaves().iter().filter_map(|leaf| leaf.service.clone()).collect();
                    shaped.insert(attachment.clone(), classes);
                }
                Err(failure) => {
                    warn!("{}", failure);
                    exclusions.push(Exclusion::installation(&failure));
                }
            }
        }
        info!("QoS shaping installed on {} attachment points", shaped.len());
        Ok(shaped)
    }

    /// Run one experiment
    pub fn run_single(&self, options: RunOptions) -> Result<RunOutcome> {
        let run_id = options.run_id();
        let general = &self.config.general;
        let topology = &self.config.topology;
        general
            .wall_clock_window(options.duration)
            .with_context(|| format!("Invalid window for run {}", run_id))?;
        let artifacts = RunArtifacts::new(&general.results_dir, &run_id);

        info!("=== Running experiment {} ({}) ===", run_id, options.label());
        info!("Duration: {}s", options.duration.as_secs());

        let capture_dir = artifacts.subdir("captures");
        if capture_dir.exists() {
            fs::remove_dir_all(&capture_dir)
                .with_context(|| format!("Failed to clear {}", capture_dir.display()))?;
        }
        fs::create_dir_all(&artifacts.run_dir)
            .with_context(|| format!("Failed to create {}", artifacts.run_dir.display()))?;

        let supervisor = Supervisor::new(general.join_timeout, general.time_scale);
        let _cleanup = CleanupGuard {
            cancel: supervisor.cancel_signal(),
        };
        let mut exclusions = Vec::new();

        let shaping = if options.qos {
            self.install_shaping(&artifacts, &mut exclusions)?
        } else {
            info!("QoS shaping disabled");
            BTreeMap::new()
        };

        let units = self.workload_units();
        let routes = match options.routing {
            RoutingMode::Static => static_routes(
                topology,
                units.iter().map(|u| (u.source.as_str(), u.destination.as_str())),
            ),
            RoutingMode::None => Vec::new(),
        };

        let tap = CaptureTap::new(topology.aggregation_points().iter().map(|agg| agg.id.clone()));
        let paths: HashMap<String, FlowPath> = units
            .iter()
            .filter_map(|u| flow_path(topology, &u.source, &u.destination).map(|p| (u.name.clone(), p)))
            .collect();

        let outcome = supervisor.run(units, options.duration, |unit| -> Box<dyn EventSink> {
            match paths.get(&unit.name) {
                Some(path) => Box::new(tap.sink(path.clone(), unit.kind)),
                None => Box::new(LogSink::new(unit)),
            }
        });
        for abandonment in &outcome.abandoned {
            exclusions.push(Exclusion::workload(abandonment));
        }

        let timestamp = chrono::Local::now();
        let ingest = self.ingest(&tap, &capture_dir, timestamp.naive_local())?;
        for failure in &ingest.failures {
            exclusions.push(Exclusion::capture(failure));
        }

        let lookup = self.class_lookup();
        let aggregate = aggregate(&ingest.records, lookup.as_ref());

        let metadata = RunMetadata {
            run_id: run_id.clone(),
            qos_enabled: options.qos,
            routing: options.routing.to_string(),
            duration: options.duration,
            timestamp: timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            shaping,
            routes,
            workloads: outcome.completed,
        };
        let report = RunReport::new(metadata, aggregate, exclusions);
        artifacts.write(&report)?;

        info!("Experiment {} completed; results in {}", run_id, artifacts.run_dir.display());
        Ok(RunOutcome {
            run_id,
            artifacts,
            report,
        })
    }

    /// Ingest the externally captured summaries, or this run's own tap
    fn ingest(
        &self,
        tap: &CaptureTap,
        capture_dir: &Path,
        timestamp: chrono::NaiveDateTime,
    ) -> Result<IngestOutcome> {
        let dir = match &self.config.general.capture_dir {
            Some(external) => external.clone(),
            None => {
                tap.write_summaries(capture_dir, timestamp)?;
                capture_dir.to_path_buf()
            }
        };
        ingest_directory(&dir, &self.config.address_space)
            .with_context(|| format!("Failed to ingest captures from {}", dir.display()))
    }

    /// Ingest an existing capture directory and write its report under `run_id`.
    ///
    /// `options` only annotates the report; nothing is shaped or driven.
    pub fn analyze_captures(&self, captures: &Path, run_id: &str, options: RunOptions) -> Result<RunOutcome> {
        let artifacts = RunArtifacts::new(&self.config.general.results_dir, run_id);
        fs::create_dir_all(&artifacts.run_dir)
            .with_context(|| format!("Failed to create {}", artifacts.run_dir.display()))?;

        info!("Analyzing captures in {}", captures.display());
        let ingest = ingest_directory(captures, &self.config.address_space)
            .with_context(|| format!("Failed to ingest captures from {}", captures.display()))?;
        let exclusions = ingest.failures.iter().map(Exclusion::capture).collect();

        let lookup = self.class_lookup();
        let aggregate = aggregate(&ingest.records, lookup.as_ref());
        let metadata = RunMetadata {
            run_id: run_id.to_string(),
            qos_enabled: options.qos,
            routing: options.routing.to_string(),
            duration: options.duration,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            shaping: BTreeMap::new(),
            routes: Vec::new(),
            workloads: Vec::new(),
        };
        let report = RunReport::new(metadata, aggregate, exclusions);
        artifacts.write(&report)?;

        Ok(RunOutcome {
            run_id: run_id.to_string(),
            artifacts,
            report,
        })
    }

    /// Run the four (QoS, routing) combinations and write the suite summary
    pub fn run_all(&self, duration: Duration) -> Result<Vec<SuiteEntry>> {
        self.config
            .general
            .wall_clock_window(duration)
            .context("Invalid suite run window")?;
        let combinations = [
            (false, RoutingMode::None),
            (true, RoutingMode::None),
            (false, RoutingMode::Static),
            (true, RoutingMode::Static),
        ];
        info!("=== Running complete experiment suite: {} runs ===", combinations.len());

        let settle = CancelSignal::new();
        let mut entries = Vec::new();
        for (index, (qos, routing)) in combinations.into_iter().enumerate() {
            let options = RunOptions {
                qos,
                routing,
                duration,
            };
            info!(">>> Experiment {}/{}", index + 1, combinations.len());

            let error = match self.run_single(options) {
                Ok(_) => None,
                Err(e) => {
                    warn!("Experiment {} failed: {:?}", options.run_id(), e);
                    Some(format!("{:#}", e))
                }
            };
            entries.push(SuiteEntry {
                run_id: options.run_id(),
                label: options.label(),
                error,
            });

            if index + 1 < combinations.len() {
                settle.wait_timeout(scale_wait(SETTLE_TIME, self.config.general.time_scale));
            }
        }

        let path = super::summary::write_suite_summary(
            &self.config.general.results_dir,
            &entries,
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        )?;
        info!("Summary report saved to {}", path.display());
        Ok(entries)
    }

    /// Short run with QoS and static routing
    pub fn run_demo(&self) -> Result<RunOutcome> {
        self.run_single(RunOptions {
            qos: true,
            routing: RoutingMode::Static,
            duration: DEMO_DURATION,
        })
    }
}
