//! Experiment configuration.
//!
//! One YAML document describes the network, the service policy, the workload
//! units and where a run's artifacts go. Topology and policy sections are
//! validated as they are parsed; [`Config::validate`] checks the references
//! between sections.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};

use crate::qos::{assignments_from_topology, reference_policies, Assignment, PolicySet};
use crate::service::ServiceTag;
use crate::topology::{reference_topology, Topology, TopologyError};
use crate::workload::WorkloadKind;

/// Top-level configuration structure that mirrors the YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub topology: Topology,
    pub policies: PolicySet,
    /// Attachment point -> service tag assignments; derived from the
    /// topology's declared services when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<Assignment>>,
    #[serde(default)]
    pub workloads: WorkloadsConfig,
    /// Address space of the emulated network; capture addresses outside it
    /// are ignored
    #[serde(default = "default_address_space")]
    pub address_space: IpNet,
    /// CIDR -> service tag ranges; when present they replace the topology
    /// lookup for service class totals
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_ranges: BTreeMap<IpNet, ServiceTag>,
}

/// General run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Workload window of a run (e.g., "60s", "5m")
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// How long to wait for each workload unit after cancellation
    #[serde(with = "humantime_serde")]
    pub join_timeout: Duration,
    /// Root directory for run artifacts
    pub results_dir: PathBuf,
    /// Directory of externally captured summaries; when unset, each run
    /// writes and ingests its own captures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_dir: Option<PathBuf>,
    /// Base random seed (random when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Wall-clock time per unit of workload time
    pub time_scale: f64,
}

/// Longest accepted run, both in workload time and once scaled to wall-clock time
pub const MAX_RUN_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

impl GeneralConfig {
    /// Wall-clock length of a `duration` run under this time scale
    pub fn wall_clock_window(&self, duration: Duration) -> Result<Duration, ValidationError> {
        if duration.is_zero() {
            return Err(ValidationError::InvalidGeneral("duration must be positive".to_string()));
        }
        if duration > MAX_RUN_DURATION {
            return Err(ValidationError::InvalidGeneral(format!(
                "duration of {}s exceeds the {}s limit",
                duration.as_secs(),
                MAX_RUN_DURATION.as_secs()
            )));
        }
        Duration::try_from_secs_f64(duration.as_secs_f64() * self.time_scale)
            .ok()
            .filter(|window| *window <= MAX_RUN_DURATION)
            .ok_or_else(|| {
                ValidationError::InvalidGeneral(format!(
                    "duration of {}s at time scale {} exceeds the {}s wall-clock limit",
                    duration.as_secs(),
                    self.time_scale,
                    MAX_RUN_DURATION.as_secs()
                ))
            })
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            join_timeout: Duration::from_secs(5),
            results_dir: PathBuf::from("results"),
            capture_dir: None,
            seed: None,
            time_scale: 1.0,
        }
    }
}

fn default_address_space() -> IpNet {
    let net = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 16).expect("Invalid default prefix length");
    IpNet::V4(net)
}

/// Workload units to run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadsConfig {
    #[serde(default)]
    pub units: Vec<UnitConfig>,
    /// Constant-rate transfers between two service classes
    #[serde(default)]
    pub cross_pairs: Vec<CrossPairConfig>,
}

/// One per-class workload unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub service: ServiceTag,
    /// Load process; defaults from the well-known service tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<WorkloadKind>,
    pub source: String,
    pub destination: String,
}

impl UnitConfig {
    pub fn resolved_kind(&self) -> Option<WorkloadKind> {
        self.kind.or(match self.service.as_str() {
            ServiceTag::BULK => Some(WorkloadKind::Bulk),
            ServiceTag::REALTIME => Some(WorkloadKind::Realtime),
            ServiceTag::PERIODIC => Some(WorkloadKind::Periodic),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossPairConfig {
    pub name: String,
    pub source: String,
    pub destination: String,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),
    #[error("Invalid workload configuration: {0}")]
    InvalidWorkload(String),
    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl Config {
    /// Three-class reference experiment: web, video and IoT hosts on three
    /// switches, with web-to-video and video-to-IoT cross traffic
    pub fn reference() -> Result<Self, ValidationError> {
        let unit = |name: &str, service: ServiceTag, source: &str, destination: &str| UnitConfig {
            name: name.to_string(),
            service,
            kind: None,
            source: source.to_string(),
            destination: destination.to_string(),
        };
        let pair = |name: &str, source: &str, destination: &str| CrossPairConfig {
            name: name.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
        };

        Ok(Self {
            general: GeneralConfig::default(),
            topology: reference_topology()?,
            policies: reference_policies(),
            assignments: None,
            workloads: WorkloadsConfig {
                units: vec![
                    unit("web", ServiceTag::bulk(), "h1", "h2"),
                    unit("video", ServiceTag::realtime(), "h3", "h4"),
                    unit("iot", ServiceTag::periodic(), "h5", "h6"),
                ],
                cross_pairs: vec![
                    pair("web-to-video", "h1", "h3"),
                    pair("video-to-iot", "h4", "h5"),
                ],
            },
            address_space: default_address_space(),
            service_ranges: BTreeMap::new(),
        })
    }

    /// Explicit assignments, or the topology's declared services
    pub fn assignments(&self) -> Vec<Assignment> {
        self.assignments
            .clone()
            .unwrap_or_else(|| assignments_from_topology(&self.topology))
    }

    /// Validate references between sections
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_general()?;
        self.validate_network()?;

        for assignment in self.assignments() {
            if self.topology.attachment_point(&assignment.attachment).is_none() {
                return Err(ValidationError::InvalidAssignment(format!(
                    "'{}' is not an attachment point",
                    assignment.attachment
                )));
            }
            if !self.policies.contains(&assignment.service) {
                return Err(ValidationError::InvalidAssignment(format!(
                    "service '{}' on '{}' has no policy profile",
                    assignment.service, assignment.attachment
                )));
            }
        }

        self.validate_workloads()
    }

    fn validate_general(&self) -> Result<(), ValidationError> {
        let general = &self.general;
        if general.join_timeout.is_zero() {
            return Err(ValidationError::InvalidGeneral(
                "join_timeout must be positive".to_string(),
            ));
        }
        if !general.time_scale.is_finite() || general.time_scale <= 0.0 {
            return Err(ValidationError::InvalidGeneral(format!(
                "time_scale must be a positive number, got {}",
                general.time_scale
            )));
        }
        general.wall_clock_window(general.duration)?;
        Ok(())
    }

    fn validate_network(&self) -> Result<(), ValidationError> {
        for ap in self.topology.attachment_points() {
            if !self.address_space.contains(&ap.address) {
                return Err(ValidationError::InvalidNetwork(format!(
                    "address {} of '{}' is outside the address space {}",
                    ap.address, ap.id, self.address_space
                )));
            }
        }
        Ok(())
    }

    fn validate_workloads(&self) -> Result<(), ValidationError> {
        let mut names = BTreeSet::new();
        let endpoints = self
            .workloads
            .units
            .iter()
            .map(|u| (&u.name, &u.source, &u.destination))
            .chain(
                self.workloads
                    .cross_pairs
                    .iter()
                    .map(|p| (&p.name, &p.source, &p.destination)),
            );

        for (name, source, destination) in endpoints {
            if !names.insert(name.as_str()) {
                return Err(ValidationError::InvalidWorkload(format!(
                    "unit name '{}' is used more than once",
                    name
                )));
            }
            for endpoint in [source, destination] {
                if self.topology.attachment_point(endpoint).is_none() {
                    return Err(ValidationError::InvalidWorkload(format!(
                        "unit '{}' references unknown attachment point '{}'",
                        name, endpoint
                    )));
                }
            }
            if source == destination {
                return Err(ValidationError::InvalidWorkload(format!(
                    "unit '{}' sends to itself",
                    name
                )));
            }
        }

        for unit in &self.workloads.units {
            if !self.policies.contains(&unit.service) {
                return Err(ValidationError::InvalidWorkload(format!(
                    "unit '{}' uses service '{}' with no policy profile",
                    unit.name, unit.service
                )));
            }
            if unit.resolved_kind().is_none() {
                return Err(ValidationError::InvalidWorkload(format!(
                    "unit '{}' needs an explicit kind for service '{}'",
                    unit.name, unit.service
                )));
            }
        }
        Ok(())
    }
}
