//! Topology type definitions.
//!
//! Attachment points (hosts), aggregation points (switches) and the links
//! between them, as declared in the experiment configuration.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service::ServiceTag;
use crate::utils::rate::Rate;

/// A network-edge device originating or terminating traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPoint {
    pub id: String,
    pub address: IpAddr,
    /// Service class the device belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceTag>,
}

impl AttachmentPoint {
    pub fn new(id: impl Into<String>, address: IpAddr, service: Option<ServiceTag>) -> Self {
        Self {
            id: id.into(),
            address,
            service,
        }
    }

    /// Name of the outbound interface shaping rules are installed on
    pub fn interface(&self) -> String {
        format!("{}-eth0", self.id)
    }
}

/// An intermediate forwarding device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPoint {
    pub id: String,
}

/// A link between two topology nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub a: String,
    pub b: String,
    /// Capacity in bits per second
    #[serde(with = "crate::utils::rate::serde_rate")]
    pub capacity: Rate,
    /// One-way latency
    #[serde(with = "humantime_serde", default)]
    pub latency: Duration,
    /// Independent loss probability in [0, 1]
    #[serde(default)]
    pub loss: f64,
}

impl Link {
    pub fn new(
        a: impl Into<String>,
        b: impl Into<String>,
        capacity: Rate,
        latency: Duration,
        loss: f64,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            capacity,
            latency,
            loss,
        }
    }

    /// True if `node` is one of the link's endpoints
    pub fn touches(&self, node: &str) -> bool {
        self.a == node || self.b == node
    }

    /// The endpoint opposite to `node`
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.a == node {
            Some(&self.b)
        } else if self.b == node {
            Some(&self.a)
        } else {
            None
        }
    }

    /// Endpoint pair in canonical (sorted) order
    pub fn unordered_pair(&self) -> (&str, &str) {
        if self.a <= self.b {
            (&self.a, &self.b)
        } else {
            (&self.b, &self.a)
        }
    }
}

/// Topology validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("Duplicate node identifier '{0}'")]
    DuplicateNode(String),
    #[error("Duplicate address {address} (used by '{first}' and '{second}')")]
    DuplicateAddress {
        address: IpAddr,
        first: String,
        second: String,
    },
    #[error("Link {a} <-> {b} references unknown node '{endpoint}'")]
    UnknownEndpoint { a: String, b: String, endpoint: String },
    #[error("Link {a} <-> {b} connects a node to itself")]
    SelfLoop { a: String, b: String },
    #[error("Link {a} <-> {b} must have a capacity greater than zero")]
    ZeroCapacity { a: String, b: String },
    #[error("Link {a} <-> {b} has loss probability {loss} outside [0, 1]")]
    InvalidLoss { a: String, b: String, loss: f64 },
    #[error("Parallel link between '{a}' and '{b}'")]
    ParallelLink { a: String, b: String },
    #[error("Attachment point '{0}' has no uplink")]
    MissingUplink(String),
    #[error("Attachment point '{id}' has {count} links, expected exactly one uplink")]
    MultipleUplinks { id: String, count: usize },
}
