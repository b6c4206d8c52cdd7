//! Network topology module.
//!
//! This module contains the topology descriptor: attachment points,
//! aggregation points and links, validated into an immutable graph.

pub mod graph;
pub mod reference;
pub mod types;

// Re-export key types and functions for easier access
pub use graph::{Topology, TopologySpec};
pub use reference::reference_topology;
pub use types::{AggregationPoint, AttachmentPoint, Link, TopologyError};
