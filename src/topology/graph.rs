//! The validated, immutable topology graph.
//!
//! Every other component consults this graph to check that the identifiers
//! it is handed (attachment points, workload endpoints) actually exist.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::types::{AggregationPoint, AttachmentPoint, Link, TopologyError};

/// Declarative form of a topology, as written in configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySpec {
    pub attachment_points: Vec<AttachmentPoint>,
    #[serde(default)]
    pub aggregation_points: Vec<AggregationPoint>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Validated network topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TopologySpec", into = "TopologySpec")]
pub struct Topology {
    attachment_points: Vec<AttachmentPoint>,
    aggregation_points: Vec<AggregationPoint>,
    links: Vec<Link>,
}

impl TryFrom<TopologySpec> for Topology {
    type Error = TopologyError;

    fn try_from(spec: TopologySpec) -> Result<Self, Self::Error> {
        Topology::new(spec.attachment_points, spec.aggregation_points, spec.links)
    }
}

impl From<Topology> for TopologySpec {
    fn from(topology: Topology) -> Self {
        TopologySpec {
            attachment_points: topology.attachment_points,
            aggregation_points: topology.aggregation_points,
            links: topology.links,
        }
    }
}

impl Topology {
    /// Build a topology, rejecting any schema violation
    pub fn new(
        attachment_points: Vec<AttachmentPoint>,
        aggregation_points: Vec<AggregationPoint>,
        links: Vec<Link>,
    ) -> Result<Self, TopologyError> {
        let topology = Self {
            attachment_points,
            aggregation_points,
            links,
        };
        topology.validate()?;
        Ok(topology)
    }

    fn validate(&self) -> Result<(), TopologyError> {
        let mut ids = HashSet::new();
        let node_ids = self
            .attachment_points
            .iter()
            .map(|ap| &ap.id)
            .chain(self.aggregation_points.iter().map(|agg| &agg.id));
        for id in node_ids {
            if !ids.insert(id.as_str()) {
                return Err(TopologyError::DuplicateNode(id.clone()));
            }
        }

        let mut addresses: HashMap<IpAddr, &str> = HashMap::new();
        for ap in &self.attachment_points {
            if let Some(first) = addresses.insert(ap.address, &ap.id) {
                return Err(TopologyError::DuplicateAddress {
                    address: ap.address,
                    first: first.to_string(),
                    second: ap.id.clone(),
                });
            }
        }

        let mut pairs = HashSet::new();
        for link in &self.links {
            for endpoint in [&link.a, &link.b] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(TopologyError::UnknownEndpoint {
                        a: link.a.clone(),
                        b: link.b.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
            if link.a == link.b {
                return Err(TopologyError::SelfLoop {
                    a: link.a.clone(),
                    b: link.b.clone(),
                });
            }
            if link.capacity == 0 {
                return Err(TopologyError::ZeroCapacity {
                    a: link.a.clone(),
                    b: link.b.clone(),
                });
            }
            if !(0.0..=1.0).contains(&link.loss) {
                return Err(TopologyError::InvalidLoss {
                    a: link.a.clone(),
                    b: link.b.clone(),
                    loss: link.loss,
                });
            }
            if !pairs.insert(link.unordered_pair()) {
                let (a, b) = link.unordered_pair();
                return Err(TopologyError::ParallelLink {
                    a: a.to_string(),
                    b: b.to_string(),
                });
            }
        }

        for ap in &self.attachment_points {
            match self.links.iter().filter(|l| l.touches(&ap.id)).count() {
                0 => return Err(TopologyError::MissingUplink(ap.id.clone())),
                1 => {}
                count => {
                    return Err(TopologyError::MultipleUplinks {
                        id: ap.id.clone(),
                        count,
                    })
                }
            }
        }

        Ok(())
    }

    pub fn attachment_points(&self) -> &[AttachmentPoint] {
        &self.attachment_points
    }

    pub fn aggregation_points(&self) -> &[AggregationPoint] {
        &self.aggregation_points
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn attachment_point(&self, id: &str) -> Option<&AttachmentPoint> {
        self.attachment_points.iter().find(|ap| ap.id == id)
    }

    pub fn attachment_point_by_address(&self, address: &IpAddr) -> Option<&AttachmentPoint> {
        self.attachment_points.iter().find(|ap| &ap.address == address)
    }

    /// True if `id` names an attachment point or an aggregation point
    pub fn contains(&self, id: &str) -> bool {
        self.attachment_point(id).is_some() || self.aggregation_points.iter().any(|agg| agg.id == id)
    }

    /// The single outbound link of an attachment point
    pub fn uplink(&self, attachment: &str) -> Option<&Link> {
        self.attachment_point(attachment)?;
        self.links.iter().find(|l| l.touches(attachment))
    }

    /// Neighbours of a node, in sorted order
    pub fn neighbors(&self, node: &str) -> Vec<&str> {
        let neighbors: BTreeSet<&str> = self
            .links
            .iter()
            .filter_map(|l| l.other_end(node))
            .collect();
        neighbors.into_iter().collect()
    }

    /// Shortest hop path between two nodes, both endpoints included.
    ///
    /// Ties are broken by identifier order so the result is deterministic.
    pub fn static_route(&self, src: &str, dst: &str) -> Option<Vec<String>> {
        if !self.contains(src) || !self.contains(dst) {
            return None;
        }

        let mut previous: BTreeMap<&str, &str> = BTreeMap::new();
        let mut visited: HashSet<&str> = HashSet::from([src]);
        let mut queue = VecDeque::from([src]);

        while let Some(node) = queue.pop_front() {
            if node == dst {
                let mut path = vec![dst.to_string()];
                let mut current = dst;
                while let Some(prev) = previous.get(current) {
                    path.push(prev.to_string());
                    current = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.neighbors(node) {
                // Traffic never transits through an edge device.
                if next != dst && self.attachment_point(next).is_some() {
                    continue;
                }
                if visited.insert(next) {
                    previous.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        None
    }
}
