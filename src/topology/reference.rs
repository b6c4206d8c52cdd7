//! The three-class reference network.
//!
//! Two web servers, two video servers and two IoT devices, each pair hanging
//! off its own switch, with a fast s1-s2 core and slower, lossy s2-s3 and
//! s1-s3 links.

use std::net::IpAddr;
use std::time::Duration;

use super::graph::Topology;
use super::types::{AggregationPoint, AttachmentPoint, Link, TopologyError};
use crate::service::ServiceTag;

const MBIT: u64 = 1_000_000;

/// Build the reference multi-service topology
pub fn reference_topology() -> Result<Topology, TopologyError> {
    let host = |id: &str, octet: u8, service: ServiceTag| {
        AttachmentPoint::new(id, IpAddr::from([10, 0, 0, octet]), Some(service))
    };
    let ms = Duration::from_millis;

    let attachment_points = vec![
        host("h1", 1, ServiceTag::bulk()),
        host("h2", 2, ServiceTag::bulk()),
        host("h3", 3, ServiceTag::realtime()),
        host("h4", 4, ServiceTag::realtime()),
        host("h5", 5, ServiceTag::periodic()),
        host("h6", 6, ServiceTag::periodic()),
    ];

    let aggregation_points = ["s1", "s2", "s3"]
        .into_iter()
        .map(|id| AggregationPoint { id: id.to_string() })
        .collect();

    // Loss figures are probabilities: 0.1% and 0.5%.
    let links = vec![
        Link::new("h1", "s1", 100 * MBIT, ms(1), 0.0),
        Link::new("h2", "s1", 100 * MBIT, ms(1), 0.0),
        Link::new("h3", "s2", 1000 * MBIT, ms(2), 0.0),
        Link::new("h4", "s2", 1000 * MBIT, ms(2), 0.0),
        Link::new("h5", "s3", 100 * MBIT, ms(5), 0.0),
        Link::new("h6", "s3", 100 * MBIT, ms(5), 0.0),
        Link::new("s1", "s2", 1000 * MBIT, ms(1), 0.0),
        Link::new("s2", "s3", 100 * MBIT, ms(10), 0.001),
        Link::new("s1", "s3", 10 * MBIT, ms(20), 0.005),
    ];

    Topology::new(attachment_points, aggregation_points, links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_topology_is_valid() {
        let topology = reference_topology().unwrap();
        assert_eq!(topology.attachment_points().len(), 6);
        assert_eq!(topology.aggregation_points().len(), 3);
        assert_eq!(topology.uplink("h3").unwrap().capacity, 1000 * MBIT);
        assert_eq!(
            topology.static_route("h1", "h5").unwrap(),
            vec!["h1", "s1", "s3", "h5"]
        );
    }
}
