//! Address to service class lookups.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use ipnet::IpNet;

use super::aggregate::ClassLookup;
use crate::qos::Assignment;
use crate::service::ServiceTag;
use crate::topology::Topology;

/// Resolves an address through the attachment point that owns it and the
/// service assigned to that point.
///
/// Built from the same assignments the shaping plan uses. Points carrying
/// more than one distinct tag have no single class and stay unresolved.
#[derive(Debug, Clone, Default)]
pub struct TopologyClassLookup {
    classes: BTreeMap<IpAddr, ServiceTag>,
}

impl TopologyClassLookup {
    pub fn new(topology: &Topology, assignments: &[Assignment]) -> Self {
        let mut assigned: BTreeMap<&str, BTreeSet<&ServiceTag>> = BTreeMap::new();
        for assignment in assignments {
            assigned
                .entry(assignment.attachment.as_str())
                .or_default()
                .insert(&assignment.service);
        }

        let mut classes = BTreeMap::new();
        for (attachment, tags) in assigned {
            let Some(ap) = topology.attachment_point(attachment) else {
                continue;
            };
            match tags.into_iter().collect::<Vec<_>>().as_slice() {
                [tag] => {
                    classes.insert(ap.address, (*tag).clone());
                }
                tags => log::debug!(
                    "'{}' carries {} service tags; its traffic stays unclassified",
                    attachment,
                    tags.len()
                ),
            }
        }
        Self { classes }
    }
}

impl ClassLookup for TopologyClassLookup {
    fn class_of(&self, address: &IpAddr) -> Option<ServiceTag> {
        self.classes.get(address).cloned()
    }
}

/// Resolves an address by the most specific CIDR range containing it
#[derive(Debug, Clone, Default)]
pub struct RangeClassLookup {
    ranges: Vec<(IpNet, ServiceTag)>,
}

impl RangeClassLookup {
    pub fn new(ranges: impl IntoIterator<Item = (IpNet, ServiceTag)>) -> Self {
        let mut ranges: Vec<(IpNet, ServiceTag)> = ranges.into_iter().collect();
        // Longest prefix first
        ranges.sort_by(|(a, _), (b, _)| b.prefix_len().cmp(&a.prefix_len()).then(a.cmp(b)));
        Self { ranges }
    }
}

impl ClassLookup for RangeClassLookup {
    fn class_of(&self, address: &IpAddr) -> Option<ServiceTag> {
        self.ranges
            .iter()
            .find(|(net, _)| net.contains(address))
            .map(|(_, tag)| tag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::assignments_from_topology;
    use crate::topology::{reference_topology, Topology, TopologySpec};

    #[test]
    fn test_topology_lookup_uses_declared_service() {
        let topology = reference_topology().unwrap();
        let lookup = TopologyClassLookup::new(&topology, &assignments_from_topology(&topology));
        assert_eq!(lookup.class_of(&"10.0.0.1".parse().unwrap()), Some(ServiceTag::bulk()));
        assert_eq!(lookup.class_of(&"10.0.0.4".parse().unwrap()), Some(ServiceTag::realtime()));
        assert_eq!(lookup.class_of(&"10.0.0.6".parse().unwrap()), Some(ServiceTag::periodic()));
        assert_eq!(lookup.class_of(&"10.0.0.7".parse().unwrap()), None);
    }

    #[test]
    fn test_topology_lookup_follows_explicit_assignments() {
        let mut spec = TopologySpec::from(reference_topology().unwrap());
        for ap in &mut spec.attachment_points {
            ap.service = None;
        }
        let topology = Topology::try_from(spec).unwrap();
        let assignments = [
            Assignment::new("h1", ServiceTag::bulk()),
            Assignment::new("h3", ServiceTag::realtime()),
            Assignment::new("h5", ServiceTag::periodic()),
            Assignment::new("h5", ServiceTag::bulk()),
            Assignment::new("h9", ServiceTag::bulk()),
        ];
        let lookup = TopologyClassLookup::new(&topology, &assignments);
        assert_eq!(lookup.class_of(&"10.0.0.1".parse().unwrap()), Some(ServiceTag::bulk()));
        assert_eq!(lookup.class_of(&"10.0.0.3".parse().unwrap()), Some(ServiceTag::realtime()));
        assert_eq!(lookup.class_of(&"10.0.0.2".parse().unwrap()), None);
        assert_eq!(lookup.class_of(&"10.0.0.5".parse().unwrap()), None);
    }

    #[test]
    fn test_range_lookup_prefers_longest_prefix() {
        let lookup = RangeClassLookup::new([
            ("10.0.0.0/24".parse().unwrap(), ServiceTag::bulk()),
            ("10.0.0.4/30".parse().unwrap(), ServiceTag::periodic()),
        ]);
        assert_eq!(lookup.class_of(&"10.0.0.2".parse().unwrap()), Some(ServiceTag::bulk()));
        assert_eq!(lookup.class_of(&"10.0.0.5".parse().unwrap()), Some(ServiceTag::periodic()));
        assert_eq!(lookup.class_of(&"10.0.1.5".parse().unwrap()), None);
    }
}
