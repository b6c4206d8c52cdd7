//! Shaping tree builder.
//!
//! Derives, per attachment point, an HTB-style bandwidth allocation tree from
//! the service policy and the attachment point -> service assignments. The
//! build is a pure transformation: installing the result on a real interface
//! is the job of a [`ShapingInstaller`](super::install::ShapingInstaller).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::policy::PolicySet;
use crate::service::ServiceTag;
use crate::topology::Topology;
use crate::utils::rate::Rate;

/// One attachment point -> service tag assignment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub attachment: String,
    pub service: ServiceTag,
}

impl Assignment {
    pub fn new(attachment: impl Into<String>, service: impl Into<ServiceTag>) -> Self {
        Self {
            attachment: attachment.into(),
            service: service.into(),
        }
    }
}

/// Assignments derived from the service tags declared on the topology itself
pub fn assignments_from_topology(topology: &Topology) -> Vec<Assignment> {
    topology
        .attachment_points()
        .iter()
        .filter_map(|ap| {
            ap.service
                .as_ref()
                .map(|service| Assignment::new(ap.id.clone(), service.clone()))
        })
        .collect()
}

/// Errors raised while building shaping trees
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapingError {
    #[error("Assignment references unknown attachment point '{0}'")]
    UnknownAttachmentPoint(String),
    #[error("Service '{service}' assigned to '{attachment}' has no profile in the policy set")]
    UnknownServiceTag {
        attachment: String,
        service: ServiceTag,
    },
    #[error(
        "Over-allocation on '{attachment}': guaranteed floors sum to {floor_sum} bit/s, \
         exceeding the {ceiling} bit/s link ceiling by {excess} bit/s"
    )]
    OverAllocation {
        attachment: String,
        floor_sum: Rate,
        ceiling: Rate,
        excess: Rate,
    },
    #[error("Ambiguous priority {priority} on '{attachment}': shared by '{first}' and '{second}'")]
    AmbiguousPriority {
        attachment: String,
        priority: u32,
        first: ServiceTag,
        second: ServiceTag,
    },
}

impl ShapingError {
    /// Configuration errors abort the whole build; the others only affect
    /// the attachment point they name.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAttachmentPoint(_) | Self::UnknownServiceTag { .. }
        )
    }
}

/// A node of a shaping tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapingNode {
    /// HTB class identifier (`1:1` for the root, `1:10`, `1:20`, ... for leaves)
    pub class_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceTag>,
    pub ceiling: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ShapingNode>,
}

impl ShapingNode {
    /// Sum of the children's guaranteed floors
    pub fn child_floor_sum(&self) -> Rate {
        self.children
            .iter()
            .filter_map(|c| c.floor)
            .fold(0, Rate::saturating_add)
    }
}

/// Bandwidth allocation tree rooted at one attachment point's outbound interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapingTree {
    attachment: String,
    interface: String,
    root: ShapingNode,
}

impl ShapingTree {
    pub fn attachment(&self) -> &str {
        &self.attachment
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn root(&self) -> &ShapingNode {
        &self.root
    }

    pub fn leaves(&self) -> &[ShapingNode] {
        &self.root.children
    }

    /// All nodes, parents before children, each paired with its parent's class id
    pub fn nodes(&self) -> Vec<(Option<&str>, &ShapingNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<(Option<&str>, &ShapingNode)> = vec![(None, &self.root)];
        while let Some((parent, node)) = stack.pop() {
            out.push((parent, node));
            for child in node.children.iter().rev() {
                stack.push((Some(node.class_id.as_str()), child));
            }
        }
        out
    }

    /// True if no child's ceiling exceeds its parent's
    pub fn ceilings_non_increasing(&self) -> bool {
        fn check(node: &ShapingNode) -> bool {
            node.children
                .iter()
                .all(|c| c.ceiling <= node.ceiling && check(c))
        }
        check(&self.root)
    }
}

/// Outcome of building trees for every assigned attachment point.
///
/// Over-allocation and priority ambiguity are reported per attachment point;
/// the other points still get their trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapingPlan {
    pub trees: BTreeMap<String, ShapingTree>,
    pub failures: BTreeMap<String, ShapingError>,
}

impl ShapingPlan {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build one shaping tree per attachment point with at least one assigned service
///
/// # Errors
/// Returns a configuration error if an assignment names an attachment point
/// that is not in the topology or a service tag with no profile. Per-point
/// failures are collected in [`ShapingPlan::failures`].
pub fn build_shaping_plan(
    topology: &Topology,
    policies: &PolicySet,
    assignments: &[Assignment],
) -> Result<ShapingPlan, ShapingError> {
    let mut by_attachment: BTreeMap<&str, BTreeSet<&ServiceTag>> = BTreeMap::new();

    for assignment in assignments {
        if topology.attachment_point(&assignment.attachment).is_none() {
            return Err(ShapingError::UnknownAttachmentPoint(
                assignment.attachment.clone(),
            ));
        }
        if !policies.contains(&assignment.service) {
            return Err(ShapingError::UnknownServiceTag {
                attachment: assignment.attachment.clone(),
                service: assignment.service.clone(),
            });
        }
        by_attachment
            .entry(assignment.attachment.as_str())
            .or_default()
            .insert(&assignment.service);
    }

    let mut plan = ShapingPlan::default();
    for (attachment, services) in by_attachment {
        match build_tree(topology, policies, attachment, &services) {
            Ok(tree) => {
                log::debug!(
                    "Built shaping tree for {} with {} leaves",
                    attachment,
                    tree.leaves().len()
                );
                plan.trees.insert(attachment.to_string(), tree);
            }
            Err(e) if e.is_configuration_error() => return Err(e),
            Err(e) => {
                log::warn!("Shaping tree for {} rejected: {}", attachment, e);
                plan.failures.insert(attachment.to_string(), e);
            }
        }
    }

    Ok(plan)
}

fn build_tree(
    topology: &Topology,
    policies: &PolicySet,
    attachment: &str,
    services: &BTreeSet<&ServiceTag>,
) -> Result<ShapingTree, ShapingError> {
    let ap = topology
        .attachment_point(attachment)
        .ok_or_else(|| ShapingError::UnknownAttachmentPoint(attachment.to_string()))?;
    // Topology validation guarantees exactly one uplink per attachment point.
    let root_ceiling = topology
        .uplink(attachment)
        .map(|link| link.capacity)
        .ok_or_else(|| ShapingError::UnknownAttachmentPoint(attachment.to_string()))?;

    let mut profiles = Vec::with_capacity(services.len());
    for service in services {
        let profile = policies
            .get(service)
            .ok_or_else(|| ShapingError::UnknownServiceTag {
                attachment: attachment.to_string(),
                service: (*service).clone(),
            })?;
        profiles.push(profile);
    }
    profiles.sort_by_key(|p| p.priority);

    for pair in profiles.windows(2) {
        if pair[0].priority == pair[1].priority {
            return Err(ShapingError::AmbiguousPriority {
                attachment: attachment.to_string(),
                priority: pair[0].priority,
                first: pair[0].service.clone(),
                second: pair[1].service.clone(),
            });
        }
    }

    let leaves: Vec<ShapingNode> = profiles
        .iter()
        .enumerate()
        .map(|(index, profile)| ShapingNode {
            class_id: format!("1:{}", (index + 1) * 10),
            service: Some(profile.service.clone()),
            ceiling: profile.ceiling.min(root_ceiling),
            floor: Some(profile.guaranteed),
            priority: Some(profile.priority),
            children: Vec::new(),
        })
        .collect();

    let root = ShapingNode {
        class_id: "1:1".to_string(),
        service: None,
        ceiling: root_ceiling,
        floor: None,
        priority: None,
        children: leaves,
    };

    let floor_sum = root.child_floor_sum();
    if floor_sum > root_ceiling {
        return Err(ShapingError::OverAllocation {
            attachment: attachment.to_string(),
            floor_sum,
            ceiling: root_ceiling,
            excess: floor_sum - root_ceiling,
        });
    }

    Ok(ShapingTree {
        attachment: attachment.to_string(),
        interface: ap.interface(),
        root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::policy::{reference_policies, ServiceProfile};
    use crate::topology::{reference_topology, AggregationPoint, AttachmentPoint, Link};
    use proptest::prelude::*;
    use std::time::Duration;

    const MBIT: u64 = 1_000_000;

    fn single_host_topology(capacity: Rate) -> Topology {
        Topology::new(
            vec![AttachmentPoint::new("h1", "10.0.0.1".parse().unwrap(), None)],
            vec![AggregationPoint { id: "s1".to_string() }],
            vec![Link::new("h1", "s1", capacity, Duration::from_millis(1), 0.0)],
        )
        .unwrap()
    }

    /// One to four profiles with distinct ranks; names run against rank order
    fn profiles() -> impl Strategy<Value = Vec<ServiceProfile>> {
        proptest::collection::btree_set(1u32..100, 1..=4)
            .prop_flat_map(|ranks| {
                let rates = proptest::collection::vec((1u64..=2_000, 0u64..=2_000), ranks.len());
                (Just(ranks), rates)
            })
            .prop_map(|(ranks, rates)| {
                ranks
                    .into_iter()
                    .rev()
                    .zip(rates)
                    .enumerate()
                    .map(|(i, (rank, (floor, headroom)))| {
                        ServiceProfile::new(
                            ServiceTag::new(format!("class{}", i)),
                            floor * MBIT,
                            (floor + headroom) * MBIT,
                            rank,
                        )
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn test_plan_respects_link_capacity(profiles in profiles(), capacity in 1u64..=10_000) {
            let capacity = capacity * MBIT;
            let topology = single_host_topology(capacity);
            let policies = PolicySet::new(profiles.clone()).unwrap();
            let assignments: Vec<Assignment> = profiles
                .iter()
                .map(|p| Assignment::new("h1", p.service.clone()))
                .collect();

            let plan = build_shaping_plan(&topology, &policies, &assignments).unwrap();
            let floor_sum: Rate = profiles.iter().map(|p| p.guaranteed).sum();

            if floor_sum <= capacity {
                prop_assert!(plan.is_complete());
                let tree = &plan.trees["h1"];
                prop_assert_eq!(tree.root().ceiling, capacity);
                prop_assert!(tree.ceilings_non_increasing());
                prop_assert!(tree.root().child_floor_sum() <= capacity);
                prop_assert_eq!(tree.leaves().len(), profiles.len());
                let ranks: Vec<u32> = tree.leaves().iter().filter_map(|l| l.priority).collect();
                prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]));
            } else {
                prop_assert!(plan.trees.is_empty());
                prop_assert_eq!(
                    &plan.failures["h1"],
                    &ShapingError::OverAllocation {
                        attachment: "h1".to_string(),
                        floor_sum,
                        ceiling: capacity,
                        excess: floor_sum - capacity,
                    }
                );
            }
        }
    }

    #[test]
    fn test_reference_plan_builds_every_host() {
        let topology = reference_topology().unwrap();
        let plan = build_shaping_plan(
            &topology,
            &reference_policies(),
            &assignments_from_topology(&topology),
        )
        .unwrap();

        assert!(plan.is_complete());
        assert_eq!(plan.trees.len(), 6);

        let h3 = &plan.trees["h3"];
        assert_eq!(h3.interface(), "h3-eth0");
        assert_eq!(h3.root().ceiling, 1000 * MBIT);
        assert_eq!(h3.leaves().len(), 1);
        assert_eq!(h3.leaves()[0].floor, Some(800 * MBIT));
        assert_eq!(h3.leaves()[0].priority, Some(2));
        assert!(plan.trees.values().all(ShapingTree::ceilings_non_increasing));
    }

    #[test]
    fn test_leaf_ceiling_clamped_to_link_capacity() {
        let topology = reference_topology().unwrap();
        let policies = PolicySet::new(vec![ServiceProfile::new("bulk", 10 * MBIT, 400 * MBIT, 1)]).unwrap();
        let plan = build_shaping_plan(&topology, &policies, &[Assignment::new("h1", "bulk")]).unwrap();

        let leaf = &plan.trees["h1"].leaves()[0];
        assert_eq!(leaf.ceiling, 100 * MBIT);
        assert!(plan.trees["h1"].ceilings_non_increasing());
    }

    #[test]
    fn test_multiple_services_ordered_by_priority() {
        let topology = reference_topology().unwrap();
        let policies = PolicySet::new(vec![
            ServiceProfile::new("periodic", 5 * MBIT, 20 * MBIT, 3),
            ServiceProfile::new("bulk", 30 * MBIT, 100 * MBIT, 1),
            ServiceProfile::new("realtime", 40 * MBIT, 100 * MBIT, 2),
        ])
        .unwrap();
        let assignments = vec![
            Assignment::new("h1", "periodic"),
            Assignment::new("h1", "bulk"),
            Assignment::new("h1", "realtime"),
            Assignment::new("h1", "bulk"),
        ];
        let plan = build_shaping_plan(&topology, &policies, &assignments).unwrap();
        let tree = &plan.trees["h1"];

        let leaves: Vec<(&str, &str)> = tree
            .leaves()
            .iter()
            .map(|n| (n.class_id.as_str(), n.service.as_ref().unwrap().as_str()))
            .collect();
        assert_eq!(leaves, vec![("1:10", "bulk"), ("1:20", "realtime"), ("1:30", "periodic")]);
        assert_eq!(tree.root().child_floor_sum(), 75 * MBIT);

        let order: Vec<&str> = tree.nodes().iter().map(|(_, n)| n.class_id.as_str()).collect();
        assert_eq!(order, vec!["1:1", "1:10", "1:20", "1:30"]);
        assert_eq!(tree.nodes()[1].0, Some("1:1"));
    }

    #[test]
    fn test_over_allocation_is_per_attachment_point() {
        let topology = reference_topology().unwrap();
        // h1 sits on a 100 Mbit link; 80 + 50 Mbit of floors cannot fit.
        let assignments = vec![
            Assignment::new("h1", "bulk"),
            Assignment::new("h1", "periodic"),
            Assignment::new("h3", "realtime"),
        ];
        let plan = build_shaping_plan(&topology, &reference_policies(), &assignments).unwrap();

        assert_eq!(
            plan.failures["h1"],
            ShapingError::OverAllocation {
                attachment: "h1".to_string(),
                floor_sum: 130 * MBIT,
                ceiling: 100 * MBIT,
                excess: 30 * MBIT,
            }
        );
        assert!(plan.trees.contains_key("h3"));
        assert!(!plan.trees.contains_key("h1"));
    }

    #[test]
    fn test_floor_above_link_capacity_is_over_allocation() {
        let topology = reference_topology().unwrap();
        let plan = build_shaping_plan(
            &topology,
            &reference_policies(),
            &[Assignment::new("h5", "realtime")],
        )
        .unwrap();
        match &plan.failures["h5"] {
            ShapingError::OverAllocation { excess, .. } => assert_eq!(*excess, 700 * MBIT),
            other => panic!("unexpected failure: {other}"),
        }
    }

    #[test]
    fn test_unknown_references_are_configuration_errors() {
        let topology = reference_topology().unwrap();
        let policies = reference_policies();

        let err = build_shaping_plan(&topology, &policies, &[Assignment::new("h9", "bulk")]).unwrap_err();
        assert_eq!(err, ShapingError::UnknownAttachmentPoint("h9".to_string()));
        assert!(err.is_configuration_error());

        let err = build_shaping_plan(&topology, &policies, &[Assignment::new("h1", "voice")]).unwrap_err();
        assert!(matches!(err, ShapingError::UnknownServiceTag { .. }));
    }

    #[test]
    fn test_tied_priorities_are_ambiguous() {
        let topology = reference_topology().unwrap();
        let policies = PolicySet::unchecked(vec![
            ServiceProfile::new("bulk", MBIT, 10 * MBIT, 1),
            ServiceProfile::new("realtime", MBIT, 10 * MBIT, 1),
        ]);
        let assignments = vec![Assignment::new("h1", "bulk"), Assignment::new("h1", "realtime")];
        let plan = build_shaping_plan(&topology, &policies, &assignments).unwrap();
        assert!(matches!(
            plan.failures["h1"],
            ShapingError::AmbiguousPriority { priority: 1, .. }
        ));
    }

    #[test]
    fn test_empty_assignments_build_nothing() {
        let topology = reference_topology().unwrap();
        let plan = build_shaping_plan(&topology, &reference_policies(), &[]).unwrap();
        assert!(plan.trees.is_empty());
        assert!(plan.is_complete());
    }
}
