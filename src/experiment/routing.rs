//! Routing modes and the paths they produce.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::RouteEntry;
use crate::capture::FlowPath;
use crate::topology::Topology;

/// How forwarding is set up for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Forwarding is left to the substrate
    None,
    /// Shortest-hop routes are computed and pinned for every workload pair
    Static,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Static => f.write_str("static"),
        }
    }
}

/// Static routes for each (source, destination) pair, skipping duplicates.
///
/// Unreachable pairs are logged and left out.
pub fn static_routes<'a, I>(topology: &Topology, pairs: I) -> Vec<RouteEntry>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut routes: Vec<RouteEntry> = Vec::new();
    for (source, destination) in pairs {
        if routes
            .iter()
            .any(|r| r.source == source && r.destination == destination)
        {
            continue;
        }
        match topology.static_route(source, destination) {
            Some(path) => {
                log::info!("Route {} -> {}: {}", source, destination, path.join(" -> "));
                routes.push(RouteEntry {
                    source: source.to_string(),
                    destination: destination.to_string(),
                    path,
                });
            }
            None => log::warn!("No route from {} to {}", source, destination),
        }
    }
    routes
}

/// Capture view of a flow: its endpoint addresses and the aggregation
/// points it crosses
pub fn flow_path(topology: &Topology, source: &str, destination: &str) -> Option<FlowPath> {
    let src = topology.attachment_point(source)?;
    let dst = topology.attachment_point(destination)?;
    let route = topology.static_route(source, destination)?;
    let points = route
        .into_iter()
        .filter(|node| topology.attachment_point(node).is_none())
        .collect();
    Some(FlowPath {
        source: src.address,
        destination: dst.address,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::reference_topology;

    #[test]
    fn test_static_routes_skip_duplicates() {
        let topology = reference_topology().unwrap();
        let routes = static_routes(&topology, [("h1", "h2"), ("h1", "h2"), ("h1", "h5")]);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].path, vec!["h1", "s1", "s3", "h5"]);
    }

    #[test]
    fn test_flow_path_lists_aggregation_points() {
        let topology = reference_topology().unwrap();
        let path = flow_path(&topology, "h3", "h4").unwrap();
        assert_eq!(path.points, vec!["s2"]);
        assert_eq!(path.source.to_string(), "10.0.0.3");
        assert!(flow_path(&topology, "h3", "s9").is_none());
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(RoutingMode::Static.to_string(), "static");
        let mode: RoutingMode = serde_yaml::from_str("none").unwrap();
        assert_eq!(mode, RoutingMode::None);
    }
}
