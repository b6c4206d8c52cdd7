//! Shaping installation boundary.
//!
//! The core never touches a network interface itself. It hands each node of a
//! [`ShapingTree`] to a [`ShapingInstaller`] and reports the first node the
//! installer rejects. There is no retry here.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::shaping::{ShapingNode, ShapingTree};
use crate::utils::rate::format_rate;

/// Sink that applies shaping nodes to an interface
pub trait ShapingInstaller {
    /// Install one node. `parent` is `None` for the root.
    fn install_node(
        &mut self,
        interface: &str,
        parent: Option<&str>,
        node: &ShapingNode,
        default_class: &str,
    ) -> std::result::Result<(), String>;
}

/// A node the installer refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to install shaping node {class_id} for '{attachment}' on {interface}: {reason}")]
pub struct InstallationFailure {
    pub attachment: String,
    pub interface: String,
    pub class_id: String,
    pub reason: String,
}

/// Install every node of a tree, parents first.
///
/// Returns the number of installed nodes, or the first failure.
pub fn install_tree(
    tree: &ShapingTree,
    installer: &mut dyn ShapingInstaller,
) -> std::result::Result<usize, InstallationFailure> {
    let default_class = default_class(tree);
    let nodes = tree.nodes();
    for (parent, node) in &nodes {
        installer
            .install_node(tree.interface(), *parent, node, &default_class)
            .map_err(|reason| InstallationFailure {
                attachment: tree.attachment().to_string(),
                interface: tree.interface().to_string(),
                class_id: node.class_id.clone(),
                reason,
            })?;
    }
    log::info!(
        "Installed {} shaping nodes on {} ({})",
        nodes.len(),
        tree.interface(),
        tree.attachment()
    );
    Ok(nodes.len())
}

/// Unclassified traffic falls into the lowest-priority leaf
fn default_class(tree: &ShapingTree) -> String {
    tree.leaves()
        .last()
        .map(|leaf| leaf.class_id.clone())
        .unwrap_or_else(|| tree.root().class_id.clone())
}

/// Renders shaping nodes as `tc` HTB commands
pub struct TcRenderer;

impl TcRenderer {
    /// Commands that create one node
    pub fn node_commands(
        interface: &str,
        parent: Option<&str>,
        node: &ShapingNode,
        default_class: &str,
    ) -> Vec<String> {
        let minor = |class_id: &str| class_id.split(':').nth(1).unwrap_or("0").to_string();
        match parent {
            None => vec![
                format!(
                    "tc qdisc add dev {} root handle 1: htb default {}",
                    interface,
                    minor(default_class)
                ),
                format!(
                    "tc class add dev {} parent 1: classid {} htb rate {}",
                    interface,
                    node.class_id,
                    format_rate(node.ceiling)
                ),
            ],
            Some(parent) => {
                let mut command = format!(
                    "tc class add dev {} parent {} classid {} htb rate {} ceil {}",
                    interface,
                    parent,
                    node.class_id,
                    format_rate(node.floor.unwrap_or(node.ceiling)),
                    format_rate(node.ceiling)
                );
                if let Some(priority) = node.priority {
                    command.push_str(&format!(" prio {}", priority));
                }
                vec![command]
            }
        }
    }

    /// All commands for a tree, in installation order
    pub fn render(tree: &ShapingTree) -> Vec<String> {
        let default_class = default_class(tree);
        tree.nodes()
            .into_iter()
            .flat_map(|(parent, node)| {
                Self::node_commands(tree.interface(), parent, node, &default_class)
            })
            .collect()
    }
}

/// Installer that records the `tc` commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunInstaller {
    commands: Vec<String>,
}

impl DryRunInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Write the recorded commands as a shell script
    pub fn write_script(&self, path: &Path) -> Result<()> {
        let mut content = String::from("#!/bin/sh\nset -e\n");
        for command in &self.commands {
            content.push_str(command);
            content.push('\n');
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write shaping script to {}", path.display()))?;
        log::debug!("Shaping script written to {}", path.display());
        Ok(())
    }
}

impl ShapingInstaller for DryRunInstaller {
    fn install_node(
        &mut self,
        interface: &str,
        parent: Option<&str>,
        node: &ShapingNode,
        default_class: &str,
    ) -> std::result::Result<(), String> {
        self.commands
            .extend(TcRenderer::node_commands(interface, parent, node, default_class));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::policy::reference_policies;
    use crate::qos::shaping::{build_shaping_plan, Assignment};
    use crate::topology::reference_topology;

    fn h1_tree() -> ShapingTree {
        let topology = reference_topology().unwrap();
        let mut plan = build_shaping_plan(
            &topology,
            &reference_policies(),
            &[Assignment::new("h1", "bulk")],
        )
        .unwrap();
        plan.trees.remove("h1").unwrap()
    }

    /// Rejects any node whose class id matches
    struct RejectingInstaller {
        reject: &'static str,
        installed: Vec<String>,
    }

    impl ShapingInstaller for RejectingInstaller {
        fn install_node(
            &mut self,
            _interface: &str,
            _parent: Option<&str>,
            node: &ShapingNode,
            _default_class: &str,
        ) -> std::result::Result<(), String> {
            if node.class_id == self.reject {
                return Err("RTNETLINK answers: File exists".to_string());
            }
            self.installed.push(node.class_id.clone());
            Ok(())
        }
    }

    #[test]
    fn test_render_matches_htb_layout() {
        let commands = TcRenderer::render(&h1_tree());
        assert_eq!(
            commands,
            vec![
                "tc qdisc add dev h1-eth0 root handle 1: htb default 10",
                "tc class add dev h1-eth0 parent 1: classid 1:1 htb rate 100mbit",
                "tc class add dev h1-eth0 parent 1:1 classid 1:10 htb rate 80mbit ceil 100mbit prio 1",
            ]
        );
    }

    #[test]
    fn test_dry_run_records_commands() {
        let tree = h1_tree();
        let mut installer = DryRunInstaller::new();
        assert_eq!(install_tree(&tree, &mut installer), Ok(2));
        assert_eq!(installer.commands(), TcRenderer::render(&tree).as_slice());

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("shaping_h1.sh");
        installer.write_script(&script).unwrap();
        let content = std::fs::read_to_string(&script).unwrap();
        assert!(content.starts_with("#!/bin/sh"));
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_first_failure_is_surfaced_without_retry() {
        let mut installer = RejectingInstaller {
            reject: "1:10",
            installed: Vec::new(),
        };
        let failure = install_tree(&h1_tree(), &mut installer).unwrap_err();
        assert_eq!(failure.class_id, "1:10");
        assert_eq!(failure.interface, "h1-eth0");
        assert_eq!(installer.installed, vec!["1:1"]);
    }
}
