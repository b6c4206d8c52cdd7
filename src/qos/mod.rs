//! Quality-of-service shaping.
//!
//! Service profiles, the per-attachment-point shaping tree builder and the
//! boundary to whatever installs the resulting trees.

pub mod install;
pub mod policy;
pub mod shaping;

pub use install::{install_tree, DryRunInstaller, InstallationFailure, ShapingInstaller, TcRenderer};
pub use policy::{reference_policies, PolicyError, PolicySet, ServiceProfile};
pub use shaping::{
    assignments_from_topology, build_shaping_plan, Assignment, ShapingError, ShapingNode,
    ShapingPlan, ShapingTree,
};
