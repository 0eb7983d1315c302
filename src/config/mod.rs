//! Deploy file handling
//!
//! The deploy file (`tutum.yaml`) declares clusters, nodes and services.
//! Loading it fills `{{NAME}}` placeholders from `TUTUM_NAME` environment
//! variables, parses the YAML and normalizes shorthand fields.

pub mod loader;
pub mod model;
pub mod raw;

pub use loader::ConfigLoader;
pub use model::{Cluster, DeployConfig, Node, Placement, Service};
pub use raw::{EnvVar, PortSpec};
