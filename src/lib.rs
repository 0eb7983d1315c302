//! tutum-deploy - declarative deployments for the Tutum container cloud
//!
//! A YAML file describes node clusters, nodes and services. Each run reads
//! the remote state of every entity and issues only the calls needed to
//! bring it in line with the file:
//!
//! - Node clusters are created and deployed
//! - Nodes are tagged and deployed
//! - Service images are built and pushed with the local docker client
//! - Services are created, linked to what they require, started and tagged

pub mod api;
pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod reconcile;
pub mod status;

pub use error::{DeployError, Result};
