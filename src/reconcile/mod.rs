//! Reconciliation of clusters, nodes and services against the remote API
//!
//! Each entity kind has a fixed list of steps. A step inspects the remote
//! record attached by earlier steps and skips itself when its precondition
//! already holds, so running the same configuration twice only reads and
//! re-tags.

pub mod cluster;
pub mod node;
pub mod service;
pub mod settle;
pub mod tags;

#[cfg(test)]
pub(crate) mod testing;

pub use cluster::ClusterStep;
pub use node::NodeStep;
pub use service::ServiceStep;
pub use settle::SettlePolicy;
pub use tags::TagIndex;
