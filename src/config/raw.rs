//! Deploy file document types, as written by the user

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level deploy document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    /// Single cluster (short form)
    #[serde(default)]
    pub cluster: Option<RawCluster>,
    /// Clusters
    #[serde(default)]
    pub clusters: Option<Vec<RawCluster>>,
    /// Pre-existing nodes
    #[serde(default)]
    pub nodes: Option<Vec<RawNode>>,
    /// Services
    #[serde(default)]
    pub services: Option<Vec<RawService>>,
}

/// Cluster definition
#[derive(Debug, Clone, Deserialize)]
pub struct RawCluster {
    pub name: String,
    /// Region name, or region resource uri
    pub region: String,
    /// Node type name, or node type resource uri
    #[serde(rename = "type", alias = "node_type")]
    pub node_type: String,
    /// Shorthand for `target_num_nodes`
    #[serde(default)]
    pub nodes: Option<u32>,
    #[serde(default)]
    pub target_num_nodes: Option<u32>,
    /// Whether service images are built before deploying
    #[serde(default)]
    pub build: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Any other field, forwarded to the API
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Reference to an existing node
#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Service definition
#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Build context, relative to the deploy file directory
    #[serde(default)]
    pub build: Option<String>,
    /// Shorthand for `container_ports`
    #[serde(default)]
    pub ports: Option<Vec<PortConfig>>,
    #[serde(default)]
    pub container_ports: Option<Vec<PortConfig>>,
    /// Shorthand for `container_envvars`
    #[serde(default)]
    pub env: Option<serde_yaml::Mapping>,
    #[serde(default)]
    pub container_envvars: Option<Vec<EnvVar>>,
    /// Shorthand for `target_num_containers`
    #[serde(default)]
    pub containers: Option<u32>,
    #[serde(default)]
    pub target_num_containers: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Services this one links to
    #[serde(default)]
    pub require: Vec<String>,
    /// Any other field, forwarded to the API
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Port mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    /// Container port only: `80`
    Number(u16),
    /// Short syntax: `"8080:80"`, `"80/udp"`
    Short(String),
    /// Long syntax
    Long(PortSpec),
}

/// Container port as sent to the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub inner_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_port: Option<u16>,
    #[serde(default)]
    pub published: bool,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Container environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
