//! Normalized configuration tree
//!
//! The raw document allows shorthand fields (`nodes`, `containers`, `ports`,
//! `env`). Normalization maps each of them onto a single canonical field so
//! the reconciliation steps only ever see one fixed shape.

use super::raw::{EnvVar, PortConfig, PortSpec, RawCluster, RawNode, RawService};
use crate::api::RemoteRecord;
use crate::error::{DeployError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Configuration tree: everything one run reconciles
#[derive(Debug, Clone, Default)]
pub struct DeployConfig {
    pub clusters: Vec<Cluster>,
    pub nodes: Vec<Node>,
    pub services: Vec<Service>,
}

impl DeployConfig {
    /// Find a service by name
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Images are built unless a cluster opts out with `build: false`
    pub fn build_enabled(&self) -> bool {
        self.clusters.iter().all(|c| c.build)
    }
}

/// Resolved region and node type resource uris
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub region: String,
    pub node_type: String,
}

/// Node cluster
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    pub region: String,
    pub node_type: String,
    pub target_num_nodes: Option<u32>,
    pub build: bool,
    pub tags: Vec<String>,
    pub extra: BTreeMap<String, Value>,
    /// Set once the region has been resolved
    pub placement: Option<Placement>,
    pub remote: Option<RemoteRecord>,
}

impl Cluster {
    /// Region given as a resource uri rather than a name
    pub fn region_is_reference(&self) -> bool {
        self.region.starts_with('/')
    }
}

impl TryFrom<RawCluster> for Cluster {
    type Error = DeployError;

    fn try_from(raw: RawCluster) -> Result<Self> {
        let target_num_nodes = pick(
            &raw.name,
            "nodes",
            raw.nodes,
            "target_num_nodes",
            raw.target_num_nodes,
        )?;

        Ok(Self {
            name: raw.name,
            region: raw.region,
            node_type: raw.node_type,
            target_num_nodes,
            build: raw.build.unwrap_or(true),
            tags: raw.tags,
            extra: raw.extra,
            placement: None,
            remote: None,
        })
    }
}

/// Existing node, referenced by uuid
#[derive(Debug, Clone)]
pub struct Node {
    pub uuid: String,
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub remote: Option<RemoteRecord>,
}

impl Node {
    /// Name for log lines
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.uuid)
    }
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        Self {
            uuid: raw.uuid,
            name: raw.name,
            tags: raw.tags,
            remote: None,
        }
    }
}

/// Service
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub image: String,
    /// Build context path, if the image is built locally
    pub build: Option<String>,
    pub container_ports: Vec<PortSpec>,
    pub container_envvars: Vec<EnvVar>,
    pub target_num_containers: Option<u32>,
    pub tags: Vec<String>,
    pub require: Vec<String>,
    pub extra: BTreeMap<String, Value>,
    pub remote: Option<RemoteRecord>,
    /// Tag name to the resources carrying it, filled by the tag resolution
    /// step. Informational: the API receives tag names, this only feeds the
    /// run log.
    pub resolved_tags: BTreeMap<String, Vec<String>>,
    /// Started by this run
    pub started: bool,
    /// Image pushed by this run
    pub image_pushed: bool,
}

impl TryFrom<RawService> for Service {
    type Error = DeployError;

    fn try_from(raw: RawService) -> Result<Self> {
        let name = raw.name;

        let image = raw
            .image
            .filter(|i| !i.is_empty())
            .ok_or_else(|| DeployError::ConfigParse(format!("service {}: image required", name)))?;

        let target_num_containers = pick(
            &name,
            "containers",
            raw.containers,
            "target_num_containers",
            raw.target_num_containers,
        )?;

        let ports = pick(&name, "ports", raw.ports, "container_ports", raw.container_ports)?;
        let container_ports = ports
            .unwrap_or_default()
            .iter()
            .map(|p| normalize_port(&name, p))
            .collect::<Result<Vec<_>>>()?;

        let container_envvars = match (raw.env, raw.container_envvars) {
            (Some(_), Some(_)) => return Err(conflict(&name, "env", "container_envvars")),
            (Some(env), None) => normalize_env(&name, &env)?,
            (None, Some(vars)) => vars,
            (None, None) => Vec::new(),
        };

        Ok(Self {
            name,
            image,
            build: raw.build,
            container_ports,
            container_envvars,
            target_num_containers,
            tags: raw.tags,
            require: raw.require,
            extra: raw.extra,
            remote: None,
            resolved_tags: BTreeMap::new(),
            started: false,
            image_pushed: false,
        })
    }
}

fn conflict(entity: &str, short: &str, canonical: &str) -> DeployError {
    DeployError::ConfigParse(format!(
        "{}: both '{}' and '{}' are set",
        entity, short, canonical
    ))
}

/// Pick between a shorthand field and its canonical name
fn pick<T>(
    entity: &str,
    short: &str,
    a: Option<T>,
    canonical: &str,
    b: Option<T>,
) -> Result<Option<T>> {
    match (a, b) {
        (Some(_), Some(_)) => Err(conflict(entity, short, canonical)),
        (a, b) => Ok(a.or(b)),
    }
}

/// Normalize a port entry to the API's port record
fn normalize_port(service: &str, port: &PortConfig) -> Result<PortSpec> {
    let invalid =
        |p: &str| DeployError::ConfigParse(format!("service {}: invalid port '{}'", service, p));

    match port {
        PortConfig::Number(inner) => Ok(PortSpec {
            protocol: "tcp".to_string(),
            inner_port: *inner,
            outer_port: None,
            published: false,
        }),
        PortConfig::Long(spec) => Ok(spec.clone()),
        PortConfig::Short(s) => {
            let (ports, protocol) = match s.split_once('/') {
                Some((ports, proto)) if proto == "tcp" || proto == "udp" => (ports, proto),
                Some(_) => return Err(invalid(s.as_str())),
                None => (s.as_str(), "tcp"),
            };

            let parse = |p: &str| p.trim().parse::<u16>().map_err(|_| invalid(s.as_str()));

            let (outer_port, inner_port) = match ports.split_once(':') {
                Some((outer, inner)) => (Some(parse(outer)?), parse(inner)?),
                None => (None, parse(ports)?),
            };

            Ok(PortSpec {
                protocol: protocol.to_string(),
                inner_port,
                outer_port,
                published: outer_port.is_some(),
            })
        }
    }
}

/// Expand an `env` mapping into ordered key/value pairs
fn normalize_env(service: &str, env: &serde_yaml::Mapping) -> Result<Vec<EnvVar>> {
    env.iter()
        .map(|(k, v)| {
            let key = scalar(k).ok_or_else(|| {
                DeployError::ConfigParse(format!("service {}: env keys must be scalars", service))
            })?;
            let value = scalar(v).ok_or_else(|| {
                DeployError::ConfigParse(format!(
                    "service {}: env {} must be a scalar",
                    service, key
                ))
            })?;
            Ok(EnvVar { key, value })
        })
        .collect()
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}
