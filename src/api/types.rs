//! Remote record types returned by the orchestration API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Remote entity state, as surfaced by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteState {
    /// Created but never deployed/started
    Init,
    /// Containers are starting
    Starting,
    /// All containers are running
    Running,
    /// Some containers are running
    PartlyRunning,
    /// Containers are stopping
    Stopping,
    /// All containers are stopped
    Stopped,
    /// Containers are being replaced
    Redeploying,
    /// Container count is changing
    Scaling,
    /// Nodes are being provisioned
    Deploying,
    /// Nodes are provisioned
    Deployed,
    /// Being destroyed
    Terminating,
    /// Destroyed
    Terminated,
    /// Node agent is not reachable
    Unreachable,
    /// Cluster without nodes
    EmptyCluster,
    /// State this tool does not know about
    Other(String),
}

impl RemoteState {
    pub fn as_str(&self) -> &str {
        match self {
            RemoteState::Init => "Init",
            RemoteState::Starting => "Starting",
            RemoteState::Running => "Running",
            RemoteState::PartlyRunning => "Partly running",
            RemoteState::Stopping => "Stopping",
            RemoteState::Stopped => "Stopped",
            RemoteState::Redeploying => "Redeploying",
            RemoteState::Scaling => "Scaling",
            RemoteState::Deploying => "Deploying",
            RemoteState::Deployed => "Deployed",
            RemoteState::Terminating => "Terminating",
            RemoteState::Terminated => "Terminated",
            RemoteState::Unreachable => "Unreachable",
            RemoteState::EmptyCluster => "Empty cluster",
            RemoteState::Other(s) => s,
        }
    }

    /// Terminated or on its way there
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteState::Terminating | RemoteState::Terminated)
    }

    /// State is expected to change without further calls
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            RemoteState::Starting
                | RemoteState::Stopping
                | RemoteState::Redeploying
                | RemoteState::Scaling
                | RemoteState::Deploying
                | RemoteState::Terminating
        )
    }
}

impl Default for RemoteState {
    fn default() -> Self {
        RemoteState::Other(String::new())
    }
}

impl From<String> for RemoteState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Init" => RemoteState::Init,
            "Starting" => RemoteState::Starting,
            "Running" => RemoteState::Running,
            "Partly running" => RemoteState::PartlyRunning,
            "Stopping" => RemoteState::Stopping,
            "Stopped" => RemoteState::Stopped,
            "Redeploying" => RemoteState::Redeploying,
            "Scaling" => RemoteState::Scaling,
            "Deploying" => RemoteState::Deploying,
            "Deployed" => RemoteState::Deployed,
            "Terminating" => RemoteState::Terminating,
            "Terminated" => RemoteState::Terminated,
            "Unreachable" => RemoteState::Unreachable,
            "Empty cluster" => RemoteState::EmptyCluster,
            _ => RemoteState::Other(s),
        }
    }
}

impl From<RemoteState> for String {
    fn from(state: RemoteState) -> Self {
        match state {
            RemoteState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag reference as used in payloads and tag listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
}

impl TagRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Cluster, node or service record attached to a local entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Unique id
    #[serde(default)]
    pub uuid: String,
    /// API path of the resource, e.g. `/api/v1/service/<uuid>/`
    #[serde(default)]
    pub resource_uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: RemoteState,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    /// Remaining fields, kept for diagnostics
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Paginated list envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub objects: Vec<T>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Region record from the region collection
#[derive(Debug, Clone, Deserialize)]
pub struct RegionRecord {
    #[serde(default)]
    pub name: String,
    pub resource_uri: String,
    /// Node type resource uris available in this region
    #[serde(default)]
    pub node_types: Vec<String>,
}

impl RegionRecord {
    /// Find the node type uri whose last path segment is `node_type`
    pub fn node_type_uri(&self, node_type: &str) -> Option<&str> {
        self.node_types
            .iter()
            .map(String::as_str)
            .find(|uri| uri.trim_end_matches('/').rsplit('/').next() == Some(node_type))
    }
}
