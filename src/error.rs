//! Error types for tutum-deploy

use thiserror::Error;

/// Result type for deploy operations
pub type Result<T> = std::result::Result<T, DeployError>;

/// Deploy error types
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("tutum conf read error: {0}")]
    ConfigRead(String),

    #[error("tutum conf template error: {variable} setting is undefined")]
    ConfigTemplate { variable: String },

    #[error("tutum conf parse error: {0}")]
    ConfigParse(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("error {operation} (status {status}): {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("service {service} requires {dependency}, which has no remote record")]
    DependencyNotFound { service: String, dependency: String },

    #[error("{kind} {name} is {state}")]
    Unavailable {
        kind: &'static str,
        name: String,
        state: String,
    },

    #[error("Region not found: {0}")]
    RegionNotFound(String),

    #[error("Node type {node_type} not available in region {region}")]
    NodeTypeNotFound { region: String, node_type: String },

    #[error("{0} has no remote record")]
    MissingRemote(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    pub(crate) fn transport(operation: impl Into<String>, err: reqwest::Error) -> Self {
        DeployError::Transport {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}
