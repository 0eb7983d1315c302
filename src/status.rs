//! Status table for the `ps` command

use crate::api::RemoteRecord;
use crate::config::DeployConfig;
use std::fmt::Write;

/// One line of the status table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub kind: &'static str,
    pub name: String,
    pub state: String,
    pub uuid: String,
}

impl StatusRow {
    fn new(kind: &'static str, name: &str, remote: Option<&RemoteRecord>) -> Self {
        let (state, uuid) = match remote {
            Some(r) => (r.state.to_string(), r.uuid.clone()),
            None => ("Not created".to_string(), "-".to_string()),
        };

        Self {
            kind,
            name: name.to_string(),
            state,
            uuid,
        }
    }
}

/// Rows for every entity, in configuration order
pub fn rows(config: &DeployConfig) -> Vec<StatusRow> {
    let clusters = config
        .clusters
        .iter()
        .map(|c| StatusRow::new("cluster", &c.name, c.remote.as_ref()));
    let nodes = config
        .nodes
        .iter()
        .map(|n| StatusRow::new("node", n.label(), n.remote.as_ref()));
    let services = config
        .services
        .iter()
        .map(|s| StatusRow::new("service", &s.name, s.remote.as_ref()));

    clusters.chain(nodes).chain(services).collect()
}

pub fn render(rows: &[StatusRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<24} {:<16} {:<38}",
        "KIND", "NAME", "STATE", "UUID"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<10} {:<24} {:<16} {:<38}",
            row.kind, row.name, row.state, row.uuid
        );
    }
    out
}
