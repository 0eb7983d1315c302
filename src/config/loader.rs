//! Deploy file loader: templating, parsing, normalization and validation

use super::model::{Cluster, DeployConfig, Node, Service};
use super::raw::RawDocument;
use crate::error::{DeployError, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Default deploy file names
pub const DEFAULT_CONFIG_FILES: &[&str] = &["tutum.yaml", "tutum.yml"];

/// Prefix of environment variables that fill `{{NAME}}` placeholders
pub const ENV_PREFIX: &str = "TUTUM_";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// Deploy file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Find the deploy file in a directory
    pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Read, template and parse a deploy file
    pub fn load(path: &Path, env: &HashMap<String, String>) -> Result<DeployConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeployError::ConfigRead(format!("{}: {}", path.display(), e)))?;

        let content = Self::substitute(&content, env)?;
        Self::parse_str(&content)
    }

    /// Replace every `{{NAME}}` with the value of `TUTUM_NAME`
    pub fn substitute(content: &str, env: &HashMap<String, String>) -> Result<String> {
        let mut result = String::with_capacity(content.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(content) {
            let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            let variable = format!("{}{}", ENV_PREFIX, name.as_str());
            let value = env
                .get(&variable)
                .filter(|v| !v.is_empty())
                .ok_or(DeployError::ConfigTemplate { variable })?;

            result.push_str(&content[last..token.start()]);
            result.push_str(value);
            last = token.end();
        }

        result.push_str(&content[last..]);
        Ok(result)
    }

    /// Parse and normalize a deploy document
    pub fn parse_str(content: &str) -> Result<DeployConfig> {
        let doc: RawDocument = serde_yaml::from_str(content)
            .map_err(|e| DeployError::ConfigParse(e.to_string()))?;

        let config = Self::normalize(doc)?;

        for warning in Self::validate(&config)? {
            tracing::warn!("{}", warning);
        }

        Ok(config)
    }

    fn normalize(doc: RawDocument) -> Result<DeployConfig> {
        let clusters = match (doc.cluster, doc.clusters) {
            (Some(_), Some(_)) => {
                return Err(DeployError::ConfigParse(
                    "use either 'cluster' or 'clusters', not both".to_string(),
                ))
            }
            (Some(cluster), None) => vec![cluster],
            (None, Some(clusters)) => clusters,
            (None, None) if doc.nodes.is_none() && doc.services.is_some() => {
                // Without `clusters`/`nodes` the document is the short form,
                // which names its cluster explicitly.
                return Err(DeployError::ConfigParse("cluster info required".to_string()));
            }
            (None, None) => Vec::new(),
        };

        let services = doc
            .services
            .ok_or_else(|| DeployError::ConfigParse("services info required".to_string()))?;

        Ok(DeployConfig {
            clusters: clusters
                .into_iter()
                .map(Cluster::try_from)
                .collect::<Result<_>>()?,
            nodes: doc.nodes.unwrap_or_default().into_iter().map(Node::from).collect(),
            services: services
                .into_iter()
                .map(Service::try_from)
                .collect::<Result<_>>()?,
        })
    }

    /// Validate a configuration tree, returning warnings
    pub fn validate(config: &DeployConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        unique("cluster", config.clusters.iter().map(|c| c.name.as_str()))?;
        unique("node", config.nodes.iter().map(|n| n.uuid.as_str()))?;
        unique("service", config.services.iter().map(|s| s.name.as_str()))?;

        for (index, service) in config.services.iter().enumerate() {
            for dep in &service.require {
                match config.services.iter().position(|s| &s.name == dep) {
                    None => {
                        return Err(DeployError::ConfigParse(format!(
                            "service '{}' requires unknown service '{}'",
                            service.name, dep
                        )))
                    }
                    Some(pos) if pos >= index => warnings.push(format!(
                        "service '{}' requires '{}', which is declared after it and will not exist yet",
                        service.name, dep
                    )),
                    Some(_) => {}
                }
            }
        }

        if config.clusters.is_empty() && config.nodes.is_empty() && !config.services.is_empty() {
            warnings.push(
                "no clusters or nodes declared; services deploy onto existing nodes".to_string(),
            );
        }

        Ok(warnings)
    }
}

fn unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(DeployError::ConfigParse(format!("{} name must not be empty", kind)));
        }
        if !seen.insert(name) {
            return Err(DeployError::ConfigParse(format!("duplicate {} '{}'", kind, name)));
        }
    }
    Ok(())
}
