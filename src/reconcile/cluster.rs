//! Cluster reconciliation steps

use crate::api::{ListResponse, RegionRecord, RemoteRecord, RemoteState, TagRef};
use crate::config::{Cluster, Placement};
use crate::context::DeployContext;
use crate::error::{DeployError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Steps of a cluster, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStep {
    Fetch,
    ResolveRegion,
    Create,
    FetchTags,
    Deploy,
}

impl ClusterStep {
    pub const ALL: [ClusterStep; 5] = [
        ClusterStep::Fetch,
        ClusterStep::ResolveRegion,
        ClusterStep::Create,
        ClusterStep::FetchTags,
        ClusterStep::Deploy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClusterStep::Fetch => "fetch",
            ClusterStep::ResolveRegion => "resolve region",
            ClusterStep::Create => "create",
            ClusterStep::FetchTags => "fetch tags",
            ClusterStep::Deploy => "deploy",
        }
    }

    pub async fn run(self, ctx: &mut DeployContext, cluster: &mut Cluster) -> Result<()> {
        match self {
            ClusterStep::Fetch => fetch(ctx, cluster).await,
            ClusterStep::ResolveRegion => resolve_region(ctx, cluster).await,
            ClusterStep::Create => create(ctx, cluster).await,
            ClusterStep::FetchTags => fetch_tags(ctx, cluster).await,
            ClusterStep::Deploy => deploy(ctx, cluster).await,
        }
    }
}

#[derive(Serialize)]
struct ClusterPayload<'a> {
    name: &'a str,
    region: &'a str,
    node_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_num_nodes: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagRef>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

fn remote_of<'a>(cluster: &'a Cluster) -> Result<&'a RemoteRecord> {
    cluster
        .remote
        .as_ref()
        .ok_or_else(|| DeployError::MissingRemote(format!("cluster {}", cluster.name)))
}

/// Look the cluster up by name
pub async fn fetch(ctx: &mut DeployContext, cluster: &mut Cluster) -> Result<()> {
    tracing::info!("getting cluster: {}", cluster.name);

    let operation = format!("getting cluster {}", cluster.name);
    let list: ListResponse<RemoteRecord> = ctx
        .api
        .fetch(&operation, "/nodecluster/", &[("name", cluster.name.as_str())])
        .await?;

    cluster.remote = list.objects.into_iter().next();

    if let Some(ref remote) = cluster.remote {
        tracing::info!("cluster {} state: {}", cluster.name, remote.state);
        if remote.state.is_terminal() {
            return Err(DeployError::Unavailable {
                kind: "cluster",
                name: cluster.name.clone(),
                state: remote.state.to_string(),
            });
        }
    }

    Ok(())
}

/// Turn the region and node type names into resource uris
pub async fn resolve_region(ctx: &mut DeployContext, cluster: &mut Cluster) -> Result<()> {
    if cluster.remote.is_some() || cluster.placement.is_some() {
        return Ok(());
    }

    if cluster.region_is_reference() {
        cluster.placement = Some(Placement {
            region: cluster.region.clone(),
            node_type: cluster.node_type.clone(),
        });
        return Ok(());
    }

    tracing::info!("getting region: {}", cluster.region);

    let list: ListResponse<RegionRecord> = ctx
        .api
        .fetch("getting region", "/region/", &[("name", cluster.region.as_str())])
        .await?;

    let region = list
        .objects
        .into_iter()
        .next()
        .ok_or_else(|| DeployError::RegionNotFound(cluster.region.clone()))?;

    let node_type = region
        .node_type_uri(&cluster.node_type)
        .ok_or_else(|| DeployError::NodeTypeNotFound {
            region: cluster.region.clone(),
            node_type: cluster.node_type.clone(),
        })?
        .to_string();

    tracing::debug!(
        "cluster {} placed in {} as {}",
        cluster.name,
        region.resource_uri,
        node_type
    );

    cluster.placement = Some(Placement {
        region: region.resource_uri,
        node_type,
    });

    Ok(())
}

/// Create the cluster if it does not exist
pub async fn create(ctx: &mut DeployContext, cluster: &mut Cluster) -> Result<()> {
    if cluster.remote.is_some() {
        tracing::info!("{} cluster already created, skipping", cluster.name);
        return Ok(());
    }

    tracing::info!("creating cluster: {}", cluster.name);

    let (region, node_type) = match cluster.placement {
        Some(ref p) => (p.region.as_str(), p.node_type.as_str()),
        None => (cluster.region.as_str(), cluster.node_type.as_str()),
    };

    let payload = ClusterPayload {
        name: &cluster.name,
        region,
        node_type,
        target_num_nodes: cluster.target_num_nodes,
        tags: cluster.tags.iter().map(|t| TagRef::new(t)).collect(),
        extra: &cluster.extra,
    };

    let operation = format!("creating {} cluster", cluster.name);
    let record: RemoteRecord = ctx.api.create(&operation, "/nodecluster/", &payload).await?;

    cluster.remote = Some(record);
    Ok(())
}

/// Add the cluster's tags to the tag index
pub async fn fetch_tags(ctx: &mut DeployContext, cluster: &mut Cluster) -> Result<()> {
    let remote = remote_of(cluster)?;

    let operation = format!("getting {} cluster tags", cluster.name);
    let path = format!("/nodecluster/{}/tags/", remote.uuid);
    let list: ListResponse<TagRef> = ctx.api.fetch(&operation, &path, &[]).await?;

    let resource = resource_key(remote);
    ctx.tags
        .merge(&resource, list.objects.iter().map(|t| t.name.as_str()));

    tracing::debug!("cluster {} tags: {:?}", cluster.name, list.objects);
    Ok(())
}

/// Deploy the cluster's nodes when it has never been deployed
pub async fn deploy(ctx: &mut DeployContext, cluster: &mut Cluster) -> Result<()> {
    let remote = remote_of(cluster)?;

    if remote.state != RemoteState::Init {
        tracing::info!(
            "{} cluster is in the {} state, skipping",
            cluster.name,
            remote.state
        );
        return Ok(());
    }

    tracing::info!("deploying cluster: {}", cluster.name);

    let operation = format!("deploying {} cluster", cluster.name);
    let path = format!("/nodecluster/{}/deploy/", remote.uuid);
    ctx.api.action(&operation, &path).await
}

pub(crate) fn resource_key(remote: &RemoteRecord) -> String {
    if remote.resource_uri.is_empty() {
        remote.uuid.clone()
    } else {
        remote.resource_uri.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::reconcile::testing::{context, json};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer};

    fn cluster(yaml: &str) -> Cluster {
        let doc = format!("cluster:\n{}\nservices: []\n", yaml);
        ConfigLoader::parse_str(&doc).unwrap().clusters.remove(0)
    }

    #[tokio::test]
    async fn test_fetch_terminating_cluster_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodecluster/"))
            .and(query_param("name", "prod"))
            .respond_with(json(200, serde_json::json!({
                "objects": [{"uuid": "c1", "state": "Terminating"}]
            })))
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut c = cluster("  name: prod\n  region: ams1\n  type: 512mb");
        let result = fetch(&mut ctx, &mut c).await;

        match result {
            Err(DeployError::Unavailable { kind, state, .. }) => {
                assert_eq!(kind, "cluster");
                assert_eq!(state, "Terminating");
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_region_and_create() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/region/"))
            .and(query_param("name", "ams1"))
            .respond_with(json(200, serde_json::json!({
                "objects": [{
                    "name": "ams1",
                    "resource_uri": "/api/v1/region/digitalocean/ams1/",
                    "node_types": [
                        "/api/v1/nodetype/digitalocean/1gb/",
                        "/api/v1/nodetype/digitalocean/512mb/"
                    ]
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/nodecluster/"))
            .and(body_partial_json(serde_json::json!({
                "name": "prod",
                "region": "/api/v1/region/digitalocean/ams1/",
                "node_type": "/api/v1/nodetype/digitalocean/512mb/",
                "target_num_nodes": 2,
                "provider": "digitalocean"
            })))
            .respond_with(json(201, serde_json::json!({
                "uuid": "c1",
                "resource_uri": "/api/v1/nodecluster/c1/",
                "state": "Init"
            })))
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut c = cluster(
            "  name: prod\n  region: ams1\n  type: 512mb\n  nodes: 2\n  provider: digitalocean",
        );

        resolve_region(&mut ctx, &mut c).await.unwrap();
        create(&mut ctx, &mut c).await.unwrap();

        assert_eq!(c.remote.as_ref().unwrap().state, RemoteState::Init);
    }

    #[tokio::test]
    async fn test_unknown_node_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/region/"))
            .respond_with(json(200, serde_json::json!({
                "objects": [{
                    "resource_uri": "/api/v1/region/digitalocean/ams1/",
                    "node_types": ["/api/v1/nodetype/digitalocean/1gb/"]
                }]
            })))
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut c = cluster("  name: prod\n  region: ams1\n  type: 512mb");
        let result = resolve_region(&mut ctx, &mut c).await;
        assert!(matches!(result, Err(DeployError::NodeTypeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_region_reference_skips_lookup() {
        let server = MockServer::start().await;
        let mut ctx = context(&server);
        let mut c = cluster(
            "  name: prod\n  region: /api/v1/region/aws/us-east-1/\n  type: /api/v1/nodetype/aws/t2.micro/",
        );

        resolve_region(&mut ctx, &mut c).await.unwrap();
        assert_eq!(
            c.placement,
            Some(Placement {
                region: "/api/v1/region/aws/us-east-1/".to_string(),
                node_type: "/api/v1/nodetype/aws/t2.micro/".to_string(),
            })
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_skips_unless_init() {
        let server = MockServer::start().await;
        let mut ctx = context(&server);
        let mut c = cluster("  name: prod\n  region: ams1\n  type: 512mb");
        c.remote = Some(RemoteRecord {
            uuid: "c1".to_string(),
            state: RemoteState::Stopped,
            ..Default::default()
        });

        deploy(&mut ctx, &mut c).await.unwrap();
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_tags_requires_remote() {
        let server = MockServer::start().await;
        let mut ctx = context(&server);
        let mut c = cluster("  name: prod\n  region: ams1\n  type: 512mb");
        let result = fetch_tags(&mut ctx, &mut c).await;
        assert!(matches!(result, Err(DeployError::MissingRemote(_))));
    }
}
