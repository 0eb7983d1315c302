//! Node reconciliation steps
//!
//! Nodes are linked to the account outside of this tool; a run only reads
//! them, assigns their tags and deploys them when they are still `Init`.

use super::cluster::resource_key;
use crate::api::{ListResponse, RemoteRecord, RemoteState, TagRef};
use crate::config::Node;
use crate::context::DeployContext;
use crate::error::{DeployError, Result};
use serde::Serialize;

/// Steps of a node, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStep {
    Fetch,
    Create,
    FetchTags,
    UpdateTags,
    Deploy,
}

impl NodeStep {
    pub const ALL: [NodeStep; 5] = [
        NodeStep::Fetch,
        NodeStep::Create,
        NodeStep::FetchTags,
        NodeStep::UpdateTags,
        NodeStep::Deploy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeStep::Fetch => "fetch",
            NodeStep::Create => "create",
            NodeStep::FetchTags => "fetch tags",
            NodeStep::UpdateTags => "update tags",
            NodeStep::Deploy => "deploy",
        }
    }

    pub async fn run(self, ctx: &mut DeployContext, node: &mut Node) -> Result<()> {
        match self {
            NodeStep::Fetch => fetch(ctx, node).await,
            NodeStep::Create => create(node),
            NodeStep::FetchTags => fetch_tags(ctx, node).await,
            NodeStep::UpdateTags => update_tags(ctx, node).await,
            NodeStep::Deploy => deploy(ctx, node).await,
        }
    }
}

#[derive(Serialize)]
struct TagsPayload {
    tags: Vec<TagRef>,
}

fn remote_of(node: &Node) -> Result<&RemoteRecord> {
    node.remote
        .as_ref()
        .ok_or_else(|| DeployError::MissingRemote(format!("node {}", node.label())))
}

pub async fn fetch(ctx: &mut DeployContext, node: &mut Node) -> Result<()> {
    tracing::info!("getting node: {}", node.label());

    let operation = format!("getting node {}", node.label());
    let path = format!("/node/{}/", node.uuid);
    let Some(record) = ctx.api.fetch_optional::<RemoteRecord>(&operation, &path).await? else {
        tracing::warn!("node {} not found", node.label());
        node.remote = None;
        return Ok(());
    };

    tracing::info!("node {} state: {}", node.label(), record.state);

    if record.state.is_terminal() {
        return Err(DeployError::Unavailable {
            kind: "node",
            name: node.label().to_string(),
            state: record.state.to_string(),
        });
    }

    node.remote = Some(record);
    Ok(())
}

/// Nodes cannot be created through the API
pub fn create(node: &mut Node) -> Result<()> {
    if node.remote.is_none() {
        return Err(DeployError::Unsupported(format!(
            "node {} does not exist and nodes cannot be created; link it to the account first",
            node.label()
        )));
    }

    tracing::debug!("node {} exists, nothing to create", node.label());
    Ok(())
}

pub async fn fetch_tags(ctx: &mut DeployContext, node: &mut Node) -> Result<()> {
    let remote = remote_of(node)?;

    let operation = format!("getting node {} tags", node.label());
    let path = format!("/node/{}/tags/", remote.uuid);
    let list: ListResponse<TagRef> = ctx.api.fetch(&operation, &path, &[]).await?;

    ctx.tags.merge(
        &resource_key(remote),
        list.objects.iter().map(|t| t.name.as_str()),
    );
    Ok(())
}

/// Replace the node's tags with the configured ones
pub async fn update_tags(ctx: &mut DeployContext, node: &mut Node) -> Result<()> {
    let uuid = remote_of(node)?.uuid.clone();

    tracing::info!("updating node {} tags: {:?}", node.label(), node.tags);

    let payload = TagsPayload {
        tags: node.tags.iter().map(|t| TagRef::new(t)).collect(),
    };

    let operation = format!("updating node {}", node.label());
    let path = format!("/node/{}/", uuid);
    let record: RemoteRecord = ctx.api.update(&operation, &path, &payload).await?;

    ctx.tags
        .replace(&resource_key(&record), node.tags.iter().map(String::as_str));
    node.remote = Some(record);
    Ok(())
}

pub async fn deploy(ctx: &mut DeployContext, node: &mut Node) -> Result<()> {
    let remote = remote_of(node)?;

    if remote.state != RemoteState::Init {
        tracing::info!(
            "node {} is in the {} state, skipping",
            node.label(),
            remote.state
        );
        return Ok(());
    }

    tracing::info!("deploying node: {}", node.label());

    let operation = format!("deploying node {}", node.label());
    let path = format!("/node/{}/deploy/", remote.uuid);
    ctx.api.action(&operation, &path).await
}
