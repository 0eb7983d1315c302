//! Service reconciliation steps

use super::settle::{poll_until, Settle};
use crate::api::{ListResponse, RemoteRecord, RemoteState, TagRef};
use crate::config::{EnvVar, PortSpec, Service};
use crate::context::DeployContext;
use crate::error::{DeployError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Steps of a service, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStep {
    BuildImage,
    PushImage,
    Fetch,
    ResolveTags,
    Create,
    Start,
    Update,
    Redeploy,
}

impl ServiceStep {
    /// Reconciliation steps, without the image steps
    pub const RECONCILE: [ServiceStep; 6] = [
        ServiceStep::Fetch,
        ServiceStep::ResolveTags,
        ServiceStep::Create,
        ServiceStep::Start,
        ServiceStep::Update,
        ServiceStep::Redeploy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceStep::BuildImage => "build image",
            ServiceStep::PushImage => "push image",
            ServiceStep::Fetch => "fetch",
            ServiceStep::ResolveTags => "resolve tags",
            ServiceStep::Create => "create",
            ServiceStep::Start => "start",
            ServiceStep::Update => "update",
            ServiceStep::Redeploy => "redeploy",
        }
    }

    pub async fn run(
        self,
        ctx: &mut DeployContext,
        services: &mut [Service],
        index: usize,
    ) -> Result<()> {
        match self {
            ServiceStep::BuildImage => build_image(ctx, entry(services, index)?).await,
            ServiceStep::PushImage => push_image(ctx, entry(services, index)?).await,
            ServiceStep::Fetch => fetch(ctx, entry(services, index)?).await,
            ServiceStep::ResolveTags => {
                resolve_tags(ctx, entry(services, index)?);
                Ok(())
            }
            ServiceStep::Create => create(ctx, services, index).await,
            ServiceStep::Start => start(ctx, entry(services, index)?).await,
            ServiceStep::Update => update(ctx, entry(services, index)?).await,
            ServiceStep::Redeploy => redeploy(ctx, entry(services, index)?).await,
        }
    }
}

fn entry(services: &mut [Service], index: usize) -> Result<&mut Service> {
    services
        .get_mut(index)
        .ok_or_else(|| DeployError::UnknownEntity(format!("service #{}", index)))
}

#[derive(Debug, Serialize)]
struct ServiceLink {
    to_service: String,
    name: String,
}

#[derive(Serialize)]
struct ServicePayload<'a> {
    name: &'a str,
    image: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    container_ports: &'a [PortSpec],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    container_envvars: &'a [EnvVar],
    #[serde(skip_serializing_if = "Option::is_none")]
    target_num_containers: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    linked_to_service: Vec<ServiceLink>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct TagsPayload {
    tags: Vec<TagRef>,
}

fn tag_refs(service: &Service) -> Vec<TagRef> {
    service.tags.iter().map(|t| TagRef::new(t)).collect()
}

fn remote_of(service: &Service) -> Result<&RemoteRecord> {
    service
        .remote
        .as_ref()
        .ok_or_else(|| DeployError::MissingRemote(format!("service {}", service.name)))
}

fn resource_path(remote: &RemoteRecord, action: &str) -> String {
    format!("/service/{}/{}", remote.uuid, action)
}

/// Build the service image when it has a build path
pub async fn build_image(ctx: &mut DeployContext, service: &mut Service) -> Result<()> {
    let Some(ref build) = service.build else {
        return Ok(());
    };

    let context = ctx.work_dir.join(build);
    ctx.images.build(&service.image, &context).await
}

pub async fn push_image(ctx: &mut DeployContext, service: &mut Service) -> Result<()> {
    if service.build.is_none() {
        return Ok(());
    }

    ctx.images.push(&service.image).await?;
    service.image_pushed = true;
    Ok(())
}

/// Find the live service with this name
pub async fn fetch(ctx: &mut DeployContext, service: &mut Service) -> Result<()> {
    tracing::info!("getting service {}", service.name);

    let list: ListResponse<RemoteRecord> = ctx
        .api
        .fetch(
            "fetching services",
            "/service/",
            &[("name", service.name.as_str())],
        )
        .await?;

    // Terminated services keep their name; only a live one counts.
    let mut live = list.objects.into_iter().filter(|s| !s.state.is_terminal());
    service.remote = live.next();

    if live.next().is_some() {
        tracing::warn!(
            "several live services named {}, using the first one",
            service.name
        );
    }

    if let Some(ref remote) = service.remote {
        tracing::info!("service {} state: {}", service.name, remote.state);
    }

    Ok(())
}

/// Look the service's tags up in the tag index built by the cluster and node steps
pub fn resolve_tags(ctx: &DeployContext, service: &mut Service) {
    service.resolved_tags = ctx.tags.resolve(&service.tags);

    for (tag, resources) in &service.resolved_tags {
        if resources.is_empty() {
            tracing::warn!(
                "service {}: no cluster or node carries tag {}",
                service.name,
                tag
            );
        } else {
            tracing::debug!("service {}: tag {} -> {:?}", service.name, tag, resources);
        }
    }
}

/// Create the service, linking it to the services it requires
pub async fn create(
    ctx: &mut DeployContext,
    services: &mut [Service],
    index: usize,
) -> Result<()> {
    let service = services
        .get(index)
        .ok_or_else(|| DeployError::UnknownEntity(format!("service #{}", index)))?;

    if service.remote.is_some() {
        tracing::info!(
            "create service: service {} is already created, skipping",
            service.name
        );
        return Ok(());
    }

    tracing::info!("creating service: {}", service.name);

    let links = service
        .require
        .iter()
        .map(|dep| -> Result<ServiceLink> {
            let uuid = services
                .iter()
                .find(|s| &s.name == dep)
                .and_then(|s| s.remote.as_ref())
                .map(|r| r.uuid.as_str())
                .filter(|uuid| !uuid.is_empty())
                .ok_or_else(|| DeployError::DependencyNotFound {
                    service: service.name.clone(),
                    dependency: dep.clone(),
                })?;

            Ok(ServiceLink {
                to_service: ctx.api.resource_uri("service", uuid),
                name: dep.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = ServicePayload {
        name: &service.name,
        image: &service.image,
        container_ports: &service.container_ports,
        container_envvars: &service.container_envvars,
        target_num_containers: service.target_num_containers,
        tags: tag_refs(service),
        linked_to_service: links,
        extra: &service.extra,
    };

    let operation = format!("creating {} service", service.name);
    let record: RemoteRecord = ctx.api.create(&operation, "/service/", &payload).await?;

    let operation = format!("waiting for {} service", service.name);
    let record = poll_until(
        &ctx.api,
        &ctx.settle,
        &operation,
        &resource_path(&record, ""),
        |r| {
            if r.state.is_terminal() {
                return Err(DeployError::Unavailable {
                    kind: "service",
                    name: service.name.clone(),
                    state: r.state.to_string(),
                });
            }
            Ok(if r.state.is_transitional() {
                Settle::Pending
            } else {
                Settle::Done
            })
        },
    )
    .await?;

    services[index].remote = Some(record);
    Ok(())
}

/// Start a service that is not running yet
pub async fn start(ctx: &mut DeployContext, service: &mut Service) -> Result<()> {
    let remote = remote_of(service)?;

    if !matches!(remote.state, RemoteState::Init | RemoteState::Stopped) {
        tracing::debug!(
            "service {} is {}, not starting",
            service.name,
            remote.state
        );
        return Ok(());
    }

    tracing::info!("starting service: {}({})", service.name, remote.uuid);

    let operation = format!("starting {} service", service.name);
    ctx.api
        .action(&operation, &resource_path(remote, "start/"))
        .await?;

    let operation = format!("waiting for {} service to run", service.name);
    let name = service.name.clone();
    let record = poll_until(
        &ctx.api,
        &ctx.settle,
        &operation,
        &resource_path(remote, ""),
        |r| {
            if r.state.is_terminal() {
                return Err(DeployError::Unavailable {
                    kind: "service",
                    name: name.clone(),
                    state: r.state.to_string(),
                });
            }
            Ok(if r.state == RemoteState::Running {
                Settle::Done
            } else {
                Settle::Pending
            })
        },
    )
    .await?;

    service.remote = Some(record);
    service.started = true;
    Ok(())
}

/// Assign the configured tags
pub async fn update(ctx: &mut DeployContext, service: &mut Service) -> Result<()> {
    let remote = remote_of(service)?;

    tracing::info!(
        "update service: updating service: {}({})",
        service.name,
        remote.uuid
    );

    let payload = TagsPayload {
        tags: tag_refs(service),
    };

    let operation = format!("updating {} service", service.name);
    let record: RemoteRecord = ctx
        .api
        .update(&operation, &resource_path(remote, ""), &payload)
        .await?;

    service.remote = Some(record);
    Ok(())
}

/// Redeploy a running service to pick up a new image
pub async fn redeploy(ctx: &mut DeployContext, service: &mut Service) -> Result<()> {
    let remote = remote_of(service)?;

    if remote.state != RemoteState::Running {
        tracing::debug!(
            "service {} is {}, not redeploying",
            service.name,
            remote.state
        );
        return Ok(());
    }

    if service.started {
        tracing::debug!("service {} was just started, not redeploying", service.name);
        return Ok(());
    }

    if !service.image_pushed && !ctx.options.force_redeploy {
        tracing::debug!("service {} has no new image, not redeploying", service.name);
        return Ok(());
    }

    tracing::info!("redeploying service: {}({})", service.name, remote.uuid);

    let operation = format!("redeploying {} service", service.name);
    ctx.api
        .action(&operation, &resource_path(remote, "redeploy/"))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::context::DeployOptions;
    use crate::reconcile::testing::{context, context_with, json};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer};

    fn services(yaml: &str) -> Vec<Service> {
        let doc = format!("clusters: []\nnodes: []\nservices:\n{}", yaml);
        ConfigLoader::parse_str(&doc).unwrap().services
    }

    fn running(uuid: &str) -> RemoteRecord {
        RemoteRecord {
            uuid: uuid.to_string(),
            resource_uri: format!("/api/v1/service/{}/", uuid),
            state: RemoteState::Running,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_skips_terminated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/"))
            .and(query_param("name", "web"))
            .respond_with(json(200, serde_json::json!({
                "objects": [
                    {"uuid": "old", "state": "Terminated"},
                    {"uuid": "s2", "state": "Stopped"}
                ]
            })))
            .mount(&server)
            .await;

        let mut ctx = context(&server);

        let mut list = services("  - name: web\n    image: nginx\n    tags: [web, gpu]\n");
        fetch(&mut ctx, &mut list[0]).await.unwrap();

        let service = &list[0];
        assert_eq!(service.remote.as_ref().unwrap().uuid, "s2");
        assert!(service.resolved_tags.is_empty());
    }

    #[test]
    fn test_resolve_tags_unknown_is_empty() {
        let mut list = services("  - name: web\n    image: nginx\n    tags: [web, gpu]\n");
        let mut ctx = DeployContext::local(std::env::temp_dir(), DeployOptions::default()).unwrap();
        ctx.tags.merge("/api/v1/node/n1/", ["web"]);

        resolve_tags(&ctx, &mut list[0]);

        assert_eq!(list[0].resolved_tags["web"], vec!["/api/v1/node/n1/"]);
        assert!(list[0].resolved_tags["gpu"].is_empty());
    }

    #[tokio::test]
    async fn test_fetch_none_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/"))
            .respond_with(json(200, serde_json::json!({
                "objects": [{"uuid": "old", "state": "Terminating"}]
            })))
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut list = services("  - name: web\n    image: nginx\n");
        fetch(&mut ctx, &mut list[0]).await.unwrap();
        assert!(list[0].remote.is_none());
    }

    #[tokio::test]
    async fn test_create_fails_without_dependency_remote() {
        let server = MockServer::start().await;
        let mut ctx = context(&server);
        let mut list = services(
            "  - name: db\n    image: postgres\n  - name: web\n    image: nginx\n    require: [db]\n",
        );

        let result = create(&mut ctx, &mut list, 1).await;
        match result {
            Err(DeployError::DependencyNotFound {
                service,
                dependency,
            }) => {
                assert_eq!(service, "web");
                assert_eq!(dependency, "db");
            }
            other => panic!("expected missing dependency, got {:?}", other),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_links_dependencies_and_waits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/service/"))
            .and(body_json(serde_json::json!({
                "name": "web",
                "image": "nginx",
                "container_ports": [
                    {"protocol": "tcp", "inner_port": 80, "outer_port": 80, "published": true}
                ],
                "container_envvars": [{"key": "MODE", "value": "prod"}],
                "target_num_containers": 2,
                "linked_to_service": [{"to_service": "/api/v1/service/d1/", "name": "db"}],
                "autorestart": "ALWAYS"
            })))
            .respond_with(json(201, serde_json::json!({"uuid": "w1", "state": "Init"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/w1/"))
            .respond_with(json(200, serde_json::json!({"uuid": "w1", "state": "Init"})))
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut list = services(
            r#"  - name: db
    image: postgres
  - name: web
    image: nginx
    build: ./web
    require: [db]
    containers: 2
    ports: ["80:80"]
    env:
      MODE: prod
    autorestart: ALWAYS
"#,
        );
        list[0].remote = Some(running("d1"));

        create(&mut ctx, &mut list, 1).await.unwrap();
        assert_eq!(list[1].remote.as_ref().unwrap().state, RemoteState::Init);
    }

    #[tokio::test]
    async fn test_start_waits_until_running() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/service/w1/start/"))
            .respond_with(json(202, serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/w1/"))
            .respond_with(json(200, serde_json::json!({"uuid": "w1", "state": "Starting"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/w1/"))
            .respond_with(json(200, serde_json::json!({"uuid": "w1", "state": "Running"})))
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut list = services("  - name: web\n    image: nginx\n");
        list[0].remote = Some(RemoteRecord {
            uuid: "w1".to_string(),
            state: RemoteState::Init,
            ..Default::default()
        });

        start(&mut ctx, &mut list[0]).await.unwrap();
        assert!(list[0].started);
        assert_eq!(list[0].remote.as_ref().unwrap().state, RemoteState::Running);
    }

    #[tokio::test]
    async fn test_start_skips_running_service() {
        let server = MockServer::start().await;
        let mut ctx = context(&server);
        let mut list = services("  - name: web\n    image: nginx\n");
        list[0].remote = Some(running("w1"));

        start(&mut ctx, &mut list[0]).await.unwrap();
        assert!(!list[0].started);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_sends_only_tags() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/service/w1/"))
            .and(body_json(serde_json::json!({"tags": [{"name": "web"}]})))
            .respond_with(json(200, serde_json::json!({"uuid": "w1", "state": "Running"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        let mut list =
            services("  - name: web\n    image: nginx\n    tags: [web]\n    containers: 3\n");
        list[0].remote = Some(running("w1"));

        update(&mut ctx, &mut list[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_redeploy_only_with_new_image_or_forced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/service/w1/redeploy/"))
            .respond_with(json(202, serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let mut list = services("  - name: web\n    image: nginx\n");
        list[0].remote = Some(running("w1"));

        let mut ctx = context(&server);
        redeploy(&mut ctx, &mut list[0]).await.unwrap();

        list[0].image_pushed = true;
        redeploy(&mut ctx, &mut list[0]).await.unwrap();

        list[0].image_pushed = false;
        let mut forced = context_with(
            &server,
            DeployOptions {
                build: true,
                force_redeploy: true,
            },
        );
        redeploy(&mut forced, &mut list[0]).await.unwrap();

        list[0].started = true;
        redeploy(&mut forced, &mut list[0]).await.unwrap();
    }
}
