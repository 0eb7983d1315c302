//! Sequential step runner
//!
//! A [`Batch`] is an ordered list of steps. Running it executes one step at a
//! time and stops at the first error; nothing already applied is rolled back.

use crate::config::DeployConfig;
use crate::context::{DeployContext, DeployOptions};
use crate::error::{DeployError, Result};
use crate::reconcile::{ClusterStep, NodeStep, ServiceStep};

/// One step against one entity of the configuration tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Cluster { index: usize, step: ClusterStep },
    Node { index: usize, step: NodeStep },
    Service { index: usize, step: ServiceStep },
}

impl Step {
    /// Human-readable label, e.g. `service web: create`
    pub fn describe(&self, config: &DeployConfig) -> String {
        let (kind, name, step) = match *self {
            Step::Cluster { index, step } => (
                "cluster",
                config.clusters.get(index).map(|c| c.name.as_str()),
                step.name(),
            ),
            Step::Node { index, step } => (
                "node",
                config.nodes.get(index).map(|n| n.label()),
                step.name(),
            ),
            Step::Service { index, step } => (
                "service",
                config.services.get(index).map(|s| s.name.as_str()),
                step.name(),
            ),
        };

        format!("{} {}: {}", kind, name.unwrap_or("?"), step)
    }

    pub async fn run(&self, ctx: &mut DeployContext, config: &mut DeployConfig) -> Result<()> {
        match *self {
            Step::Cluster { index, step } => {
                let cluster = config
                    .clusters
                    .get_mut(index)
                    .ok_or_else(|| DeployError::UnknownEntity(format!("cluster #{}", index)))?;
                step.run(ctx, cluster).await
            }
            Step::Node { index, step } => {
                let node = config
                    .nodes
                    .get_mut(index)
                    .ok_or_else(|| DeployError::UnknownEntity(format!("node #{}", index)))?;
                step.run(ctx, node).await
            }
            Step::Service { index, step } => step.run(ctx, &mut config.services, index).await,
        }
    }
}

/// Ordered list of steps, run with a concurrency of one
#[derive(Debug, Clone, Default)]
pub struct Batch {
    steps: Vec<Step>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Bring the remote system up to date: clusters, then nodes, then services
    pub fn up(config: &DeployConfig, options: &DeployOptions) -> Self {
        let mut batch = Self::new();

        for index in 0..config.clusters.len() {
            for step in ClusterStep::ALL {
                batch.push(Step::Cluster { index, step });
            }
        }

        for index in 0..config.nodes.len() {
            for step in NodeStep::ALL {
                batch.push(Step::Node { index, step });
            }
        }

        let build = options.build && config.build_enabled();

        for (index, service) in config.services.iter().enumerate() {
            if build && service.build.is_some() {
                batch.push(Step::Service {
                    index,
                    step: ServiceStep::BuildImage,
                });
                batch.push(Step::Service {
                    index,
                    step: ServiceStep::PushImage,
                });
            }

            for step in ServiceStep::RECONCILE {
                batch.push(Step::Service { index, step });
            }
        }

        batch
    }

    /// Read the remote state of every entity
    pub fn status(config: &DeployConfig) -> Self {
        let mut batch = Self::new();

        for index in 0..config.clusters.len() {
            batch.push(Step::Cluster {
                index,
                step: ClusterStep::Fetch,
            });
        }

        for index in 0..config.nodes.len() {
            batch.push(Step::Node {
                index,
                step: NodeStep::Fetch,
            });
        }

        for index in 0..config.services.len() {
            batch.push(Step::Service {
                index,
                step: ServiceStep::Fetch,
            });
        }

        batch
    }

    /// Build and push every service image that has a build path
    pub fn images(config: &DeployConfig) -> Self {
        let mut batch = Self::new();

        for (index, service) in config.services.iter().enumerate() {
            if service.build.is_some() {
                batch.push(Step::Service {
                    index,
                    step: ServiceStep::BuildImage,
                });
                batch.push(Step::Service {
                    index,
                    step: ServiceStep::PushImage,
                });
            }
        }

        batch
    }

    /// Run every step in order, stopping at the first failure
    pub async fn run(&self, ctx: &mut DeployContext, config: &mut DeployConfig) -> Result<()> {
        for step in &self.steps {
            let label = step.describe(config);
            tracing::debug!("{}", label);

            if let Err(e) = step.run(ctx, config).await {
                tracing::debug!("{} failed", label);
                return Err(e);
            }
        }

        Ok(())
    }
}
