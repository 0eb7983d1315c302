//! Helpers shared by the reconciliation tests

use crate::api::{ApiClient, ApiConfig, Credentials};
use crate::context::{DeployContext, DeployOptions};
use crate::image::ImageTool;
use crate::reconcile::SettlePolicy;
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

/// Context pointed at a mock API, with instant polling and a no-op image tool
pub fn context(server: &MockServer) -> DeployContext {
    context_with(server, DeployOptions::default())
}

pub fn context_with(server: &MockServer, options: DeployOptions) -> DeployContext {
    let api = ApiClient::new(
        ApiConfig::default().with_base_url(&server.uri()),
        Credentials::new("alice", "s3cret"),
    )
    .unwrap();

    DeployContext::new(api, std::env::temp_dir(), options)
        .with_settle(SettlePolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
        })
        .with_images(ImageTool::new("true"))
}

pub fn json(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}
