//! Per-run state shared by every reconciliation step

use crate::api::client::API_URL_ENV;
use crate::api::{ApiClient, ApiConfig, Credentials};
use crate::error::Result;
use crate::image::ImageTool;
use crate::reconcile::{SettlePolicy, TagIndex};
use std::collections::HashMap;
use std::path::PathBuf;

/// Switches for an `up` run
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Build and push images for services with a build path
    pub build: bool,
    /// Redeploy running services even if no new image was pushed
    pub force_redeploy: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            build: true,
            force_redeploy: false,
        }
    }
}

/// Everything a step needs besides the configuration tree
pub struct DeployContext {
    pub api: ApiClient,
    pub tags: TagIndex,
    pub settle: SettlePolicy,
    pub images: ImageTool,
    /// Directory build paths are relative to
    pub work_dir: PathBuf,
    pub options: DeployOptions,
}

impl DeployContext {
    pub fn new(api: ApiClient, work_dir: PathBuf, options: DeployOptions) -> Self {
        Self {
            api,
            tags: TagIndex::new(),
            settle: SettlePolicy::default(),
            images: ImageTool::default(),
            work_dir,
            options,
        }
    }

    /// Build a context from process environment values
    ///
    /// The API host comes from `api_url`, then `TUTUM_API_URL`, then the
    /// default host.
    pub fn from_env(
        env: &HashMap<String, String>,
        api_url: Option<&str>,
        work_dir: PathBuf,
        options: DeployOptions,
    ) -> Result<Self> {
        let credentials = Credentials::from_env(env)?;

        let mut config = ApiConfig::default();
        if let Some(url) = api_url.or_else(|| env.get(API_URL_ENV).map(String::as_str)) {
            config = config.with_base_url(url);
        }

        let api = ApiClient::new(config, credentials)?;
        Ok(Self::new(api, work_dir, options))
    }

    /// Context for commands that never reach the API
    pub fn local(work_dir: PathBuf, options: DeployOptions) -> Result<Self> {
        let api = ApiClient::new(ApiConfig::default(), Credentials::default())?;
        Ok(Self::new(api, work_dir, options))
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_images(mut self, images: ImageTool) -> Self {
        self.images = images;
        self
    }
}
