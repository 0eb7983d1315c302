//! Authenticated client for the orchestration REST API

use crate::error::{DeployError, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default API host
pub const DEFAULT_API_URL: &str = "https://dashboard.tutum.co";

/// API version used in the path prefix
pub const API_VERSION: u32 = 1;

/// Environment variable holding the API user id
pub const USER_ENV: &str = "TUTUM_USER";

/// Environment variable holding the API key
pub const APIKEY_ENV: &str = "TUTUM_APIKEY";

/// Environment variable overriding the API host
pub const API_URL_ENV: &str = "TUTUM_API_URL";

/// API credentials
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(user: &str, api_key: &str) -> Self {
        Self {
            user: user.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Read credentials from an environment map
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self> {
        let lookup = |key: &str| {
            env.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| DeployError::Credentials(format!("{} is not set", key)))
        };

        Ok(Self {
            user: lookup(USER_ENV)?,
            api_key: lookup(APIKEY_ENV)?,
        })
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("ApiKey {}:{}", self.user, self.api_key)
    }
}

/// API client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API host, without the version prefix
    pub base_url: String,
    /// API version
    pub version: u32,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            version: API_VERSION,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Raw response: status plus body text
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Orchestration API client
pub struct ApiClient {
    config: ApiConfig,
    credentials: Credentials,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: ApiConfig, credentials: Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeployError::transport("client setup", e))?;

        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Path prefix of every endpoint, e.g. `/api/v1`
    pub fn prefix(&self) -> String {
        format!("/api/v{}", self.config.version)
    }

    /// Resource uri of an entity in a collection
    pub fn resource_uri(&self, collection: &str, uuid: &str) -> String {
        format!("{}/{}/{}/", self.prefix(), collection, uuid)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.config.base_url, self.prefix(), path)
    }

    /// Send a request and return the raw response
    pub async fn send(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let url = self.url(path);
        tracing::debug!("{} {} ({})", method, url, operation);

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", self.credentials.authorization())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeployError::transport(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeployError::transport(operation, e))?;

        tracing::debug!("{} -> {}", url, status);

        Ok(ApiResponse { status, body })
    }

    /// GET, expecting 200
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.send(operation, Method::GET, path, query, None).await?;
        Self::expect(operation, response, StatusCode::OK)
    }

    /// GET, expecting 200; a 404 yields `None`
    pub async fn fetch_optional<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
    ) -> Result<Option<T>> {
        let response = self.send(operation, Method::GET, path, &[], None).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::expect(operation, response, StatusCode::OK).map(Some)
    }

    /// POST to a collection, expecting 201
    pub async fn create<T: DeserializeOwned, B: Serialize>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .send(operation, Method::POST, path, &[], Some(&body))
            .await?;
        Self::expect(operation, response, StatusCode::CREATED)
    }

    /// PATCH a resource, expecting 200
    pub async fn update<T: DeserializeOwned, B: Serialize>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .send(operation, Method::PATCH, path, &[], Some(&body))
            .await?;
        Self::expect(operation, response, StatusCode::OK)
    }

    /// POST an asynchronous action (deploy/start/redeploy), expecting 202
    pub async fn action(&self, operation: &str, path: &str) -> Result<()> {
        let body = serde_json::json!({});
        let response = self
            .send(operation, Method::POST, path, &[], Some(&body))
            .await?;

        if response.status != StatusCode::ACCEPTED {
            return Err(Self::unexpected(operation, response));
        }

        Ok(())
    }

    fn expect<T: DeserializeOwned>(
        operation: &str,
        response: ApiResponse,
        expected: StatusCode,
    ) -> Result<T> {
        if response.status != expected {
            return Err(Self::unexpected(operation, response));
        }

        Ok(serde_json::from_str(&response.body)?)
    }

    fn unexpected(operation: &str, response: ApiResponse) -> DeployError {
        DeployError::UnexpectedStatus {
            operation: operation.to_string(),
            status: response.status.as_u16(),
            body: response.body,
        }
    }
}
