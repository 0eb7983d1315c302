//! Polling a resource until an asynchronous action has taken effect

use crate::api::{ApiClient, RemoteRecord};
use crate::error::{DeployError, Result};
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff for state polling
#[derive(Debug, Clone)]
pub struct SettlePolicy {
    /// Number of state reads before giving up
    pub max_attempts: u32,
    /// Delay after the first read
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Add up to a quarter of the delay as random jitter
    pub jitter: bool,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl SettlePolicy {
    /// Delay to wait after the given (zero-based) attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let base = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter || base.is_zero() {
            return base;
        }

        let extra = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(extra)
    }
}

/// Outcome of inspecting a polled record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Done,
    Pending,
}

/// Read `path` until `check` reports done, fails, or attempts run out
pub async fn poll_until<F>(
    api: &ApiClient,
    policy: &SettlePolicy,
    operation: &str,
    path: &str,
    mut check: F,
) -> Result<RemoteRecord>
where
    F: FnMut(&RemoteRecord) -> Result<Settle>,
{
    for attempt in 0..policy.max_attempts {
        let record: RemoteRecord = api.fetch(operation, path, &[]).await?;

        if check(&record)? == Settle::Done {
            return Ok(record);
        }

        tracing::debug!(
            "{}: state {} (attempt {}/{})",
            operation,
            record.state,
            attempt + 1,
            policy.max_attempts
        );

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay(attempt)).await;
        }
    }

    Err(DeployError::Timeout(format!(
        "{}: state did not settle after {} attempts",
        operation, policy.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiConfig, Credentials, RemoteState};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast() -> SettlePolicy {
        SettlePolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = SettlePolicy {
            jitter: false,
            ..SettlePolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(10), Duration::from_secs(8));
        assert_eq!(policy.delay(40), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = SettlePolicy::default();
        for attempt in 0..5 {
            let base = SettlePolicy {
                jitter: false,
                ..policy.clone()
            }
            .delay(attempt);
            let delay = policy.delay(attempt);
            assert!(delay >= base && delay <= base + base / 4);
        }
    }

    #[tokio::test]
    async fn test_poll_until_running() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/s1/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"uuid": "s1", "state": "Starting"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/service/s1/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"uuid": "s1", "state": "Running"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(
            ApiConfig::default().with_base_url(&server.uri()),
            Credentials::new("a", "b"),
        )
        .unwrap();

        let record = poll_until(&api, &fast(), "starting web", "/service/s1/", |r| {
            Ok(if r.state == RemoteState::Running {
                Settle::Done
            } else {
                Settle::Pending
            })
        })
        .await
        .unwrap();

        assert_eq!(record.state, RemoteState::Running);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"uuid": "s1", "state": "Starting"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(
            ApiConfig::default().with_base_url(&server.uri()),
            Credentials::new("a", "b"),
        )
        .unwrap();

        let result = poll_until(&api, &fast(), "starting web", "/service/s1/", |_| {
            Ok(Settle::Pending)
        })
        .await;

        assert!(matches!(result, Err(DeployError::Timeout(_))));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
