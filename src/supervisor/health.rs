//! Readiness probing against the backend's health endpoint.

use crate::error::{Result, SupervisorError};
use reqwest::{StatusCode, Url};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

/// Path appended to the service URL for readiness probes.
pub const HEALTH_PATH: &str = "/health";

const DEFAULT_MAX_ATTEMPTS: u32 = 30;
const DEFAULT_INTERVAL: Duration = Duration::from_millis(1_000);
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Bounded retry policy for readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub max_attempts: u32,
    /// Pause between attempts (not after the last one)
    pub interval: Duration,
    /// Upper bound for a single probe
    pub attempt_timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl HealthPolicy {
    /// Longest a full polling run can take.
    pub fn worst_case(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
            + self.attempt_timeout * self.max_attempts
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub ready: bool,
    pub timestamp: SystemTime,
}

pub struct HealthPoller {
    client: reqwest::Client,
}

impl HealthPoller {
    pub fn new() -> Result<Self> {
        // The backend listens on a local address; system proxies must not apply.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| SupervisorError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    /// `{base_url}/health`, validated.
    pub fn health_url(base_url: &str) -> Result<Url> {
        let invalid = |reason: String| SupervisorError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };

        let url = Url::parse(&format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/')))
            .map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(url)
    }

    /// Poll until the backend answers 200 or the attempts run out.
    ///
    /// Network failures and non-200 answers count as "not ready yet"; only
    /// an unusable `base_url` is an error.
    pub async fn wait_until_ready(&self, base_url: &str, policy: &HealthPolicy) -> Result<bool> {
        let url = Self::health_url(base_url)?;

        for attempt in 1..=policy.max_attempts {
            let result = self.probe(url.clone(), policy.attempt_timeout).await;
            if result.ready {
                info!(url = %url, attempt, "Backend reported healthy");
                return Ok(true);
            }

            debug!(
                url = %url,
                attempt,
                max_attempts = policy.max_attempts,
                "Backend not ready yet"
            );

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        warn!(
            url = %url,
            attempts = policy.max_attempts,
            "Backend never reported healthy"
        );
        Ok(false)
    }

    /// Issue one GET bounded by `timeout`.
    pub async fn probe(&self, url: Url, timeout: Duration) -> HealthCheckResult {
        let ready = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                trace!(status = %response.status(), "Health probe answered without 200");
                false
            }
            Err(e) => {
                trace!(error = %e, "Health probe failed");
                false
            }
        };

        HealthCheckResult {
            ready,
            timestamp: SystemTime::now(),
        }
    }
}
