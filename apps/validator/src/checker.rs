use std::time::{Duration, Instant};

use anyhow::Result;
use hubwire::CheckStatus;
use tracing::debug;

/// What one check of a site observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub status: CheckStatus,
    pub latency_ms: u64,
    /// HTTP status, when the site answered at all
    pub http_status: Option<u16>,
}

/// Checker trait for the checks a validator can run
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Check `target`. Never fails: an unreachable site is a `Bad` probe.
    async fn check(&self, target: &str) -> Probe;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
    penalty_latency_ms: u64,
}

impl HttpChecker {
    pub fn new(timeout: Duration, penalty_latency_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, penalty_latency_ms })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Probe {
        let start = Instant::now();

        match self.client.get(target).send().await {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status =
                    if response.status() == reqwest::StatusCode::OK { CheckStatus::Good } else { CheckStatus::Bad };

                Probe { status, latency_ms, http_status: Some(response.status().as_u16()) }
            }
            Err(e) => {
                debug!(target_url = target, "HTTP request failed: {}", e);
                Probe { status: CheckStatus::Bad, latency_ms: self.penalty_latency_ms, http_status: None }
            }
        }
    }
}
