//! Callback correlation table
//!
//! Every `validate` request the hub sends leaves a [`PendingCheck`] behind,
//! keyed by its request id. The reply is matched by id, the entry removed
//! and handed to result ingestion. Entries whose reply never comes are
//! evicted once they are older than the staleness window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// What to do when the reply for `request_id` arrives: verify it against
/// `public_key` and record an observation of `site_id` for `validator_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheck {
    pub request_id: Uuid,
    pub validator_id: String,
    pub public_key: String,
    pub site_id: String,
    pub url: String,
    pub issued_at: Instant,
}

impl PendingCheck {
    pub fn new(
        request_id: Uuid,
        validator_id: impl Into<String>,
        public_key: impl Into<String>,
        site_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            validator_id: validator_id.into(),
            public_key: public_key.into(),
            site_id: site_id.into(),
            url: url.into(),
            issued_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("request {0} is already pending")]
    Duplicate(Uuid),
}

/// Pending checks keyed by request id
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<Uuid, PendingCheck>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pending check. An id that is already pending is refused and
    /// the existing entry is left untouched.
    pub async fn register(&self, entry: PendingCheck) -> Result<(), CorrelationError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&entry.request_id) {
            return Err(CorrelationError::Duplicate(entry.request_id));
        }
        entries.insert(entry.request_id, entry);
        Ok(())
    }

    /// Remove and return the entry for `request_id`. A given id is handed
    /// out at most once.
    pub async fn resolve(&self, request_id: &Uuid) -> Option<PendingCheck> {
        self.entries.lock().await.remove(request_id)
    }

    /// Drop an entry whose request never made it onto the wire
    pub async fn cancel(&self, request_id: &Uuid) -> bool {
        self.entries.lock().await.remove(request_id).is_some()
    }

    /// Remove every entry older than `max_age`
    pub async fn evict_stale(&self, max_age: Duration) -> Vec<PendingCheck> {
        let mut entries = self.entries.lock().await;
        let stale: Vec<Uuid> = entries
            .values()
            .filter(|entry| entry.age() > max_age)
            .map(|entry| entry.request_id)
            .collect();

        stale.iter().filter_map(|id| entries.remove(id)).collect()
    }

    /// Outstanding entry count per validator id
    pub async fn pending_by_validator(&self) -> HashMap<String, usize> {
        let entries = self.entries.lock().await;
        let mut counts = HashMap::new();
        for entry in entries.values() {
            *counts.entry(entry.validator_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Start the background sweeper evicting entries older than `max_age`
    /// every `every`
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        max_age: Duration,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let table = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;

                let evicted = table.evict_stale(max_age).await;
                if evicted.is_empty() {
                    debug!("Correlation sweep found nothing stale");
                    continue;
                }

                let mut per_validator: HashMap<&str, usize> = HashMap::new();
                for entry in &evicted {
                    *per_validator.entry(entry.validator_id.as_str()).or_insert(0) += 1;
                }
                for (validator_id, count) in per_validator {
                    info!(
                        target: logger::AUDIT_TARGET,
                        event = "stale_evicted",
                        validator_id,
                        count,
                        max_age_secs = max_age.as_secs(),
                        "Unanswered checks evicted"
                    );
                }
            }
        })
    }
}
