//! Result ingestion handler
//!
//! Runs once per resolved correlation entry. The reply's signature is
//! checked against the key the request was addressed to, then the tick and
//! the payout credit are written in one transaction.

use std::sync::Arc;
use std::time::SystemTime;

use hubwire::ValidateReply;
use hubwire::crypto::validate_reply_message;
use hubwire::verify;
use tracing::{error, info, warn};

use super::correlation::PendingCheck;
use crate::database::Store;
use crate::database::models::NewTick;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Recorded { tick_id: String },
    BadSignature,
    /// Latency does not fit the tick table's integer column
    LatencyOutOfRange,
    StoreFailed,
}

pub struct ResultIngestion {
    store: Arc<dyn Store>,
    reward: u32,
}

impl ResultIngestion {
    pub fn new(store: Arc<dyn Store>, reward: u32) -> Self {
        Self { store, reward }
    }

    pub async fn ingest(&self, pending: PendingCheck, reply: ValidateReply) -> IngestOutcome {
        let message = validate_reply_message(&pending.request_id);
        if !verify(&message, &pending.public_key, &reply.signed_message) {
            warn!(
                target: logger::AUDIT_TARGET,
                event = "reply_rejected",
                validator_id = %pending.validator_id,
                request_id = %pending.request_id,
                site_id = %pending.site_id,
                "Check reply signature rejected"
            );
            return IngestOutcome::BadSignature;
        }

        if i64::try_from(reply.latency).is_err() {
            warn!(
                target: logger::AUDIT_TARGET,
                event = "reply_rejected",
                validator_id = %pending.validator_id,
                request_id = %pending.request_id,
                latency = reply.latency,
                "Check reply latency out of range"
            );
            return IngestOutcome::LatencyOutOfRange;
        }

        let tick = NewTick {
            site_id: pending.site_id.clone(),
            validator_id: pending.validator_id.clone(),
            status: reply.status,
            latency_ms: reply.latency,
            timestamp: SystemTime::now(),
        };

        match self.store.record_observation(&tick, self.reward).await {
            Ok(tick_id) => {
                info!(
                    validator_id = %tick.validator_id,
                    site = %pending.url,
                    status = %tick.status,
                    latency_ms = tick.latency_ms,
                    "Recorded tick {}", tick_id
                );
                IngestOutcome::Recorded { tick_id }
            }
            Err(e) => {
                error!(
                    validator_id = %tick.validator_id,
                    request_id = %pending.request_id,
                    "Dropping check result, store write failed: {:#}", e
                );
                IngestOutcome::StoreFailed
            }
        }
    }
}
