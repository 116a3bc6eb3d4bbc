use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hubwire::CheckStatus;
use serde::{Deserialize, Serialize};

/// Placeholder location recorded for newly signed-up validators
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Convert SystemTime to Unix timestamp
pub fn timestamp_to_i64(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Convert Unix timestamp to SystemTime
pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64)
}

/// Validator model - durable identity of a checking agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: String,
    /// Lowercase hex Ed25519 key, unique across validators
    pub public_key: String,
    pub ip: String,
    pub location: String,
    /// Credit owed for accepted results; only ever increases here
    pub pending_payouts: i64,
    pub created_at: SystemTime,
}

/// MonitoredSite model - a website the hub asks validators to check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredSite {
    pub id: String,
    pub url: String,
    pub user_id: String,
    pub disabled: bool,
}

/// A tick about to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTick {
    pub site_id: String,
    pub validator_id: String,
    pub status: CheckStatus,
    pub latency_ms: u64,
    pub timestamp: SystemTime,
}

/// Tick model - one validator's observation of one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub id: String,
    pub site_id: String,
    pub validator_id: String,
    pub status: CheckStatus,
    pub latency_ms: u64,
    pub created_at: SystemTime,
}
