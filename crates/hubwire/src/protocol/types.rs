//! Protocol type definitions.
//!
//! Every frame is a JSON object `{"type": ..., "data": {...}}`. Field names
//! inside `data` are camelCase on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reachability verdict a validator reports for one site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    Good,
    Bad,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Good => "Good",
            CheckStatus::Bad => "Bad",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(CheckStatus::Good),
            "Bad" => Ok(CheckStatus::Bad),
            other => Err(format!("unknown check status: {other}")),
        }
    }
}

/// Signup request sent by a validator right after connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// Hex-encoded Ed25519 public key the validator claims
    pub public_key: String,

    /// Hex signature over `Signed message for {requestId}, {publicKey}`
    pub signed_message: String,

    /// Correlates the hub's acknowledgement with this request
    pub request_id: Uuid,

    /// Address the validator declares for itself
    pub ip: String,
}

/// Result of a check, sent by a validator in answer to a [`ValidateRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReply {
    pub request_id: Uuid,
    pub status: CheckStatus,

    /// Round trip in milliseconds
    pub latency: u64,

    /// Hex signature over `Replying to {requestId}`
    pub signed_message: String,
}

/// Frames a validator sends to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ValidatorMessage {
    Signup(SignupRequest),
    Validate(ValidateReply),
}

/// Acknowledgement of a successful signup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupAck {
    pub validator_id: String,
    pub request_id: Uuid,
}

/// Work item asking a validator to check one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub url: String,
    pub request_id: Uuid,
}

/// Frames the hub sends to a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum HubMessage {
    Signup(SignupAck),
    Validate(ValidateRequest),
}
