//! Hubwire - the hub <-> validator protocol for Uppe
//!
//! This library holds everything both ends of a validator connection must
//! agree on byte for byte: the JSON frame layout, the signed-message
//! conventions and the Ed25519 key handling used to authenticate them.

pub mod crypto;
pub mod protocol;

// Re-export main types
pub use crypto::{verify, KeyPair};
pub use protocol::{
    CheckStatus, HubMessage, SignupAck, SignupRequest, ValidateReply, ValidateRequest,
    ValidatorMessage, WireError,
};

/// The version of the hub protocol
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default WebSocket path the hub serves validators on
pub const DEFAULT_WS_PATH: &str = "/ws";
