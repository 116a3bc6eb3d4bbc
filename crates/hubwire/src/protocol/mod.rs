//! Protocol module for the hub.
//!
//! This module contains the frame types exchanged over a validator
//! connection and the codec that turns them into text frames.

pub mod codec;
pub mod types;

pub use codec::{decode, encode, WireError, MAX_FRAME_BYTES};
pub use types::{
    CheckStatus, HubMessage, SignupAck, SignupRequest, ValidateReply, ValidateRequest,
    ValidatorMessage,
};
