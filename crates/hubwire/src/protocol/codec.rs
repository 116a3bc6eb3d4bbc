//! Text-frame codec.
//!
//! Frames are JSON documents carried in WebSocket text messages. Decoding
//! enforces a size ceiling before touching the parser.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Largest frame either side will attempt to decode
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame too large: {size} bytes (max: {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}

/// Encode a frame as JSON text
pub fn encode<T: Serialize>(message: &T) -> Result<String, WireError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a JSON text frame
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, WireError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge { size: text.len(), max: MAX_FRAME_BYTES });
    }

    Ok(serde_json::from_str(text)?)
}
