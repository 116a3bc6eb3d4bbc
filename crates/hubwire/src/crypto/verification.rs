//! Ed25519 signature verification.
//!
//! [`verify`] is the verifier the hub runs on every signup and every check
//! reply. It is total: anything it cannot decode counts as a bad signature.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::debug;

use crate::protocol::WireError;

/// Parse a hex-encoded Ed25519 public key
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, WireError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| WireError::InvalidPublicKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| WireError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;

    VerifyingKey::from_bytes(&bytes).map_err(|e| WireError::InvalidPublicKey(e.to_string()))
}

/// Lowercase hex form of a public key, used as the validator's stored identity
pub fn canonical_public_key(public_key_hex: &str) -> Result<String, WireError> {
    Ok(hex::encode(parse_public_key(public_key_hex)?.to_bytes()))
}

fn parse_signature(signature_hex: &str) -> Result<Signature, WireError> {
    let bytes = hex::decode(signature_hex)
        .map_err(|e| WireError::InvalidSignature(e.to_string()))?;
    let bytes: [u8; 64] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| WireError::InvalidSignature(format!("expected 64 bytes, got {}", bytes.len())))?;

    Ok(Signature::from_bytes(&bytes))
}

/// Check that `signature_hex` is a valid signature by `public_key_hex` over
/// exactly the bytes of `message`.
pub fn verify(message: &str, public_key_hex: &str, signature_hex: &str) -> bool {
    let verifying_key = match parse_public_key(public_key_hex) {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "Rejecting signature: bad public key");
            return false;
        }
    };

    let signature = match parse_signature(signature_hex) {
        Ok(sig) => sig,
        Err(e) => {
            debug!(error = %e, "Rejecting signature: bad encoding");
            return false;
        }
    };

    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}
