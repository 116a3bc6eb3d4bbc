//! Ed25519 signing operations.

use super::keys::KeyPair;
use ed25519_dalek::Signer;

/// Sign raw bytes with a keypair. Returns 64-byte Ed25519 signature.
pub fn sign_bytes(data: &[u8], keypair: &KeyPair) -> Vec<u8> {
    keypair.signing_key.sign(data).to_bytes().to_vec()
}

/// Sign the UTF-8 bytes of `message` and hex-encode the signature for the wire
pub fn sign_message(message: &str, keypair: &KeyPair) -> String {
    hex::encode(sign_bytes(message.as_bytes(), keypair))
}
