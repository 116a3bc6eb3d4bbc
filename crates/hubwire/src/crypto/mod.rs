//! Cryptographic operations for the hub protocol.
//!
//! - Ed25519 key generation, persistence and hex encoding
//! - The canonical strings each side signs
//! - Signing, and the total (never failing) signature verifier

pub mod keys;
pub mod messages;
pub mod signing;
pub mod verification;

pub use keys::{generate_keypair, load_keypair, load_or_generate_keypair, save_keypair, KeyPair};
pub use messages::{signup_message, validate_reply_message};
pub use signing::{sign_bytes, sign_message};
pub use verification::{canonical_public_key, parse_public_key, verify};
