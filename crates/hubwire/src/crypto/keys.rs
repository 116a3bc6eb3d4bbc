//! Ed25519 key generation and management.

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::io::Write;
use std::path::Path;

/// KeyPair for signing and verification
#[derive(Clone)]
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Create a new keypair from a signing key
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Get the public key as bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the public key as hex string. This is the identity a validator
    /// presents to the hub.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public_key", &self.public_key_hex()).finish_non_exhaustive()
    }
}

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> KeyPair {
    let mut csprng = OsRng;
    let mut secret_bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut csprng, &mut secret_bytes);
    KeyPair::new(SigningKey::from_bytes(&secret_bytes))
}

/// Write the secret key as hex text, readable by the owner only
pub fn save_keypair(keypair: &KeyPair, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating key directory {}", parent.display()))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

    let mut file = options
        .open(path)
        .with_context(|| format!("opening {} for writing", path.display()))?;
    writeln!(file, "{}", hex::encode(keypair.signing_key.to_bytes()))
        .context("Failed to write keypair to file")?;

    tracing::info!(public_key = %keypair.public_key_hex(), "Saved keypair to: {}", path.display());
    Ok(())
}

/// Load a keypair written by [`save_keypair`]. A raw 32-byte secret is
/// accepted as well.
pub fn load_keypair(path: &Path) -> Result<KeyPair> {
    let contents = fs::read(path).with_context(|| format!("reading key file {}", path.display()))?;

    let secret = match std::str::from_utf8(&contents).map(str::trim) {
        Ok(text) if text.len() == 64 => hex::decode(text).context("key file is not valid hex")?,
        _ => contents,
    };

    let bytes: [u8; 32] = secret
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("Invalid key file {}: expected a 32-byte secret", path.display()))?;

    Ok(KeyPair::new(SigningKey::from_bytes(&bytes)))
}

/// Load the key at `path`, creating one on first run
pub fn load_or_generate_keypair(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        tracing::debug!("Loading existing keypair from: {}", path.display());
        return load_keypair(path);
    }

    tracing::info!("No key at {}, generating a new identity", path.display());
    let keypair = generate_keypair();
    save_keypair(&keypair, path)?;
    Ok(keypair)
}
