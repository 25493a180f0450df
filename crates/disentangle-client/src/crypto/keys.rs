//! Ed25519 key pairs.
//!
//! The registering process generates (or is handed) exactly one key pair;
//! its public half is sent at registration and its private half signs every
//! mutating request afterwards.

use ed25519_dalek::{SigningKey, VerifyingKey};

use crate::error::{ClientError, Result};

/// An Ed25519 key pair for signing operations.
///
/// The secret half is wiped when the pair is dropped: `SigningKey` is
/// `ZeroizeOnDrop` under ed25519-dalek's `zeroize` feature.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519KeyPair {
    /// Generate a new random Ed25519 key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a key pair from raw signing key bytes.
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a verifying key from raw bytes.
    pub fn verifying_key_from_bytes(bytes: &[u8; 32]) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(bytes)
            .map_err(|e| ClientError::InvalidKey(format!("invalid verifying key: {e}")))
    }

    /// Decode a base64 verifying key as carried on the wire.
    pub fn verifying_key_from_base64(encoded: &str) -> Result<VerifyingKey> {
        let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
            .map_err(|e| ClientError::InvalidKey(format!("invalid base64 public key: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| ClientError::InvalidKey("public key must be 32 bytes".into()))?;
        Self::verifying_key_from_bytes(&bytes)
    }

    /// Return a reference to the signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Return the verifying (public) key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Return the verifying key bytes.
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Return the public key as base64.
    pub fn public_key_base64(&self) -> String {
        base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            self.verifying_key_bytes(),
        )
    }
}
