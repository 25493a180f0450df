//! Signed request envelopes.
//!
//! Every mutating request leaves the process wrapped in a [`Signed`]
//! envelope. The signature covers the operation name, the signer, the
//! issue time, a random nonce, and a SHA-256 digest of the JSON body:
//!
//! ```text
//! {op}:{signer}:{issued_at}:{nonce}:{hex(sha256(body_json))}
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::keys::Ed25519KeyPair;
use crate::crypto::{random, signing};
use crate::error::Result;

use super::did::Did;

/// A request body that names the operation it performs.
pub trait Operation: Serialize {
    /// Stable operation name bound into the signature.
    const NAME: &'static str;
}

/// Signature block attached to a mutating request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSignature {
    pub signer: Did,
    /// Signer's Ed25519 public key, base64.
    pub public_key: String,
    /// Microseconds since Unix epoch.
    pub issued_at: u64,
    /// Hex-encoded 16 random bytes.
    pub nonce: String,
    /// Ed25519 signature, base64.
    pub signature: String,
}

/// A request body together with its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    #[serde(flatten)]
    pub body: T,
    pub signature: RequestSignature,
}

impl<T: Operation> Signed<T> {
    /// Sign `body` as `signer`.
    pub fn sign(body: T, signer: Did, key_pair: &Ed25519KeyPair) -> Result<Self> {
        let issued_at = crate::time::now_micros();
        let nonce = random::request_nonce();
        let message = signing_message::<T>(&body, &signer, issued_at, &nonce)?;
        let signature = signing::sign_to_base64(key_pair.signing_key(), message.as_bytes());

        Ok(Self {
            body,
            signature: RequestSignature {
                signer,
                public_key: key_pair.public_key_base64(),
                issued_at,
                nonce,
                signature,
            },
        })
    }

    /// Verify the signature against the embedded public key.
    ///
    /// This does not check that the public key belongs to the signer; the
    /// node does that against its identity registry.
    pub fn verify(&self) -> Result<()> {
        let key = Ed25519KeyPair::verifying_key_from_base64(&self.signature.public_key)?;
        let message = signing_message::<T>(
            &self.body,
            &self.signature.signer,
            self.signature.issued_at,
            &self.signature.nonce,
        )?;
        signing::verify_from_base64(&key, message.as_bytes(), &self.signature.signature)
    }

    pub fn signer(&self) -> &Did {
        &self.signature.signer
    }
}

fn signing_message<T: Operation>(
    body: &T,
    signer: &Did,
    issued_at: u64,
    nonce: &str,
) -> Result<String> {
    let json = serde_json::to_vec(body)?;
    let digest = hex::encode(Sha256::digest(&json));
    Ok(format!("{}:{signer}:{issued_at}:{nonce}:{digest}", T::NAME))
}
