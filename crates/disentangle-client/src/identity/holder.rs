//! Identity holder: owns the signing key pair and the registered DID.
//!
//! The private key is generated in-process (or handed in by the caller),
//! only its public half is sent to the node, and it never leaves the
//! [`IdentityContext`]. Dropping or releasing the holder zeroizes the key.

use serde::{Deserialize, Serialize};

use crate::crypto::keys::Ed25519KeyPair;
use crate::error::{ClientError, Result};
use crate::gateway::{Gateway, RegisterRequest};

use super::did::Did;
use super::signature::{Operation, Signed};

/// What kind of agent an identity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    Agi,
    Human,
    Other(String),
}

impl AgentType {
    /// Return a stable string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Agi => "agi",
            Self::Human => "human",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for AgentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "agi" => Self::Agi,
            "human" => Self::Human,
            _ => Self::Other(s),
        }
    }
}

impl From<AgentType> for String {
    fn from(t: AgentType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The public view of a registered identity. Contains no private key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub did: Did,
    pub agent_type: AgentType,
    pub model_hash: Option<Vec<u8>>,
    pub runtime_hash: Option<Vec<u8>>,
    /// Ed25519 public key, base64.
    pub public_key: String,
    /// Registration timestamp (microseconds since Unix epoch).
    pub registered_at: u64,
}

/// An established identity plus the key that signs on its behalf.
///
/// This is the explicit signing context handed to every operation that
/// produces a signed request.
pub struct IdentityContext {
    identity: Identity,
    key_pair: Ed25519KeyPair,
}

impl IdentityContext {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn did(&self) -> &Did {
        &self.identity.did
    }

    /// Wrap `body` in a signed envelope for this identity.
    pub fn sign<T: Operation>(&self, body: T) -> Result<Signed<T>> {
        Signed::sign(body, self.identity.did.clone(), &self.key_pair)
    }
}

/// Holds at most one identity for the lifetime of the process.
#[derive(Default)]
pub struct IdentityHolder {
    context: Option<IdentityContext>,
}

impl IdentityHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh key pair and register it with the node.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if this holder already has an identity (checked
    /// before any network call), `InvalidDid` if the node answers with a
    /// malformed DID, or any gateway error.
    pub fn register<G: Gateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        agent_type: AgentType,
        model_hash: Option<&[u8]>,
        runtime_hash: Option<&[u8]>,
    ) -> Result<Identity> {
        self.register_with_key(
            gateway,
            Ed25519KeyPair::generate(),
            agent_type,
            model_hash,
            runtime_hash,
        )
    }

    /// Register with a caller-supplied key pair.
    pub fn register_with_key<G: Gateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        key_pair: Ed25519KeyPair,
        agent_type: AgentType,
        model_hash: Option<&[u8]>,
        runtime_hash: Option<&[u8]>,
    ) -> Result<Identity> {
        if let Some(ctx) = &self.context {
            return Err(ClientError::AlreadyRegistered(ctx.did().to_string()));
        }

        let request = RegisterRequest {
            agent_type: agent_type.clone(),
            model_hash: model_hash.map(hex::encode),
            runtime_hash: runtime_hash.map(hex::encode),
            public_key: key_pair.public_key_base64(),
        };
        let response = gateway.register(&request)?;
        let did = Did::parse(response.did)?;

        let identity = Identity {
            did,
            agent_type,
            model_hash: model_hash.map(<[u8]>::to_vec),
            runtime_hash: runtime_hash.map(<[u8]>::to_vec),
            public_key: request.public_key,
            registered_at: crate::time::now_micros(),
        };
        log::info!(
            "registered {} as {} agent",
            identity.did,
            identity.agent_type
        );

        self.context = Some(IdentityContext {
            identity: identity.clone(),
            key_pair,
        });
        Ok(identity)
    }

    /// The registered identity.
    pub fn current_identity(&self) -> Result<&Identity> {
        self.context().map(IdentityContext::identity)
    }

    /// The signing context of the registered identity.
    pub fn context(&self) -> Result<&IdentityContext> {
        self.context.as_ref().ok_or(ClientError::NotRegistered)
    }

    pub fn is_registered(&self) -> bool {
        self.context.is_some()
    }

    /// Drop the identity and zeroize its key. Returns the released DID.
    pub fn release(&mut self) -> Option<Did> {
        let released = self.context.take().map(|ctx| ctx.identity.did.clone());
        if let Some(did) = &released {
            log::debug!("released identity {did}");
        }
        released
    }
}
