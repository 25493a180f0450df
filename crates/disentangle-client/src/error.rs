//! Error types for the Disentangle client.
//!
//! All errors are strongly typed and propagated without panicking.
//! Private key material is never included in error messages.
//!
//! Expected outcomes of local validation (a revoked link, a broken chain, an
//! exhausted constraint) and of remote authorization are *not* errors: they
//! are carried as values in [`crate::capability::ValidationResult`] and
//! [`crate::coherence::AuthorizationResult`].

use crate::capability::CapabilityId;

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Local state: identity, capability graph, petnames, key material.
    Local,
    /// The node answered and refused or could not find the target.
    Remote,
    /// The node could not be reached or its answer could not be decoded.
    Transport,
}

/// Client error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Agent is not registered; call register() first")]
    NotRegistered,

    #[error("Agent is already registered as {0}")]
    AlreadyRegistered(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Capability {0} is not in the local graph")]
    UnknownCapability(CapabilityId),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Capability is not delegatable: {0}")]
    NotDelegatable(String),

    #[error("Capability denied: {message}")]
    CapabilityDenied {
        message: String,
        coherence_score: Option<f64>,
    },

    #[error("Cannot reach node: {0}")]
    Connection(String),

    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("Petname not found: {0}")]
    PetnameNotFound(String),

    #[error("Invalid petname: {0}")]
    InvalidPetname(String),

    #[error("Delegated capability widens its parent: {0}")]
    ScopeEscalation(String),

    #[error("Node returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::NotFound(_)
            | Self::CapabilityDenied { .. }
            | Self::Remote { .. } => Stage::Remote,
            Self::Connection(_) | Self::Serialization(_) => Stage::Transport,
            _ => Stage::Local,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ClientError>;
