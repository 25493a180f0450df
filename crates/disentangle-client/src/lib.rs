//! Disentangle client: the trust core of an agent on the Disentangle network.
//!
//! Provides a locally held Ed25519 identity bound to a DID, a mirrored
//! graph of delegated capabilities with chain revocation, local chain
//! validation, coherence-gated authorization of invocations, private
//! petnames, and a gateway contract for talking to a node.

pub mod agent;
pub mod capability;
pub mod coherence;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod petname;
pub mod storage;
pub mod time;

// Re-export primary types
pub use agent::Agent;
pub use config::ClientConfig;
pub use error::{ClientError, Result, Stage};
pub use identity::{AgentType, Did, Identity, IdentityContext, IdentityHolder};
pub use petname::PetnameResolver;
pub use storage::GraphFile;

// Re-export capability types
pub use capability::{
    validate, Capability, CapabilityConstraints, CapabilityGraph, CapabilityId, CapabilityStatus,
    Constraints, InvocationContext, RevocationScope, ValidationFailure, ValidationResult,
};

// Re-export coherence types
pub use coherence::{
    authorize_invoke, AuthorizationResult, CoherenceProfile, CoherenceSnapshot, CurvatureResult,
    DecisionStage,
};

// Re-export gateway types
pub use gateway::{CallCounts, Gateway, HttpGateway, MemoryGateway};
