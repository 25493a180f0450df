//! Request and response bodies exchanged with the node.
//!
//! Field names follow the node's JSON contract. Bodies of mutating
//! requests implement [`Operation`] so they can be wrapped in a
//! [`crate::identity::Signed`] envelope.

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityId, Constraints, RevocationScope};
use crate::identity::{AgentType, Did, Operation};

/// `register` request. Not signed; it introduces the key that signs
/// everything afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub agent_type: AgentType,
    /// Hex-encoded model hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    /// Hex-encoded runtime attestation hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_hash: Option<String>,
    /// Ed25519 public key, base64.
    pub public_key: String,
}

/// The DID is kept as the node sent it; the holder checks its structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub did: String,
    #[serde(default)]
    pub document: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCapabilityRequest {
    pub issuer_did: Did,
    pub subject_type: String,
    pub scope: String,
    pub constraints: Constraints,
    pub delegatable: bool,
}

impl Operation for CreateCapabilityRequest {
    const NAME: &'static str = "create_capability";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateRequest {
    #[serde(rename = "capability_id_hex")]
    pub capability_id: CapabilityId,
    pub delegator_did: Did,
    #[serde(rename = "delegatee_did")]
    pub to_did: Did,
}

impl Operation for DelegateRequest {
    const NAME: &'static str = "delegate";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    #[serde(rename = "capability_id_hex")]
    pub capability_id: CapabilityId,
    pub invoker_did: Did,
}

impl Operation for InvokeRequest {
    const NAME: &'static str = "invoke";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeRequest {
    #[serde(rename = "capability_id_hex")]
    pub capability_id: CapabilityId,
    pub revoker_did: Did,
    pub scope: RevocationScope,
}

impl Operation for RevokeRequest {
    const NAME: &'static str = "revoke";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroduceRequest {
    pub introducer_did: Did,
    pub introduced_did: Did,
    pub edge_name: String,
}

impl Operation for IntroduceRequest {
    const NAME: &'static str = "introduce";
}

/// Result of an `invoke` the node did not refuse outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
