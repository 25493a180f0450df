//! Capability records as mirrored from the node.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::Did;

/// Unique identifier for a capability, as assigned by the node
/// (hex-encoded 32 bytes on the reference node).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityId(pub String);

impl CapabilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form constraints attached to a capability.
///
/// Keys understood locally are listed in [`super::constraint`]; anything
/// else is passed through to the node untouched. A `BTreeMap` keeps the
/// JSON encoding stable for request signing.
pub type Constraints = BTreeMap<String, serde_json::Value>;

/// Lifecycle state. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    #[default]
    Active,
    Revoked,
}

/// A revocable, optionally delegatable grant of scoped permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(alias = "capability_id_hex")]
    pub id: CapabilityId,
    pub subject_type: String,
    pub scope: String,
    #[serde(default)]
    pub constraints: Constraints,
    pub delegatable: bool,
    pub issuer_did: Did,
    pub holder_did: Did,
    #[serde(default)]
    pub parent_capability_id: Option<CapabilityId>,
    #[serde(default)]
    pub status: CapabilityStatus,
}

impl Capability {
    /// A root capability was issued directly by an identity.
    pub fn is_root(&self) -> bool {
        self.parent_capability_id.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.status == CapabilityStatus::Active
    }

    pub fn is_revoked(&self) -> bool {
        self.status == CapabilityStatus::Revoked
    }
}

/// How far a revocation reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevocationScope {
    /// Only the named capability.
    #[serde(rename = "single")]
    Single,
    /// The named capability and every descendant.
    #[serde(rename = "subtree", alias = "chain")]
    Chain,
}

impl RevocationScope {
    /// Return the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Chain => "subtree",
        }
    }
}
