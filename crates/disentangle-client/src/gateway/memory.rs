//! In-process node double.
//!
//! `MemoryGateway` keeps an identity registry, a capability store and an
//! introduction graph in memory and answers every [`Gateway`] call the way
//! a node would. Mutating requests must carry a valid signature from the
//! key the signer registered with. Every call is counted, so tests can
//! assert how much network traffic an operation caused.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use sha2::{Digest, Sha256};

use crate::capability::{Capability, CapabilityId, CapabilityStatus, RevocationScope};
use crate::coherence::CoherenceProfile;
use crate::error::{ClientError, Result};
use crate::identity::{Did, Operation, Signed};

use super::wire::{
    CreateCapabilityRequest, DelegateRequest, IntroduceRequest, InvocationOutcome, InvokeRequest,
    RegisterRequest, RegisterResponse, RevokeRequest,
};
use super::Gateway;

const DEFAULT_COHERENCE: f64 = 0.5;

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub register: usize,
    pub get_identity: usize,
    pub create_capability: usize,
    pub delegate: usize,
    pub invoke: usize,
    pub revoke: usize,
    pub introduce: usize,
    pub introduction_chain: usize,
    pub curvature: usize,
    pub neighbors: usize,
    pub coherence: usize,
    pub node_status: usize,
    pub get_capability: usize,
    pub capabilities_of: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.register
            + self.get_identity
            + self.create_capability
            + self.delegate
            + self.invoke
            + self.revoke
            + self.introduce
            + self.introduction_chain
            + self.curvature
            + self.neighbors
            + self.coherence
            + self.node_status
            + self.get_capability
            + self.capabilities_of
    }
}

struct Registered {
    request: RegisterRequest,
}

/// In-memory [`Gateway`] implementation.
#[derive(Default)]
pub struct MemoryGateway {
    identities: HashMap<Did, Registered>,
    capabilities: HashMap<CapabilityId, Capability>,
    /// Creation order, for listings.
    order: Vec<CapabilityId>,
    /// Undirected introduction edges.
    edges: HashMap<Did, BTreeSet<Did>>,
    coherence: HashMap<Did, f64>,
    curvature: HashMap<(Did, Did), f64>,
    min_invoke_coherence: f64,
    /// When set, delegated children come back with this scope.
    delegation_scope_override: Option<String>,
    offline: bool,
    closed: bool,
    minted: u64,
    calls: CallCounts,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounts {
        self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = CallCounts::default();
    }

    /// Composite coherence score reported for `did`. Defaults to 0.5.
    pub fn set_coherence(&mut self, did: &Did, score: f64) {
        self.coherence.insert(did.clone(), score);
    }

    /// Invocations by identities scoring below `min` are denied.
    pub fn set_min_invoke_coherence(&mut self, min: f64) {
        self.min_invoke_coherence = min;
    }

    pub fn set_curvature(&mut self, a: &Did, b: &Did, value: f64) {
        self.curvature.insert(edge_key(a, b), value);
    }

    /// While offline every call fails with a connection error.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Make `delegate` answer with a child carrying `scope` instead of the
    /// parent's scope.
    pub fn override_delegation_scope(&mut self, scope: Option<String>) {
        self.delegation_scope_override = scope;
    }

    /// The node's own copy of a capability.
    pub fn capability(&self, id: &CapabilityId) -> Option<&Capability> {
        self.capabilities.get(id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn reachable(&self) -> Result<()> {
        if self.closed {
            return Err(ClientError::Connection("gateway closed".into()));
        }
        if self.offline {
            return Err(ClientError::Connection("node offline".into()));
        }
        Ok(())
    }

    fn require_identity(&self, did: &Did) -> Result<()> {
        if self.identities.contains_key(did) {
            Ok(())
        } else {
            Err(ClientError::NotFound(format!("identity {did}")))
        }
    }

    /// Check the envelope signature and that it was made with the signer's
    /// registered key.
    fn authenticate<T: Operation>(&self, request: &Signed<T>) -> Result<()> {
        let registered = self
            .identities
            .get(request.signer())
            .ok_or(ClientError::NotRegistered)?;
        if registered.request.public_key != request.signature.public_key {
            return Err(ClientError::Remote {
                status: 401,
                message: "signing key does not match registration".into(),
            });
        }
        request.verify().map_err(|_| ClientError::Remote {
            status: 401,
            message: "invalid request signature".into(),
        })
    }

    fn stored(&self, id: &CapabilityId) -> Result<&Capability> {
        self.capabilities
            .get(id)
            .ok_or_else(|| ClientError::NotFound(format!("capability {id}")))
    }

    fn mint_id(&mut self, did: &Did) -> CapabilityId {
        self.minted += 1;
        let mut hasher = Sha256::new();
        hasher.update(did.as_str().as_bytes());
        hasher.update(self.minted.to_le_bytes());
        CapabilityId::new(hex::encode(hasher.finalize()))
    }

    fn store(&mut self, capability: Capability) -> Capability {
        self.order.push(capability.id.clone());
        self.capabilities
            .insert(capability.id.clone(), capability.clone());
        capability
    }

    fn score_of(&self, did: &Did) -> f64 {
        self.coherence
            .get(did)
            .copied()
            .unwrap_or(DEFAULT_COHERENCE)
    }

    fn neighbors_of(&self, did: &Did) -> Vec<Did> {
        self.edges
            .get(did)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The first revoked capability from `id` up to its root.
    fn revoked_on_path(&self, id: &CapabilityId) -> Option<CapabilityId> {
        let mut seen = HashSet::new();
        let mut current = self.capabilities.get(id);
        while let Some(cap) = current {
            if !seen.insert(&cap.id) {
                break;
            }
            if cap.is_revoked() {
                return Some(cap.id.clone());
            }
            current = cap
                .parent_capability_id
                .as_ref()
                .and_then(|p| self.capabilities.get(p));
        }
        None
    }

    fn issuers_on_path(&self, id: &CapabilityId) -> HashSet<Did> {
        let mut out = HashSet::new();
        let mut seen = HashSet::new();
        let mut current = self.capabilities.get(id);
        while let Some(cap) = current {
            if !seen.insert(&cap.id) {
                break;
            }
            out.insert(cap.issuer_did.clone());
            current = cap
                .parent_capability_id
                .as_ref()
                .and_then(|p| self.capabilities.get(p));
        }
        out
    }

    fn subtree(&self, root: &CapabilityId) -> Vec<CapabilityId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for child in self.order.iter().rev() {
                let is_child = self
                    .capabilities
                    .get(child)
                    .and_then(|c| c.parent_capability_id.as_ref())
                    == Some(&id);
                if is_child {
                    stack.push(child.clone());
                }
            }
            out.push(id);
        }
        out
    }
}

fn edge_key(a: &Did, b: &Did) -> (Did, Did) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl Gateway for MemoryGateway {
    fn register(&mut self, request: &RegisterRequest) -> Result<RegisterResponse> {
        self.calls.register += 1;
        self.reachable()?;

        let key = crate::crypto::keys::Ed25519KeyPair::verifying_key_from_base64(
            &request.public_key,
        )?;
        let digest = Sha256::digest(key.as_bytes());
        let did = Did::parse(format!("did:disentangle:{}", hex::encode(&digest[..16])))?;
        if self.identities.contains_key(&did) {
            return Err(ClientError::Remote {
                status: 409,
                message: format!("{did} already registered"),
            });
        }

        self.identities.insert(
            did.clone(),
            Registered {
                request: request.clone(),
            },
        );
        log::debug!("memory node registered {did}");
        Ok(RegisterResponse {
            did: did.to_string(),
            document: None,
        })
    }

    fn get_identity(&mut self, did: &Did) -> Result<serde_json::Value> {
        self.calls.get_identity += 1;
        self.reachable()?;
        let registered = self
            .identities
            .get(did)
            .ok_or_else(|| ClientError::NotFound(format!("identity {did}")))?;
        Ok(serde_json::json!({
            "did": did,
            "agent_type": registered.request.agent_type,
            "model_hash": registered.request.model_hash,
            "runtime_hash": registered.request.runtime_hash,
            "public_key": registered.request.public_key,
        }))
    }

    fn create_capability(
        &mut self,
        request: &Signed<CreateCapabilityRequest>,
    ) -> Result<Capability> {
        self.calls.create_capability += 1;
        self.reachable()?;
        self.authenticate(request)?;
        let body = &request.body;
        if request.signer() != &body.issuer_did {
            return Err(ClientError::Remote {
                status: 403,
                message: "issuer must sign its own capability".into(),
            });
        }

        let id = self.mint_id(&body.issuer_did);
        Ok(self.store(Capability {
            id,
            subject_type: body.subject_type.clone(),
            scope: body.scope.clone(),
            constraints: body.constraints.clone(),
            delegatable: body.delegatable,
            issuer_did: body.issuer_did.clone(),
            holder_did: body.issuer_did.clone(),
            parent_capability_id: None,
            status: CapabilityStatus::Active,
        }))
    }

    fn delegate(&mut self, request: &Signed<DelegateRequest>) -> Result<Capability> {
        self.calls.delegate += 1;
        self.reachable()?;
        self.authenticate(request)?;
        let body = &request.body;
        self.require_identity(&body.to_did)?;

        let parent = self.stored(&body.capability_id)?.clone();
        if parent.holder_did != body.delegator_did || request.signer() != &body.delegator_did {
            return Err(ClientError::Remote {
                status: 403,
                message: "only the holder may delegate".into(),
            });
        }
        if !parent.delegatable || self.revoked_on_path(&parent.id).is_some() {
            return Err(ClientError::NotDelegatable(parent.id.to_string()));
        }

        let id = self.mint_id(&body.delegator_did);
        let scope = self
            .delegation_scope_override
            .clone()
            .unwrap_or_else(|| parent.scope.clone());
        Ok(self.store(Capability {
            id,
            subject_type: parent.subject_type.clone(),
            scope,
            constraints: parent.constraints.clone(),
            delegatable: parent.delegatable,
            issuer_did: body.delegator_did.clone(),
            holder_did: body.to_did.clone(),
            parent_capability_id: Some(parent.id.clone()),
            status: CapabilityStatus::Active,
        }))
    }

    fn invoke(&mut self, request: &Signed<InvokeRequest>) -> Result<InvocationOutcome> {
        self.calls.invoke += 1;
        self.reachable()?;
        self.authenticate(request)?;
        let body = &request.body;
        let cap = self.stored(&body.capability_id)?;
        let score = self.score_of(&body.invoker_did);

        let denial = if cap.holder_did != body.invoker_did {
            Some("invoker does not hold this capability".to_string())
        } else if let Some(revoked) = self.revoked_on_path(&cap.id) {
            Some(format!("capability {revoked} is revoked"))
        } else if score < self.min_invoke_coherence {
            Some(format!(
                "coherence {score:.3} below required {:.3}",
                self.min_invoke_coherence
            ))
        } else {
            None
        };

        match denial {
            Some(message) => Err(ClientError::CapabilityDenied {
                message,
                coherence_score: Some(score),
            }),
            None => Ok(InvocationOutcome {
                success: true,
                message: None,
            }),
        }
    }

    fn revoke(&mut self, request: &Signed<RevokeRequest>) -> Result<()> {
        self.calls.revoke += 1;
        self.reachable()?;
        self.authenticate(request)?;
        let body = &request.body;
        let cap = self.stored(&body.capability_id)?;
        let allowed = cap.holder_did == body.revoker_did
            || self.issuers_on_path(&cap.id).contains(&body.revoker_did);
        if !allowed {
            return Err(ClientError::Remote {
                status: 403,
                message: "revoker is neither holder nor issuer on the chain".into(),
            });
        }

        let targets = match body.scope {
            RevocationScope::Single => vec![body.capability_id.clone()],
            RevocationScope::Chain => self.subtree(&body.capability_id),
        };
        for id in targets {
            if let Some(cap) = self.capabilities.get_mut(&id) {
                cap.status = CapabilityStatus::Revoked;
            }
        }
        Ok(())
    }

    fn introduce(&mut self, request: &Signed<IntroduceRequest>) -> Result<()> {
        self.calls.introduce += 1;
        self.reachable()?;
        self.authenticate(request)?;
        let body = &request.body;
        self.require_identity(&body.introduced_did)?;

        let a = body.introducer_did.clone();
        let b = body.introduced_did.clone();
        self.edges.entry(a.clone()).or_default().insert(b.clone());
        self.edges.entry(b).or_default().insert(a);
        Ok(())
    }

    fn introduction_chain(&mut self, from: &Did, to: &Did) -> Result<Vec<Did>> {
        self.calls.introduction_chain += 1;
        self.reachable()?;
        self.require_identity(from)?;
        self.require_identity(to)?;

        // Breadth-first, so the chain is a shortest one.
        let mut previous: HashMap<Did, Did> = HashMap::new();
        let mut queue = VecDeque::from([from.clone()]);
        let mut seen = HashSet::from([from.clone()]);
        while let Some(current) = queue.pop_front() {
            if &current == to {
                let mut chain = vec![current];
                while let Some(prev) = chain.last().and_then(|d| previous.get(d)) {
                    chain.push(prev.clone());
                }
                chain.reverse();
                return Ok(chain);
            }
            for next in self.neighbors_of(&current) {
                if seen.insert(next.clone()) {
                    previous.insert(next.clone(), current.clone());
                    queue.push_back(next);
                }
            }
        }
        Err(ClientError::NotFound(format!(
            "no introduction chain from {from} to {to}"
        )))
    }

    fn curvature(&mut self, did_a: &Did, did_b: &Did) -> Result<f64> {
        self.calls.curvature += 1;
        self.reachable()?;
        self.require_identity(did_a)?;
        self.require_identity(did_b)?;
        Ok(self
            .curvature
            .get(&edge_key(did_a, did_b))
            .copied()
            .unwrap_or(0.0))
    }

    fn neighbors(&mut self, did: &Did) -> Result<Vec<Did>> {
        self.calls.neighbors += 1;
        self.reachable()?;
        self.require_identity(did)?;
        Ok(self.neighbors_of(did))
    }

    fn coherence(&mut self, did: &Did) -> Result<CoherenceProfile> {
        self.calls.coherence += 1;
        self.reachable()?;
        self.require_identity(did)?;
        let degree = self.neighbors_of(did).len() as f64;
        Ok(CoherenceProfile {
            did: did.clone(),
            composite_score: self.score_of(did),
            topological_mass: degree,
            relational_diversity: degree,
            mean_local_curvature: None,
            temporal_depth: None,
            decayed_mass: None,
        })
    }

    fn node_status(&mut self) -> Result<serde_json::Value> {
        self.calls.node_status += 1;
        self.reachable()?;
        Ok(serde_json::json!({
            "node": "memory",
            "identities": self.identities.len(),
            "capabilities": self.capabilities.len(),
        }))
    }

    fn get_capability(&mut self, id: &CapabilityId) -> Result<Capability> {
        self.calls.get_capability += 1;
        self.reachable()?;
        self.stored(id).cloned()
    }

    fn capabilities_of(&mut self, did: &Did) -> Result<Vec<Capability>> {
        self.calls.capabilities_of += 1;
        self.reachable()?;
        self.require_identity(did)?;
        Ok(self
            .order
            .iter()
            .filter_map(|id| self.capabilities.get(id))
            .filter(|c| &c.holder_did == did)
            .cloned()
            .collect())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
