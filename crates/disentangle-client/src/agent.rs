//! Agent: one identity together with its capability graph, petnames and
//! the gateway it talks through.
//!
//! Every capability and social-graph operation needs a registered identity
//! and fails with `NotRegistered` before [`Agent::register`]. Checks that
//! can be decided locally run before any request leaves the process.

use std::path::Path;

use crate::capability::{
    is_attenuation, validate, Capability, CapabilityGraph, CapabilityId, Constraints,
    InvocationContext, RevocationScope, ValidationResult,
};
use crate::coherence::{self, AuthorizationResult, CoherenceSnapshot, CurvatureResult};
use crate::crypto::keys::Ed25519KeyPair;
use crate::error::{ClientError, Result};
use crate::gateway::{
    CreateCapabilityRequest, DelegateRequest, Gateway, IntroduceRequest, RevokeRequest,
};
use crate::identity::{AgentType, Did, Identity, IdentityContext, IdentityHolder};
use crate::petname::PetnameResolver;
use crate::storage::GraphFile;

/// A client-side agent on the Disentangle network.
pub struct Agent<G: Gateway> {
    holder: IdentityHolder,
    graph: CapabilityGraph,
    petnames: PetnameResolver,
    gateway: G,
}

impl<G: Gateway> Agent<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            holder: IdentityHolder::new(),
            graph: CapabilityGraph::new(),
            petnames: PetnameResolver::new(),
            gateway,
        }
    }

    // ── Identity ──────────────────────────────────────────────────────────

    /// Generate a key pair and register it with the node.
    pub fn register(
        &mut self,
        agent_type: AgentType,
        model_hash: Option<&[u8]>,
        runtime_hash: Option<&[u8]>,
    ) -> Result<Identity> {
        self.holder
            .register(&mut self.gateway, agent_type, model_hash, runtime_hash)
    }

    pub fn register_with_key(
        &mut self,
        key_pair: Ed25519KeyPair,
        agent_type: AgentType,
        model_hash: Option<&[u8]>,
        runtime_hash: Option<&[u8]>,
    ) -> Result<Identity> {
        self.holder.register_with_key(
            &mut self.gateway,
            key_pair,
            agent_type,
            model_hash,
            runtime_hash,
        )
    }

    pub fn identity(&self) -> Result<&Identity> {
        self.holder.current_identity()
    }

    pub fn did(&self) -> Result<&Did> {
        Ok(&self.holder.context()?.identity().did)
    }

    pub fn is_registered(&self) -> bool {
        self.holder.is_registered()
    }

    fn context(&self) -> Result<&IdentityContext> {
        self.holder.context()
    }

    // ── Capabilities ──────────────────────────────────────────────────────

    /// Create a root capability issued to ourselves.
    pub fn create_capability(
        &mut self,
        subject_type: &str,
        scope: &str,
        constraints: Constraints,
        delegatable: bool,
    ) -> Result<Capability> {
        let ctx = self.holder.context()?;
        let request = ctx.sign(CreateCapabilityRequest {
            issuer_did: ctx.did().clone(),
            subject_type: subject_type.to_string(),
            scope: scope.to_string(),
            constraints,
            delegatable,
        })?;
        let capability = self.gateway.create_capability(&request)?;
        log::info!(
            "created capability {} ({}:{})",
            capability.id,
            capability.subject_type,
            capability.scope
        );
        Ok(self.graph.insert(capability).clone())
    }

    /// Delegate `capability_id` to `to_did`.
    ///
    /// # Errors
    ///
    /// Decided locally, with no network call: `UnknownCapability` if the capability
    /// is not in the local graph, `NotDelegatable` if it is not delegatable
    /// or revoked anywhere on its chain, `InvalidDid` for a malformed
    /// `to_did`. `ScopeEscalation` if the node returns a child wider than its
    /// parent; that child is not recorded.
    pub fn delegate(&mut self, capability_id: &CapabilityId, to_did: &str) -> Result<Capability> {
        let ctx = self.holder.context()?;
        let parent = self
            .graph
            .get(capability_id)
            .ok_or_else(|| ClientError::UnknownCapability(capability_id.clone()))?;
        let revoked_on_chain = self
            .graph
            .path_to_root(capability_id)
            .iter()
            .any(|c| c.is_revoked());
        if !parent.delegatable || revoked_on_chain {
            return Err(ClientError::NotDelegatable(capability_id.to_string()));
        }
        let to_did = Did::parse(to_did)?;

        let request = ctx.sign(DelegateRequest {
            capability_id: capability_id.clone(),
            delegator_did: ctx.did().clone(),
            to_did: to_did.clone(),
        })?;
        let mut child = self.gateway.delegate(&request)?;
        child.parent_capability_id = Some(capability_id.clone());

        if !is_attenuation(parent, &child) {
            log::warn!(
                "node returned {} with {}:{} under {}:{}",
                child.id,
                child.subject_type,
                child.scope,
                parent.subject_type,
                parent.scope
            );
            return Err(ClientError::ScopeEscalation(format!(
                "{}:{} is not covered by {}:{}",
                child.subject_type, child.scope, parent.subject_type, parent.scope
            )));
        }

        log::info!("delegated {capability_id} to {to_did} as {}", child.id);
        Ok(self.graph.insert(child).clone())
    }

    /// Revoke a capability, and with [`RevocationScope::Chain`] everything
    /// delegated from it. Returns the ids whose status changed.
    ///
    /// When nothing in reach is still active this is a no-op and the node is
    /// not contacted. Otherwise the node is told first and the local graph
    /// is updated only after it acknowledged.
    pub fn revoke(
        &mut self,
        capability_id: &CapabilityId,
        scope: RevocationScope,
    ) -> Result<Vec<CapabilityId>> {
        let ctx = self.holder.context()?;
        if self.graph.pending_revocations(capability_id, scope)?.is_empty() {
            log::debug!("{capability_id} already revoked; nothing to do");
            return Ok(Vec::new());
        }

        let request = ctx.sign(RevokeRequest {
            capability_id: capability_id.clone(),
            revoker_did: ctx.did().clone(),
            scope,
        })?;
        self.gateway.revoke(&request)?;
        self.graph.revoke(capability_id, scope)
    }

    /// Capabilities held by this identity, in the order they were recorded.
    pub fn list_capabilities(&self) -> Result<Vec<Capability>> {
        let did = self.did()?;
        Ok(self.graph.held_by(did).cloned().collect())
    }

    /// Validate the delegation chain of `capability_id` as of now.
    pub fn validate(&self, capability_id: &CapabilityId) -> ValidationResult {
        validate(&self.graph, capability_id, InvocationContext::now())
    }

    pub fn validate_at(&self, capability_id: &CapabilityId, ctx: InvocationContext) -> ValidationResult {
        validate(&self.graph, capability_id, ctx)
    }

    /// Run the two-phase authorization for invoking `capability_id` now.
    pub fn authorize_invoke(&mut self, capability_id: &CapabilityId) -> Result<AuthorizationResult> {
        self.authorize_invoke_at(capability_id, InvocationContext::now())
    }

    pub fn authorize_invoke_at(
        &mut self,
        capability_id: &CapabilityId,
        invocation: InvocationContext,
    ) -> Result<AuthorizationResult> {
        let ctx = self.holder.context()?;
        coherence::authorize_invoke(
            ctx,
            &mut self.graph,
            &mut self.gateway,
            capability_id,
            invocation,
        )
    }

    /// Fetch the node's record of a capability. With `mirror`, the record is
    /// also added to the local graph.
    pub fn fetch_capability(&mut self, capability_id: &CapabilityId, mirror: bool) -> Result<Capability> {
        self.context()?;
        let capability = self.gateway.get_capability(capability_id)?;
        if mirror {
            self.graph.insert(capability.clone());
        }
        Ok(capability)
    }

    /// Capabilities the node lists for this identity.
    pub fn remote_capabilities(&mut self) -> Result<Vec<Capability>> {
        let did = self.did()?.clone();
        self.gateway.capabilities_of(&did)
    }

    pub fn graph(&self) -> &CapabilityGraph {
        &self.graph
    }

    // ── Social graph ──────────────────────────────────────────────────────

    pub fn introduce(&mut self, other_did: &str, edge_name: &str) -> Result<()> {
        let ctx = self.holder.context()?;
        let other = Did::parse(other_did)?;
        let request = ctx.sign(IntroduceRequest {
            introducer_did: ctx.did().clone(),
            introduced_did: other,
            edge_name: edge_name.to_string(),
        })?;
        self.gateway.introduce(&request)
    }

    /// Introduction path from this identity to `to_did`, both ends included.
    pub fn get_introduction_chain(&mut self, to_did: &str) -> Result<Vec<Did>> {
        let from = self.did()?.clone();
        let to = Did::parse(to_did)?;
        self.gateway.introduction_chain(&from, &to)
    }

    pub fn curvature_with(&mut self, other_did: &str) -> Result<CurvatureResult> {
        let did_a = self.did()?.clone();
        let did_b = Did::parse(other_did)?;
        let curvature = self.gateway.curvature(&did_a, &did_b)?;
        Ok(CurvatureResult {
            did_a,
            did_b,
            curvature,
        })
    }

    pub fn neighbors(&mut self) -> Result<Vec<Did>> {
        let did = self.did()?.clone();
        self.gateway.neighbors(&did)
    }

    /// Our own coherence, fetched fresh.
    pub fn coherence(&mut self) -> Result<CoherenceSnapshot> {
        let did = self.did()?.clone();
        coherence::snapshot(&mut self.gateway, &did)
    }

    pub fn peer_coherence(&mut self, did: &str) -> Result<CoherenceSnapshot> {
        self.context()?;
        let did = Did::parse(did)?;
        coherence::snapshot(&mut self.gateway, &did)
    }

    /// The node's identity document for `did`.
    pub fn get_identity(&mut self, did: &str) -> Result<serde_json::Value> {
        let did = Did::parse(did)?;
        self.gateway.get_identity(&did)
    }

    pub fn node_status(&mut self) -> Result<serde_json::Value> {
        self.gateway.node_status()
    }

    // ── Petnames ──────────────────────────────────────────────────────────

    pub fn assign_petname(&mut self, did: &str, petname: &str) -> Result<Did> {
        let owner = self.holder.context()?.did();
        self.petnames.assign(owner, did, petname)
    }

    pub fn resolve_petname(&self, petname: &str) -> Result<Did> {
        self.petnames.resolve(self.did()?, petname)
    }

    pub fn petname_of(&self, did: &Did) -> Result<Option<&str>> {
        Ok(self.petnames.petname_of(self.did()?, did))
    }

    pub fn remove_petname(&mut self, petname: &str) -> Result<Did> {
        let owner = self.holder.context()?.did();
        self.petnames.remove(owner, petname)
    }

    pub fn petnames(&self) -> Result<Vec<(String, Did)>> {
        Ok(self.petnames.entries(self.did()?))
    }

    // ── Export ────────────────────────────────────────────────────────────

    pub fn export(&self) -> GraphFile {
        GraphFile::from_graph(&self.graph, self.did().ok())
    }

    pub fn export_to(&self, path: &Path) -> Result<()> {
        self.export().save(path)
    }

    /// Merge an exported graph into the local one. Returns how many records
    /// were new.
    ///
    /// Existing records keep their state except that a revocation in the
    /// file is carried over. Use counts take the larger of the two.
    pub fn import(&mut self, file: GraphFile) -> usize {
        if let (Some(owner), Ok(did)) = (&file.owner, self.did()) {
            if owner != did {
                log::warn!("importing graph exported by {owner} into {did}");
            }
        }

        let mut added = 0;
        for capability in file.capabilities {
            if !self.graph.contains(&capability.id) {
                added += 1;
            }
            self.graph.insert(capability);
        }
        for (id, uses) in &file.uses {
            let merged = self.graph.uses(id).max(*uses);
            self.graph.set_uses(id, merged);
        }
        log::debug!("imported {added} new capabilities");
        added
    }

    pub fn import_from(&mut self, path: &Path) -> Result<usize> {
        Ok(self.import(GraphFile::load(path)?))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Close the gateway and release the identity.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.gateway.close();
        self.holder.release();
    }
}

impl<G: Gateway> Drop for Agent<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
