//! Integration test: full end-to-end workflow against an in-memory node.
//!
//! Tests the complete lifecycle:
//! 1. Register identities
//! 2. Create a root capability and delegate it
//! 3. Authorize invocations through the delegated chain
//! 4. Introduce identities and query the social graph
//! 5. Revoke the chain and verify revocation dominates
//! 6. Export and re-import the graph

use std::sync::{Arc, Mutex};

use disentangle_client::{
    Agent, AgentType, CapabilityConstraints, CapabilityId, ClientError, Constraints,
    DecisionStage, GraphFile, MemoryGateway, RevocationScope, ValidationFailure,
};

type SharedNode = Arc<Mutex<MemoryGateway>>;

fn node() -> SharedNode {
    Arc::new(Mutex::new(MemoryGateway::new()))
}

fn agent(node: &SharedNode, agent_type: AgentType) -> Agent<SharedNode> {
    let mut agent = Agent::new(Arc::clone(node));
    agent
        .register(agent_type, Some(b"model-v1"), None)
        .expect("registration should succeed");
    agent
}

#[test]
fn full_workflow_register_to_revocation() {
    let node = node();

    // ── Step 1: Register identities ─────────────────────────────────────
    let mut alice = agent(&node, AgentType::Agi);
    let mut bob = agent(&node, AgentType::Human);
    let alice_did = alice.did().unwrap().clone();
    let bob_did = bob.did().unwrap().clone();
    assert_ne!(alice_did, bob_did);
    assert_eq!(alice_did.method(), "disentangle");

    let document = bob.get_identity(alice_did.as_str()).unwrap();
    assert_eq!(document["agent_type"], "agi");

    // ── Step 2: Create and delegate ─────────────────────────────────────
    let root = alice
        .create_capability("file", "read", Constraints::new(), true)
        .expect("create should succeed");
    let child = alice
        .delegate(&root.id, bob_did.as_str())
        .expect("delegate should succeed");
    assert_eq!(child.parent_capability_id.as_ref(), Some(&root.id));
    assert_eq!(child.holder_did, bob_did);
    assert_eq!(alice.graph().children(&root.id).len(), 1);
    assert_eq!(alice.list_capabilities().unwrap(), vec![root.clone()]);

    // ── Step 3: Bob mirrors the chain and invokes ───────────────────────
    let listed = bob.remote_capabilities().unwrap();
    assert_eq!(listed.len(), 1);
    bob.fetch_capability(&child.id, true).unwrap();
    let before_parent = bob.validate(&child.id);
    assert_eq!(before_parent.reason, Some(ValidationFailure::BrokenChain));
    bob.fetch_capability(&root.id, true).unwrap();

    let decision = bob.authorize_invoke(&child.id).unwrap();
    assert!(decision.allowed, "denied: {:?}", decision.denial_reason);
    assert_eq!(decision.stage, DecisionStage::Remote);
    assert_eq!(decision.validation.depth(), 2);
    assert_eq!(bob.graph().uses(&root.id), 1);

    // ── Step 4: Social graph ────────────────────────────────────────────
    alice.introduce(bob_did.as_str(), "colleague").unwrap();
    assert_eq!(alice.neighbors().unwrap(), vec![bob_did.clone()]);
    assert_eq!(
        alice.get_introduction_chain(bob_did.as_str()).unwrap(),
        vec![alice_did.clone(), bob_did.clone()]
    );
    node.lock().unwrap().set_curvature(&alice_did, &bob_did, -0.25);
    let curvature = alice.curvature_with(bob_did.as_str()).unwrap();
    assert_eq!(curvature.curvature, -0.25);
    assert_eq!(curvature.did_a, alice_did);

    let mine = alice.coherence().unwrap();
    let theirs = alice.peer_coherence(bob_did.as_str()).unwrap();
    assert_eq!(mine.topological_mass, 1.0);
    assert!(theirs.observed_at > mine.observed_at);

    // ── Step 5: Revoke the chain ────────────────────────────────────────
    let changed = alice.revoke(&root.id, RevocationScope::Chain).unwrap();
    assert_eq!(changed, vec![root.id.clone(), child.id.clone()]);

    let validation = alice.validate(&child.id);
    assert!(!validation.ok);
    assert_eq!(validation.reason, Some(ValidationFailure::Revoked));

    // Bob's mirror is stale; the node refuses and its answer stands.
    let refused = bob.authorize_invoke(&child.id).unwrap();
    assert!(!refused.allowed);
    assert_eq!(refused.stage, DecisionStage::Remote);
    assert!(refused.coherence_score.is_some());

    // Refreshing the mirror makes the refusal local.
    bob.fetch_capability(&root.id, true).unwrap();
    let invokes_before = node.lock().unwrap().calls().invoke;
    let local = bob.authorize_invoke(&child.id).unwrap();
    assert_eq!(local.stage, DecisionStage::Local);
    assert_eq!(node.lock().unwrap().calls().invoke, invokes_before);

    // ── Step 6: Export and import ───────────────────────────────────────
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alice-graph.json");
    alice.export_to(&path).unwrap();
    let file = GraphFile::load(&path).unwrap();
    assert_eq!(file.owner.as_ref(), Some(&alice_did));
    let restored = file.into_graph();
    assert_eq!(restored.len(), 2);
    assert!(restored.get(&child.id).unwrap().is_revoked());
}

#[test]
fn scenario_chain_revoke_invalidates_delegate() {
    let node = node();
    let mut a = agent(&node, AgentType::Agi);
    let b = agent(&node, AgentType::Agi);

    let r = a
        .create_capability("file", "read", Constraints::new(), true)
        .unwrap();
    let d = a.delegate(&r.id, b.did().unwrap().as_str()).unwrap();
    a.revoke(&r.id, RevocationScope::Chain).unwrap();

    let result = a.validate(&d.id);
    assert!(!result.ok);
    assert_eq!(result.reason, Some(ValidationFailure::Revoked));
}

#[test]
fn scenario_unregistered_agent_is_refused() {
    let mut b = Agent::new(MemoryGateway::new());
    let id = CapabilityId::new("anything");

    assert!(matches!(
        b.create_capability("file", "read", Constraints::new(), true),
        Err(ClientError::NotRegistered)
    ));
    assert!(matches!(
        b.delegate(&id, "did:disentangle:x"),
        Err(ClientError::NotRegistered)
    ));
    assert!(matches!(
        b.revoke(&id, RevocationScope::Single),
        Err(ClientError::NotRegistered)
    ));
    assert!(matches!(b.list_capabilities(), Err(ClientError::NotRegistered)));
    assert!(matches!(
        b.authorize_invoke(&id),
        Err(ClientError::NotRegistered)
    ));
    assert!(matches!(
        b.introduce("did:disentangle:x", "knows"),
        Err(ClientError::NotRegistered)
    ));
    assert_eq!(b.gateway().calls().total(), 0);
}

#[test]
fn scenario_delegate_revoked_capability() {
    let node = node();
    let mut a = agent(&node, AgentType::Agi);
    let b = agent(&node, AgentType::Agi);
    let r = a
        .create_capability("file", "read", Constraints::new(), true)
        .unwrap();
    a.revoke(&r.id, RevocationScope::Single).unwrap();
    let graph_size = a.graph().len();
    let delegates_before = node.lock().unwrap().calls().delegate;

    let result = a.delegate(&r.id, b.did().unwrap().as_str());
    assert!(matches!(result, Err(ClientError::NotDelegatable(_))));
    assert_eq!(a.graph().len(), graph_size);
    assert_eq!(node.lock().unwrap().calls().delegate, delegates_before);
}

#[test]
fn local_failure_makes_no_network_calls() {
    let node = node();
    let mut a = agent(&node, AgentType::Agi);
    let expiring = CapabilityConstraints::time_bounded(1, 2).into_map();
    let cap = a
        .create_capability("db", "query", expiring, false)
        .unwrap();
    let before = node.lock().unwrap().calls();

    let result = a.authorize_invoke(&cap.id).unwrap();
    assert!(!result.allowed);
    assert_eq!(
        result.validation.reason,
        Some(ValidationFailure::ExpiredConstraint)
    );
    assert_eq!(node.lock().unwrap().calls(), before);
}

#[test]
fn low_coherence_is_denied_remotely() {
    let node = node();
    let mut a = agent(&node, AgentType::Agi);
    let cap = a
        .create_capability("api", "call:*", Constraints::new(), false)
        .unwrap();
    {
        let mut n = node.lock().unwrap();
        n.set_coherence(a.did().unwrap(), 0.05);
        n.set_min_invoke_coherence(0.3);
    }

    let result = a.authorize_invoke(&cap.id).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.stage, DecisionStage::Remote);
    assert_eq!(result.coherence_score, Some(0.05));
    assert_eq!(result.snapshot.unwrap().composite_score, 0.05);
    assert_eq!(a.graph().uses(&cap.id), 0);
}

#[test]
fn attenuated_delegation_narrows_scope() {
    let node = node();
    let mut a = agent(&node, AgentType::Agi);
    let b = agent(&node, AgentType::Agi);
    let cap = a
        .create_capability("file", "docs/*", Constraints::new(), true)
        .unwrap();
    node.lock()
        .unwrap()
        .override_delegation_scope(Some("docs/reports".into()));

    let child = a.delegate(&cap.id, b.did().unwrap().as_str()).unwrap();
    assert_eq!(child.scope, "docs/reports");

    node.lock()
        .unwrap()
        .override_delegation_scope(Some("admin/*".into()));
    let widened = a.delegate(&cap.id, b.did().unwrap().as_str());
    assert!(matches!(widened, Err(ClientError::ScopeEscalation(_))));
    assert_eq!(a.graph().children(&cap.id).len(), 1);
}

#[test]
fn offline_node_surfaces_connection_error() {
    let node = node();
    let mut a = agent(&node, AgentType::Agi);
    node.lock().unwrap().set_offline(true);

    let err = a
        .create_capability("file", "read", Constraints::new(), true)
        .unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)));
    assert_eq!(err.stage(), disentangle_client::Stage::Transport);
    assert!(a.graph().is_empty());
}
