//! Stress test: deep and wide delegation graphs under chain revocation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use disentangle_client::{
    Agent, AgentType, Capability, CapabilityGraph, CapabilityId, CapabilityStatus, Constraints,
    Did, InvocationContext, MemoryGateway, RevocationScope, ValidationFailure,
};

fn cap(id: String, parent: Option<String>) -> Capability {
    let owner = Did::parse("did:disentangle:root").unwrap();
    Capability {
        id: CapabilityId::new(id),
        subject_type: "file".into(),
        scope: "read:*".into(),
        constraints: Constraints::new(),
        delegatable: true,
        issuer_did: owner.clone(),
        holder_did: owner,
        parent_capability_id: parent.map(CapabilityId::new),
        status: CapabilityStatus::Active,
    }
}

/// A linear chain `n0 <- n1 <- ... <- n{depth-1}`.
fn linear(depth: usize) -> CapabilityGraph {
    let mut graph = CapabilityGraph::new();
    for i in 0..depth {
        let parent = (i > 0).then(|| format!("n{}", i - 1));
        graph.insert(cap(format!("n{i}"), parent));
    }
    graph
}

#[test]
fn stress_chain_revoke_depth_1000() {
    let depth = 1000;
    let mut graph = linear(depth);
    let root = CapabilityId::new("n0");
    let leaf = CapabilityId::new(format!("n{}", depth - 1));

    let before = disentangle_client::validate(&graph, &leaf, InvocationContext::now());
    assert!(before.ok);
    assert_eq!(before.depth(), depth);

    let changed = graph.revoke(&root, RevocationScope::Chain).unwrap();
    assert_eq!(changed.len(), depth);
    assert!(graph.iter().all(Capability::is_revoked));

    let after = disentangle_client::validate(&graph, &leaf, InvocationContext::now());
    assert_eq!(after.reason, Some(ValidationFailure::Revoked));
    assert_eq!(after.failed_at, Some(leaf));

    // Revoking again changes nothing.
    assert!(graph
        .revoke(&root, RevocationScope::Chain)
        .unwrap()
        .is_empty());
    assert!(graph
        .pending_revocations(&root, RevocationScope::Single)
        .unwrap()
        .is_empty());
}

#[test]
fn stress_single_revoke_in_the_middle_dominates() {
    let depth = 200;
    let mut graph = linear(depth);
    let middle = CapabilityId::new("n100");
    let leaf = CapabilityId::new(format!("n{}", depth - 1));

    graph.revoke(&middle, RevocationScope::Single).unwrap();
    let active = graph.iter().filter(|c| c.is_active()).count();
    assert_eq!(active, depth - 1);

    let result = disentangle_client::validate(&graph, &leaf, InvocationContext::now());
    assert_eq!(result.reason, Some(ValidationFailure::Revoked));
    assert_eq!(result.failed_at, Some(middle));
    assert_eq!(result.depth(), depth - 100);
}

#[test]
fn stress_wide_tree_revoke_visits_each_once() {
    // Root with 50 children, each with 20 grandchildren.
    let mut graph = CapabilityGraph::new();
    graph.insert(cap("root".into(), None));
    for c in 0..50 {
        graph.insert(cap(format!("c{c}"), Some("root".into())));
        for g in 0..20 {
            graph.insert(cap(format!("c{c}-g{g}"), Some(format!("c{c}"))));
        }
    }
    let root = CapabilityId::new("root");
    assert_eq!(graph.descendants(&root).len(), 50 + 50 * 20);

    // Pre-revoke one subtree; the chain revoke only reports the rest.
    graph
        .revoke(&CapabilityId::new("c7"), RevocationScope::Chain)
        .unwrap();
    let changed = graph.revoke(&root, RevocationScope::Chain).unwrap();
    assert_eq!(changed.len(), 1 + 49 + 49 * 20);

    let unique: HashSet<_> = changed.iter().collect();
    assert_eq!(unique.len(), changed.len());
    assert!(graph.iter().all(Capability::is_revoked));
}

#[test]
fn stress_delegation_chain_across_50_agents() {
    let depth = 50;
    let node = Arc::new(Mutex::new(MemoryGateway::new()));
    let mut agents: Vec<Agent<Arc<Mutex<MemoryGateway>>>> = (0..=depth)
        .map(|_| {
            let mut agent = Agent::new(Arc::clone(&node));
            agent.register(AgentType::Agi, None, None).unwrap();
            agent
        })
        .collect();
    let dids: Vec<String> = agents
        .iter()
        .map(|a| a.did().unwrap().to_string())
        .collect();

    let root = agents[0]
        .create_capability("file", "read:*", Constraints::new(), true)
        .unwrap();
    let mut ids = vec![root.id.clone()];
    for i in 0..depth {
        let child = agents[i]
            .delegate(ids.last().unwrap(), &dids[i + 1])
            .unwrap_or_else(|e| panic!("delegation {i} failed: {e}"));
        agents[i + 1].fetch_capability(&child.id, true).unwrap();
        ids.push(child.id);
    }

    // The last holder mirrors the whole chain and may invoke.
    let last = agents.last_mut().unwrap();
    for id in &ids {
        last.fetch_capability(id, true).unwrap();
    }
    let leaf = ids.last().unwrap().clone();
    let decision = last.authorize_invoke(&leaf).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.validation.depth(), depth + 1);

    // The root issuer revokes everything downstream on the node.
    agents[0].revoke(&root.id, RevocationScope::Chain).unwrap();
    {
        let node = node.lock().unwrap();
        for id in &ids {
            assert!(node.capability(id).unwrap().is_revoked(), "{id} still active");
        }
    }

    let last = agents.last_mut().unwrap();
    let refused = last.authorize_invoke(&leaf).unwrap();
    assert!(!refused.allowed);
}
