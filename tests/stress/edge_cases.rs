//! Edge cases: malformed identifiers, wildcard boundaries, constraint
//! boundaries, malformed links and out-of-order graph records.

use disentangle_client::capability::{is_attenuation, scope_covers};
use disentangle_client::crypto::keys::Ed25519KeyPair;
use disentangle_client::identity::is_valid_did;
use disentangle_client::{
    validate, Agent, AgentType, Capability, CapabilityConstraints, CapabilityGraph, CapabilityId,
    CapabilityStatus, ClientError, Constraints, DecisionStage, Did, GraphFile, InvocationContext,
    MemoryGateway, RevocationScope, Stage, ValidationFailure,
};

fn cap(id: &str, parent: Option<&str>, scope: &str) -> Capability {
    let owner = Did::parse("did:disentangle:owner").unwrap();
    Capability {
        id: CapabilityId::new(id),
        subject_type: "file".into(),
        scope: scope.into(),
        constraints: Constraints::new(),
        delegatable: true,
        issuer_did: owner.clone(),
        holder_did: owner,
        parent_capability_id: parent.map(CapabilityId::new),
        status: CapabilityStatus::Active,
    }
}

#[test]
fn did_structure_edge_cases() {
    for valid in [
        "did:disentangle:abc",
        "did:web:example.com",
        "did:key:z6Mk-_.%3A",
        "did:disentangle:a:b:c",
        "did:m0:1",
    ] {
        assert!(is_valid_did(valid), "{valid} should be valid");
    }
    for invalid in [
        "",
        "did:",
        "did:disentangle",
        "did:disentangle:",
        "did::abc",
        "did:Disentangle:abc",
        "DID:disentangle:abc",
        "did:disentangle:abc:",
        "did:disentangle:a b",
        "did:disentangle:ä",
        "urn:disentangle:abc",
    ] {
        assert!(!is_valid_did(invalid), "{invalid:?} should be invalid");
        assert!(matches!(Did::parse(invalid), Err(ClientError::InvalidDid(_))));
    }
}

#[test]
fn did_serde_rejects_malformed() {
    let ok: Did = serde_json::from_str("\"did:disentangle:abc\"").unwrap();
    assert_eq!(ok.method(), "disentangle");
    assert!(serde_json::from_str::<Did>("\"disentangle:abc\"").is_err());
}

#[test]
fn scope_wildcard_boundaries() {
    assert!(scope_covers("read:*", "read"));
    assert!(scope_covers("read:*", "read:docs:2024"));
    assert!(!scope_covers("read:*", "reader"));
    assert!(!scope_covers("read:*", "read/docs"));
    assert!(scope_covers("storage/*", "storage/a/b"));
    assert!(!scope_covers("storage/*", "storage2/a"));
    assert!(!scope_covers("read", "*"));
    assert!(!scope_covers("read:docs", "read:*"));
    assert!(!scope_covers("", "read"));
}

#[test]
fn attenuation_requires_same_subject() {
    let parent = cap("p", None, "*");
    let mut child = cap("c", Some("p"), "read");
    assert!(is_attenuation(&parent, &child));
    child.subject_type = "database".into();
    assert!(!is_attenuation(&parent, &child));
}

#[test]
fn constraint_window_is_inclusive() {
    let mut graph = CapabilityGraph::new();
    let mut root = cap("r", None, "read");
    root.constraints = CapabilityConstraints::time_bounded(100, 200).into_map();
    graph.insert(root);
    let id = CapabilityId::new("r");

    assert!(validate(&graph, &id, InvocationContext::at(100)).ok);
    assert!(validate(&graph, &id, InvocationContext::at(200)).ok);
    assert_eq!(
        validate(&graph, &id, InvocationContext::at(201)).reason,
        Some(ValidationFailure::ExpiredConstraint)
    );
}

#[test]
fn unknown_constraint_keys_are_ignored_locally() {
    let mut graph = CapabilityGraph::new();
    let mut root = cap("r", None, "read");
    root.constraints
        .insert("region".into(), serde_json::json!("eu-west"));
    root.constraints.insert("not_after".into(), serde_json::Value::Null);
    graph.insert(root);

    assert!(validate(&graph, &CapabilityId::new("r"), InvocationContext::now()).ok);
}

#[test]
fn negative_limit_fails_closed() {
    let mut graph = CapabilityGraph::new();
    let mut root = cap("r", None, "read");
    root.constraints.insert("max_uses".into(), serde_json::json!(-1));
    graph.insert(root);

    let result = validate(&graph, &CapabilityId::new("r"), InvocationContext::now());
    assert!(!result.ok);
    assert_eq!(result.reason, Some(ValidationFailure::Unknown));
}

#[test]
fn self_parented_record_is_broken_chain() {
    let mut graph = CapabilityGraph::new();
    graph.insert(cap("loop", Some("loop"), "read"));

    let result = validate(&graph, &CapabilityId::new("loop"), InvocationContext::now());
    assert_eq!(result.reason, Some(ValidationFailure::BrokenChain));

    // Revocation still terminates.
    let changed = graph
        .revoke(&CapabilityId::new("loop"), RevocationScope::Chain)
        .unwrap();
    assert_eq!(changed.len(), 1);
}

#[test]
fn stale_copy_does_not_resurrect() {
    let mut graph = CapabilityGraph::new();
    graph.insert(cap("r", None, "read"));
    graph
        .revoke(&CapabilityId::new("r"), RevocationScope::Single)
        .unwrap();

    graph.insert(cap("r", None, "read"));
    assert!(graph.get(&CapabilityId::new("r")).unwrap().is_revoked());
    assert_eq!(graph.len(), 1);
}

#[test]
fn children_before_parents_are_linked() {
    let mut graph = CapabilityGraph::new();
    graph.insert(cap("grandchild", Some("child"), "read"));
    graph.insert(cap("child", Some("root"), "read"));
    assert_eq!(
        validate(&graph, &CapabilityId::new("grandchild"), InvocationContext::now()).reason,
        Some(ValidationFailure::BrokenChain)
    );

    graph.insert(cap("root", None, "*"));
    let result = validate(&graph, &CapabilityId::new("grandchild"), InvocationContext::now());
    assert!(result.ok);
    assert_eq!(
        graph
            .path_to_root(&CapabilityId::new("grandchild"))
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>(),
        vec!["grandchild", "child", "root"]
    );
}

#[test]
fn petname_edge_cases() {
    let mut agent = Agent::new(MemoryGateway::new());
    agent.register(AgentType::Human, None, None).unwrap();

    assert!(matches!(
        agent.assign_petname("did:disentangle:bob", ""),
        Err(ClientError::InvalidPetname(_))
    ));
    assert!(matches!(
        agent.assign_petname("bob", "bob"),
        Err(ClientError::InvalidDid(_))
    ));
    assert!(matches!(
        agent.resolve_petname("bob"),
        Err(ClientError::PetnameNotFound(_))
    ));

    // Surrounding whitespace is not part of the name.
    agent
        .assign_petname("did:disentangle:bob", "  bob ")
        .unwrap();
    assert_eq!(
        agent.resolve_petname("bob").unwrap().as_str(),
        "did:disentangle:bob"
    );
}

#[test]
fn garbage_graph_file_is_rejected() {
    assert!(matches!(
        GraphFile::from_json("{\"version\": 1}"),
        Err(ClientError::InvalidFileFormat(_))
    ));
    assert!(matches!(
        GraphFile::from_json("not json"),
        Err(ClientError::InvalidFileFormat(_))
    ));
}

#[test]
fn register_twice_is_refused_locally() {
    let mut agent = Agent::new(MemoryGateway::new());
    let first = agent.register(AgentType::Agi, None, None).unwrap();
    let second = agent.register(AgentType::Agi, None, None);

    assert!(matches!(second, Err(ClientError::AlreadyRegistered(d)) if d == first.did.as_str()));
    assert_eq!(agent.gateway().calls().register, 1);
}

#[test]
fn supplied_key_yields_stable_did() {
    let seed = [7u8; 32];
    let mut first = Agent::new(MemoryGateway::new());
    let mut second = Agent::new(MemoryGateway::new());

    let a = first
        .register_with_key(
            Ed25519KeyPair::from_signing_key_bytes(&seed),
            AgentType::Agi,
            None,
            None,
        )
        .unwrap();
    let b = second
        .register_with_key(
            Ed25519KeyPair::from_signing_key_bytes(&seed),
            AgentType::Agi,
            None,
            None,
        )
        .unwrap();

    assert_eq!(a.did, b.did);
    assert_eq!(a.public_key, b.public_key);
}

#[test]
fn imported_widened_child_is_refused_locally() {
    let mut agent = Agent::new(MemoryGateway::new());
    agent.register(AgentType::Agi, None, None).unwrap();

    let mut graph = CapabilityGraph::new();
    graph.insert(cap("r", None, "read"));
    let mut widened = cap("c", Some("r"), "*");
    widened.subject_type = "admin".into();
    graph.insert(widened);
    agent.import(GraphFile::from_graph(&graph, None));

    let calls_before = agent.gateway().calls();
    let decision = agent.authorize_invoke(&CapabilityId::new("c")).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.stage, DecisionStage::Local);
    assert_eq!(
        decision.validation.reason,
        Some(ValidationFailure::BrokenChain)
    );
    assert_eq!(agent.gateway().calls(), calls_before);
}

#[test]
fn local_misses_report_local_stage() {
    let mut agent = Agent::new(MemoryGateway::new());
    agent.register(AgentType::Agi, None, None).unwrap();
    let ghost = CapabilityId::new("ghost");

    let delegate = agent.delegate(&ghost, "did:disentangle:bob").unwrap_err();
    assert!(matches!(delegate, ClientError::UnknownCapability(_)));
    assert_eq!(delegate.stage(), Stage::Local);

    let revoke = agent.revoke(&ghost, RevocationScope::Chain).unwrap_err();
    assert_eq!(revoke.stage(), Stage::Local);

    let load = GraphFile::load(std::path::Path::new("/nonexistent/graph.json")).unwrap_err();
    assert!(matches!(load, ClientError::FileNotFound(_)));
    assert_eq!(load.stage(), Stage::Local);

    // A miss on the node is still a remote failure.
    let remote = agent.fetch_capability(&ghost, false).unwrap_err();
    assert!(matches!(remote, ClientError::NotFound(_)));
    assert_eq!(remote.stage(), Stage::Remote);
    assert_eq!(agent.gateway().calls().delegate + agent.gateway().calls().revoke, 0);
}
