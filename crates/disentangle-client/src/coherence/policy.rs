//! Coherence policy: the two-phase authorization of an invocation.
//!
//! Phase one is local: the delegation chain must validate. A local failure
//! ends the decision with no network traffic at all. Phase two asks the
//! node: a fresh coherence snapshot of the invoker is fetched, then the
//! signed invoke is sent. The node's verdict is final; a remote denial is
//! never overridden locally.

use serde::{Deserialize, Serialize};

use crate::capability::{validate, CapabilityGraph, CapabilityId, InvocationContext, ValidationResult};
use crate::error::{ClientError, Result};
use crate::gateway::{Gateway, InvokeRequest};
use crate::identity::{Did, IdentityContext};

use super::types::CoherenceSnapshot;

/// Which phase produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStage {
    Local,
    Remote,
}

/// Outcome of [`authorize_invoke`]. Denials are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub allowed: bool,
    pub coherence_score: Option<f64>,
    pub denial_reason: Option<String>,
    pub stage: DecisionStage,
    pub validation: ValidationResult,
    /// Absent when the decision was made locally.
    pub snapshot: Option<CoherenceSnapshot>,
}

impl AuthorizationResult {
    fn local_denial(validation: ValidationResult) -> Self {
        let reason = match (&validation.reason, &validation.failed_at) {
            (Some(reason), Some(at)) => format!("{reason} at {at}"),
            (Some(reason), None) => reason.to_string(),
            _ => "validation failed".to_string(),
        };
        Self {
            allowed: false,
            coherence_score: None,
            denial_reason: Some(reason),
            stage: DecisionStage::Local,
            validation,
            snapshot: None,
        }
    }
}

/// Fetch a fresh coherence snapshot for `did`.
pub fn snapshot<G: Gateway + ?Sized>(gateway: &mut G, did: &Did) -> Result<CoherenceSnapshot> {
    let profile = gateway.coherence(did)?;
    Ok(CoherenceSnapshot::observe(profile))
}

/// Decide whether the holder of `ctx` may invoke capability `id`.
///
/// On approval every capability on the delegation path has its use count
/// incremented.
///
/// # Errors
///
/// Transport failures, and remote errors other than a capability denial
/// (such as `NotFound` for a capability the node does not know).
pub fn authorize_invoke<G: Gateway + ?Sized>(
    ctx: &IdentityContext,
    graph: &mut CapabilityGraph,
    gateway: &mut G,
    id: &CapabilityId,
    invocation: InvocationContext,
) -> Result<AuthorizationResult> {
    let validation = validate(graph, id, invocation);
    if !validation.ok {
        log::debug!("invoke of {id} denied locally: {:?}", validation.reason);
        return Ok(AuthorizationResult::local_denial(validation));
    }

    let snapshot = snapshot(gateway, ctx.did())?;
    let request = ctx.sign(InvokeRequest {
        capability_id: id.clone(),
        invoker_did: ctx.did().clone(),
    })?;

    let (allowed, coherence_score, denial_reason) = match gateway.invoke(&request) {
        Ok(outcome) if outcome.success => (true, Some(snapshot.composite_score), None),
        Ok(outcome) => (
            false,
            Some(snapshot.composite_score),
            Some(
                outcome
                    .message
                    .unwrap_or_else(|| "invocation refused".to_string()),
            ),
        ),
        Err(ClientError::CapabilityDenied {
            message,
            coherence_score,
        }) => (
            false,
            coherence_score.or(Some(snapshot.composite_score)),
            Some(message),
        ),
        Err(e) => return Err(e),
    };

    if allowed {
        graph.record_use(id)?;
        log::info!(
            "invoke of {id} approved (coherence {:.3})",
            snapshot.composite_score
        );
    } else {
        log::info!(
            "invoke of {id} denied by node: {}",
            denial_reason.as_deref().unwrap_or_default()
        );
    }

    Ok(AuthorizationResult {
        allowed,
        coherence_score,
        denial_reason,
        stage: DecisionStage::Remote,
        validation,
        snapshot: Some(snapshot),
    })
}
