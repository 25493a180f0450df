//! Chain validation: is a capability still usable right now?
//!
//! Walks from a capability up through its parent links to a root:
//! 1. Unknown start → `unknown`
//! 2. Any revoked node on the path → `revoked` (stop walking)
//! 3. A dangling parent reference or a loop → `broken_chain`
//! 4. A child wider than its parent (scope or subject type) → `broken_chain`
//! 5. Constraints of every node on the path, leaf first → `expired_constraint`
//!
//! Validation is purely local. A passing result is necessary but not
//! sufficient for an invocation: the node has the final word.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::constraint::{CapabilityConstraints, ConstraintViolation};
use super::graph::CapabilityGraph;
use super::scope::is_attenuation;
use super::types::CapabilityId;

/// Why a capability failed local validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    Revoked,
    BrokenChain,
    ExpiredConstraint,
    Unknown,
}

impl ValidationFailure {
    /// Return a stable string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revoked => "revoked",
            Self::BrokenChain => "broken_chain",
            Self::ExpiredConstraint => "expired_constraint",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub reason: Option<ValidationFailure>,
    /// The capability on the path where validation stopped.
    pub failed_at: Option<CapabilityId>,
    /// Ids walked, leaf first.
    pub path: Vec<CapabilityId>,
}

impl ValidationResult {
    fn valid(path: Vec<CapabilityId>) -> Self {
        Self {
            ok: true,
            reason: None,
            failed_at: None,
            path,
        }
    }

    fn invalid(reason: ValidationFailure, at: &CapabilityId, path: Vec<CapabilityId>) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            failed_at: Some(at.clone()),
            path,
        }
    }

    /// Number of capabilities walked before validation stopped.
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// The moment an invocation is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationContext {
    /// Microseconds since Unix epoch.
    pub now: u64,
}

impl InvocationContext {
    pub fn now() -> Self {
        Self {
            now: crate::time::now_micros(),
        }
    }

    pub fn at(now: u64) -> Self {
        Self { now }
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::now()
    }
}

/// Validate the delegation chain ending at `id`.
pub fn validate(
    graph: &CapabilityGraph,
    id: &CapabilityId,
    ctx: InvocationContext,
) -> ValidationResult {
    let Some(start) = graph.get(id) else {
        return ValidationResult::invalid(ValidationFailure::Unknown, id, Vec::new());
    };

    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = start;
    let mut widened: Option<&CapabilityId> = None;
    loop {
        if !seen.insert(&current.id) {
            return ValidationResult::invalid(ValidationFailure::BrokenChain, &current.id, path);
        }
        path.push(current.id.clone());

        if current.is_revoked() {
            return ValidationResult::invalid(ValidationFailure::Revoked, &current.id, path);
        }

        let Some(parent_id) = &current.parent_capability_id else {
            break;
        };
        match graph.get(parent_id) {
            Some(parent) => {
                if widened.is_none() && !is_attenuation(parent, current) {
                    widened = Some(&current.id);
                }
                current = parent;
            }
            None => {
                return ValidationResult::invalid(
                    ValidationFailure::BrokenChain,
                    &current.id,
                    path,
                );
            }
        }
    }

    // Revocation higher up still wins over an escalation below it.
    if let Some(child) = widened {
        log::warn!("capability {child} is wider than its parent");
        return ValidationResult::invalid(ValidationFailure::BrokenChain, child, path);
    }

    for cap_id in &path {
        let Some(cap) = graph.get(cap_id) else {
            continue;
        };
        let outcome = CapabilityConstraints::from_map(&cap.constraints)
            .and_then(|c| c.check(ctx.now, graph.uses(cap_id)));
        match outcome {
            Ok(()) => {}
            Err(ConstraintViolation::Malformed(key)) => {
                log::warn!("capability {cap_id} has a malformed {key} constraint");
                return ValidationResult::invalid(ValidationFailure::Unknown, cap_id, path.clone());
            }
            Err(_) => {
                return ValidationResult::invalid(
                    ValidationFailure::ExpiredConstraint,
                    cap_id,
                    path.clone(),
                );
            }
        }
    }

    ValidationResult::valid(path)
}
