//! Capabilities: the local delegation graph and its validation.
//!
//! The capability module provides:
//! - Capability records and revocation scopes
//! - Scope coverage with wildcard matching (attenuation only)
//! - Time- and count-bounded constraints
//! - An arena-backed delegation graph with chain revocation
//! - Chain validation from a capability to its root

pub mod constraint;
pub mod graph;
pub mod scope;
pub mod types;
pub mod validate;

pub use constraint::{CapabilityConstraints, ConstraintViolation};
pub use graph::CapabilityGraph;
pub use scope::{is_attenuation, scope_covers};
pub use types::{Capability, CapabilityId, CapabilityStatus, Constraints, RevocationScope};
pub use validate::{validate, InvocationContext, ValidationFailure, ValidationResult};
