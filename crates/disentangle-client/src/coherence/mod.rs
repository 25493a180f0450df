//! Coherence: node-reported trust signals and the policy that consumes them.

pub mod policy;
pub mod types;

pub use policy::{authorize_invoke, snapshot, AuthorizationResult, DecisionStage};
pub use types::{CoherenceProfile, CoherenceSnapshot, CurvatureResult};
