//! Coherence and curvature values reported by the node.
//!
//! The client never computes these; it only carries them into policy.

use serde::{Deserialize, Serialize};

use crate::identity::Did;

/// Coherence profile as the node serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceProfile {
    pub did: Did,
    pub composite_score: f64,
    pub topological_mass: f64,
    pub relational_diversity: f64,
    #[serde(default)]
    pub mean_local_curvature: Option<f64>,
    #[serde(default)]
    pub temporal_depth: Option<u64>,
    #[serde(default)]
    pub decayed_mass: Option<f64>,
}

/// A coherence profile stamped with the moment it was received.
///
/// Snapshots are fetched fresh for every authorization decision and are
/// never cached by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceSnapshot {
    pub did: Did,
    pub composite_score: f64,
    pub topological_mass: f64,
    pub relational_diversity: f64,
    pub mean_local_curvature: Option<f64>,
    pub temporal_depth: Option<u64>,
    pub decayed_mass: Option<f64>,
    /// Logical receive time; strictly increasing within the process.
    pub observed_at: u64,
}

impl CoherenceSnapshot {
    pub fn observe(profile: CoherenceProfile) -> Self {
        Self {
            did: profile.did,
            composite_score: profile.composite_score,
            topological_mass: profile.topological_mass,
            relational_diversity: profile.relational_diversity,
            mean_local_curvature: profile.mean_local_curvature,
            temporal_depth: profile.temporal_depth,
            decayed_mass: profile.decayed_mass,
            observed_at: crate::time::logical_now(),
        }
    }
}

/// Symmetric relational measure between two identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvatureResult {
    pub did_a: Did,
    pub did_b: Did,
    pub curvature: f64,
}
