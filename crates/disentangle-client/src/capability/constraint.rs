//! Capability constraints: time and count limits.
//!
//! Constraints travel as a free-form map. The keys below are evaluated
//! locally before an invocation; any other key is left to the node.
//!
//! | key          | value                                   |
//! |--------------|-----------------------------------------|
//! | `not_before` | microseconds since epoch (u64)          |
//! | `not_after`  | microseconds since epoch (u64)          |
//! | `max_uses`   | maximum number of invocations (u64)     |

use serde_json::Value;

use super::types::Constraints;

pub const NOT_BEFORE: &str = "not_before";
pub const NOT_AFTER: &str = "not_after";
pub const MAX_USES: &str = "max_uses";

/// Why a set of constraints is not satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    NotYetValid,
    Expired,
    UsesExhausted,
    /// A recognized key carried a value of the wrong shape.
    Malformed(String),
}

/// The locally enforced subset of a capability's constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityConstraints {
    pub not_before: Option<u64>,
    pub not_after: Option<u64>,
    pub max_uses: Option<u64>,
}

impl CapabilityConstraints {
    /// No limits.
    pub fn open() -> Self {
        Self::default()
    }

    /// Valid only inside `[not_before, not_after]`.
    pub fn time_bounded(not_before: u64, not_after: u64) -> Self {
        Self {
            not_before: Some(not_before),
            not_after: Some(not_after),
            max_uses: None,
        }
    }

    /// Add a maximum use count.
    pub fn with_max_uses(mut self, max: u64) -> Self {
        self.max_uses = Some(max);
        self
    }

    /// Read the recognized keys out of a constraint map.
    pub fn from_map(map: &Constraints) -> Result<Self, ConstraintViolation> {
        Ok(Self {
            not_before: read_u64(map, NOT_BEFORE)?,
            not_after: read_u64(map, NOT_AFTER)?,
            max_uses: read_u64(map, MAX_USES)?,
        })
    }

    /// Write these limits into a constraint map, leaving other keys alone.
    pub fn apply_to(&self, map: &mut Constraints) {
        for (key, value) in [
            (NOT_BEFORE, self.not_before),
            (NOT_AFTER, self.not_after),
            (MAX_USES, self.max_uses),
        ] {
            if let Some(v) = value {
                map.insert(key.to_string(), Value::from(v));
            }
        }
    }

    /// Build a fresh constraint map.
    pub fn into_map(self) -> Constraints {
        let mut map = Constraints::new();
        self.apply_to(&mut map);
        map
    }

    /// Check the limits at `now` with `uses` prior invocations.
    pub fn check(&self, now: u64, uses: u64) -> Result<(), ConstraintViolation> {
        if let Some(start) = self.not_before {
            if now < start {
                return Err(ConstraintViolation::NotYetValid);
            }
        }
        if let Some(expiry) = self.not_after {
            if now > expiry {
                return Err(ConstraintViolation::Expired);
            }
        }
        if let Some(max) = self.max_uses {
            if uses >= max {
                return Err(ConstraintViolation::UsesExhausted);
            }
        }
        Ok(())
    }
}

fn read_u64(map: &Constraints, key: &str) -> Result<Option<u64>, ConstraintViolation> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| ConstraintViolation::Malformed(key.to_string())),
    }
}
