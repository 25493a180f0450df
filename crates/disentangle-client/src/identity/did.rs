//! Decentralized identifiers.
//!
//! Only the structure is checked: `did:<method>:<method-specific-id>`.
//! Whether a DID is actually registered is the node's business.

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// A structurally valid decentralized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse and validate a DID string.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if is_valid_did(&s) {
            Ok(Self(s))
        } else {
            Err(ClientError::InvalidDid(s))
        }
    }

    /// The DID method, e.g. `disentangle` in `did:disentangle:abc`.
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Structural DID check.
///
/// - scheme must be exactly `did`
/// - method is one or more of `[a-z0-9]`
/// - method-specific id is non-empty, drawn from `[A-Za-z0-9._:%-]`,
///   and does not end in `:`
pub fn is_valid_did(s: &str) -> bool {
    let mut parts = s.splitn(3, ':');
    let (Some(scheme), Some(method), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    if scheme != "did" {
        return false;
    }
    if method.is_empty()
        || !method
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return false;
    }
    if id.is_empty() || id.ends_with(':') {
        return false;
    }
    id.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'))
}

impl TryFrom<String> for Did {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl std::str::FromStr for Did {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
