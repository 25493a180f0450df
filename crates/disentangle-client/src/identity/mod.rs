//! Identity management: DIDs, the held key pair, signed requests.
//!
//! The identity module provides the [`IdentityHolder`], the root of the
//! client's cryptographic identity, and the [`IdentityContext`] that signs
//! every mutating request.

pub mod did;
pub mod holder;
pub mod signature;

pub use did::{is_valid_did, Did};
pub use holder::{AgentType, Identity, IdentityContext, IdentityHolder};
pub use signature::{Operation, RequestSignature, Signed};
