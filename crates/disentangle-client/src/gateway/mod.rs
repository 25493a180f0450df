//! Remote gateway: the request/response contract with a Disentangle node.
//!
//! The [`Gateway`] trait has one method per node operation. Two
//! implementations ship with the crate:
//!
//! - [`HttpGateway`]: blocking JSON-over-HTTP client for a real node.
//! - [`MemoryGateway`]: in-process node double with call counters, used by
//!   tests and demos.
//!
//! Every call blocks until the node answers or the transport times out.
//! There is no retry: a failed call surfaces immediately.
//!
//! Several agents can share one gateway through `Arc<Mutex<G>>`, which is
//! itself a [`Gateway`].

pub mod http;
pub mod memory;
pub mod wire;

pub use http::HttpGateway;
pub use memory::{CallCounts, MemoryGateway};
pub use wire::{
    CreateCapabilityRequest, DelegateRequest, IntroduceRequest, InvocationOutcome, InvokeRequest,
    RegisterRequest, RegisterResponse, RevokeRequest,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capability::{Capability, CapabilityId};
use crate::coherence::CoherenceProfile;
use crate::error::Result;
use crate::identity::{Did, Signed};

/// Operations the client consumes from a node.
pub trait Gateway {
    fn register(&mut self, request: &RegisterRequest) -> Result<RegisterResponse>;

    /// Identity document for `did`.
    fn get_identity(&mut self, did: &Did) -> Result<serde_json::Value>;

    fn create_capability(&mut self, request: &Signed<CreateCapabilityRequest>)
        -> Result<Capability>;

    /// Returns the child capability minted for the delegatee.
    fn delegate(&mut self, request: &Signed<DelegateRequest>) -> Result<Capability>;

    /// A refusal surfaces as `ClientError::CapabilityDenied`.
    fn invoke(&mut self, request: &Signed<InvokeRequest>) -> Result<InvocationOutcome>;

    fn revoke(&mut self, request: &Signed<RevokeRequest>) -> Result<()>;

    fn introduce(&mut self, request: &Signed<IntroduceRequest>) -> Result<()>;

    /// Ordered DIDs from `from` to `to`, both ends included.
    fn introduction_chain(&mut self, from: &Did, to: &Did) -> Result<Vec<Did>>;

    fn curvature(&mut self, did_a: &Did, did_b: &Did) -> Result<f64>;

    fn neighbors(&mut self, did: &Did) -> Result<Vec<Did>>;

    fn coherence(&mut self, did: &Did) -> Result<CoherenceProfile>;

    fn node_status(&mut self) -> Result<serde_json::Value>;

    fn get_capability(&mut self, id: &CapabilityId) -> Result<Capability>;

    /// Capabilities the node lists for `did`.
    fn capabilities_of(&mut self, did: &Did) -> Result<Vec<Capability>>;

    /// Release the transport. Calls after `close` fail with a connection error.
    fn close(&mut self) {}
}

fn locked<G: ?Sized>(shared: &Mutex<G>) -> MutexGuard<'_, G> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A gateway shared between agents. `close` only takes effect on the last
/// handle.
impl<G: Gateway + ?Sized> Gateway for Arc<Mutex<G>> {
    fn register(&mut self, request: &RegisterRequest) -> Result<RegisterResponse> {
        locked(self).register(request)
    }

    fn get_identity(&mut self, did: &Did) -> Result<serde_json::Value> {
        locked(self).get_identity(did)
    }

    fn create_capability(&mut self, request: &Signed<CreateCapabilityRequest>)
        -> Result<Capability> {
        locked(self).create_capability(request)
    }

    fn delegate(&mut self, request: &Signed<DelegateRequest>) -> Result<Capability> {
        locked(self).delegate(request)
    }

    fn invoke(&mut self, request: &Signed<InvokeRequest>) -> Result<InvocationOutcome> {
        locked(self).invoke(request)
    }

    fn revoke(&mut self, request: &Signed<RevokeRequest>) -> Result<()> {
        locked(self).revoke(request)
    }

    fn introduce(&mut self, request: &Signed<IntroduceRequest>) -> Result<()> {
        locked(self).introduce(request)
    }

    fn introduction_chain(&mut self, from: &Did, to: &Did) -> Result<Vec<Did>> {
        locked(self).introduction_chain(from, to)
    }

    fn curvature(&mut self, did_a: &Did, did_b: &Did) -> Result<f64> {
        locked(self).curvature(did_a, did_b)
    }

    fn neighbors(&mut self, did: &Did) -> Result<Vec<Did>> {
        locked(self).neighbors(did)
    }

    fn coherence(&mut self, did: &Did) -> Result<CoherenceProfile> {
        locked(self).coherence(did)
    }

    fn node_status(&mut self) -> Result<serde_json::Value> {
        locked(self).node_status()
    }

    fn get_capability(&mut self, id: &CapabilityId) -> Result<Capability> {
        locked(self).get_capability(id)
    }

    fn capabilities_of(&mut self, did: &Did) -> Result<Vec<Capability>> {
        locked(self).capabilities_of(did)
    }

    fn close(&mut self) {
        if Arc::strong_count(self) == 1 {
            locked(self).close();
        }
    }
}
