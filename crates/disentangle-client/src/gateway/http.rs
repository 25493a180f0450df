//! Blocking JSON-over-HTTP gateway to a Disentangle node.
//!
//! Error mapping, first match wins:
//! - a `code` of `not_delegatable` or `not_registered` (or the same words in
//!   the message) → `NotDelegatable` / `NotRegistered`
//! - 404 → `NotFound`
//! - 403 → `CapabilityDenied`, with the node's `coherence_score` if present
//! - any other non-2xx → `Remote { status, message }`
//! - connect failures and timeouts → `Connection`
//! - a 2xx body that does not decode → `Serialization`
//!
//! Error bodies are expected as `{"error": "...", "code": "...", ...}`;
//! `detail` is accepted in place of `error`.
//!
//! Path parameters are percent-encoded as single segments.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilityId, CapabilityStatus, Constraints};
use crate::coherence::CoherenceProfile;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::identity::{Did, Signed};

use super::wire::{
    CreateCapabilityRequest, DelegateRequest, IntroduceRequest, InvocationOutcome, InvokeRequest,
    RegisterRequest, RegisterResponse, RevokeRequest,
};
use super::Gateway;

/// Gateway backed by `reqwest`'s blocking client.
pub struct HttpGateway {
    base_url: Url,
    client: Option<Client>,
}

impl HttpGateway {
    /// Build the HTTP client. No request is made until the first call.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.node_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                ClientError::Connection(format!("invalid node url {:?}", config.node_url))
            })?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .user_agent(concat!("disentangle-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        log::debug!("http gateway for {}", config.node_url);
        Ok(Self {
            base_url,
            client: Some(client),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ClientError::Connection("gateway closed".into()))
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base urls, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R> {
        let request = self.client()?.get(self.url(segments));
        send(request)
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, segments: &[&str], body: &B) -> Result<R> {
        let request = self.client()?.post(self.url(segments)).json(body);
        send(request)
    }
}

fn send<R: DeserializeOwned>(request: RequestBuilder) -> Result<R> {
    let response = request.send().map_err(transport_error)?;
    let status = response.status();
    let text = response.text().map_err(transport_error)?;

    if status.is_success() {
        return serde_json::from_str(&text).map_err(|e| {
            ClientError::Serialization(format!("unexpected response body: {e}"))
        });
    }

    let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .get("error")
        .or_else(|| body.get("detail"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    log::debug!("node answered {status}: {message}");

    let code = body.get("code").and_then(serde_json::Value::as_str);
    Err(match (failure_kind(code, &message), status.as_u16()) {
        (Some(NodeFailure::NotDelegatable), _) => ClientError::NotDelegatable(message),
        (Some(NodeFailure::NotRegistered), _) => ClientError::NotRegistered,
        (None, 404) => ClientError::NotFound(message),
        (None, 403) => ClientError::CapabilityDenied {
            message,
            coherence_score: body
                .get("coherence_score")
                .and_then(serde_json::Value::as_f64),
        },
        (None, status) => ClientError::Remote { status, message },
    })
}

enum NodeFailure {
    NotDelegatable,
    NotRegistered,
}

/// Failures the node reports that have a client-side counterpart.
fn failure_kind(code: Option<&str>, message: &str) -> Option<NodeFailure> {
    match code {
        Some("not_delegatable") => return Some(NodeFailure::NotDelegatable),
        Some("not_registered") => return Some(NodeFailure::NotRegistered),
        _ => {}
    }
    let message = message.to_ascii_lowercase();
    if message.contains("not delegatable") {
        Some(NodeFailure::NotDelegatable)
    } else if message.contains("not registered") {
        Some(NodeFailure::NotRegistered)
    } else {
        None
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    if e.is_decode() {
        ClientError::Serialization(e.to_string())
    } else {
        ClientError::Connection(e.to_string())
    }
}

/// `{"capability_id_hex": ..., "capability": {...}}` as returned by create
/// and delegate. The embedded record may omit fields the request implies.
#[derive(Deserialize)]
struct CapabilityEnvelope {
    #[serde(alias = "id")]
    capability_id_hex: CapabilityId,
    #[serde(default)]
    capability: PartialCapability,
}

#[derive(Default, Deserialize)]
struct PartialCapability {
    subject_type: Option<String>,
    scope: Option<String>,
    constraints: Option<Constraints>,
    delegatable: Option<bool>,
    issuer_did: Option<Did>,
    holder_did: Option<Did>,
    parent_capability_id: Option<CapabilityId>,
    status: Option<CapabilityStatus>,
}

impl CapabilityEnvelope {
    /// Fill the gaps of the returned record from `implied`.
    fn complete(self, implied: Capability) -> Capability {
        let record = self.capability;
        Capability {
            id: self.capability_id_hex,
            subject_type: record.subject_type.unwrap_or(implied.subject_type),
            scope: record.scope.unwrap_or(implied.scope),
            constraints: record.constraints.unwrap_or(implied.constraints),
            delegatable: record.delegatable.unwrap_or(implied.delegatable),
            issuer_did: record.issuer_did.unwrap_or(implied.issuer_did),
            holder_did: record.holder_did.unwrap_or(implied.holder_did),
            parent_capability_id: record
                .parent_capability_id
                .or(implied.parent_capability_id),
            status: record.status.unwrap_or(implied.status),
        }
    }
}

#[derive(Deserialize)]
struct DelegateResponse {
    #[serde(alias = "capability")]
    delegation: CapabilityEnvelope,
}

#[derive(Deserialize)]
struct Ack {
    #[serde(default = "acknowledged")]
    success: bool,
}

fn acknowledged() -> bool {
    true
}

impl Ack {
    fn into_result(self, operation: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(ClientError::Remote {
                status: 200,
                message: format!("{operation} not acknowledged"),
            })
        }
    }
}

#[derive(Deserialize)]
struct IdentityResponse {
    document: Option<serde_json::Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ChainResponse {
    chain: Vec<Did>,
}

#[derive(Deserialize)]
struct CurvatureResponse {
    curvature: f64,
}

#[derive(Deserialize)]
struct NeighborsResponse {
    neighbors: Vec<Did>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoherenceResponse {
    Wrapped { profile: CoherenceProfile },
    Bare(CoherenceProfile),
}

#[derive(Deserialize)]
struct CapabilityResponse {
    capability: Capability,
}

#[derive(Deserialize)]
struct CapabilityList {
    capabilities: Vec<Capability>,
}

impl Gateway for HttpGateway {
    fn register(&mut self, request: &RegisterRequest) -> Result<RegisterResponse> {
        self.post(&["identity", "register"], request)
    }

    fn get_identity(&mut self, did: &Did) -> Result<serde_json::Value> {
        let response: IdentityResponse = self.get(&["identity", did.as_str()])?;
        Ok(response
            .document
            .unwrap_or(serde_json::Value::Object(response.rest)))
    }

    fn create_capability(
        &mut self,
        request: &Signed<CreateCapabilityRequest>,
    ) -> Result<Capability> {
        let envelope: CapabilityEnvelope = self.post(&["capability", "create"], request)?;
        let body = &request.body;
        Ok(envelope.complete(Capability {
            id: CapabilityId::new(""),
            subject_type: body.subject_type.clone(),
            scope: body.scope.clone(),
            constraints: body.constraints.clone(),
            delegatable: body.delegatable,
            issuer_did: body.issuer_did.clone(),
            holder_did: body.issuer_did.clone(),
            parent_capability_id: None,
            status: CapabilityStatus::Active,
        }))
    }

    fn delegate(&mut self, request: &Signed<DelegateRequest>) -> Result<Capability> {
        let response: DelegateResponse = self.post(&["capability", "delegate"], request)?;
        let body = &request.body;
        // The node's record wins; only the lineage is implied.
        let record = &response.delegation.capability;
        let (Some(subject_type), Some(scope)) = (&record.subject_type, &record.scope) else {
            return Err(ClientError::Serialization(
                "delegation response lacks subject_type or scope".into(),
            ));
        };
        let implied = Capability {
            id: CapabilityId::new(""),
            subject_type: subject_type.clone(),
            scope: scope.clone(),
            constraints: Constraints::new(),
            delegatable: false,
            issuer_did: body.delegator_did.clone(),
            holder_did: body.to_did.clone(),
            parent_capability_id: Some(body.capability_id.clone()),
            status: CapabilityStatus::Active,
        };
        Ok(response.delegation.complete(implied))
    }

    fn invoke(&mut self, request: &Signed<InvokeRequest>) -> Result<InvocationOutcome> {
        self.post(&["capability", "invoke"], request)
    }

    fn revoke(&mut self, request: &Signed<RevokeRequest>) -> Result<()> {
        let ack: Ack = self.post(&["capability", "revoke"], request)?;
        ack.into_result("revoke")
    }

    fn introduce(&mut self, request: &Signed<IntroduceRequest>) -> Result<()> {
        let ack: Ack = self.post(&["introduction"], request)?;
        ack.into_result("introduce")
    }

    fn introduction_chain(&mut self, from: &Did, to: &Did) -> Result<Vec<Did>> {
        let response: ChainResponse = self.get(&["introduction", "chain", from.as_str(), to.as_str()])?;
        Ok(response.chain)
    }

    fn curvature(&mut self, did_a: &Did, did_b: &Did) -> Result<f64> {
        let response: CurvatureResponse =
            self.get(&["coherence", "curvature", did_a.as_str(), did_b.as_str()])?;
        Ok(response.curvature)
    }

    fn neighbors(&mut self, did: &Did) -> Result<Vec<Did>> {
        let response: NeighborsResponse = self.get(&["coherence", "neighbors", did.as_str()])?;
        Ok(response.neighbors)
    }

    fn coherence(&mut self, did: &Did) -> Result<CoherenceProfile> {
        match self.get(&["coherence", did.as_str()])? {
            CoherenceResponse::Wrapped { profile } | CoherenceResponse::Bare(profile) => Ok(profile),
        }
    }

    fn node_status(&mut self) -> Result<serde_json::Value> {
        self.get(&["status"])
    }

    fn get_capability(&mut self, id: &CapabilityId) -> Result<Capability> {
        let response: CapabilityResponse = self.get(&["capability", id.as_str()])?;
        Ok(response.capability)
    }

    fn capabilities_of(&mut self, did: &Did) -> Result<Vec<Capability>> {
        let response: CapabilityList = self.get(&["capability", "by-did", did.as_str()])?;
        Ok(response.capabilities)
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            log::debug!("closed http gateway for {}", self.base_url);
        }
    }
}
