//! Petnames: private, human-chosen names for other identities.
//!
//! Each owning identity has its own namespace. Within a namespace the
//! mapping is one-to-one in both directions: a petname names one DID and a
//! DID carries at most one petname. Petnames are never sent to the node.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ClientError, Result};
use crate::identity::Did;

#[derive(Default)]
struct Namespace {
    by_name: BTreeMap<String, Did>,
    by_did: HashMap<Did, String>,
}

/// Bidirectional petname table, namespaced per owner.
#[derive(Default)]
pub struct PetnameResolver {
    namespaces: HashMap<Did, Namespace>,
}

impl PetnameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `petname` to `did` in `owner`'s namespace.
    ///
    /// Re-assigning a petname moves it to the new DID, and a DID that
    /// already had a different petname loses the old one.
    pub fn assign(&mut self, owner: &Did, did: &str, petname: &str) -> Result<Did> {
        let did = Did::parse(did)?;
        let petname = petname.trim();
        if petname.is_empty() {
            return Err(ClientError::InvalidPetname("petname is empty".into()));
        }

        let ns = self.namespaces.entry(owner.clone()).or_default();
        if let Some(previous_did) = ns.by_name.insert(petname.to_string(), did.clone()) {
            if previous_did != did {
                ns.by_did.remove(&previous_did);
            }
        }
        if let Some(previous_name) = ns.by_did.insert(did.clone(), petname.to_string()) {
            if previous_name != petname {
                ns.by_name.remove(&previous_name);
            }
        }
        log::debug!("{owner}: petname {petname:?} -> {did}");
        Ok(did)
    }

    pub fn resolve(&self, owner: &Did, petname: &str) -> Result<Did> {
        self.namespaces
            .get(owner)
            .and_then(|ns| ns.by_name.get(petname.trim()))
            .cloned()
            .ok_or_else(|| ClientError::PetnameNotFound(petname.to_string()))
    }

    /// The petname `owner` gave `did`, if any.
    pub fn petname_of(&self, owner: &Did, did: &Did) -> Option<&str> {
        self.namespaces
            .get(owner)
            .and_then(|ns| ns.by_did.get(did))
            .map(String::as_str)
    }

    /// Remove a petname and return the DID it named.
    pub fn remove(&mut self, owner: &Did, petname: &str) -> Result<Did> {
        let ns = self
            .namespaces
            .get_mut(owner)
            .ok_or_else(|| ClientError::PetnameNotFound(petname.to_string()))?;
        let did = ns
            .by_name
            .remove(petname.trim())
            .ok_or_else(|| ClientError::PetnameNotFound(petname.to_string()))?;
        ns.by_did.remove(&did);
        Ok(did)
    }

    /// All `(petname, did)` pairs of `owner`, sorted by petname.
    pub fn entries(&self, owner: &Did) -> Vec<(String, Did)> {
        self.namespaces
            .get(owner)
            .map(|ns| {
                ns.by_name
                    .iter()
                    .map(|(name, did)| (name.clone(), did.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
