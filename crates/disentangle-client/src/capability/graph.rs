//! In-memory capability graph.
//!
//! Capabilities form a forest: each record has at most one parent, and
//! delegation edges point from parent to child. The graph is an arena of
//! nodes addressed by index, with a primary index from [`CapabilityId`]
//! to arena slot. Parent/child links are stored as indices in both
//! directions, so there is no shared ownership between nodes.
//!
//! Records may arrive out of order (an import, or a child fetched before its
//! parent). A child whose parent is not yet known waits in `orphans` and is
//! linked as soon as the parent is inserted.

use std::collections::{HashMap, HashSet};

use crate::error::{ClientError, Result};
use crate::identity::Did;

use super::types::{Capability, CapabilityId, CapabilityStatus, RevocationScope};

struct Node {
    capability: Capability,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Invocations authorized through this node.
    uses: u64,
}

/// Arena of capability records with delegation links.
#[derive(Default)]
pub struct CapabilityGraph {
    nodes: Vec<Node>,
    index: HashMap<CapabilityId, usize>,
    /// Parent id → children waiting for that parent to be inserted.
    orphans: HashMap<CapabilityId, Vec<usize>>,
}

impl CapabilityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.index.contains_key(id)
    }

    /// Insert a record mirrored from the node.
    ///
    /// Records are immutable once inserted except for revocation. Inserting
    /// an id that is already present only carries over a `revoked` status;
    /// a local revocation is never undone by a stale remote copy.
    pub fn insert(&mut self, capability: Capability) -> &Capability {
        if let Some(&slot) = self.index.get(&capability.id) {
            if capability.is_revoked() {
                self.nodes[slot].capability.status = CapabilityStatus::Revoked;
            }
            return &self.nodes[slot].capability;
        }

        let slot = self.nodes.len();
        let id = capability.id.clone();
        let parent = match &capability.parent_capability_id {
            Some(parent_id) => match self.index.get(parent_id) {
                Some(&p) => Some(p),
                None => {
                    self.orphans.entry(parent_id.clone()).or_default().push(slot);
                    None
                }
            },
            None => None,
        };

        self.nodes.push(Node {
            capability,
            parent,
            children: Vec::new(),
            uses: 0,
        });
        self.index.insert(id.clone(), slot);
        if let Some(p) = parent {
            self.nodes[p].children.push(slot);
        }

        if let Some(waiting) = self.orphans.remove(&id) {
            for child in waiting {
                self.nodes[child].parent = Some(slot);
                self.nodes[slot].children.push(child);
            }
        }

        &self.nodes[slot].capability
    }

    pub fn get(&self, id: &CapabilityId) -> Option<&Capability> {
        self.index.get(id).map(|&slot| &self.nodes[slot].capability)
    }

    /// The parent record, if it is known locally.
    pub fn parent_of(&self, id: &CapabilityId) -> Option<&Capability> {
        let slot = *self.index.get(id)?;
        self.nodes[slot]
            .parent
            .map(|p| &self.nodes[p].capability)
    }

    /// Direct children, in insertion order.
    pub fn children(&self, id: &CapabilityId) -> Vec<&Capability> {
        self.index
            .get(id)
            .map(|&slot| {
                self.nodes[slot]
                    .children
                    .iter()
                    .map(|&c| &self.nodes[c].capability)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every transitive descendant, depth-first pre-order, each once.
    pub fn descendants(&self, id: &CapabilityId) -> Vec<&Capability> {
        match self.index.get(id) {
            Some(&slot) => self
                .subtree_slots(slot)
                .into_iter()
                .skip(1)
                .map(|s| &self.nodes[s].capability)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The delegation path from `id` up to its root, leaf first.
    ///
    /// Stops early at a dangling parent reference or a repeated node.
    pub fn path_to_root(&self, id: &CapabilityId) -> Vec<&Capability> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.index.get(id).copied();
        while let Some(slot) = current {
            if !seen.insert(slot) {
                break;
            }
            path.push(&self.nodes[slot].capability);
            current = self.nodes[slot].parent;
        }
        path
    }

    /// All records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.nodes.iter().map(|n| &n.capability)
    }

    /// Records held by `holder`, in insertion order.
    pub fn held_by<'a>(&'a self, holder: &'a Did) -> impl Iterator<Item = &'a Capability> + 'a {
        self.iter().filter(move |c| &c.holder_did == holder)
    }

    /// Ids a revocation of `id` with `scope` would newly revoke.
    ///
    /// Empty when everything in reach is already revoked, which makes the
    /// revocation a no-op.
    pub fn pending_revocations(
        &self,
        id: &CapabilityId,
        scope: RevocationScope,
    ) -> Result<Vec<CapabilityId>> {
        let slot = self.slot(id)?;
        Ok(self
            .affected_slots(slot, scope)
            .into_iter()
            .filter(|&s| self.nodes[s].capability.is_active())
            .map(|s| self.nodes[s].capability.id.clone())
            .collect())
    }

    /// Mark `id` (and, for [`RevocationScope::Chain`], every descendant)
    /// revoked. Returns the ids whose status changed.
    ///
    /// Idempotent: revoking an already revoked record is not an error.
    /// The traversal visits each node once even if the links are cyclic.
    pub fn revoke(
        &mut self,
        id: &CapabilityId,
        scope: RevocationScope,
    ) -> Result<Vec<CapabilityId>> {
        let slot = self.slot(id)?;
        let mut changed = Vec::new();
        for s in self.affected_slots(slot, scope) {
            let cap = &mut self.nodes[s].capability;
            if cap.is_active() {
                changed.push(cap.id.clone());
            }
            cap.status = CapabilityStatus::Revoked;
        }
        log::debug!(
            "revoked {id} ({}): {} record(s) changed",
            scope.as_str(),
            changed.len()
        );
        Ok(changed)
    }

    /// Count one invocation against `id` and every ancestor on its path.
    pub fn record_use(&mut self, id: &CapabilityId) -> Result<()> {
        let slot = self.slot(id)?;
        let mut seen = HashSet::new();
        let mut current = Some(slot);
        while let Some(s) = current {
            if !seen.insert(s) {
                break;
            }
            self.nodes[s].uses += 1;
            current = self.nodes[s].parent;
        }
        Ok(())
    }

    /// Invocations authorized through `id` so far.
    pub fn uses(&self, id: &CapabilityId) -> u64 {
        self.index
            .get(id)
            .map(|&slot| self.nodes[slot].uses)
            .unwrap_or(0)
    }

    /// Restore a use count, e.g. from an export.
    pub(crate) fn set_uses(&mut self, id: &CapabilityId, uses: u64) {
        if let Some(&slot) = self.index.get(id) {
            self.nodes[slot].uses = uses;
        }
    }

    fn slot(&self, id: &CapabilityId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ClientError::UnknownCapability(id.clone()))
    }

    fn affected_slots(&self, slot: usize, scope: RevocationScope) -> Vec<usize> {
        match scope {
            RevocationScope::Single => vec![slot],
            RevocationScope::Chain => self.subtree_slots(slot),
        }
    }

    /// Depth-first pre-order over the subtree rooted at `root`, with a
    /// visited set so malformed links cannot loop.
    fn subtree_slots(&self, root: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(slot) = stack.pop() {
            if !visited.insert(slot) {
                continue;
            }
            order.push(slot);
            // reversed so the first child is visited first
            stack.extend(self.nodes[slot].children.iter().rev());
        }
        order
    }
}
