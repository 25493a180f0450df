//! Graph export: a versioned JSON snapshot of a capability graph.
//!
//! File format:
//! ```json
//! {
//!     "version": 1,
//!     "owner": "did:disentangle:...",
//!     "exported_at": 1700000000000000,
//!     "capabilities": [ ... Capability ... ],
//!     "uses": { "<capability id>": 3 }
//! }
//! ```
//!
//! Capabilities are written in graph insertion order. Import does not rely
//! on that order: children that precede their parent are linked once the
//! parent is read.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilityGraph, CapabilityId};
use crate::error::{ClientError, Result};
use crate::identity::Did;

// ── File format constants ─────────────────────────────────────────────────────

const GRAPH_FILE_VERSION: u32 = 1;

// ── On-disk structure ─────────────────────────────────────────────────────────

/// Serialized form of a [`CapabilityGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    /// Format version number.
    pub version: u32,
    /// Identity the graph was exported by, if registered.
    pub owner: Option<Did>,
    /// Export time (microseconds since Unix epoch).
    pub exported_at: u64,
    pub capabilities: Vec<Capability>,
    /// Non-zero use counts.
    #[serde(default)]
    pub uses: BTreeMap<CapabilityId, u64>,
}

impl GraphFile {
    /// Snapshot `graph`.
    pub fn from_graph(graph: &CapabilityGraph, owner: Option<&Did>) -> Self {
        let capabilities: Vec<Capability> = graph.iter().cloned().collect();
        let uses = capabilities
            .iter()
            .map(|c| (c.id.clone(), graph.uses(&c.id)))
            .filter(|(_, n)| *n > 0)
            .collect();
        Self {
            version: GRAPH_FILE_VERSION,
            owner: owner.cloned(),
            exported_at: crate::time::now_micros(),
            capabilities,
            uses,
        }
    }

    /// Rebuild a graph, restoring use counts.
    pub fn into_graph(self) -> CapabilityGraph {
        let mut graph = CapabilityGraph::new();
        for capability in self.capabilities {
            graph.insert(capability);
        }
        for (id, uses) in &self.uses {
            graph.set_uses(id, *uses);
        }
        graph
    }

    /// # Errors
    ///
    /// `Serialization` if JSON encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ClientError::Serialization(e.to_string()))
    }

    /// # Errors
    ///
    /// `InvalidFileFormat` if the text is not a graph file or its version is
    /// not supported.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::InvalidFileFormat(format!("failed to parse graph file: {e}")))?;
        if file.version != GRAPH_FILE_VERSION {
            return Err(ClientError::InvalidFileFormat(format!(
                "unsupported graph file version={}",
                file.version
            )));
        }
        Ok(file)
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())?;
        log::info!(
            "exported {} capabilities to {} at {}",
            self.capabilities.len(),
            path.display(),
            crate::time::micros_to_rfc3339(self.exported_at)
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `FileNotFound` if `path` does not exist, `InvalidFileFormat` if it cannot
    /// be parsed, or `Io` for other filesystem errors.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClientError::FileNotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Write `data` next to `path` and rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
