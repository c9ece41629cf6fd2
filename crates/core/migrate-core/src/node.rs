//! Node/architecture directory for the cluster.
//!
//! The directory is populated exactly once during single-threaded process
//! startup by querying each potential node, then shared read-only by every
//! thread. No locking is needed after `probe`.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::arch::Architecture;

/// Node identifier, a small integer bounded by [`MAX_NODES`].
pub type NodeId = usize;

/// Maximum cluster size.
pub const MAX_NODES: usize = 32;

/// Liveness of a node as reported by the node-info query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active,
    Inactive,
}

/// Per-node record returned by the system query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub status: NodeStatus,
    pub arch: Architecture,
    /// Relative interconnect distance from the querying node.
    pub distance: u32,
}

/// Opaque system query for node information.
///
/// `None` means the node does not exist; an `Inactive` status records the
/// node with the `Unsupported` sentinel, same as absence.
pub trait NodeInfoSource {
    fn node_info(&self, node: NodeId) -> Option<NodeInfo>;
}

/// Write-once mapping from node id to architecture.
#[derive(Debug, Clone)]
pub struct NodeDirectory {
    archs: [Architecture; MAX_NODES],
    distances: [Option<u32>; MAX_NODES],
}

impl NodeDirectory {
    /// Query every potential node once and record its architecture.
    pub fn probe(source: &dyn NodeInfoSource) -> Self {
        let mut archs = [Architecture::Unsupported; MAX_NODES];
        let mut distances = [None; MAX_NODES];

        for node in 0..MAX_NODES {
            match source.node_info(node) {
                Some(info) if info.status == NodeStatus::Active => {
                    archs[node] = info.arch;
                    distances[node] = Some(info.distance);
                    debug!(
                        "node {}: {} (distance {})",
                        node, info.arch, info.distance
                    );
                }
                Some(_) => {
                    debug!("node {}: inactive", node);
                }
                None => {}
            }
        }

        let active = archs.iter().filter(|a| a.is_supported()).count();
        if active == 0 {
            warn!("node directory probe found no active nodes");
        }
        Self { archs, distances }
    }

    /// A directory built from explicit per-node architectures; slots beyond
    /// the given entries stay `Unsupported`.
    pub fn from_entries(entries: &[(NodeId, Architecture)]) -> Self {
        let mut archs = [Architecture::Unsupported; MAX_NODES];
        for &(node, arch) in entries {
            if node < MAX_NODES {
                archs[node] = arch;
            }
        }
        Self {
            archs,
            distances: [None; MAX_NODES],
        }
    }

    /// Architecture of `node`; out-of-range ids yield the sentinel, never a
    /// panic.
    pub fn architecture_of(&self, node: NodeId) -> Architecture {
        self.archs
            .get(node)
            .copied()
            .unwrap_or(Architecture::Unsupported)
    }

    /// Interconnect distance of `node`, if it was active at probe time.
    pub fn distance_of(&self, node: NodeId) -> Option<u32> {
        self.distances.get(node).copied().flatten()
    }

    /// Ids of all nodes recorded with a supported architecture.
    pub fn active_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.archs
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_supported())
            .map(|(n, _)| n)
    }
}
