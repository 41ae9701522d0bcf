//! Discovery node definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Version;

/// Node ID
pub type NodeId = String;

/// Cluster member as seen by the elected master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryNode {
    /// Node ID
    pub id: NodeId,
    /// Software version
    pub version: Version,
    /// Whether the node may be elected master
    pub master_eligible: bool,
    /// Whether the node holds shard data
    pub data: bool,
}

impl DiscoveryNode {
    /// Create a master-eligible data node
    pub fn new(id: impl Into<NodeId>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            master_eligible: true,
            data: true,
        }
    }

    /// Create a client-only node (neither master-eligible nor data)
    pub fn client(id: impl Into<NodeId>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            master_eligible: false,
            data: false,
        }
    }

    pub fn is_client(&self) -> bool {
        !self.master_eligible && !self.data
    }
}

/// Nodes of the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryNodes {
    nodes: BTreeMap<NodeId, DiscoveryNode>,
}

impl DiscoveryNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node
    pub fn with_node(mut self, node: DiscoveryNode) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn get(&self, id: &str) -> Option<&DiscoveryNode> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn data_node_count(&self) -> usize {
        self.nodes.values().filter(|n| n.data).count()
    }

    /// Oldest version among master-eligible and data nodes
    pub fn smallest_non_client_node_version(&self) -> Option<Version> {
        self.nodes
            .values()
            .filter(|n| !n.is_client())
            .map(|n| n.version)
            .min()
    }
}
