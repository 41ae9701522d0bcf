//! Cluster state
//!
//! The single immutable snapshot of metadata, routing, blocks and nodes.
//! Every accepted transition produces a new value through the builder.

use serde::{Deserialize, Serialize};

use crate::{ClusterBlocks, DiscoveryNodes, Metadata, RoutingTable, UNKNOWN_UUID};

/// Cluster state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    cluster_name: String,
    version: u64,
    state_uuid: String,
    metadata: Metadata,
    routing_table: RoutingTable,
    blocks: ClusterBlocks,
    nodes: DiscoveryNodes,
}

impl ClusterState {
    /// Create an empty cluster state
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            version: 0,
            state_uuid: UNKNOWN_UUID.to_string(),
            metadata: Metadata::default(),
            routing_table: RoutingTable::new(),
            blocks: ClusterBlocks::new(),
            nodes: DiscoveryNodes::new(),
        }
    }

    /// Start building a state derived from this one
    pub fn builder(&self) -> ClusterStateBuilder {
        ClusterStateBuilder {
            state: self.clone(),
            incr_version: false,
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state_uuid(&self) -> &str {
        &self.state_uuid
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn blocks(&self) -> &ClusterBlocks {
        &self.blocks
    }

    pub fn nodes(&self) -> &DiscoveryNodes {
        &self.nodes
    }
}

/// Cluster state builder
#[derive(Debug, Clone)]
pub struct ClusterStateBuilder {
    state: ClusterState,
    incr_version: bool,
}

impl ClusterStateBuilder {
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.state.metadata = metadata;
        self
    }

    pub fn routing_table(mut self, routing_table: RoutingTable) -> Self {
        self.state.routing_table = routing_table;
        self
    }

    pub fn blocks(mut self, blocks: ClusterBlocks) -> Self {
        self.state.blocks = blocks;
        self
    }

    pub fn nodes(mut self, nodes: DiscoveryNodes) -> Self {
        self.state.nodes = nodes;
        self
    }

    /// Mark the built state as a new published version
    pub fn incr_version(mut self) -> Self {
        self.incr_version = true;
        self
    }

    pub fn build(self) -> ClusterState {
        let mut state = self.state;
        if self.incr_version {
            state.version += 1;
            state.state_uuid = uuid::Uuid::new_v4().to_string();
        }
        state
    }
}
