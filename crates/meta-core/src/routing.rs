//! Routing table definitions
//!
//! Maps every index to its shards and every shard to the nodes holding its
//! copies. Placement itself is decided by the allocation service; the control
//! plane only adds new indices with unassigned copies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{IndexMetadata, NodeId};

/// Shard copy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardRoutingState {
    /// Not assigned to any node
    Unassigned,
    /// Assigned, recovering
    Initializing,
    /// Assigned and serving
    Started,
    /// Serving while moving to another node
    Relocating,
}

impl std::fmt::Display for ShardRoutingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardRoutingState::Unassigned => write!(f, "unassigned"),
            ShardRoutingState::Initializing => write!(f, "initializing"),
            ShardRoutingState::Started => write!(f, "started"),
            ShardRoutingState::Relocating => write!(f, "relocating"),
        }
    }
}

/// One copy of a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRouting {
    pub index: String,
    pub shard_id: u32,
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub state: ShardRoutingState,
}

impl ShardRouting {
    pub fn unassigned(index: impl Into<String>, shard_id: u32, primary: bool) -> Self {
        Self {
            index: index.into(),
            shard_id,
            primary,
            node_id: None,
            state: ShardRoutingState::Unassigned,
        }
    }

    pub fn started(
        index: impl Into<String>,
        shard_id: u32,
        primary: bool,
        node_id: impl Into<NodeId>,
    ) -> Self {
        Self {
            index: index.into(),
            shard_id,
            primary,
            node_id: Some(node_id.into()),
            state: ShardRoutingState::Started,
        }
    }

    /// Whether the copy can serve requests
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ShardRoutingState::Started | ShardRoutingState::Relocating
        )
    }
}

/// Routing of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoutingTable {
    pub index: String,
    /// shard_id -> copies (primary first)
    pub shards: BTreeMap<u32, Vec<ShardRouting>>,
}

impl IndexRoutingTable {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            shards: BTreeMap::new(),
        }
    }

    /// Routing for a freshly created index: every copy unassigned
    pub fn new_unassigned(imd: &IndexMetadata) -> Self {
        let mut table = Self::new(imd.name());
        for shard_id in 0..imd.number_of_shards() {
            let mut copies = Vec::with_capacity(1 + imd.number_of_replicas() as usize);
            copies.push(ShardRouting::unassigned(imd.name(), shard_id, true));
            for _ in 0..imd.number_of_replicas() {
                copies.push(ShardRouting::unassigned(imd.name(), shard_id, false));
            }
            table.shards.insert(shard_id, copies);
        }
        table
    }

    /// Add a shard copy
    pub fn with_copy(mut self, copy: ShardRouting) -> Self {
        self.shards.entry(copy.shard_id).or_default().push(copy);
        self
    }

    pub fn all_copies(&self) -> impl Iterator<Item = &ShardRouting> {
        self.shards.values().flatten()
    }

    pub fn copies_with_state(&self, state: ShardRoutingState) -> Vec<&ShardRouting> {
        self.all_copies().filter(|c| c.state == state).collect()
    }

    pub fn copy_count(&self) -> usize {
        self.all_copies().count()
    }

    /// Number of active copies of one shard
    pub fn active_copies(&self, shard_id: u32) -> usize {
        self.shards
            .get(&shard_id)
            .map(|copies| copies.iter().filter(|c| c.is_active()).count())
            .unwrap_or(0)
    }
}

/// Routing table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    version: u64,
    indices: BTreeMap<String, IndexRoutingTable>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_builder(&self) -> RoutingTableBuilder {
        RoutingTableBuilder {
            version: self.version,
            indices: self.indices.clone(),
        }
    }

    /// Routing table version number (incremented on each change)
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    pub fn index(&self, index: &str) -> Option<&IndexRoutingTable> {
        self.indices.get(index)
    }

    pub fn indices(&self) -> &BTreeMap<String, IndexRoutingTable> {
        &self.indices
    }
}

/// Routing table builder
#[derive(Debug, Clone)]
pub struct RoutingTableBuilder {
    version: u64,
    indices: BTreeMap<String, IndexRoutingTable>,
}

impl RoutingTableBuilder {
    /// Add routing for a newly created index
    pub fn add_as_new(mut self, imd: &IndexMetadata) -> Self {
        self.indices
            .insert(imd.name().to_string(), IndexRoutingTable::new_unassigned(imd));
        self
    }

    /// Add or replace the routing of an index
    pub fn add(mut self, table: IndexRoutingTable) -> Self {
        self.indices.insert(table.index.clone(), table);
        self
    }

    pub fn build(self) -> RoutingTable {
        RoutingTable {
            version: self.version + 1,
            indices: self.indices,
        }
    }
}
