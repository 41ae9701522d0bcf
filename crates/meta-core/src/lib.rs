//! Core cluster metadata model
//!
//! Immutable values that make up a cluster-state snapshot:
//! - Index settings and versions
//! - Index metadata, mappings and aliases
//! - Index templates
//! - Routing table, cluster blocks and discovery nodes
//!
//! Every value here is replaced rather than mutated: builders derive a new
//! value from an existing one and `build()` checks the invariants.

pub mod alias;
pub mod blocks;
pub mod error;
pub mod index;
pub mod mapping;
pub mod metadata;
pub mod node;
pub mod routing;
pub mod settings;
pub mod state;
pub mod template;
pub mod version;

// Re-export commonly used types
pub use alias::AliasMetadata;
pub use blocks::{ClusterBlock, ClusterBlockLevel, ClusterBlocks, ClusterBlocksBuilder};
pub use error::MetadataError;
pub use index::{IndexMetadata, IndexMetadataBuilder, IndexState};
pub use mapping::{
    merge_defaults, parse_mapping, MappingMetadata, MappingSource, DEFAULT_MAPPING, SINGLE_MAPPING_NAME,
};
pub use metadata::{Metadata, MetadataBuilder};
pub use node::{DiscoveryNode, DiscoveryNodes, NodeId};
pub use routing::{IndexRoutingTable, RoutingTable, RoutingTableBuilder, ShardRouting, ShardRoutingState};
pub use settings::Settings;
pub use state::{ClusterState, ClusterStateBuilder};
pub use template::{simple_match, IndexTemplateMetadata};
pub use version::Version;

/// Placeholder used for identifiers that have not been assigned yet
pub const UNKNOWN_UUID: &str = "_na_";
