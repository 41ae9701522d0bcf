//! Shared fixtures for the meta-pilot integration tests

#![allow(dead_code)]

use std::sync::Arc;

use meta_core::settings::{
    SETTING_BLOCKS_WRITE, SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS,
};
use meta_core::{
    ClusterState, DiscoveryNode, DiscoveryNodes, IndexMetadata, IndexMetadataBuilder,
    IndexRoutingTable, MappingMetadata, Settings, ShardRouting, Version,
};
use meta_pilot::alias::DefaultAliasValidator;
use meta_pilot::indices::LocalIndicesService;
use meta_pilot::schema::{
    RecordingSchemaSynchronizer, SchemaError, SchemaMutation, SchemaSynchronizer,
};
use meta_pilot::{IndexCreator, PilotConfig};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

pub fn shards(number_of_shards: u32, number_of_replicas: u32) -> Settings {
    Settings::new()
        .with(SETTING_NUMBER_OF_SHARDS, number_of_shards)
        .with(SETTING_NUMBER_OF_REPLICAS, number_of_replicas)
}

/// Data nodes named node1..=nodeN on the current version
pub fn data_nodes(count: usize) -> DiscoveryNodes {
    (1..=count).fold(DiscoveryNodes::new(), |nodes, i| {
        nodes.with_node(DiscoveryNode::new(format!("node{}", i), Version::CURRENT))
    })
}

pub fn cluster(data_node_count: usize) -> ClusterState {
    ClusterState::new("test-cluster")
        .builder()
        .nodes(data_nodes(data_node_count))
        .build()
}

/// Routing with one started primary per shard, placed by `node_of`
pub fn started_routing(index: &str, shards: u32, node_of: impl Fn(u32) -> String) -> IndexRoutingTable {
    (0..shards).fold(IndexRoutingTable::new(index), |table, shard| {
        table.with_copy(ShardRouting::started(index, shard, true, node_of(shard)))
    })
}

/// Add an existing index with its routing and setting-derived blocks
pub fn with_index(state: &ClusterState, imd: IndexMetadata, routing: IndexRoutingTable) -> ClusterState {
    let blocks = state.blocks().to_builder().update_blocks(&imd).build();
    let metadata = state.metadata().to_builder().put(imd).build();
    let routing = state.routing_table().to_builder().add(routing).build();
    state
        .builder()
        .metadata(metadata)
        .routing_table(routing)
        .blocks(blocks)
        .build()
}

/// Builder for a write-blocked resize source
pub fn resize_source(name: &str, number_of_shards: u32) -> IndexMetadataBuilder {
    IndexMetadata::builder(name).settings(
        shards(number_of_shards, 0)
            .with(SETTING_BLOCKS_WRITE, true)
            .with("index.uuid", format!("{}-uuid", name)),
    )
}

pub fn doc_mapping(source: &str) -> MappingMetadata {
    MappingMetadata::parse("_doc", source).unwrap()
}

/// Coordinator wired to in-memory collaborators
pub struct Harness {
    pub local: Arc<LocalIndicesService>,
    pub schema: Arc<RecordingSchemaSynchronizer>,
    pub creator: IndexCreator,
}

impl Harness {
    pub fn new(config: PilotConfig) -> Self {
        let local = Arc::new(LocalIndicesService::new());
        let schema = Arc::new(RecordingSchemaSynchronizer::new());
        let creator = IndexCreator::new(
            config,
            local.clone(),
            Arc::new(DefaultAliasValidator::default()),
            schema.clone(),
        );
        Self {
            local,
            schema,
            creator,
        }
    }

    /// Coordinator whose schema store rejects every table update
    pub fn with_failing_schema(config: PilotConfig) -> (Arc<LocalIndicesService>, IndexCreator) {
        let local = Arc::new(LocalIndicesService::new());
        let creator = IndexCreator::new(
            config,
            local.clone(),
            Arc::new(DefaultAliasValidator::default()),
            Arc::new(FailingSchemaSynchronizer),
        );
        (local, creator)
    }
}

/// Schema store that refuses table changes
pub struct FailingSchemaSynchronizer;

impl SchemaSynchronizer for FailingSchemaSynchronizer {
    fn create_or_update_keyspace(
        &self,
        _keyspace: &str,
        _replication_factor: u32,
        _replication: Option<&str>,
        _mutations: &mut Vec<SchemaMutation>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn update_table_schema(
        &self,
        keyspace: &str,
        mapping: &MappingMetadata,
        _indices: &[&IndexMetadata],
        _mutations: &mut Vec<SchemaMutation>,
    ) -> Result<(), SchemaError> {
        Err(SchemaError::Table {
            keyspace: keyspace.to_string(),
            table: mapping.type_name().to_string(),
            reason: "schema store rejected the update".to_string(),
        })
    }

    fn apply(&self, _mutations: &[SchemaMutation]) {}
}
