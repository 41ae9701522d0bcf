//! Index metadata definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::settings::{
    SETTING_INDEX_UUID, SETTING_KEYSPACE, SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS,
    SETTING_REPLICATION, SETTING_ROUTING_PARTITION_SIZE, SETTING_VERSION_CREATED,
    SETTING_VERSION_UPGRADED, SETTING_VIRTUAL, SETTING_VIRTUAL_INDEX,
};
use crate::{AliasMetadata, MappingMetadata, MetadataError, Settings, Version, UNKNOWN_UUID};

/// Index lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    #[default]
    Open,
    Close,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexState::Open => write!(f, "open"),
            IndexState::Close => write!(f, "close"),
        }
    }
}

/// Index metadata
///
/// Immutable once built. `routing_num_shards` is fixed when the index is
/// created and is always a multiple of the number of shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    name: String,
    uuid: String,
    version: u64,
    state: IndexState,
    settings: Settings,
    number_of_shards: u32,
    number_of_replicas: u32,
    routing_num_shards: u32,
    primary_terms: Vec<u64>,
    creation_version: Version,
    #[serde(default)]
    mappings: BTreeMap<String, MappingMetadata>,
    #[serde(default)]
    aliases: BTreeMap<String, AliasMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    virtual_index: Option<String>,
    is_virtual: bool,
    keyspace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replication: Option<String>,
}

impl IndexMetadata {
    /// Start building metadata for a new index
    pub fn builder(name: impl Into<String>) -> IndexMetadataBuilder {
        IndexMetadataBuilder::new(name)
    }

    /// Start building a modified copy of this index
    pub fn to_builder(&self) -> IndexMetadataBuilder {
        IndexMetadataBuilder {
            name: self.name.clone(),
            settings: self.settings.clone(),
            version: self.version,
            state: self.state,
            routing_num_shards: Some(self.routing_num_shards),
            primary_terms: self
                .primary_terms
                .iter()
                .enumerate()
                .map(|(shard, term)| (shard as u32, *term))
                .collect(),
            mappings: self.mappings.clone(),
            aliases: self.aliases.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Metadata version, bumped on every change to the index
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn number_of_shards(&self) -> u32 {
        self.number_of_shards
    }

    pub fn number_of_replicas(&self) -> u32 {
        self.number_of_replicas
    }

    /// Total shard copies (primaries and replicas)
    pub fn total_shard_copies(&self) -> u64 {
        u64::from(self.number_of_shards) * (1 + u64::from(self.number_of_replicas))
    }

    pub fn routing_num_shards(&self) -> u32 {
        self.routing_num_shards
    }

    /// Routing shards per actual shard
    pub fn routing_factor(&self) -> u32 {
        self.routing_num_shards / self.number_of_shards
    }

    pub fn routing_partition_size(&self) -> u32 {
        self.settings
            .get_as_u32(SETTING_ROUTING_PARTITION_SIZE)
            .ok()
            .flatten()
            .unwrap_or(1)
    }

    /// Primary term of one shard
    pub fn primary_term(&self, shard: u32) -> u64 {
        self.primary_terms.get(shard as usize).copied().unwrap_or(0)
    }

    pub fn primary_terms(&self) -> &[u64] {
        &self.primary_terms
    }

    /// Version of the node that created this index
    pub fn creation_version(&self) -> Version {
        self.creation_version
    }

    /// Version this index was last upgraded to
    pub fn upgraded_version(&self) -> Version {
        self.settings
            .get_as_u32(SETTING_VERSION_UPGRADED)
            .ok()
            .flatten()
            .map(Version::from_id)
            .unwrap_or(self.creation_version)
    }

    pub fn mappings(&self) -> &BTreeMap<String, MappingMetadata> {
        &self.mappings
    }

    pub fn mapping(&self, type_name: &str) -> Option<&MappingMetadata> {
        self.mappings.get(type_name)
    }

    pub fn aliases(&self) -> &BTreeMap<String, AliasMetadata> {
        &self.aliases
    }

    /// Name of the virtual index this index shares its schema with
    pub fn virtual_index(&self) -> Option<&str> {
        self.virtual_index.as_deref()
    }

    /// Whether this is a virtual (schema-only) index
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Keyspace holding the index tables; defaults to the index name
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Replication descriptor of the keyspace
    pub fn replication(&self) -> Option<&str> {
        self.replication.as_deref()
    }
}

/// Index metadata builder
#[derive(Debug, Clone)]
pub struct IndexMetadataBuilder {
    name: String,
    settings: Settings,
    version: u64,
    state: IndexState,
    routing_num_shards: Option<u32>,
    primary_terms: BTreeMap<u32, u64>,
    mappings: BTreeMap<String, MappingMetadata>,
    aliases: BTreeMap<String, AliasMetadata>,
}

impl IndexMetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Settings::new(),
            version: 1,
            state: IndexState::Open,
            routing_num_shards: None,
            primary_terms: BTreeMap::new(),
            mappings: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Rename the index being built
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn state(mut self, state: IndexState) -> Self {
        self.state = state;
        self
    }

    pub fn routing_num_shards(mut self, routing_num_shards: u32) -> Self {
        self.routing_num_shards = Some(routing_num_shards);
        self
    }

    pub fn primary_term(mut self, shard: u32, term: u64) -> Self {
        self.primary_terms.insert(shard, term);
        self
    }

    pub fn put_mapping(mut self, mapping: MappingMetadata) -> Self {
        self.mappings.insert(mapping.type_name().to_string(), mapping);
        self
    }

    pub fn put_alias(mut self, alias: AliasMetadata) -> Self {
        self.aliases.insert(alias.alias.clone(), alias);
        self
    }

    /// Number of shards according to the current settings
    pub fn number_of_shards(&self) -> Result<u32, MetadataError> {
        let shards = self
            .settings
            .get_as_u32(SETTING_NUMBER_OF_SHARDS)?
            .ok_or_else(|| MetadataError::MissingSetting(SETTING_NUMBER_OF_SHARDS.to_string()))?;
        if shards == 0 {
            return Err(MetadataError::InvalidSetting {
                key: SETTING_NUMBER_OF_SHARDS.to_string(),
                value: shards.to_string(),
                expected: "a value of at least 1",
            });
        }
        Ok(shards)
    }

    /// Build and validate the index metadata
    pub fn build(self) -> Result<IndexMetadata, MetadataError> {
        let number_of_shards = self.number_of_shards()?;
        let number_of_replicas = self
            .settings
            .get_as_u32(SETTING_NUMBER_OF_REPLICAS)?
            .ok_or_else(|| MetadataError::MissingSetting(SETTING_NUMBER_OF_REPLICAS.to_string()))?;

        let routing_num_shards = self.routing_num_shards.unwrap_or(number_of_shards);
        if routing_num_shards == 0 || routing_num_shards % number_of_shards != 0 {
            return Err(MetadataError::RoutingShardsNotMultiple {
                routing_num_shards,
                number_of_shards,
            });
        }

        let mut primary_terms = vec![0u64; number_of_shards as usize];
        for (shard, term) in &self.primary_terms {
            let slot = primary_terms.get_mut(*shard as usize).ok_or(
                MetadataError::PrimaryTermOutOfRange {
                    shard: *shard,
                    number_of_shards,
                },
            )?;
            *slot = *term;
        }

        let creation_version = self
            .settings
            .get_as_u32(SETTING_VERSION_CREATED)?
            .map(Version::from_id)
            .unwrap_or(Version::CURRENT);

        let uuid = self
            .settings
            .get(SETTING_INDEX_UUID)
            .unwrap_or(UNKNOWN_UUID)
            .to_string();
        let is_virtual = self.settings.get_as_bool(SETTING_VIRTUAL, false)?;
        let virtual_index = self.settings.get(SETTING_VIRTUAL_INDEX).map(String::from);
        let keyspace = self
            .settings
            .get(SETTING_KEYSPACE)
            .unwrap_or(self.name.as_str())
            .to_string();
        let replication = self.settings.get(SETTING_REPLICATION).map(String::from);

        Ok(IndexMetadata {
            name: self.name,
            uuid,
            version: self.version,
            state: self.state,
            settings: self.settings,
            number_of_shards,
            number_of_replicas,
            routing_num_shards,
            primary_terms,
            creation_version,
            mappings: self.mappings,
            aliases: self.aliases,
            virtual_index,
            is_virtual,
            keyspace,
            replication,
        })
    }
}
