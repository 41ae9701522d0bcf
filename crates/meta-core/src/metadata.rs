//! Cluster-wide metadata
//!
//! Index metadata, templates, and the virtual index reference map
//! (virtual index name -> names of the physical indices sharing it).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{IndexMetadata, IndexTemplateMetadata, UNKNOWN_UUID};

/// Cluster metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    cluster_uuid: String,
    version: u64,
    #[serde(default)]
    indices: BTreeMap<String, IndexMetadata>,
    #[serde(default)]
    templates: BTreeMap<String, IndexTemplateMetadata>,
    /// Derived from `indices` on every build
    #[serde(default)]
    virtual_refs: BTreeMap<String, BTreeSet<String>>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            cluster_uuid: UNKNOWN_UUID.to_string(),
            version: 0,
            indices: BTreeMap::new(),
            templates: BTreeMap::new(),
            virtual_refs: BTreeMap::new(),
        }
    }
}

impl Metadata {
    pub fn builder() -> MetadataBuilder {
        Metadata::default().to_builder()
    }

    /// Start building a modified copy of this metadata
    pub fn to_builder(&self) -> MetadataBuilder {
        MetadataBuilder {
            cluster_uuid: self.cluster_uuid.clone(),
            version: self.version,
            indices: self.indices.clone(),
            templates: self.templates.clone(),
        }
    }

    pub fn cluster_uuid(&self) -> &str {
        &self.cluster_uuid
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn indices(&self) -> &BTreeMap<String, IndexMetadata> {
        &self.indices
    }

    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.get(name)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Check if any index carries an alias with this name
    pub fn has_alias(&self, alias: &str) -> bool {
        self.indices.values().any(|imd| imd.aliases().contains_key(alias))
    }

    pub fn templates(&self) -> &BTreeMap<String, IndexTemplateMetadata> {
        &self.templates
    }

    /// Physical indices referencing a virtual index
    pub fn referencing_indices(&self, virtual_index: &str) -> impl Iterator<Item = &str> {
        self.virtual_refs
            .get(virtual_index)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Total shard copies of all open, non-virtual indices
    pub fn total_open_shard_copies(&self) -> u64 {
        self.indices
            .values()
            .filter(|imd| imd.state() == crate::IndexState::Open && !imd.is_virtual())
            .map(IndexMetadata::total_shard_copies)
            .sum()
    }
}

/// Metadata builder
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    cluster_uuid: String,
    version: u64,
    indices: BTreeMap<String, IndexMetadata>,
    templates: BTreeMap<String, IndexTemplateMetadata>,
}

impl MetadataBuilder {
    /// Add or replace an index
    pub fn put(mut self, index: IndexMetadata) -> Self {
        self.indices.insert(index.name().to_string(), index);
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.indices.remove(name);
        self
    }

    pub fn put_template(mut self, template: IndexTemplateMetadata) -> Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    /// Assign a cluster uuid if none has been assigned yet
    pub fn generate_cluster_uuid_if_needed(mut self) -> Self {
        if self.cluster_uuid == UNKNOWN_UUID {
            self.cluster_uuid = uuid::Uuid::new_v4().to_string();
        }
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.get(name)
    }

    /// Build metadata, bumping the version and recomputing virtual references
    pub fn build(self) -> Metadata {
        let mut virtual_refs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for imd in self.indices.values() {
            if imd.is_virtual() {
                continue;
            }
            if let Some(virtual_index) = imd.virtual_index() {
                virtual_refs
                    .entry(virtual_index.to_string())
                    .or_default()
                    .insert(imd.name().to_string());
            }
        }

        Metadata {
            cluster_uuid: self.cluster_uuid,
            version: self.version + 1,
            indices: self.indices,
            templates: self.templates,
            virtual_refs,
        }
    }
}
