//! External table-schema synchronization
//!
//! Every index is backed by a keyspace in an external schema store, with one
//! table per mapping type. During a creation attempt the synchronizer only
//! computes the mutations; they are applied after the new state is published
//! and dropped if the attempt fails.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use tracing::debug;

use meta_core::{ClusterBlock, ClusterBlockLevel, IndexMetadata, MappingMetadata};

use crate::CreateIndexError;

/// Global block present while the schema store is unreachable
pub const NO_SCHEMA_STORE_BLOCK_ID: u32 = 12;

pub fn no_schema_store_block() -> ClusterBlock {
    ClusterBlock::new(
        NO_SCHEMA_STORE_BLOCK_ID,
        "no schema store available",
        true,
        [ClusterBlockLevel::Read, ClusterBlockLevel::Write, ClusterBlockLevel::MetadataWrite],
    )
}

/// Schema change recorded during an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaMutation {
    CreateKeyspace {
        keyspace: String,
        replication_factor: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replication: Option<String>,
    },
    UpdateKeyspace {
        keyspace: String,
        replication_factor: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replication: Option<String>,
    },
    UpdateTable {
        keyspace: String,
        table: String,
        columns: BTreeSet<String>,
        /// Indices whose mappings back this table
        indices: BTreeSet<String>,
    },
}

/// Schema store error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema store unavailable")]
    Unavailable,
    #[error("keyspace [{keyspace}]: {reason}")]
    Keyspace { keyspace: String, reason: String },
    #[error("table [{keyspace}.{table}]: {reason}")]
    Table {
        keyspace: String,
        table: String,
        reason: String,
    },
}

impl From<SchemaError> for CreateIndexError {
    fn from(e: SchemaError) -> Self {
        CreateIndexError::SchemaSyncFailure(e.to_string())
    }
}

/// Schema store seen by the coordinator
pub trait SchemaSynchronizer: Send + Sync {
    /// Record the mutation creating or updating a keyspace
    fn create_or_update_keyspace(
        &self,
        keyspace: &str,
        replication_factor: u32,
        replication: Option<&str>,
        mutations: &mut Vec<SchemaMutation>,
    ) -> Result<(), SchemaError>;

    /// Record the mutation bringing a type's table in line with its mapping
    fn update_table_schema(
        &self,
        keyspace: &str,
        mapping: &MappingMetadata,
        indices: &[&IndexMetadata],
        mutations: &mut Vec<SchemaMutation>,
    ) -> Result<(), SchemaError>;

    /// Apply mutations recorded by a committed attempt
    fn apply(&self, mutations: &[SchemaMutation]);
}

/// Keyspace as known to the recording synchronizer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceSchema {
    pub replication_factor: u32,
    pub replication: Option<String>,
    /// table -> columns
    pub tables: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory schema store
#[derive(Debug, Default)]
pub struct RecordingSchemaSynchronizer {
    keyspaces: RwLock<BTreeMap<String, KeyspaceSchema>>,
    applied: RwLock<Vec<SchemaMutation>>,
}

impl RecordingSchemaSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyspace(&self, name: &str) -> Option<KeyspaceSchema> {
        self.keyspaces.read().get(name).cloned()
    }

    /// Every mutation applied so far
    pub fn applied(&self) -> Vec<SchemaMutation> {
        self.applied.read().clone()
    }
}

impl SchemaSynchronizer for RecordingSchemaSynchronizer {
    fn create_or_update_keyspace(
        &self,
        keyspace: &str,
        replication_factor: u32,
        replication: Option<&str>,
        mutations: &mut Vec<SchemaMutation>,
    ) -> Result<(), SchemaError> {
        if replication_factor == 0 {
            return Err(SchemaError::Keyspace {
                keyspace: keyspace.to_string(),
                reason: "replication factor must be at least 1".to_string(),
            });
        }
        let replication = replication.map(String::from);
        let mutation = match self.keyspaces.read().get(keyspace) {
            None => SchemaMutation::CreateKeyspace {
                keyspace: keyspace.to_string(),
                replication_factor,
                replication,
            },
            Some(existing)
                if existing.replication_factor == replication_factor
                    && existing.replication == replication =>
            {
                return Ok(());
            }
            Some(_) => SchemaMutation::UpdateKeyspace {
                keyspace: keyspace.to_string(),
                replication_factor,
                replication,
            },
        };
        mutations.push(mutation);
        Ok(())
    }

    fn update_table_schema(
        &self,
        keyspace: &str,
        mapping: &MappingMetadata,
        indices: &[&IndexMetadata],
        mutations: &mut Vec<SchemaMutation>,
    ) -> Result<(), SchemaError> {
        let columns = mapping.field_names();
        let current = self
            .keyspaces
            .read()
            .get(keyspace)
            .and_then(|ks| ks.tables.get(mapping.type_name()).cloned());
        if let Some(current) = current {
            if let Some(dropped) = current.difference(&columns).next() {
                return Err(SchemaError::Table {
                    keyspace: keyspace.to_string(),
                    table: mapping.type_name().to_string(),
                    reason: format!("column [{}] cannot be dropped", dropped),
                });
            }
            if current == columns {
                return Ok(());
            }
        }
        mutations.push(SchemaMutation::UpdateTable {
            keyspace: keyspace.to_string(),
            table: mapping.type_name().to_string(),
            columns,
            indices: indices.iter().map(|imd| imd.name().to_string()).collect(),
        });
        Ok(())
    }

    fn apply(&self, mutations: &[SchemaMutation]) {
        let mut keyspaces = self.keyspaces.write();
        for mutation in mutations {
            match mutation {
                SchemaMutation::CreateKeyspace {
                    keyspace,
                    replication_factor,
                    replication,
                }
                | SchemaMutation::UpdateKeyspace {
                    keyspace,
                    replication_factor,
                    replication,
                } => {
                    let ks = keyspaces.entry(keyspace.clone()).or_default();
                    ks.replication_factor = *replication_factor;
                    ks.replication = replication.clone();
                }
                SchemaMutation::UpdateTable {
                    keyspace,
                    table,
                    columns,
                    ..
                } => {
                    keyspaces
                        .entry(keyspace.clone())
                        .or_default()
                        .tables
                        .insert(table.clone(), columns.clone());
                }
            }
            debug!("applied schema mutation {:?}", mutation);
        }
        self.applied.write().extend_from_slice(mutations);
    }
}
