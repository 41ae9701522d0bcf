//! In-memory local indices
//!
//! Holds just enough state per index to validate a creation: the merged
//! mappings and the index settings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::debug;

use meta_core::settings::SETTING_SORT_FIELD;
use meta_core::{merge_defaults, IndexMetadata, MappingMetadata, MappingSource, Settings, DEFAULT_MAPPING};

use super::{IndexService, IndicesService, QueryContext, RemovalReason};
use crate::CreateIndexError;

/// Record of one local index removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalRecord {
    pub index: String,
    pub reason: RemovalReason,
    pub extra_info: String,
}

/// Local indices keyed by name
#[derive(Default)]
pub struct LocalIndicesService {
    indices: RwLock<BTreeMap<String, Arc<LocalIndex>>>,
    removals: Mutex<Vec<RemovalRecord>>,
}

impl LocalIndicesService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the indices currently materialized
    pub fn index_names(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }

    /// Removals performed so far, oldest first
    pub fn removals(&self) -> Vec<RemovalRecord> {
        self.removals.lock().clone()
    }
}

impl IndicesService for LocalIndicesService {
    fn has_index(&self, index: &str) -> bool {
        self.indices.read().contains_key(index)
    }

    fn index_service(&self, index: &str) -> Option<Arc<dyn IndexService>> {
        self.indices
            .read()
            .get(index)
            .map(|i| i.clone() as Arc<dyn IndexService>)
    }

    fn create_index(&self, imd: &IndexMetadata) -> Result<Arc<dyn IndexService>, CreateIndexError> {
        let mut indices = self.indices.write();
        if indices.contains_key(imd.name()) {
            return Err(CreateIndexError::AlreadyExists(imd.name().to_string()));
        }
        let index = Arc::new(LocalIndex::new(imd));
        indices.insert(imd.name().to_string(), index.clone());
        debug!("[{}] created local index", imd.name());
        Ok(index)
    }

    fn remove_index(&self, index: &str, reason: RemovalReason, extra_info: &str) {
        self.indices.write().remove(index);
        self.removals.lock().push(RemovalRecord {
            index: index.to_string(),
            reason,
            extra_info: extra_info.to_string(),
        });
    }
}

/// Locally materialized index
pub struct LocalIndex {
    name: String,
    settings: Settings,
    mapper: RwLock<LocalMapper>,
}

impl LocalIndex {
    pub fn new(imd: &IndexMetadata) -> Self {
        let mut mapper = LocalMapper::new(imd.name());
        mapper.reset(imd);
        Self {
            name: imd.name().to_string(),
            settings: imd.settings().clone(),
            mapper: RwLock::new(mapper),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl IndexService for LocalIndex {
    fn index(&self) -> &str {
        &self.name
    }

    fn merge_mappings(&self, mappings: &BTreeMap<String, MappingSource>) -> Result<(), CreateIndexError> {
        self.mapper.write().merge(mappings)
    }

    fn doc_mappings(&self) -> Vec<MappingMetadata> {
        self.mapper.read().doc_mappings()
    }

    fn update_mapping(&self, imd: &IndexMetadata) -> Result<(), CreateIndexError> {
        self.mapper.write().reset(imd);
        Ok(())
    }

    fn validate_index_sort(&self) -> Result<(), CreateIndexError> {
        let sort_fields = self.settings.get_as_list(SETTING_SORT_FIELD);
        if sort_fields.is_empty() {
            return Ok(());
        }
        let mapped = self.mapper.read().field_names();
        for field in sort_fields {
            if !mapped.contains(&field) {
                return Err(CreateIndexError::invalid_setting(format!(
                    "unknown index sort field:[{}]",
                    field
                )));
            }
        }
        Ok(())
    }

    fn query_context(&self) -> QueryContext {
        QueryContext {
            index: self.name.clone(),
        }
    }
}

/// Mapping state of a local index
///
/// Allows at most one type besides `_default_`. Existing fields may gain
/// parameters but never change type.
#[derive(Debug, Clone)]
pub struct LocalMapper {
    index: String,
    /// type -> source rooted at the type name
    mappings: BTreeMap<String, MappingSource>,
}

impl LocalMapper {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            mappings: BTreeMap::new(),
        }
    }

    /// Replace the state with the mappings committed in `imd`
    pub fn reset(&mut self, imd: &IndexMetadata) {
        self.mappings = imd
            .mappings()
            .values()
            .map(|m| (m.type_name().to_string(), m.source().clone()))
            .collect();
    }

    /// Merge mappings; the mapper is unchanged on error
    pub fn merge(&mut self, incoming: &BTreeMap<String, MappingSource>) -> Result<(), CreateIndexError> {
        let mut merged = self.mappings.clone();

        if let Some(default) = incoming.get(DEFAULT_MAPPING) {
            merged.insert(DEFAULT_MAPPING.to_string(), default.clone());
        }
        let default_body = merged
            .get(DEFAULT_MAPPING)
            .and_then(|m| m.get(DEFAULT_MAPPING))
            .and_then(Value::as_object)
            .cloned();

        for (type_name, source) in incoming {
            if type_name == DEFAULT_MAPPING {
                continue;
            }
            let body = source
                .get(type_name)
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    CreateIndexError::MappingConflict(format!(
                        "Root mapping definition for type [{}] is missing",
                        type_name
                    ))
                })?;

            match merged
                .get_mut(type_name)
                .and_then(|m| m.get_mut(type_name))
                .and_then(Value::as_object_mut)
            {
                Some(existing) => merge_body_at(existing, body, "")?,
                None => {
                    let mut body = body.clone();
                    if let Some(default_body) = &default_body {
                        merge_defaults(&mut body, default_body);
                    }
                    let mut rooted = Map::new();
                    rooted.insert(type_name.clone(), Value::Object(body));
                    merged.insert(type_name.clone(), rooted);
                }
            }
        }

        let types: Vec<&str> = merged
            .keys()
            .map(String::as_str)
            .filter(|t| *t != DEFAULT_MAPPING)
            .collect();
        if types.len() > 1 {
            return Err(CreateIndexError::MappingConflict(format!(
                "Rejecting mapping update to [{}] as the final mapping would have more than 1 type: [{}]",
                self.index,
                types.join(", ")
            )));
        }

        self.mappings = merged;
        Ok(())
    }

    pub fn doc_mappings(&self) -> Vec<MappingMetadata> {
        self.mappings
            .iter()
            .map(|(t, source)| MappingMetadata::new(t.clone(), source.clone()))
            .collect()
    }

    /// Field paths of every non-default type
    pub fn field_names(&self) -> BTreeSet<String> {
        self.doc_mappings()
            .iter()
            .filter(|m| m.type_name() != DEFAULT_MAPPING)
            .flat_map(|m| m.field_names())
            .collect()
    }
}

fn merge_properties(
    existing: &mut Map<String, Value>,
    incoming: &Map<String, Value>,
    prefix: &str,
) -> Result<(), CreateIndexError> {
    for (name, def) in incoming {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        let Some(current) = existing.get_mut(name) else {
            existing.insert(name.clone(), def.clone());
            continue;
        };

        let (old_type, new_type) = (field_type(current), field_type(def));
        if old_type != new_type {
            return Err(CreateIndexError::MappingConflict(format!(
                "mapper [{}] cannot be changed from type [{}] to [{}]",
                path, old_type, new_type
            )));
        }

        if let (Value::Object(current), Some(def)) = (current, def.as_object()) {
            merge_body_at(current, def, &path)?;
        }
    }
    Ok(())
}

fn merge_body_at(
    current: &mut Map<String, Value>,
    def: &Map<String, Value>,
    path: &str,
) -> Result<(), CreateIndexError> {
    for (key, value) in def {
        match (key.as_str(), value.as_object()) {
            ("properties", Some(props)) => {
                let target = current
                    .entry("properties".to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(target) = target {
                    merge_properties(target, props, path)?;
                }
            }
            _ => {
                current.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn field_type(def: &Value) -> String {
    def.get("type")
        .and_then(Value::as_str)
        .unwrap_or("object")
        .to_string()
}
