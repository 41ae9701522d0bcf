//! Type mappings
//!
//! A mapping is kept as its JSON source, rooted at the type name:
//! `{"<type>": {"properties": {...}}}`. Structured mapper logic lives with the
//! local index service; this module only stores and inspects sources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::MetadataError;

/// Type name used by typeless mappings
pub const SINGLE_MAPPING_NAME: &str = "_doc";
/// Name of the default mapping applied to every type
pub const DEFAULT_MAPPING: &str = "_default_";

/// JSON object rooted at the type name
pub type MappingSource = Map<String, Value>;

/// Parse a mapping source for `type_name`
///
/// Sources without a type wrapper are wrapped so the result is always rooted
/// at the type name.
pub fn parse_mapping(type_name: &str, source: &str) -> Result<MappingSource, MetadataError> {
    let value: Value = serde_json::from_str(source).map_err(|e| MetadataError::MappingParse {
        type_name: type_name.to_string(),
        reason: e.to_string(),
    })?;

    let Value::Object(root) = value else {
        return Err(MetadataError::MappingParse {
            type_name: type_name.to_string(),
            reason: "mapping source must be a JSON object".to_string(),
        });
    };

    if root.len() == 1 && root.get(type_name).is_some_and(Value::is_object) {
        return Ok(root);
    }

    let mut wrapped = Map::new();
    wrapped.insert(type_name.to_string(), Value::Object(root));
    Ok(wrapped)
}

/// Mapping of one type, as committed to index metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingMetadata {
    type_name: String,
    source: MappingSource,
}

impl MappingMetadata {
    pub fn new(type_name: impl Into<String>, source: MappingSource) -> Self {
        Self {
            type_name: type_name.into(),
            source,
        }
    }

    /// Parse a mapping from its JSON source
    pub fn parse(type_name: &str, source: &str) -> Result<Self, MetadataError> {
        Ok(Self::new(type_name, parse_mapping(type_name, source)?))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn source(&self) -> &MappingSource {
        &self.source
    }

    /// Body of the mapping under the type root
    pub fn body(&self) -> Option<&Map<String, Value>> {
        self.source.get(&self.type_name).and_then(Value::as_object)
    }

    /// All mapped field paths, with object fields expanded to dotted paths
    pub fn field_names(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        if let Some(props) = self
            .body()
            .and_then(|b| b.get("properties"))
            .and_then(Value::as_object)
        {
            collect_fields(props, "", &mut fields);
        }
        fields
    }

    /// Serialized JSON source
    pub fn source_string(&self) -> String {
        Value::Object(self.source.clone()).to_string()
    }
}

/// Merge `defaults` into `content`, keeping every value already in `content`
///
/// Nested objects merge recursively. Two arrays whose items are all
/// single-key objects (dynamic templates) merge by key, content entries first;
/// any other pair of arrays is combined, defaults first, without duplicates.
pub fn merge_defaults(content: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, default) in defaults {
        match (content.get_mut(key), default) {
            (None, _) => {
                content.insert(key.clone(), default.clone());
            }
            (Some(Value::Object(existing)), Value::Object(default)) => {
                merge_defaults(existing, default);
            }
            (Some(Value::Array(existing)), Value::Array(default)) => {
                let merged = merge_lists(existing, default);
                *existing = merged;
            }
            (Some(_), _) => {}
        }
    }
}

fn merge_lists(content: &[Value], defaults: &[Value]) -> Vec<Value> {
    let single_key = |items: &[Value]| {
        items
            .iter()
            .all(|v| v.as_object().is_some_and(|m| m.len() == 1))
    };

    if single_key(content) && single_key(defaults) {
        let mut merged: Vec<(String, Map<String, Value>)> = Vec::new();
        for item in content.iter().chain(defaults) {
            let Some(map) = item.as_object() else { continue };
            let Some(key) = map.keys().next().cloned() else { continue };
            match merged.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => merge_defaults(existing, map),
                None => merged.push((key, map.clone())),
            }
        }
        merged.into_iter().map(|(_, m)| Value::Object(m)).collect()
    } else {
        let mut merged = defaults.to_vec();
        for item in content {
            if !merged.contains(item) {
                merged.push(item.clone());
            }
        }
        merged
    }
}

fn collect_fields(props: &Map<String, Value>, prefix: &str, out: &mut BTreeSet<String>) {
    for (name, def) in props {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        if let Some(children) = def.get("properties").and_then(Value::as_object) {
            collect_fields(children, &path, out);
        }
        out.insert(path);
    }
}
