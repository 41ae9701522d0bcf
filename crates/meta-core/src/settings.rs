//! Index settings
//!
//! A flat `key -> value` map with typed accessors. Keys are fully qualified
//! (`index.number_of_shards`); values are stored as strings, the way they arrive
//! from requests, templates and process defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::MetadataError;

pub const INDEX_PREFIX: &str = "index.";

pub const SETTING_NUMBER_OF_SHARDS: &str = "index.number_of_shards";
pub const SETTING_NUMBER_OF_REPLICAS: &str = "index.number_of_replicas";
pub const SETTING_AUTO_EXPAND_REPLICAS: &str = "index.auto_expand_replicas";
pub const SETTING_NUMBER_OF_ROUTING_SHARDS: &str = "index.number_of_routing_shards";
pub const SETTING_ROUTING_PARTITION_SIZE: &str = "index.routing_partition_size";
pub const SETTING_CREATION_DATE: &str = "index.creation_date";
pub const SETTING_INDEX_UUID: &str = "index.uuid";
pub const SETTING_INDEX_PROVIDED_NAME: &str = "index.provided_name";
pub const SETTING_VERSION_CREATED: &str = "index.version.created";
pub const SETTING_VERSION_UPGRADED: &str = "index.version.upgraded";
pub const SETTING_DATA_PATH: &str = "index.data_path";
pub const SETTING_WAIT_FOR_ACTIVE_SHARDS: &str = "index.write.wait_for_active_shards";
pub const SETTING_SORT_FIELD: &str = "index.sort.field";

pub const SETTING_BLOCKS_READ_ONLY: &str = "index.blocks.read_only";
pub const SETTING_BLOCKS_READ: &str = "index.blocks.read";
pub const SETTING_BLOCKS_WRITE: &str = "index.blocks.write";
pub const SETTING_BLOCKS_METADATA: &str = "index.blocks.metadata";

pub const SETTING_INITIAL_RECOVERY_ID: &str = "index.routing.allocation.initial_recovery._id";
pub const SETTING_ALLOCATION_MAX_RETRIES: &str = "index.allocation.max_retries";
pub const SETTING_RESIZE_SOURCE_NAME: &str = "index.resize.source.name";
pub const SETTING_RESIZE_SOURCE_UUID: &str = "index.resize.source.uuid";
pub const SETTING_SHRINK_SOURCE_NAME: &str = "index.shrink.source.name";
pub const SETTING_SHRINK_SOURCE_UUID: &str = "index.shrink.source.uuid";

pub const SETTING_VIRTUAL_INDEX: &str = "index.virtual_index";
pub const SETTING_VIRTUAL: &str = "index.virtual";
pub const SETTING_PARTITION_FUNCTION: &str = "index.partition_function";
pub const SETTING_PARTITION_FUNCTION_CLASS: &str = "index.partition_function_class";
pub const SETTING_KEYSPACE: &str = "index.keyspace";
pub const SETTING_REPLICATION: &str = "index.replication";

/// Settings that only the cluster itself may write
pub const PRIVATE_INDEX_SETTINGS: &[&str] = &[
    SETTING_CREATION_DATE,
    SETTING_INDEX_UUID,
    SETTING_INDEX_PROVIDED_NAME,
    SETTING_VERSION_CREATED,
    SETTING_VERSION_UPGRADED,
    SETTING_RESIZE_SOURCE_NAME,
    SETTING_RESIZE_SOURCE_UUID,
    SETTING_SHRINK_SOURCE_NAME,
    SETTING_SHRINK_SOURCE_UUID,
    SETTING_VIRTUAL,
];

/// Settings that are never carried over from a resize source
pub const NOT_COPYABLE_ON_RESIZE: &[&str] = &[
    SETTING_INITIAL_RECOVERY_ID,
    SETTING_ALLOCATION_MAX_RETRIES,
    SETTING_RESIZE_SOURCE_NAME,
    SETTING_RESIZE_SOURCE_UUID,
    SETTING_SHRINK_SOURCE_NAME,
    SETTING_SHRINK_SOURCE_UUID,
    SETTING_NUMBER_OF_ROUTING_SHARDS,
];

/// Check if a setting key is reserved for the cluster
pub fn is_private_setting(key: &str) -> bool {
    PRIVATE_INDEX_SETTINGS.contains(&key)
}

/// Index settings
///
/// Deserializes from nested or flat JSON objects; nested objects are flattened
/// into dotted keys and scalar values are kept as their string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, String>")]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting, returning the updated value
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.put(key, value);
        self
    }

    /// Set a setting, replacing any previous value
    pub fn put(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    /// Copy all settings from `other`, overriding existing keys
    pub fn put_all(&mut self, other: &Settings) -> &mut Self {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    /// Remove a setting
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a setting as an unsigned integer
    pub fn get_as_u32(&self, key: &str) -> Result<Option<u32>, MetadataError> {
        self.parse_with(key, "an unsigned integer", |v| v.parse::<u32>().ok())
    }

    /// Read a setting as a 64-bit unsigned integer
    pub fn get_as_u64(&self, key: &str) -> Result<Option<u64>, MetadataError> {
        self.parse_with(key, "an unsigned integer", |v| v.parse::<u64>().ok())
    }

    /// Read a setting as a boolean, falling back to `default` when absent
    pub fn get_as_bool(&self, key: &str, default: bool) -> Result<bool, MetadataError> {
        let value = self.parse_with(key, "true or false", |v| match v {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        })?;
        Ok(value.unwrap_or(default))
    }

    /// Read a comma separated list setting
    pub fn get_as_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keep only the settings whose key matches the predicate
    pub fn filter<F>(&self, mut predicate: F) -> Settings
    where
        F: FnMut(&str) -> bool,
    {
        Settings {
            values: self
                .values
                .iter()
                .filter(|(k, _)| predicate(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Prefix every key that does not already start with `prefix`
    pub fn normalize_prefix(&self, prefix: &str) -> Settings {
        Settings {
            values: self
                .values
                .iter()
                .map(|(k, v)| {
                    if k.starts_with(prefix) {
                        (k.clone(), v.clone())
                    } else {
                        (format!("{}{}", prefix, k), v.clone())
                    }
                })
                .collect(),
        }
    }

    fn parse_with<T, F>(
        &self,
        key: &str,
        expected: &'static str,
        parse: F,
    ) -> Result<Option<T>, MetadataError>
    where
        F: FnOnce(&str) -> Option<T>,
    {
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => parse(raw.trim())
                .map(Some)
                .ok_or_else(|| MetadataError::InvalidSetting {
                    key: key.to_string(),
                    value: raw.clone(),
                    expected,
                }),
        }
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();
        for (k, v) in iter {
            settings.put(k, v);
        }
        settings
    }
}

impl From<BTreeMap<String, Value>> for Settings {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        let mut settings = Settings::new();
        for (key, value) in raw {
            flatten_into(&mut settings.values, key, value);
        }
        settings
    }
}

impl From<Settings> for BTreeMap<String, String> {
    fn from(settings: Settings) -> Self {
        settings.values
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, key: String, value: Value) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.insert(key, s);
        }
        Value::Bool(b) => {
            out.insert(key, b.to_string());
        }
        Value::Number(n) => {
            out.insert(key, n.to_string());
        }
        Value::Array(items) => {
            let joined = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            out.insert(key, joined);
        }
        Value::Object(map) => {
            for (child, value) in map {
                flatten_into(out, format!("{}.{}", key, child), value);
            }
        }
    }
}
