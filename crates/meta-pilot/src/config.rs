//! Configuration module for the metadata pilot
//!
//! Supports YAML configuration files with module-based organization

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Index creation defaults
    #[serde(default)]
    pub index: IndexDefaultsConfig,
    /// Admission control
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Index naming policy
    #[serde(default)]
    pub naming: NamingConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl PilotConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to YAML file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let yaml =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: PilotConfig) {
        self.cluster.merge(other.cluster);
        self.index.merge(other.index);
        self.admission.merge(other.admission);
        self.naming.merge(other.naming);
        self.log.merge(other.log);
    }
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name
    #[serde(default = "default_cluster_name")]
    pub name: String,
    /// Directory holding the persisted cluster state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Default timeout when waiting for active shards, in seconds
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            data_dir: default_data_dir(),
            ack_timeout_secs: default_ack_timeout_secs(),
        }
    }
}

impl ClusterConfig {
    fn merge(&mut self, other: Self) {
        if !other.name.is_empty() {
            self.name = other.name;
        }
        if !other.data_dir.as_os_str().is_empty() {
            self.data_dir = other.data_dir;
        }
        if other.ack_timeout_secs > 0 {
            self.ack_timeout_secs = other.ack_timeout_secs;
        }
    }

    /// Get ack timeout as Duration
    pub fn ack_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ack_timeout_secs)
    }
}

/// Process-wide index defaults, applied below templates and request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefaultsConfig {
    #[serde(default = "default_number_of_shards")]
    pub default_number_of_shards: u32,
    #[serde(default = "default_number_of_replicas")]
    pub default_number_of_replicas: u32,
    #[serde(default)]
    pub default_auto_expand_replicas: Option<String>,
}

impl Default for IndexDefaultsConfig {
    fn default() -> Self {
        Self {
            default_number_of_shards: default_number_of_shards(),
            default_number_of_replicas: default_number_of_replicas(),
            default_auto_expand_replicas: None,
        }
    }
}

impl IndexDefaultsConfig {
    fn merge(&mut self, other: Self) {
        if other.default_number_of_shards > 0 {
            self.default_number_of_shards = other.default_number_of_shards;
        }
        if other.default_number_of_replicas != default_number_of_replicas() {
            self.default_number_of_replicas = other.default_number_of_replicas;
        }
        if other.default_auto_expand_replicas.is_some() {
            self.default_auto_expand_replicas = other.default_auto_expand_replicas;
        }
    }
}

/// What happens when an index would exceed the cluster shard limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardLimitMode {
    /// Emit a deprecation advisory and admit the index
    Deprecation,
    /// Reject the index
    #[default]
    Enforce,
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Open shard copies allowed per data node
    #[serde(default = "default_max_shards_per_node")]
    pub max_shards_per_node: u32,
    #[serde(default)]
    pub shard_limit_mode: ShardLimitMode,
    /// Upper bound of `index.number_of_shards`
    #[serde(default = "default_max_number_of_shards")]
    pub max_number_of_shards: u32,
    /// Upper bound of `index.number_of_replicas`
    #[serde(default = "default_max_number_of_replicas")]
    pub max_number_of_replicas: u32,
    /// Reject private index settings supplied by callers
    #[serde(default = "default_true")]
    pub forbid_private_index_settings: bool,
    /// Root directory under which custom index data paths must live
    #[serde(default)]
    pub shared_data_path: Option<PathBuf>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_shards_per_node: default_max_shards_per_node(),
            shard_limit_mode: ShardLimitMode::default(),
            max_number_of_shards: default_max_number_of_shards(),
            max_number_of_replicas: default_max_number_of_replicas(),
            forbid_private_index_settings: true,
            shared_data_path: None,
        }
    }
}

impl AdmissionConfig {
    fn merge(&mut self, other: Self) {
        if other.max_shards_per_node > 0 {
            self.max_shards_per_node = other.max_shards_per_node;
        }
        if other.shard_limit_mode != ShardLimitMode::default() {
            self.shard_limit_mode = other.shard_limit_mode;
        }
        if other.max_number_of_shards != default_max_number_of_shards() && other.max_number_of_shards > 0 {
            self.max_number_of_shards = other.max_number_of_shards;
        }
        if other.max_number_of_replicas != default_max_number_of_replicas() {
            self.max_number_of_replicas = other.max_number_of_replicas;
        }
        if !other.forbid_private_index_settings {
            self.forbid_private_index_settings = false;
        }
        if other.shared_data_path.is_some() {
            self.shared_data_path = other.shared_data_path;
        }
    }
}

/// Handling of `:` in index names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColonMode {
    /// Accept the name and emit a deprecation advisory
    #[default]
    Deprecation,
    /// Reject the name
    Reject,
}

/// Index naming configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub colon_mode: ColonMode,
}

impl NamingConfig {
    fn merge(&mut self, other: Self) {
        if other.colon_mode != ColonMode::default() {
            self.colon_mode = other.colon_mode;
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    fn merge(&mut self, other: Self) {
        if !other.level.is_empty() {
            self.level = other.level;
        }
    }
}

// Default value functions

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./pilot_data")
}

fn default_ack_timeout_secs() -> u64 {
    30
}

fn default_number_of_shards() -> u32 {
    5
}

fn default_number_of_replicas() -> u32 {
    1
}

fn default_max_shards_per_node() -> u32 {
    1000
}

fn default_max_number_of_shards() -> u32 {
    1024
}

fn default_max_number_of_replicas() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}
