//! Create-index request types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use meta_core::settings::{INDEX_PREFIX, SETTING_WAIT_FOR_ACTIVE_SHARDS};
use meta_core::{AliasMetadata, ClusterBlock, IndexMetadata, IndexState, Settings};

/// Kind of resize operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeType {
    Shrink,
    Split,
}

impl std::fmt::Display for ResizeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResizeType::Shrink => write!(f, "shrink"),
            ResizeType::Split => write!(f, "split"),
        }
    }
}

/// Resize descriptor: create the target from an existing index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub source_index: String,
    pub resize_type: ResizeType,
    /// Copy all copyable source settings instead of the analysis-related subset
    #[serde(default)]
    pub copy_settings: bool,
}

impl ResizeRequest {
    pub fn shrink(source_index: impl Into<String>) -> Self {
        Self {
            source_index: source_index.into(),
            resize_type: ResizeType::Shrink,
            copy_settings: false,
        }
    }

    pub fn split(source_index: impl Into<String>) -> Self {
        Self {
            source_index: source_index.into(),
            resize_type: ResizeType::Split,
            copy_settings: false,
        }
    }

    pub fn with_copy_settings(mut self, copy_settings: bool) -> Self {
        self.copy_settings = copy_settings;
        self
    }
}

/// Number of active copies per shard to wait for after creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub enum ActiveShardCount {
    /// Use the index's `index.write.wait_for_active_shards`
    #[default]
    Default,
    /// Every copy (primary and replicas)
    All,
    Count(u32),
}

impl ActiveShardCount {
    /// Parse `all`, `default` or a non-negative count
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "all" => Ok(ActiveShardCount::All),
            "default" => Ok(ActiveShardCount::Default),
            other => other
                .parse::<u32>()
                .map(ActiveShardCount::Count)
                .map_err(|_| format!("cannot parse ActiveShardCount[{}]", value)),
        }
    }

    /// Resolve `Default` against the index settings
    pub fn resolve(self, imd: &IndexMetadata) -> Result<Self, String> {
        match self {
            ActiveShardCount::Default => {
                match imd.settings().get(SETTING_WAIT_FOR_ACTIVE_SHARDS) {
                    Some(value) => Self::parse(value).map(|count| match count {
                        ActiveShardCount::Default => ActiveShardCount::Count(1),
                        other => other,
                    }),
                    None => Ok(ActiveShardCount::Count(1)),
                }
            }
            other => Ok(other),
        }
    }

    /// Check the count against the copies an index will have
    pub fn validate(self, number_of_replicas: u32) -> bool {
        match self {
            ActiveShardCount::Count(n) => u64::from(n) <= u64::from(number_of_replicas) + 1,
            _ => true,
        }
    }

    /// Copies per shard required, for a resolved count
    pub fn required_copies(self, number_of_replicas: u32) -> u64 {
        match self {
            ActiveShardCount::All => u64::from(number_of_replicas) + 1,
            ActiveShardCount::Count(n) => u64::from(n),
            ActiveShardCount::Default => 1,
        }
    }
}

impl std::fmt::Display for ActiveShardCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveShardCount::Default => write!(f, "default"),
            ActiveShardCount::All => write!(f, "all"),
            ActiveShardCount::Count(n) => write!(f, "{}", n),
        }
    }
}

impl TryFrom<serde_json::Value> for ActiveShardCount {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(ActiveShardCount::Count)
                .ok_or_else(|| format!("cannot parse ActiveShardCount[{}]", n)),
            serde_json::Value::String(s) => Self::parse(&s),
            other => Err(format!("cannot parse ActiveShardCount[{}]", other)),
        }
    }
}

impl From<ActiveShardCount> for String {
    fn from(count: ActiveShardCount) -> Self {
        count.to_string()
    }
}

/// Request to create an index, either fresh or by resizing another index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    /// Why the index is created (diagnostic only)
    #[serde(default = "default_cause")]
    pub cause: String,
    pub index: String,
    /// Name as supplied by the caller, before any resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_name: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    /// Mapping sources per type (JSON)
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub aliases: Vec<AliasMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeRequest>,
    #[serde(default)]
    pub state: IndexState,
    #[serde(default)]
    pub blocks: Vec<ClusterBlock>,
    #[serde(default)]
    pub wait_for_active_shards: ActiveShardCount,
    /// How long to wait for active shards, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_cause() -> String {
    "api".to_string()
}

impl CreateIndexRequest {
    pub fn new(cause: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            index: index.into(),
            provided_name: None,
            settings: Settings::new(),
            mappings: BTreeMap::new(),
            aliases: Vec::new(),
            resize: None,
            state: IndexState::Open,
            blocks: Vec::new(),
            wait_for_active_shards: ActiveShardCount::Default,
            timeout_secs: None,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mapping(mut self, type_name: impl Into<String>, source: impl Into<String>) -> Self {
        self.mappings.insert(type_name.into(), source.into());
        self
    }

    pub fn alias(mut self, alias: AliasMetadata) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn resize(mut self, resize: ResizeRequest) -> Self {
        self.resize = Some(resize);
        self
    }

    pub fn state(mut self, state: IndexState) -> Self {
        self.state = state;
        self
    }

    pub fn block(mut self, block: ClusterBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn wait_for_active_shards(mut self, count: ActiveShardCount) -> Self {
        self.wait_for_active_shards = count;
        self
    }

    pub fn provided_name(&self) -> &str {
        self.provided_name.as_deref().unwrap_or(&self.index)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a.alias == alias)
    }

    /// Copy of the request with every settings key carrying the `index.` prefix
    pub fn normalized(mut self) -> Self {
        self.settings = self.settings.normalize_prefix(INDEX_PREFIX);
        self
    }
}
