//! Cluster and index blocks

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::settings::{
    SETTING_BLOCKS_METADATA, SETTING_BLOCKS_READ, SETTING_BLOCKS_READ_ONLY, SETTING_BLOCKS_WRITE,
};
use crate::{IndexMetadata, IndexState};

/// Operation class a block applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBlockLevel {
    Read,
    Write,
    MetadataRead,
    MetadataWrite,
}

/// Block preventing a class of operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBlock {
    pub id: u32,
    pub description: String,
    pub retryable: bool,
    pub levels: BTreeSet<ClusterBlockLevel>,
}

impl ClusterBlock {
    pub fn new(
        id: u32,
        description: impl Into<String>,
        retryable: bool,
        levels: impl IntoIterator<Item = ClusterBlockLevel>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            retryable,
            levels: levels.into_iter().collect(),
        }
    }

    pub fn contains(&self, level: ClusterBlockLevel) -> bool {
        self.levels.contains(&level)
    }

    pub fn index_closed() -> Self {
        Self::new(
            INDEX_CLOSED_BLOCK_ID,
            "index closed",
            false,
            [ClusterBlockLevel::Read, ClusterBlockLevel::Write],
        )
    }

    pub fn index_read_only() -> Self {
        Self::new(
            INDEX_READ_ONLY_BLOCK_ID,
            "index read-only (api)",
            false,
            [ClusterBlockLevel::Write, ClusterBlockLevel::MetadataWrite],
        )
    }

    pub fn index_read() -> Self {
        Self::new(
            INDEX_READ_BLOCK_ID,
            "index read (api)",
            false,
            [ClusterBlockLevel::Read],
        )
    }

    pub fn index_write() -> Self {
        Self::new(
            INDEX_WRITE_BLOCK_ID,
            "index write (api)",
            false,
            [ClusterBlockLevel::Write],
        )
    }

    pub fn index_metadata() -> Self {
        Self::new(
            INDEX_METADATA_BLOCK_ID,
            "index metadata (api)",
            false,
            [ClusterBlockLevel::MetadataRead, ClusterBlockLevel::MetadataWrite],
        )
    }
}

pub const INDEX_CLOSED_BLOCK_ID: u32 = 4;
pub const INDEX_READ_ONLY_BLOCK_ID: u32 = 5;
pub const INDEX_READ_BLOCK_ID: u32 = 7;
pub const INDEX_WRITE_BLOCK_ID: u32 = 8;
pub const INDEX_METADATA_BLOCK_ID: u32 = 9;

/// Blocks derived from index state and settings
const SETTING_DERIVED_BLOCK_IDS: &[u32] = &[
    INDEX_CLOSED_BLOCK_ID,
    INDEX_READ_ONLY_BLOCK_ID,
    INDEX_READ_BLOCK_ID,
    INDEX_WRITE_BLOCK_ID,
    INDEX_METADATA_BLOCK_ID,
];

/// Global and per-index blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBlocks {
    #[serde(default)]
    global: Vec<ClusterBlock>,
    #[serde(default)]
    indices: BTreeMap<String, Vec<ClusterBlock>>,
}

impl ClusterBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_builder(&self) -> ClusterBlocksBuilder {
        ClusterBlocksBuilder {
            global: self.global.clone(),
            indices: self.indices.clone(),
        }
    }

    pub fn global(&self) -> &[ClusterBlock] {
        &self.global
    }

    pub fn has_global_block(&self, id: u32) -> bool {
        self.global.iter().any(|b| b.id == id)
    }

    pub fn global_blocked(&self, level: ClusterBlockLevel) -> bool {
        self.global.iter().any(|b| b.contains(level))
    }

    pub fn index_blocks(&self, index: &str) -> &[ClusterBlock] {
        self.indices.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_index_block(&self, index: &str, id: u32) -> bool {
        self.index_blocks(index).iter().any(|b| b.id == id)
    }

    /// Check if an index is blocked at a level, globally or by its own blocks
    pub fn index_blocked(&self, level: ClusterBlockLevel, index: &str) -> bool {
        self.global_blocked(level) || self.index_blocks(index).iter().any(|b| b.contains(level))
    }
}

/// Cluster blocks builder
#[derive(Debug, Clone)]
pub struct ClusterBlocksBuilder {
    global: Vec<ClusterBlock>,
    indices: BTreeMap<String, Vec<ClusterBlock>>,
}

impl ClusterBlocksBuilder {
    pub fn add_global_block(mut self, block: ClusterBlock) -> Self {
        if !self.global.iter().any(|b| b.id == block.id) {
            self.global.push(block);
        }
        self
    }

    pub fn remove_global_block(mut self, id: u32) -> Self {
        self.global.retain(|b| b.id != id);
        self
    }

    pub fn add_index_block(mut self, index: &str, block: ClusterBlock) -> Self {
        let blocks = self.indices.entry(index.to_string()).or_default();
        if !blocks.iter().any(|b| b.id == block.id) {
            blocks.push(block);
        }
        self
    }

    pub fn remove_index_block(mut self, index: &str, id: u32) -> Self {
        if let Some(blocks) = self.indices.get_mut(index) {
            blocks.retain(|b| b.id != id);
            if blocks.is_empty() {
                self.indices.remove(index);
            }
        }
        self
    }

    /// Re-derive the blocks implied by an index's state and settings
    pub fn update_blocks(mut self, imd: &IndexMetadata) -> Self {
        let index = imd.name();
        for id in SETTING_DERIVED_BLOCK_IDS {
            self = self.remove_index_block(index, *id);
        }

        let settings = imd.settings();
        let flag = |key: &str| settings.get_as_bool(key, false).unwrap_or(false);

        if imd.state() == IndexState::Close {
            self = self.add_index_block(index, ClusterBlock::index_closed());
        }
        if flag(SETTING_BLOCKS_READ_ONLY) {
            self = self.add_index_block(index, ClusterBlock::index_read_only());
        }
        if flag(SETTING_BLOCKS_READ) {
            self = self.add_index_block(index, ClusterBlock::index_read());
        }
        if flag(SETTING_BLOCKS_WRITE) {
            self = self.add_index_block(index, ClusterBlock::index_write());
        }
        if flag(SETTING_BLOCKS_METADATA) {
            self = self.add_index_block(index, ClusterBlock::index_metadata());
        }
        self
    }

    pub fn build(self) -> ClusterBlocks {
        ClusterBlocks {
            global: self.global,
            indices: self.indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS};
    use crate::Settings;

    fn index(settings: Settings, state: IndexState) -> IndexMetadata {
        IndexMetadata::builder("logs")
            .settings(
                settings
                    .with(SETTING_NUMBER_OF_SHARDS, 1)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0),
            )
            .state(state)
            .build()
            .unwrap()
    }

    #[test]
    fn test_update_blocks_from_settings() {
        let imd = index(Settings::new().with(SETTING_BLOCKS_WRITE, true), IndexState::Open);
        let blocks = ClusterBlocks::new().to_builder().update_blocks(&imd).build();

        assert!(blocks.index_blocked(ClusterBlockLevel::Write, "logs"));
        assert!(!blocks.index_blocked(ClusterBlockLevel::Read, "logs"));
        assert!(!blocks.index_blocked(ClusterBlockLevel::Write, "other"));
    }

    #[test]
    fn test_update_blocks_closed_index() {
        let imd = index(Settings::new(), IndexState::Close);
        let blocks = ClusterBlocks::new().to_builder().update_blocks(&imd).build();

        assert!(blocks.has_index_block("logs", INDEX_CLOSED_BLOCK_ID));
        assert!(blocks.index_blocked(ClusterBlockLevel::Read, "logs"));
    }

    #[test]
    fn test_update_blocks_keeps_request_blocks() {
        let custom = ClusterBlock::new(100, "custom", true, [ClusterBlockLevel::MetadataWrite]);
        let imd = index(Settings::new(), IndexState::Open);
        let blocks = ClusterBlocks::new()
            .to_builder()
            .add_index_block("logs", custom)
            .add_index_block("logs", ClusterBlock::index_write())
            .update_blocks(&imd)
            .build();

        assert!(blocks.has_index_block("logs", 100));
        assert!(!blocks.has_index_block("logs", INDEX_WRITE_BLOCK_ID));
    }
}
