//! Shard topology: routing shards, shrink/split validation and primary terms

use std::collections::{BTreeMap, BTreeSet};

use meta_core::settings::{
    SETTING_ALLOCATION_MAX_RETRIES, SETTING_INITIAL_RECOVERY_ID, SETTING_NUMBER_OF_ROUTING_SHARDS,
    SETTING_NUMBER_OF_SHARDS, SETTING_RESIZE_SOURCE_NAME, SETTING_RESIZE_SOURCE_UUID,
    SETTING_ROUTING_PARTITION_SIZE, SETTING_SHRINK_SOURCE_NAME, SETTING_SHRINK_SOURCE_UUID,
    SETTING_VERSION_CREATED, SETTING_VERSION_UPGRADED, NOT_COPYABLE_ON_RESIZE,
};
use meta_core::{
    ClusterBlockLevel, ClusterState, IndexMetadata, NodeId, Settings, ShardRoutingState, Version,
    DEFAULT_MAPPING,
};

use crate::request::{CreateIndexRequest, ResizeRequest, ResizeType};
use crate::CreateIndexError;

/// Source settings copied to a resize target when `copy_settings` is off
fn copied_by_default(key: &str) -> bool {
    key.starts_with("index.similarity.")
        || key.starts_with("index.analysis.")
        || key.starts_with("index.sort.")
        || key == "index.mapping.single_type"
        || key == "index.soft_deletes.enabled"
}

/// Check a resize request before any settings are resolved
///
/// A shrink without a target shard count shrinks to one shard; a split must
/// name its target count.
pub fn check_resize_request(request: &CreateIndexRequest) -> Result<(), CreateIndexError> {
    match &request.resize {
        Some(resize)
            if resize.resize_type == ResizeType::Split
                && !request.settings.contains(SETTING_NUMBER_OF_SHARDS) =>
        {
            Err(CreateIndexError::invalid_setting(format!(
                "{} is required for split operations",
                SETTING_NUMBER_OF_SHARDS
            )))
        }
        _ => Ok(()),
    }
}

/// Fix the routing shard count and strip it from the persisted settings
///
/// A fresh index takes `index.number_of_routing_shards`, defaulting to its
/// shard count; a resize target inherits the source's count.
pub fn routing_num_shards(
    settings: &mut Settings,
    source: Option<&IndexMetadata>,
) -> Result<u32, CreateIndexError> {
    let routing_num_shards = match source {
        None => match settings.get_as_u32(SETTING_NUMBER_OF_ROUTING_SHARDS)? {
            Some(n) => n,
            None => settings.get_as_u32(SETTING_NUMBER_OF_SHARDS)?.unwrap_or(1),
        },
        Some(source) => {
            if settings.contains(SETTING_NUMBER_OF_ROUTING_SHARDS) {
                return Err(CreateIndexError::invalid_setting(format!(
                    "cannot provide [{}] on resize",
                    SETTING_NUMBER_OF_ROUTING_SHARDS
                )));
            }
            source.routing_num_shards()
        }
    };
    settings.remove(SETTING_NUMBER_OF_ROUTING_SHARDS);
    Ok(routing_num_shards)
}

/// Validate a resize and layer the source-derived settings onto `settings`
///
/// `mapping_types` are the request mapping types; resizes copy every mapping
/// from the source.
pub fn prepare_resize_settings<'a>(
    state: &'a ClusterState,
    mapping_types: &BTreeSet<String>,
    settings: &mut Settings,
    resize: &ResizeRequest,
    target: &str,
) -> Result<&'a IndexMetadata, CreateIndexError> {
    let source = match resize.resize_type {
        ResizeType::Shrink => {
            let (source, nodes) =
                validate_shrink(state, &resize.source_index, mapping_types, target, settings)?;
            settings.put(SETTING_INITIAL_RECOVERY_ID, nodes.join(","));
            settings.put(SETTING_ALLOCATION_MAX_RETRIES, 1);
            settings.put(SETTING_SHRINK_SOURCE_NAME, source.name());
            settings.put(SETTING_SHRINK_SOURCE_UUID, source.uuid());
            source
        }
        ResizeType::Split => {
            let source = validate_split(state, &resize.source_index, mapping_types, target, settings)?;
            settings.remove(SETTING_INITIAL_RECOVERY_ID);
            source
        }
    };

    let copied = if resize.copy_settings {
        source
            .settings()
            .filter(|key| !NOT_COPYABLE_ON_RESIZE.contains(&key) && !settings.contains(key))
    } else {
        source
            .settings()
            .filter(|key| copied_by_default(key) && !settings.contains(key))
    };

    settings.put(SETTING_VERSION_CREATED, source.creation_version().id());
    settings.put(SETTING_VERSION_UPGRADED, source.upgraded_version().id());
    settings.put_all(&copied);
    settings.put(SETTING_ROUTING_PARTITION_SIZE, source.routing_partition_size());
    settings.put(SETTING_RESIZE_SOURCE_NAME, source.name());
    settings.put(SETTING_RESIZE_SOURCE_UUID, source.uuid());
    Ok(source)
}

/// Preconditions shared by shrink and split
pub fn validate_resize<'a>(
    state: &'a ClusterState,
    source_index: &str,
    mapping_types: &BTreeSet<String>,
    target: &str,
) -> Result<&'a IndexMetadata, CreateIndexError> {
    if state.metadata().has_index(target) {
        return Err(CreateIndexError::AlreadyExists(target.to_string()));
    }
    let source = state
        .metadata()
        .index(source_index)
        .ok_or_else(|| CreateIndexError::IndexNotFound(source_index.to_string()))?;

    if !state.blocks().index_blocked(ClusterBlockLevel::Write, source_index) {
        return Err(CreateIndexError::UnresizableSource(format!(
            "index {} must be read-only to resize index. use \"index.blocks.write=true\"",
            source_index
        )));
    }

    let only_default = mapping_types.is_empty()
        || (mapping_types.len() == 1 && mapping_types.contains(DEFAULT_MAPPING));
    if !only_default {
        return Err(CreateIndexError::UnresizableSource(
            "mappings are not allowed when resizing indices, all mappings are copied from the source index"
                .to_string(),
        ));
    }
    Ok(source)
}

/// Validate a shrink, returning the nodes that hold a started copy of every source shard
pub fn validate_shrink<'a>(
    state: &'a ClusterState,
    source_index: &str,
    mapping_types: &BTreeSet<String>,
    target: &str,
    target_settings: &Settings,
) -> Result<(&'a IndexMetadata, Vec<NodeId>), CreateIndexError> {
    let source = validate_resize(state, source_index, mapping_types, target)?;
    let source_shards = source.number_of_shards();
    let target_shards = target_shard_count(target_settings)?;

    if source_shards == 1 {
        return Err(CreateIndexError::UnresizableSource(
            "can't shrink an index with only one shard".to_string(),
        ));
    }
    if target_shards >= source_shards {
        return Err(CreateIndexError::UnresizableSource(format!(
            "the number of target shards [{}] must be less than the number of source shards [{}]",
            target_shards, source_shards
        )));
    }
    if source_shards % target_shards != 0 {
        return Err(CreateIndexError::UnresizableSource(format!(
            "the number of source shards [{}] must be a multiple of [{}]",
            source_shards, target_shards
        )));
    }

    let mut shards_per_node: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
    if let Some(table) = state.routing_table().index(source_index) {
        for copy in table.copies_with_state(ShardRoutingState::Started) {
            if let Some(node) = copy.node_id.as_deref() {
                shards_per_node.entry(node).or_default().insert(copy.shard_id);
            }
        }
    }
    let nodes: Vec<NodeId> = shards_per_node
        .into_iter()
        .filter(|(_, shards)| shards.len() == source_shards as usize)
        .map(|(node, _)| node.to_string())
        .collect();
    if nodes.is_empty() {
        return Err(CreateIndexError::UnresizableSource(format!(
            "index {} must have all shards allocated on the same node to shrink index",
            source_index
        )));
    }
    Ok((source, nodes))
}

/// Validate a split
pub fn validate_split<'a>(
    state: &'a ClusterState,
    source_index: &str,
    mapping_types: &BTreeSet<String>,
    target: &str,
    target_settings: &Settings,
) -> Result<&'a IndexMetadata, CreateIndexError> {
    let source = validate_resize(state, source_index, mapping_types, target)?;
    let source_shards = source.number_of_shards();
    let target_shards = target_shard_count(target_settings)?;

    if target_shards <= source_shards {
        return Err(CreateIndexError::UnresizableSource(format!(
            "the number of target shards [{}] must be greater than the number of source shards [{}]",
            target_shards, source_shards
        )));
    }
    if target_shards % source_shards != 0 {
        return Err(CreateIndexError::UnresizableSource(format!(
            "the number of source shards [{}] must be a factor of [{}]",
            source_shards, target_shards
        )));
    }
    if source.routing_num_shards() % target_shards != 0 {
        return Err(CreateIndexError::UnresizableSource(format!(
            "the number of routing shards [{}] must be a multiple of the target shards [{}]",
            source.routing_num_shards(),
            target_shards
        )));
    }
    if source.creation_version().before(Version::V_6_0_0_ALPHA1) {
        return Err(CreateIndexError::UnresizableSource(
            "source index created version is too old to apply a split operation".to_string(),
        ));
    }
    Ok(source)
}

/// Primary term every shard of a resize target starts with
///
/// Sequence numbers must keep moving forward across the resize, so every
/// target shard takes the highest term of any source shard.
pub fn resize_primary_term(source: &IndexMetadata) -> u64 {
    source.primary_terms().iter().copied().max().unwrap_or(0)
}

fn target_shard_count(settings: &Settings) -> Result<u32, CreateIndexError> {
    match settings.get_as_u32(SETTING_NUMBER_OF_SHARDS)? {
        Some(n) if n > 0 => Ok(n),
        _ => Err(CreateIndexError::invalid_setting(format!(
            "{} must be at least 1",
            SETTING_NUMBER_OF_SHARDS
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_core::settings::{SETTING_BLOCKS_WRITE, SETTING_NUMBER_OF_REPLICAS};
    use meta_core::{
        ClusterBlocks, IndexRoutingTable, Metadata, RoutingTable, ShardRouting,
    };

    fn source(shards: u32, routing_shards: u32, version: Version) -> IndexMetadata {
        let mut builder = IndexMetadata::builder("src")
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, shards)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0)
                    .with(SETTING_BLOCKS_WRITE, true)
                    .with(SETTING_VERSION_CREATED, version.id())
                    .with("index.uuid", "src-uuid")
                    .with("index.analysis.analyzer.a.type", "standard")
                    .with("index.refresh_interval", "1s"),
            )
            .routing_num_shards(routing_shards);
        for shard in 0..shards {
            builder = builder.primary_term(shard, 3 + shard as u64);
        }
        builder.build().unwrap()
    }

    fn state(imd: IndexMetadata, routing: IndexRoutingTable) -> ClusterState {
        let blocks = ClusterBlocks::new().to_builder().update_blocks(&imd).build();
        ClusterState::new("test")
            .builder()
            .metadata(Metadata::builder().put(imd).build())
            .routing_table(RoutingTable::new().to_builder().add(routing).build())
            .blocks(blocks)
            .build()
    }

    fn colocated(shards: u32, node: &str) -> IndexRoutingTable {
        (0..shards).fold(IndexRoutingTable::new("src"), |t, s| {
            t.with_copy(ShardRouting::started("src", s, true, node))
        })
    }

    fn target(shards: u32) -> Settings {
        Settings::new().with(SETTING_NUMBER_OF_SHARDS, shards)
    }

    #[test]
    fn test_routing_num_shards_fresh() {
        let mut settings = target(3).with(SETTING_NUMBER_OF_ROUTING_SHARDS, 12);
        assert_eq!(routing_num_shards(&mut settings, None).unwrap(), 12);
        assert!(!settings.contains(SETTING_NUMBER_OF_ROUTING_SHARDS));

        let mut settings = target(3);
        assert_eq!(routing_num_shards(&mut settings, None).unwrap(), 3);
    }

    #[test]
    fn test_routing_num_shards_resize() {
        let src = source(4, 16, Version::CURRENT);
        assert_eq!(routing_num_shards(&mut target(2), Some(&src)).unwrap(), 16);

        let mut settings = target(2).with(SETTING_NUMBER_OF_ROUTING_SHARDS, 8);
        assert!(matches!(
            routing_num_shards(&mut settings, Some(&src)),
            Err(CreateIndexError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_shrink_divisibility() {
        let st = state(source(6, 6, Version::CURRENT), colocated(6, "n1"));
        let no_types = BTreeSet::new();

        let (_, nodes) = validate_shrink(&st, "src", &no_types, "dst", &target(3)).unwrap();
        assert_eq!(nodes, vec!["n1".to_string()]);

        let err = validate_shrink(&st, "src", &no_types, "dst", &target(4)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the number of source shards [6] must be a multiple of [4]"
        );
        assert!(validate_shrink(&st, "src", &no_types, "dst", &target(6)).is_err());
    }

    #[test]
    fn test_shrink_single_shard() {
        let st = state(source(1, 1, Version::CURRENT), colocated(1, "n1"));
        let err = validate_shrink(&st, "src", &BTreeSet::new(), "dst", &target(1)).unwrap_err();
        assert_eq!(err.to_string(), "can't shrink an index with only one shard");
    }

    #[test]
    fn test_shrink_requires_colocation() {
        let routing = IndexRoutingTable::new("src")
            .with_copy(ShardRouting::started("src", 0, true, "n1"))
            .with_copy(ShardRouting::started("src", 1, true, "n2"));
        let st = state(source(2, 2, Version::CURRENT), routing);

        let err = validate_shrink(&st, "src", &BTreeSet::new(), "dst", &target(1)).unwrap_err();
        assert!(matches!(err, CreateIndexError::UnresizableSource(_)));
    }

    #[test]
    fn test_resize_preconditions() {
        let mut imd = source(2, 2, Version::CURRENT);
        let st = state(imd.clone(), colocated(2, "n1"));

        let err = validate_resize(&st, "missing", &BTreeSet::new(), "dst").unwrap_err();
        assert_eq!(err, CreateIndexError::IndexNotFound("missing".to_string()));

        let err = validate_resize(&st, "src", &BTreeSet::new(), "src").unwrap_err();
        assert!(err.is_already_exists());

        let types: BTreeSet<String> = ["_doc".to_string()].into();
        assert!(validate_resize(&st, "src", &types, "dst").is_err());
        let types: BTreeSet<String> = [DEFAULT_MAPPING.to_string()].into();
        assert!(validate_resize(&st, "src", &types, "dst").is_ok());

        let mut settings = imd.settings().clone();
        settings.remove(SETTING_BLOCKS_WRITE);
        imd = imd.to_builder().settings(settings).build().unwrap();
        let st = state(imd, colocated(2, "n1"));
        let err = validate_resize(&st, "src", &BTreeSet::new(), "dst").unwrap_err();
        assert!(err.to_string().contains("must be read-only to resize index"));
    }

    #[test]
    fn test_split_rules() {
        let st = state(source(2, 8, Version::CURRENT), colocated(2, "n1"));
        let no_types = BTreeSet::new();

        assert!(validate_split(&st, "src", &no_types, "dst", &target(4)).is_ok());
        assert!(validate_split(&st, "src", &no_types, "dst", &target(2)).is_err());

        let err = validate_split(&st, "src", &no_types, "dst", &target(6)).unwrap_err();
        assert!(err.to_string().contains("must be a multiple of the target shards"));

        let err = validate_split(&st, "src", &no_types, "dst", &target(3)).unwrap_err();
        assert_eq!(err.to_string(), "the number of source shards [2] must be a factor of [3]");

        let old = state(source(2, 8, Version::V_5_6_0), colocated(2, "n1"));
        let err = validate_split(&old, "src", &no_types, "dst", &target(4)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "source index created version is too old to apply a split operation"
        );
    }

    #[test]
    fn test_prepare_shrink_settings() {
        let st = state(source(4, 4, Version::V_6_0_0), colocated(4, "n1"));
        let mut settings = target(2);

        let src = prepare_resize_settings(
            &st,
            &BTreeSet::new(),
            &mut settings,
            &ResizeRequest::shrink("src"),
            "dst",
        )
        .unwrap();

        assert_eq!(src.name(), "src");
        assert_eq!(settings.get(SETTING_INITIAL_RECOVERY_ID), Some("n1"));
        assert_eq!(settings.get(SETTING_ALLOCATION_MAX_RETRIES), Some("1"));
        assert_eq!(settings.get(SETTING_RESIZE_SOURCE_UUID), Some("src-uuid"));
        assert_eq!(settings.get(SETTING_SHRINK_SOURCE_NAME), Some("src"));
        assert_eq!(
            settings.get_as_u32(SETTING_VERSION_CREATED).unwrap(),
            Some(Version::V_6_0_0.id())
        );
        assert!(settings.contains("index.analysis.analyzer.a.type"));
        assert!(!settings.contains("index.refresh_interval"));
    }

    #[test]
    fn test_prepare_split_copy_settings() {
        let st = state(source(2, 8, Version::CURRENT), colocated(2, "n1"));
        let mut settings = target(4)
            .with(SETTING_INITIAL_RECOVERY_ID, "n9")
            .with("index.refresh_interval", "30s");

        prepare_resize_settings(
            &st,
            &BTreeSet::new(),
            &mut settings,
            &ResizeRequest::split("src").with_copy_settings(true),
            "dst",
        )
        .unwrap();

        assert!(!settings.contains(SETTING_INITIAL_RECOVERY_ID));
        assert_eq!(settings.get("index.refresh_interval"), Some("30s"));
        assert_eq!(settings.get(SETTING_NUMBER_OF_SHARDS), Some("4"));
        assert_eq!(settings.get(SETTING_BLOCKS_WRITE), Some("true"));
    }

    #[test]
    fn test_resize_primary_term() {
        let src = source(3, 3, Version::CURRENT);
        assert_eq!(resize_primary_term(&src), 5);
    }

    #[test]
    fn test_split_requires_shard_count() {
        let request = CreateIndexRequest::new("api", "dst").resize(ResizeRequest::split("src"));
        assert!(check_resize_request(&request).is_err());

        let request = CreateIndexRequest::new("api", "dst").resize(ResizeRequest::shrink("src"));
        assert!(check_resize_request(&request).is_ok());
    }
}
