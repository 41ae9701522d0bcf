mod common;

use meta_core::settings::{
    SETTING_ALLOCATION_MAX_RETRIES, SETTING_INITIAL_RECOVERY_ID, SETTING_NUMBER_OF_SHARDS,
    SETTING_RESIZE_SOURCE_NAME, SETTING_RESIZE_SOURCE_UUID, SETTING_SHRINK_SOURCE_NAME,
    SETTING_VERSION_CREATED,
};
use meta_core::{ClusterState, IndexMetadataBuilder, Settings, Version};
use meta_pilot::{
    CreateIndexError, CreateIndexRequest, CreationOutcome, DeprecationLogger, PilotConfig,
    ResizeRequest,
};

use common::{cluster, init_logging, resize_source, shards, started_routing, with_index, Harness};

/// Cluster of three data nodes holding `source`, one started primary per shard
fn cluster_with_source(source: IndexMetadataBuilder, node_of: impl Fn(u32) -> String) -> ClusterState {
    let imd = source.build().unwrap();
    let routing = started_routing(imd.name(), imd.number_of_shards(), node_of);
    with_index(&cluster(3), imd, routing)
}

fn spread(shard: u32) -> String {
    format!("node{}", shard + 1)
}

fn resize(
    state: &ClusterState,
    target: &str,
    resize: ResizeRequest,
    settings: Settings,
) -> Result<CreationOutcome, CreateIndexError> {
    let harness = Harness::new(PilotConfig::default());
    let request = CreateIndexRequest::new("resize", target)
        .settings(settings)
        .resize(resize);
    harness
        .creator
        .execute(&request, state, &DeprecationLogger::new())
}

#[test]
fn test_shrink_requires_colocated_shards() {
    init_logging();
    let state = cluster_with_source(resize_source("logs", 3), spread);

    let err = resize(&state, "logs-shrunk", ResizeRequest::shrink("logs"), shards(1, 0)).unwrap_err();
    assert_eq!(
        err,
        CreateIndexError::UnresizableSource(
            "index logs must have all shards allocated on the same node to shrink index".to_string()
        )
    );
}

#[test]
fn test_shrink_colocated_source() {
    init_logging();
    let source = resize_source("logs", 3)
        .primary_term(0, 2)
        .primary_term(1, 7)
        .primary_term(2, 4);
    let state = cluster_with_source(source, |_| "node1".to_string());

    let outcome = resize(&state, "logs-shrunk", ResizeRequest::shrink("logs"), Settings::new()).unwrap();

    let imd = outcome.state.metadata().index("logs-shrunk").unwrap();
    assert_eq!(imd.number_of_shards(), 1);
    assert_eq!(imd.primary_term(0), 7);
    assert_eq!(imd.routing_num_shards(), 3);

    let settings = imd.settings();
    assert_eq!(settings.get(SETTING_INITIAL_RECOVERY_ID), Some("node1"));
    assert_eq!(settings.get(SETTING_ALLOCATION_MAX_RETRIES), Some("1"));
    assert_eq!(settings.get(SETTING_SHRINK_SOURCE_NAME), Some("logs"));
    assert_eq!(settings.get(SETTING_RESIZE_SOURCE_NAME), Some("logs"));
    assert_eq!(settings.get(SETTING_RESIZE_SOURCE_UUID), Some("logs-uuid"));
    assert!(outcome.templates.is_empty());
}

#[test]
fn test_shrink_target_must_divide_source() {
    let state = cluster_with_source(resize_source("logs", 4), |_| "node1".to_string());

    let err = resize(&state, "logs-shrunk", ResizeRequest::shrink("logs"), shards(3, 0)).unwrap_err();
    assert_eq!(
        err,
        CreateIndexError::UnresizableSource(
            "the number of source shards [4] must be a multiple of [3]".to_string()
        )
    );
}

#[test]
fn test_split() {
    let source = resize_source("logs", 2).routing_num_shards(8).primary_term(1, 3);
    let state = cluster_with_source(source, spread);

    let outcome = resize(&state, "logs-split", ResizeRequest::split("logs"), shards(4, 0)).unwrap();

    let imd = outcome.state.metadata().index("logs-split").unwrap();
    assert_eq!(imd.number_of_shards(), 4);
    assert_eq!(imd.routing_num_shards(), 8);
    assert_eq!(imd.primary_terms(), &[3, 3, 3, 3]);
    assert!(!imd.settings().contains(SETTING_INITIAL_RECOVERY_ID));
    assert!(!imd.settings().contains(SETTING_SHRINK_SOURCE_NAME));
    assert_eq!(imd.settings().get(SETTING_RESIZE_SOURCE_NAME), Some("logs"));
}

#[test]
fn test_split_target_must_be_multiple() {
    let state = cluster_with_source(resize_source("logs", 2).routing_num_shards(12), spread);

    let err = resize(&state, "logs-split", ResizeRequest::split("logs"), shards(3, 0)).unwrap_err();
    assert_eq!(
        err,
        CreateIndexError::UnresizableSource(
            "the number of source shards [2] must be a factor of [3]".to_string()
        )
    );
}

#[test]
fn test_split_requires_shard_count() {
    let state = cluster_with_source(resize_source("logs", 2).routing_num_shards(8), spread);

    let err = resize(&state, "logs-split", ResizeRequest::split("logs"), Settings::new()).unwrap_err();
    assert_eq!(
        err,
        CreateIndexError::InvalidSettings(vec![format!(
            "{} is required for split operations",
            SETTING_NUMBER_OF_SHARDS
        )])
    );
}

#[test]
fn test_split_rejects_old_source() {
    let source = resize_source("logs", 2).routing_num_shards(8);
    let settings = source_settings(&source).with(SETTING_VERSION_CREATED, Version::V_5_6_0.id());
    let state = cluster_with_source(source.settings(settings), spread);

    let err = resize(&state, "logs-split", ResizeRequest::split("logs"), shards(4, 0)).unwrap_err();
    assert_eq!(
        err,
        CreateIndexError::UnresizableSource(
            "source index created version is too old to apply a split operation".to_string()
        )
    );
}

#[test]
fn test_resize_requires_write_block() {
    let source = resize_source("logs", 2).routing_num_shards(8);
    let mut settings = source_settings(&source);
    settings.remove(meta_core::settings::SETTING_BLOCKS_WRITE);
    let state = cluster_with_source(source.settings(settings), spread);

    let err = resize(&state, "logs-split", ResizeRequest::split("logs"), shards(4, 0)).unwrap_err();
    assert_eq!(
        err,
        CreateIndexError::UnresizableSource(
            "index logs must be read-only to resize index. use \"index.blocks.write=true\"".to_string()
        )
    );
}

#[test]
fn test_resize_rejects_mappings() {
    let state = cluster_with_source(resize_source("logs", 4), |_| "node1".to_string());
    let request = CreateIndexRequest::new("resize", "logs-shrunk")
        .settings(shards(2, 0))
        .mapping("_doc", r#"{"properties": {"msg": {"type": "text"}}}"#)
        .resize(ResizeRequest::shrink("logs"));

    let harness = Harness::new(PilotConfig::default());
    let err = harness
        .creator
        .execute(&request, &state, &DeprecationLogger::new())
        .unwrap_err();
    assert!(matches!(err, CreateIndexError::UnresizableSource(_)));
    assert!(harness.local.removals().is_empty());
}

fn source_settings(source: &IndexMetadataBuilder) -> Settings {
    source.clone().build().unwrap().settings().clone()
}
