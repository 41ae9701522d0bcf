//! Admission control
//!
//! Checks that run before anything is materialized: request settings policy
//! and the cluster-wide shard limit.

use std::path::{Component, Path, PathBuf};

use meta_core::settings::{
    is_private_setting, SETTING_DATA_PATH, SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS,
};
use meta_core::{ClusterState, Settings};

use crate::config::{AdmissionConfig, ShardLimitMode};
use crate::{CreateIndexError, DeprecationLogger};

/// Cluster setting bounding open shard copies per data node
pub const MAX_SHARDS_PER_NODE_SETTING: &str = "cluster.max_shards_per_node";

/// Admission controller
pub struct AdmissionController<'a> {
    config: &'a AdmissionConfig,
}

impl<'a> AdmissionController<'a> {
    pub fn new(config: &'a AdmissionConfig) -> Self {
        Self { config }
    }

    /// Validate request settings, reporting every problem at once
    pub fn validate_index_settings(&self, settings: &Settings) -> Result<(), CreateIndexError> {
        let errors = self.index_settings_errors(settings);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CreateIndexError::InvalidSettings(errors))
        }
    }

    pub fn index_settings_errors(&self, settings: &Settings) -> Vec<String> {
        let mut errors = self.shard_count_errors(settings);

        if let Some(custom) = settings.get(SETTING_DATA_PATH).filter(|p| !p.is_empty()) {
            match &self.config.shared_data_path {
                None => errors.push("path.shared_data must be set in order to use custom data paths".to_string()),
                Some(shared) if !is_sub_path(shared, custom) => errors.push(format!(
                    "custom path [{}] is not a sub-path of path.shared_data [{}]",
                    custom,
                    shared.display()
                )),
                Some(_) => {}
            }
        }

        if self.config.forbid_private_index_settings {
            errors.extend(
                settings
                    .keys()
                    .filter(|key| is_private_setting(key))
                    .map(|key| format!("private index setting [{}] can not be set explicitly", key)),
            );
        }
        errors
    }

    /// Check shard and replica counts once templates and defaults are applied
    pub fn validate_shard_counts(&self, settings: &Settings) -> Result<(), CreateIndexError> {
        let errors = self.shard_count_errors(settings);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CreateIndexError::InvalidSettings(errors))
        }
    }

    fn shard_count_errors(&self, settings: &Settings) -> Vec<String> {
        let mut errors = Vec::new();
        match settings.get_as_u32(SETTING_NUMBER_OF_SHARDS) {
            Ok(Some(shards)) if shards > self.config.max_number_of_shards => errors.push(format!(
                "Failed to parse value [{}] for setting [{}] must be <= {}",
                shards, SETTING_NUMBER_OF_SHARDS, self.config.max_number_of_shards
            )),
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
        match settings.get_as_u32(SETTING_NUMBER_OF_REPLICAS) {
            Ok(Some(replicas)) if replicas > self.config.max_number_of_replicas => errors.push(format!(
                "Failed to parse value [{}] for setting [{}] must be <= {}",
                replicas, SETTING_NUMBER_OF_REPLICAS, self.config.max_number_of_replicas
            )),
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
        errors
    }

    /// Check that the index fits the cluster shard limit
    ///
    /// Skipped while the cluster has no data nodes. Over the limit it either fails
    /// or only emits an advisory, depending on the configured mode.
    pub fn check_shard_limit(
        &self,
        settings: &Settings,
        state: &ClusterState,
        deprecation: &DeprecationLogger,
    ) -> Result<(), CreateIndexError> {
        let data_nodes = state.nodes().data_node_count() as u64;
        if data_nodes == 0 {
            return Ok(());
        }

        let shards = settings.get_as_u32(SETTING_NUMBER_OF_SHARDS)?.unwrap_or(1) as u64;
        let replicas = settings.get_as_u32(SETTING_NUMBER_OF_REPLICAS)?.unwrap_or(0) as u64;
        let new_shards = shards * (1 + replicas);
        let max_shards = self.config.max_shards_per_node as u64 * data_nodes;
        let current = state.metadata().total_open_shard_copies();

        if current + new_shards <= max_shards {
            return Ok(());
        }

        let message = format!(
            "this action would add [{}] total shards, but this cluster currently has [{}]/[{}] maximum shards open",
            new_shards, current, max_shards
        );
        match self.config.shard_limit_mode {
            ShardLimitMode::Enforce => Err(CreateIndexError::ShardLimitExceeded(message)),
            ShardLimitMode::Deprecation => {
                deprecation.deprecated(format!(
                    "In a future major version, this request will fail because {}. Before upgrading, \
                     reduce the number of shards in your cluster or adjust the cluster setting [{}].",
                    message, MAX_SHARDS_PER_NODE_SETTING
                ));
                Ok(())
            }
        }
    }
}

/// Check that `custom`, resolved against `root`, stays inside `root`
fn is_sub_path(root: &Path, custom: &str) -> bool {
    let root = normalize(root);
    normalize(&root.join(custom)).starts_with(&root)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_core::settings::SETTING_INDEX_UUID;
    use meta_core::{DiscoveryNode, DiscoveryNodes, IndexMetadata, Metadata, Version};

    fn state_with_shards(copies: u32, data_nodes: usize) -> ClusterState {
        let imd = IndexMetadata::builder("existing")
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, copies)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0),
            )
            .build()
            .unwrap();
        let nodes = (0..data_nodes).fold(DiscoveryNodes::new(), |n, i| {
            n.with_node(DiscoveryNode::new(format!("n{}", i), Version::CURRENT))
        });
        ClusterState::new("test")
            .builder()
            .metadata(Metadata::builder().put(imd).build())
            .nodes(nodes)
            .build()
    }

    fn shards(n: u32, replicas: u32) -> Settings {
        Settings::new()
            .with(SETTING_NUMBER_OF_SHARDS, n)
            .with(SETTING_NUMBER_OF_REPLICAS, replicas)
    }

    #[test]
    fn test_shard_limit_enforced() {
        let config = AdmissionConfig {
            max_shards_per_node: 5,
            ..Default::default()
        };
        let controller = AdmissionController::new(&config);
        let state = state_with_shards(6, 2);
        let log = DeprecationLogger::new();

        assert!(controller.check_shard_limit(&shards(2, 1), &state, &log).is_ok());

        let err = controller
            .check_shard_limit(&shards(3, 1), &state, &log)
            .unwrap_err();
        assert_eq!(
            err,
            CreateIndexError::ShardLimitExceeded(
                "this action would add [6] total shards, but this cluster currently has [6]/[10] maximum shards open"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_shard_limit_deprecation_mode() {
        let config = AdmissionConfig {
            max_shards_per_node: 1,
            shard_limit_mode: ShardLimitMode::Deprecation,
            ..Default::default()
        };
        let controller = AdmissionController::new(&config);
        let log = DeprecationLogger::new();

        controller
            .check_shard_limit(&shards(10, 0), &state_with_shards(1, 1), &log)
            .unwrap();
        let messages = log.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("In a future major version, this request will fail"));
    }

    #[test]
    fn test_shard_limit_skipped_without_data_nodes() {
        let config = AdmissionConfig {
            max_shards_per_node: 1,
            ..Default::default()
        };
        let controller = AdmissionController::new(&config);
        let log = DeprecationLogger::new();
        assert!(controller
            .check_shard_limit(&shards(100, 1), &state_with_shards(1, 0), &log)
            .is_ok());
    }

    #[test]
    fn test_settings_errors_collected() {
        let config = AdmissionConfig::default();
        let controller = AdmissionController::new(&config);
        let settings = Settings::new()
            .with(SETTING_DATA_PATH, "/data/custom")
            .with(SETTING_INDEX_UUID, "abc");

        let err = controller.validate_index_settings(&settings).unwrap_err();
        assert_eq!(
            err,
            CreateIndexError::InvalidSettings(vec![
                "path.shared_data must be set in order to use custom data paths".to_string(),
                "private index setting [index.uuid] can not be set explicitly".to_string(),
            ])
        );
    }

    #[test]
    fn test_number_of_shards_bounded() {
        let config = AdmissionConfig::default();
        let controller = AdmissionController::new(&config);

        assert!(controller.validate_index_settings(&shards(1024, 1)).is_ok());
        assert_eq!(
            controller.validate_shard_counts(&shards(1025, 1)).unwrap_err(),
            CreateIndexError::InvalidSettings(vec![
                "Failed to parse value [1025] for setting [index.number_of_shards] must be <= 1024".to_string()
            ])
        );

        let config = AdmissionConfig {
            max_number_of_shards: 8,
            ..Default::default()
        };
        let errors = AdmissionController::new(&config).index_settings_errors(&shards(9, 0));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_number_of_replicas_bounded() {
        let config = AdmissionConfig::default();
        let controller = AdmissionController::new(&config);

        assert!(controller.validate_shard_counts(&shards(1, 1024)).is_ok());
        assert!(controller.validate_shard_counts(&shards(1, 1025)).is_err());
        assert_eq!(
            controller.validate_shard_counts(&shards(1, u32::MAX)).unwrap_err(),
            CreateIndexError::InvalidSettings(vec![format!(
                "Failed to parse value [{}] for setting [index.number_of_replicas] must be <= 1024",
                u32::MAX
            )])
        );

        // the shard limit arithmetic does not overflow either
        let log = DeprecationLogger::new();
        assert!(matches!(
            controller.check_shard_limit(&shards(1024, u32::MAX), &state_with_shards(1, 1), &log),
            Err(CreateIndexError::ShardLimitExceeded(_))
        ));
    }

    #[test]
    fn test_custom_data_path() {
        let config = AdmissionConfig {
            shared_data_path: Some(PathBuf::from("/mnt/shared")),
            forbid_private_index_settings: false,
            ..Default::default()
        };
        let controller = AdmissionController::new(&config);

        let ok = Settings::new().with(SETTING_DATA_PATH, "indices/a");
        assert!(controller.validate_index_settings(&ok).is_ok());

        let escaped = Settings::new().with(SETTING_DATA_PATH, "../elsewhere");
        let errors = controller.index_settings_errors(&escaped);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("custom path [../elsewhere] is not a sub-path"));

        let private = Settings::new().with(SETTING_INDEX_UUID, "abc");
        assert!(controller.validate_index_settings(&private).is_ok());
    }
}
