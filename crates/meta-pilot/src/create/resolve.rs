//! Index settings resolution

use meta_core::settings::{
    INDEX_PREFIX, SETTING_AUTO_EXPAND_REPLICAS, SETTING_CREATION_DATE, SETTING_INDEX_PROVIDED_NAME,
    SETTING_INDEX_UUID, SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS, SETTING_VERSION_CREATED,
};
use meta_core::{DiscoveryNodes, IndexTemplateMetadata, Settings, Version};

use crate::config::IndexDefaultsConfig;
use crate::request::{CreateIndexRequest, ResizeType};
use crate::DeprecationLogger;

/// Advisory emitted when a request relies on the default shard count
pub const DEFAULT_SHARDS_DEPRECATION: &str = "the default number of shards will change from [5] to [1] in 7.0.0; \
if you wish to continue using the default of [5] shards, you must manage this on the create index request \
or with an index template";

/// Combines templates, request settings and process defaults
pub struct SettingsResolver<'a> {
    defaults: &'a IndexDefaultsConfig,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(defaults: &'a IndexDefaultsConfig) -> Self {
        Self { defaults }
    }

    /// Resolve the settings of a new index
    ///
    /// `templates` must be ordered best match first; they are layered lowest
    /// precedence first so the best match wins. Resize requests pass no
    /// templates.
    pub fn resolve(
        &self,
        request: &CreateIndexRequest,
        templates: &[&IndexTemplateMetadata],
        nodes: &DiscoveryNodes,
        deprecation: &DeprecationLogger,
    ) -> Settings {
        let mut settings = Settings::new();
        for template in templates.iter().rev() {
            settings.put_all(&template.settings.normalize_prefix(INDEX_PREFIX));
        }
        settings.put_all(&request.settings);

        if !settings.contains(SETTING_NUMBER_OF_SHARDS) {
            if is_shrink(request) {
                settings.put(SETTING_NUMBER_OF_SHARDS, 1);
            } else {
                deprecation.deprecated(DEFAULT_SHARDS_DEPRECATION);
                settings.put(SETTING_NUMBER_OF_SHARDS, self.defaults.default_number_of_shards);
            }
        }
        if !settings.contains(SETTING_NUMBER_OF_REPLICAS) {
            settings.put(SETTING_NUMBER_OF_REPLICAS, self.defaults.default_number_of_replicas);
        }
        if let Some(auto_expand) = &self.defaults.default_auto_expand_replicas {
            if !settings.contains(SETTING_AUTO_EXPAND_REPLICAS) {
                settings.put(SETTING_AUTO_EXPAND_REPLICAS, auto_expand);
            }
        }
        if !settings.contains(SETTING_VERSION_CREATED) {
            settings.put(SETTING_VERSION_CREATED, creation_version(nodes).id());
        }

        settings.put(SETTING_CREATION_DATE, chrono::Utc::now().timestamp_millis());
        settings.put(SETTING_INDEX_PROVIDED_NAME, request.provided_name());
        settings.put(SETTING_INDEX_UUID, uuid::Uuid::new_v4().to_string());
        settings
    }
}

fn is_shrink(request: &CreateIndexRequest) -> bool {
    matches!(&request.resize, Some(resize) if resize.resize_type == ResizeType::Shrink)
}

/// Oldest version able to read the new index
pub fn creation_version(nodes: &DiscoveryNodes) -> Version {
    nodes
        .smallest_non_client_node_version()
        .map(|v| std::cmp::min(v, Version::CURRENT))
        .unwrap_or(Version::CURRENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_core::DiscoveryNode;

    fn resolve(
        request: &CreateIndexRequest,
        templates: &[&IndexTemplateMetadata],
        nodes: &DiscoveryNodes,
    ) -> (Settings, Vec<String>) {
        let defaults = IndexDefaultsConfig::default();
        let log = DeprecationLogger::new();
        let settings = SettingsResolver::new(&defaults).resolve(request, templates, nodes, &log);
        (settings, log.messages())
    }

    #[test]
    fn test_defaults_and_stamps() {
        let request = CreateIndexRequest::new("api", "logs");
        let (settings, advisories) = resolve(&request, &[], &DiscoveryNodes::new());

        assert_eq!(settings.get(SETTING_NUMBER_OF_SHARDS), Some("5"));
        assert_eq!(settings.get(SETTING_NUMBER_OF_REPLICAS), Some("1"));
        assert_eq!(settings.get(SETTING_INDEX_PROVIDED_NAME), Some("logs"));
        assert!(settings.get(SETTING_INDEX_UUID).is_some());
        assert!(settings.get(SETTING_CREATION_DATE).is_some());
        assert_eq!(
            settings.get_as_u32(SETTING_VERSION_CREATED).unwrap(),
            Some(Version::CURRENT.id())
        );
        assert_eq!(advisories, vec![DEFAULT_SHARDS_DEPRECATION.to_string()]);
    }

    #[test]
    fn test_precedence() {
        let low = IndexTemplateMetadata::new("low", vec!["*".to_string()]).with_settings(
            Settings::new()
                .with(SETTING_NUMBER_OF_SHARDS, 2)
                .with(SETTING_NUMBER_OF_REPLICAS, 2)
                .with("index.refresh_interval", "5s"),
        );
        let high = IndexTemplateMetadata::new("high", vec!["*".to_string()])
            .with_order(1)
            .with_settings(Settings::new().with(SETTING_NUMBER_OF_SHARDS, 4));
        let request = CreateIndexRequest::new("api", "logs")
            .settings(Settings::new().with(SETTING_NUMBER_OF_REPLICAS, 0));

        let (settings, advisories) = resolve(&request, &[&high, &low], &DiscoveryNodes::new());

        assert_eq!(settings.get(SETTING_NUMBER_OF_SHARDS), Some("4"));
        assert_eq!(settings.get(SETTING_NUMBER_OF_REPLICAS), Some("0"));
        assert_eq!(settings.get("index.refresh_interval"), Some("5s"));
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_uuid_not_overridable() {
        let request = CreateIndexRequest::new("api", "logs").settings(
            Settings::new()
                .with(SETTING_NUMBER_OF_SHARDS, 1)
                .with(SETTING_INDEX_UUID, "caller-uuid"),
        );
        let (settings, _) = resolve(&request, &[], &DiscoveryNodes::new());
        assert_ne!(settings.get(SETTING_INDEX_UUID), Some("caller-uuid"));
    }

    #[test]
    fn test_shrink_defaults_to_one_shard() {
        let request = CreateIndexRequest::new("shrink_index", "logs_shrunk")
            .resize(crate::request::ResizeRequest::shrink("logs"));
        let (settings, advisories) = resolve(&request, &[], &DiscoveryNodes::new());

        assert_eq!(settings.get(SETTING_NUMBER_OF_SHARDS), Some("1"));
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_creation_version_uses_oldest_node() {
        let nodes = DiscoveryNodes::new()
            .with_node(DiscoveryNode::new("n1", Version::CURRENT))
            .with_node(DiscoveryNode::new("n2", Version::V_6_0_0))
            .with_node(DiscoveryNode::client("c1", Version::V_5_6_0));
        assert_eq!(creation_version(&nodes), Version::V_6_0_0);

        let request = CreateIndexRequest::new("api", "logs").settings(
            Settings::new()
                .with(SETTING_NUMBER_OF_SHARDS, 1)
                .with(SETTING_VERSION_CREATED, Version::V_5_6_0.id()),
        );
        let (settings, _) = resolve(&request, &[], &nodes);
        assert_eq!(
            settings.get_as_u32(SETTING_VERSION_CREATED).unwrap(),
            Some(Version::V_5_6_0.id())
        );
    }
}
