//! Virtual index synchronization
//!
//! Physical indices that name the same `index.virtual_index` share one schema.
//! The virtual index holds the merged mapping; every change to it is pushed to
//! all physical indices referencing it so they stay identical.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use meta_core::settings::{
    SETTING_INDEX_PROVIDED_NAME, SETTING_INDEX_UUID, SETTING_KEYSPACE, SETTING_PARTITION_FUNCTION,
    SETTING_PARTITION_FUNCTION_CLASS, SETTING_VIRTUAL, SETTING_VIRTUAL_INDEX,
};
use meta_core::{IndexMetadata, MappingMetadata, MappingSource, Metadata, DEFAULT_MAPPING};

use crate::indices::{IndexService, IndicesService, LocalIndexGuard};
use crate::CreateIndexError;

/// Outcome of synchronizing a physical index with its virtual index
pub struct VirtualSync {
    /// The physical index, carrying the virtual mappings and version
    pub index: IndexMetadata,
    pub virtual_index: IndexMetadata,
    /// Other physical indices whose mappings were replaced
    pub propagated: Vec<IndexMetadata>,
    /// Local virtual index created by this attempt
    pub guard: Option<LocalIndexGuard>,
}

/// Reconciles a new physical index with the virtual index it references
pub struct VirtualIndexSynchronizer<'a> {
    indices: &'a Arc<dyn IndicesService>,
}

impl<'a> VirtualIndexSynchronizer<'a> {
    pub fn new(indices: &'a Arc<dyn IndicesService>) -> Self {
        Self { indices }
    }

    /// Synchronize `index` with the virtual index it references
    ///
    /// `local` is the materialized physical index and `mappings` the mappings
    /// merged into it. `guard` owns the physical local index; its failure info
    /// is updated when the merge with an existing virtual index fails.
    pub fn sync(
        &self,
        index: IndexMetadata,
        virtual_name: &str,
        local: &dyn IndexService,
        mappings: &BTreeMap<String, MappingSource>,
        metadata: &Metadata,
        guard: &mut LocalIndexGuard,
    ) -> Result<VirtualSync, CreateIndexError> {
        let Some(existing) = metadata.index(virtual_name) else {
            return self.create_virtual(index, virtual_name, mappings);
        };

        if existing.keyspace() != index.keyspace() {
            return Err(CreateIndexError::invalid_name(
                index.name(),
                "Virtual index keyspace does not match",
            ));
        }
        if let (Some(virtual_type), Some(request_type)) =
            (first_type(existing.mappings().keys()), first_type(mappings.keys()))
        {
            if virtual_type != request_type {
                return Err(CreateIndexError::MappingConflict(
                    "Virtual type name does not match".to_string(),
                ));
            }
        }

        guard.set_failure_info(format!(
            "failed on merging mapping with the existing virtual index=[{}]",
            virtual_name
        ));
        self.merge_into_existing(index, existing, local, mappings, metadata)
    }

    /// First use of a virtual index: clone it from the physical index
    fn create_virtual(
        &self,
        index: IndexMetadata,
        virtual_name: &str,
        mappings: &BTreeMap<String, MappingSource>,
    ) -> Result<VirtualSync, CreateIndexError> {
        let mut settings = index.settings().clone();
        settings.remove(SETTING_VIRTUAL_INDEX);
        settings.remove(SETTING_PARTITION_FUNCTION);
        settings.remove(SETTING_PARTITION_FUNCTION_CLASS);
        settings.put(SETTING_INDEX_UUID, uuid::Uuid::new_v4().to_string());
        settings.put(SETTING_INDEX_PROVIDED_NAME, virtual_name);
        settings.put(SETTING_VIRTUAL, true);
        settings.put(SETTING_KEYSPACE, index.keyspace());

        let virtual_index = index.to_builder().name(virtual_name).settings(settings).build()?;

        let (service, guard) = self.local_index(&virtual_index)?;
        service.merge_mappings(mappings)?;
        debug!(
            "created virtual index [{}] from [{}] with mappings {:?}",
            virtual_name,
            index.name(),
            mappings.keys().collect::<Vec<_>>()
        );

        Ok(VirtualSync {
            index,
            virtual_index,
            propagated: Vec::new(),
            guard,
        })
    }

    fn merge_into_existing(
        &self,
        index: IndexMetadata,
        existing: &IndexMetadata,
        local: &dyn IndexService,
        mappings: &BTreeMap<String, MappingSource>,
        metadata: &Metadata,
    ) -> Result<VirtualSync, CreateIndexError> {
        let (service, guard) = self.local_index(existing)?;
        service.merge_mappings(mappings)?;
        debug!(
            "merged mappings {:?} into virtual index [{}]",
            mappings.keys().collect::<Vec<_>>(),
            existing.name()
        );

        let mut virtual_index = with_mappings(existing, service.doc_mappings(), existing.version())?;
        let mut propagated = Vec::new();
        if virtual_index != *existing {
            virtual_index = virtual_index
                .to_builder()
                .version(existing.version() + 1)
                .build()?;
            debug!(
                "virtual index [{}] mappings updated, version {}",
                virtual_index.name(),
                virtual_index.version()
            );

            for name in metadata.referencing_indices(existing.name()) {
                let Some(other) = metadata.index(name) else { continue };
                if other.is_virtual() || other.name() == index.name() {
                    continue;
                }
                propagated.push(with_mappings(
                    other,
                    virtual_index.mappings().values().cloned(),
                    virtual_index.version(),
                )?);
            }
        }

        let index = with_mappings(
            &index,
            virtual_index.mappings().values().cloned(),
            virtual_index.version(),
        )?;
        local.update_mapping(&index)?;

        Ok(VirtualSync {
            index,
            virtual_index,
            propagated,
            guard,
        })
    }

    /// Local handle for a virtual index, creating it if this node has none
    fn local_index(
        &self,
        imd: &IndexMetadata,
    ) -> Result<(Arc<dyn IndexService>, Option<LocalIndexGuard>), CreateIndexError> {
        if let Some(service) = self.indices.index_service(imd.name()) {
            return Ok((service, None));
        }
        let service = self.indices.create_index(imd)?;
        let guard = LocalIndexGuard::new(self.indices.clone(), imd.name());
        Ok((service, Some(guard)))
    }
}

fn with_mappings(
    imd: &IndexMetadata,
    mappings: impl IntoIterator<Item = MappingMetadata>,
    version: u64,
) -> Result<IndexMetadata, CreateIndexError> {
    let builder = mappings
        .into_iter()
        .fold(imd.to_builder().version(version), |b, m| b.put_mapping(m));
    Ok(builder.build()?)
}

fn first_type<'k>(mut types: impl Iterator<Item = &'k String>) -> Option<&'k str> {
    types.find(|t| t.as_str() != DEFAULT_MAPPING).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indices::{LocalIndicesService, RemovalReason};
    use meta_core::settings::{SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS};
    use meta_core::{parse_mapping, Settings};

    fn physical(name: &str, keyspace: &str, mapping: &str) -> IndexMetadata {
        IndexMetadata::builder(name)
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, 1)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0)
                    .with(SETTING_VIRTUAL_INDEX, "v")
                    .with(SETTING_KEYSPACE, keyspace)
                    .with(SETTING_PARTITION_FUNCTION, "p"),
            )
            .put_mapping(MappingMetadata::parse("_doc", mapping).unwrap())
            .build()
            .unwrap()
    }

    fn mappings(type_name: &str, source: &str) -> BTreeMap<String, MappingSource> {
        [(type_name.to_string(), parse_mapping(type_name, source).unwrap())].into()
    }

    struct Fixture {
        service: Arc<LocalIndicesService>,
        indices: Arc<dyn IndicesService>,
    }

    impl Fixture {
        fn new() -> Self {
            let service = Arc::new(LocalIndicesService::new());
            let indices: Arc<dyn IndicesService> = service.clone();
            Self { service, indices }
        }

        fn sync(
            &self,
            imd: IndexMetadata,
            request: &BTreeMap<String, MappingSource>,
            metadata: &Metadata,
        ) -> Result<VirtualSync, CreateIndexError> {
            let local = self.indices.create_index(&imd).unwrap();
            local.merge_mappings(request).unwrap();
            let mut guard = LocalIndexGuard::new(self.indices.clone(), imd.name());
            VirtualIndexSynchronizer::new(&self.indices).sync(
                imd,
                "v",
                local.as_ref(),
                request,
                metadata,
                &mut guard,
            )
        }
    }

    const A_FIELD: &str = r#"{"properties": {"a": {"type": "keyword"}}}"#;
    const B_FIELD: &str = r#"{"properties": {"b": {"type": "long"}}}"#;

    #[test]
    fn test_create_virtual_index() {
        let fx = Fixture::new();
        let imd = physical("a", "shared", A_FIELD);

        let sync = fx
            .sync(imd.clone(), &mappings("_doc", A_FIELD), &Metadata::default())
            .unwrap();

        let v = &sync.virtual_index;
        assert_eq!(v.name(), "v");
        assert!(v.is_virtual());
        assert_eq!(v.keyspace(), "shared");
        assert_ne!(v.uuid(), imd.uuid());
        assert!(v.virtual_index().is_none());
        assert!(!v.settings().contains(SETTING_PARTITION_FUNCTION));
        assert!(v.mapping("_doc").is_some());
        assert!(sync.guard.is_some());
        assert!(sync.propagated.is_empty());

        drop(sync);
        let removals = fx.service.removals();
        assert!(removals
            .iter()
            .any(|r| r.index == "v" && r.reason == RemovalReason::Failure));
    }

    #[test]
    fn test_merge_propagates_to_referencing_indices() {
        let fx = Fixture::new();
        let a = physical("a", "shared", A_FIELD);
        let v = a
            .to_builder()
            .name("v")
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, 1)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0)
                    .with(SETTING_VIRTUAL, true)
                    .with(SETTING_KEYSPACE, "shared"),
            )
            .build()
            .unwrap();
        let metadata = Metadata::builder().put(a).put(v.clone()).build();

        let b = physical("b", "shared", B_FIELD);
        let sync = fx
            .sync(b, &mappings("_doc", B_FIELD), &metadata)
            .unwrap();

        assert_eq!(sync.virtual_index.version(), v.version() + 1);
        let fields = sync.virtual_index.mapping("_doc").unwrap().field_names();
        assert!(fields.contains("a") && fields.contains("b"));

        assert_eq!(sync.propagated.len(), 1);
        let a = &sync.propagated[0];
        assert_eq!(a.name(), "a");
        assert_eq!(a.version(), sync.virtual_index.version());
        assert!(a.mapping("_doc").unwrap().field_names().contains("b"));

        assert_eq!(sync.index.version(), sync.virtual_index.version());
        assert!(sync.index.mapping("_doc").unwrap().field_names().contains("a"));
    }

    #[test]
    fn test_keyspace_mismatch() {
        let fx = Fixture::new();
        let v = physical("v", "one", A_FIELD)
            .to_builder()
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, 1)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0)
                    .with(SETTING_VIRTUAL, true)
                    .with(SETTING_KEYSPACE, "one"),
            )
            .build()
            .unwrap();
        let metadata = Metadata::builder().put(v).build();

        let err = fx
            .sync(physical("b", "two", B_FIELD), &mappings("_doc", B_FIELD), &metadata)
            .err()
            .unwrap();
        assert_eq!(
            err,
            CreateIndexError::invalid_name("b", "Virtual index keyspace does not match")
        );
    }

    #[test]
    fn test_type_mismatch() {
        let fx = Fixture::new();
        let v = physical("v", "shared", A_FIELD)
            .to_builder()
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, 1)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0)
                    .with(SETTING_VIRTUAL, true)
                    .with(SETTING_KEYSPACE, "shared"),
            )
            .build()
            .unwrap();
        let metadata = Metadata::builder().put(v).build();

        let b = IndexMetadata::builder("b")
            .settings(physical("b", "shared", B_FIELD).settings().clone())
            .build()
            .unwrap();
        let err = fx
            .sync(b, &mappings("tweet", B_FIELD), &metadata)
            .err()
            .unwrap();
        assert_eq!(
            err,
            CreateIndexError::MappingConflict("Virtual type name does not match".to_string())
        );
    }
}
