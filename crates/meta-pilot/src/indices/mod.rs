//! Local index materialization
//!
//! Before an index is admitted into cluster state it is created locally so its
//! mappings, sort and alias filters can be checked. The [`LocalIndexGuard`]
//! removes such an index exactly once, on whichever path the attempt leaves by.

pub mod local;

pub use local::{LocalIndex, LocalIndicesService, LocalMapper, RemovalRecord};

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use meta_core::{IndexMetadata, MappingMetadata, MappingSource};

use crate::CreateIndexError;

/// Why a local index was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The attempt that created it failed
    Failure,
    /// The cluster state build succeeded; the local copy was only for validation
    NoLongerAssigned,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Failure => write!(f, "failure"),
            RemovalReason::NoLongerAssigned => write!(f, "no_longer_assigned"),
        }
    }
}

/// Context handed to alias filter validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    pub index: String,
}

/// Locally materialized index
pub trait IndexService: Send + Sync {
    /// Index name
    fn index(&self) -> &str;

    /// Merge parsed mappings (type -> source rooted at the type) into the mapper
    fn merge_mappings(&self, mappings: &BTreeMap<String, MappingSource>) -> Result<(), CreateIndexError>;

    /// Current document mappings, `_default_` included
    fn doc_mappings(&self) -> Vec<MappingMetadata>;

    /// Replace the mapper state with the mappings of `imd`
    fn update_mapping(&self, imd: &IndexMetadata) -> Result<(), CreateIndexError>;

    /// Check `index.sort.*` against the merged mappings
    fn validate_index_sort(&self) -> Result<(), CreateIndexError>;

    fn query_context(&self) -> QueryContext;
}

/// Creates and removes local index objects
pub trait IndicesService: Send + Sync {
    fn has_index(&self, index: &str) -> bool;

    fn index_service(&self, index: &str) -> Option<Arc<dyn IndexService>>;

    /// Materialize an index from its metadata
    fn create_index(&self, imd: &IndexMetadata) -> Result<Arc<dyn IndexService>, CreateIndexError>;

    fn remove_index(&self, index: &str, reason: RemovalReason, extra_info: &str);
}

/// Extra info recorded when the local copy is released after a successful build
pub const RELEASE_AFTER_VALIDATION: &str = "cleaning up after validating index on master";

/// Scoped ownership of a locally created index
///
/// Dropping the guard removes the index with [`RemovalReason::Failure`];
/// [`LocalIndexGuard::release`] removes it with
/// [`RemovalReason::NoLongerAssigned`] once the new state has been built.
pub struct LocalIndexGuard {
    indices: Arc<dyn IndicesService>,
    index: String,
    failure_info: String,
    released: bool,
}

impl LocalIndexGuard {
    pub fn new(indices: Arc<dyn IndicesService>, index: impl Into<String>) -> Self {
        Self {
            indices,
            index: index.into(),
            failure_info: String::new(),
            released: false,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Extra info recorded if the attempt fails from here on
    pub fn set_failure_info(&mut self, info: impl Into<String>) {
        self.failure_info = info.into();
    }

    /// Release after a successful build
    pub fn release(mut self) {
        self.remove(RemovalReason::NoLongerAssigned, RELEASE_AFTER_VALIDATION);
    }

    fn remove(&mut self, reason: RemovalReason, extra_info: &str) {
        if self.released {
            return;
        }
        self.released = true;
        debug!(
            "[{}] removing local index, reason [{}], {}",
            self.index, reason, extra_info
        );
        self.indices.remove_index(&self.index, reason, extra_info);
    }
}

impl Drop for LocalIndexGuard {
    fn drop(&mut self) {
        let info = std::mem::take(&mut self.failure_info);
        self.remove(RemovalReason::Failure, &info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_core::settings::{SETTING_NUMBER_OF_REPLICAS, SETTING_NUMBER_OF_SHARDS};
    use meta_core::Settings;

    fn index(name: &str) -> IndexMetadata {
        IndexMetadata::builder(name)
            .settings(
                Settings::new()
                    .with(SETTING_NUMBER_OF_SHARDS, 1)
                    .with(SETTING_NUMBER_OF_REPLICAS, 0),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_guard_drop_removes_with_failure() {
        let service = Arc::new(LocalIndicesService::new());
        service.create_index(&index("logs")).unwrap();

        {
            let mut guard = LocalIndexGuard::new(service.clone(), "logs");
            guard.set_failure_info("boom");
        }

        assert!(!service.has_index("logs"));
        let removals = service.removals();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].reason, RemovalReason::Failure);
        assert_eq!(removals[0].extra_info, "boom");
    }

    #[test]
    fn test_guard_release_removes_once() {
        let service = Arc::new(LocalIndicesService::new());
        service.create_index(&index("logs")).unwrap();

        LocalIndexGuard::new(service.clone(), "logs").release();

        let removals = service.removals();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].reason, RemovalReason::NoLongerAssigned);
        assert_eq!(removals[0].extra_info, RELEASE_AFTER_VALIDATION);
    }
}
