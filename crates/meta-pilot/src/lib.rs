//! Meta Pilot - Index creation for the cluster metadata control plane
//!
//! Admits new indices into the cluster state
//!
//! # Features
//! - Index name, settings and alias validation
//! - Template, mapping and settings resolution
//! - Shrink and split of existing indices
//! - Shard limit admission control
//! - Virtual index schema sharing
//! - External table-schema synchronization
//! - Serialized, versioned cluster state updates
//!
//! # Usage Example
//! ```ignore
//! use meta_pilot::{CreateIndexRequest, Pilot, PilotConfig};
//!
//! let pilot = Pilot::new(PilotConfig::default()).await?;
//! let response = pilot.create_index(CreateIndexRequest::new("api", "logs")).await?;
//! pilot.save().await?;
//! ```

pub mod active_shards;
pub mod alias;
pub mod config;
pub mod create;
pub mod deprecation;
pub mod error;
pub mod indices;
pub mod request;
pub mod schema;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use config::PilotConfig;
pub use create::{CreationOutcome, CreationPhase, IndexCreator};
pub use deprecation::DeprecationLogger;
pub use error::CreateIndexError;
pub use request::{ActiveShardCount, CreateIndexRequest, ResizeRequest, ResizeType};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use meta_core::ClusterState;

use active_shards::ActiveShardsObserver;
use alias::{AliasValidator, DefaultAliasValidator};
use create::naming::NameValidator;
use indices::{IndicesService, LocalIndicesService};
use schema::{RecordingSchemaSynchronizer, SchemaSynchronizer};
use service::{ClusterService, Priority};
use storage::{FileStorage, StorageError};

/// Acknowledgement of a create-index request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexResponse {
    /// The index is part of the published cluster state
    pub acknowledged: bool,
    /// The requested shard copies became active before the timeout
    pub shards_acknowledged: bool,
    pub index: String,
    /// Deprecation advisories emitted while handling the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deprecations: Vec<String>,
}

/// Services the coordinator calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub indices: Arc<dyn IndicesService>,
    pub aliases: Arc<dyn AliasValidator>,
    pub schema: Arc<dyn SchemaSynchronizer>,
}

impl Collaborators {
    /// In-memory local indices and schema store
    pub fn in_memory(config: &PilotConfig) -> Self {
        let names = NameValidator::new(config.naming.colon_mode);
        Self {
            indices: Arc::new(LocalIndicesService::new()),
            aliases: Arc::new(DefaultAliasValidator::new(names, DeprecationLogger::new())),
            schema: Arc::new(RecordingSchemaSynchronizer::new()),
        }
    }
}

/// Metadata control plane
pub struct Pilot {
    config: PilotConfig,
    storage: FileStorage,
    service: Arc<ClusterService>,
    creator: IndexCreator,
    schema: Arc<dyn SchemaSynchronizer>,
    observer: ActiveShardsObserver,
}

impl Pilot {
    /// Create Pilot instance backed by the persisted state and in-memory collaborators
    pub async fn new(config: PilotConfig) -> Result<Self, StorageError> {
        let storage = FileStorage::new(&config.cluster.data_dir);
        let state = storage.load_or_create(&config.cluster.name).await?;
        let collaborators = Collaborators::in_memory(&config);
        Ok(Self::with_state(config, storage, state, collaborators))
    }

    /// Create Pilot instance from an existing state
    pub fn with_state(
        config: PilotConfig,
        storage: FileStorage,
        state: ClusterState,
        collaborators: Collaborators,
    ) -> Self {
        let service = Arc::new(ClusterService::new(state));
        let observer = ActiveShardsObserver::new(service.clone());
        let schema = collaborators.schema.clone();
        let creator = IndexCreator::new(
            config.clone(),
            collaborators.indices,
            collaborators.aliases,
            collaborators.schema,
        );

        info!(
            "Pilot initialized: cluster={}, data_dir={:?}",
            config.cluster.name, config.cluster.data_dir
        );

        Self {
            config,
            storage,
            service,
            creator,
            schema,
            observer,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Currently published cluster state
    pub fn state(&self) -> Arc<ClusterState> {
        self.service.state()
    }

    pub fn service(&self) -> &Arc<ClusterService> {
        &self.service
    }

    /// Create an index
    ///
    /// The creation runs as an urgent cluster state update. Once published,
    /// the recorded schema mutations are applied and the call waits, bounded
    /// by the request timeout, for the requested shard copies.
    pub async fn create_index(
        &self,
        request: CreateIndexRequest,
    ) -> Result<CreateIndexResponse, CreateIndexError> {
        let request = request.normalized();
        let deprecation = DeprecationLogger::new();
        let source = format!("create-index [{}], cause [{}]", request.index, request.cause);

        let (_, (mutations, wait_for_active_shards)) = self
            .service
            .submit_state_update(&source, Priority::Urgent, |state| {
                let CreationOutcome {
                    state,
                    mutations,
                    wait_for_active_shards,
                    ..
                } = self.creator.execute(&request, state, &deprecation)?;
                Ok::<_, CreateIndexError>((state, (mutations, wait_for_active_shards)))
            })
            .await?;

        self.schema.apply(&mutations);

        let timeout = request
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.cluster.ack_timeout());
        let shards_acknowledged = self
            .observer
            .wait_for_active_shards(&request.index, wait_for_active_shards, timeout)
            .await;

        Ok(CreateIndexResponse {
            acknowledged: true,
            shards_acknowledged,
            index: request.index,
            deprecations: deprecation.drain(),
        })
    }

    /// Save the current cluster state
    pub async fn save(&self) -> Result<(), StorageError> {
        self.storage.save(&self.service.state()).await
    }
}
