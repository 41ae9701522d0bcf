//! Index creation coordinator
//!
//! Turns one [`CreateIndexRequest`] and a cluster state snapshot into the next
//! cluster state. An attempt moves through the phases of [`CreationPhase`]:
//! - validation (name, settings, aliases, templates, topology, admission)
//! - local materialization of the index and mapping merge
//! - virtual index synchronization
//! - external schema synchronization
//!
//! Nothing is published here. Local indices created by the attempt are owned by
//! [`LocalIndexGuard`]s and removed on every exit path; a committed attempt
//! releases them as no longer needed.

pub mod admission;
pub mod naming;
pub mod resolve;
pub mod templates;
pub mod topology;
pub mod virtual_index;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, trace};

use meta_core::{
    parse_mapping, ClusterState, IndexMetadata, IndexState, MappingSource, Settings,
    DEFAULT_MAPPING,
};

use crate::alias::AliasValidator;
use crate::config::PilotConfig;
use crate::indices::{IndicesService, LocalIndexGuard};
use crate::request::{ActiveShardCount, CreateIndexRequest};
use crate::schema::{SchemaMutation, SchemaSynchronizer, NO_SCHEMA_STORE_BLOCK_ID};
use crate::{CreateIndexError, DeprecationLogger};

use admission::AdmissionController;
use naming::NameValidator;
use resolve::SettingsResolver;
use templates::{apply_templates, find_templates};
use virtual_index::{VirtualIndexSynchronizer, VirtualSync};

/// Phase of a creation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPhase {
    Validating,
    MaterializingLocal,
    MergingMappings,
    SyncingVirtual,
    SyncingExternalSchema,
    Committed,
    RolledBack,
}

impl std::fmt::Display for CreationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CreationPhase::Validating => "validating",
            CreationPhase::MaterializingLocal => "materializing_local",
            CreationPhase::MergingMappings => "merging_mappings",
            CreationPhase::SyncingVirtual => "syncing_virtual",
            CreationPhase::SyncingExternalSchema => "syncing_external_schema",
            CreationPhase::Committed => "committed",
            CreationPhase::RolledBack => "rolled_back",
        };
        write!(f, "{}", name)
    }
}

/// Result of a committed attempt
#[derive(Debug, Clone)]
pub struct CreationOutcome {
    /// State to publish
    pub state: ClusterState,
    pub index: String,
    /// Names of the templates applied, best match first
    pub templates: Vec<String>,
    /// Schema mutations to apply once the state is published
    pub mutations: Vec<SchemaMutation>,
    /// Active copies per shard to wait for, resolved against the index settings
    pub wait_for_active_shards: ActiveShardCount,
}

/// Index creation coordinator
pub struct IndexCreator {
    config: PilotConfig,
    indices: Arc<dyn IndicesService>,
    aliases: Arc<dyn AliasValidator>,
    schema: Arc<dyn SchemaSynchronizer>,
    names: NameValidator,
}

impl IndexCreator {
    pub fn new(
        config: PilotConfig,
        indices: Arc<dyn IndicesService>,
        aliases: Arc<dyn AliasValidator>,
        schema: Arc<dyn SchemaSynchronizer>,
    ) -> Self {
        let names = NameValidator::new(config.naming.colon_mode);
        Self {
            config,
            indices,
            aliases,
            schema,
            names,
        }
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Run one creation attempt against `state`
    ///
    /// On failure `state` is left as it was and no local index created by the
    /// attempt survives.
    pub fn execute(
        &self,
        request: &CreateIndexRequest,
        state: &ClusterState,
        deprecation: &DeprecationLogger,
    ) -> Result<CreationOutcome, CreateIndexError> {
        let mut phase = CreationPhase::Validating;
        let result = self.attempt(request, state, deprecation, &mut phase);

        if let Err(e) = &result {
            if phase != CreationPhase::Validating {
                debug!(
                    "[{}] {} during [{}]",
                    request.index,
                    CreationPhase::RolledBack,
                    phase
                );
            }
            if e.is_already_exists() {
                trace!("[{}] failed to create, {}", request.index, e);
            } else {
                debug!("[{}] failed to create, {}", request.index, e);
            }
        }
        result
    }

    fn attempt(
        &self,
        request: &CreateIndexRequest,
        state: &ClusterState,
        deprecation: &DeprecationLogger,
        phase: &mut CreationPhase,
    ) -> Result<CreationOutcome, CreateIndexError> {
        let index = request.index.as_str();
        let metadata = state.metadata();

        self.names.validate_index_name(index, state, deprecation)?;
        let admission = AdmissionController::new(&self.config.admission);
        admission.validate_index_settings(&request.settings)?;
        for alias in &request.aliases {
            self.aliases.validate_alias(alias, index, metadata)?;
        }
        topology::check_resize_request(request)?;

        let mut mappings: BTreeMap<String, MappingSource> = BTreeMap::new();
        for (type_name, source) in &request.mappings {
            mappings.insert(type_name.clone(), parse_mapping(type_name, source)?);
        }
        let request_types: BTreeSet<String> = mappings.keys().cloned().collect();

        let (templates, template_aliases) = match request.resize {
            None => {
                let templates = find_templates(metadata, index);
                let aliases = apply_templates(
                    request,
                    &templates,
                    &mut mappings,
                    metadata,
                    self.aliases.as_ref(),
                )?;
                (templates, aliases)
            }
            Some(_) => (Vec::new(), BTreeMap::new()),
        };
        let template_names: Vec<String> = templates.iter().map(|t| t.name.clone()).collect();

        let mut settings =
            SettingsResolver::new(&self.config.index).resolve(request, &templates, state.nodes(), deprecation);
        admission.validate_shard_counts(&settings)?;
        let source = match &request.resize {
            Some(resize) => Some(topology::prepare_resize_settings(
                state,
                &request_types,
                &mut settings,
                resize,
                index,
            )?),
            None => None,
        };
        let routing_num_shards = topology::routing_num_shards(&mut settings, source)?;
        admission.check_shard_limit(&settings, state, deprecation)?;

        let tmp = validation_metadata(index, settings, routing_num_shards, source)?;
        let wait_for_active_shards = request
            .wait_for_active_shards
            .resolve(&tmp)
            .map_err(CreateIndexError::invalid_setting)?;
        if !wait_for_active_shards.validate(tmp.number_of_replicas()) {
            return Err(CreateIndexError::invalid_setting(format!(
                "invalid wait_for_active_shards[{}]: cannot be greater than number of shard copies [{}]",
                wait_for_active_shards,
                u64::from(tmp.number_of_replicas()) + 1
            )));
        }

        enter(phase, CreationPhase::MaterializingLocal, index);
        let local = self.indices.create_index(&tmp)?;
        let mut guard = LocalIndexGuard::new(self.indices.clone(), index);

        enter(phase, CreationPhase::MergingMappings, index);
        local.merge_mappings(&mappings).map_err(|e| {
            guard.set_failure_info("failed on parsing default mapping/mappings on index creation");
            e
        })?;
        if request.resize.is_none() {
            local.validate_index_sort()?;
        }

        let context = local.query_context();
        for alias in request.aliases.iter().chain(template_aliases.values()) {
            if let Some(filter) = &alias.filter {
                self.aliases.validate_alias_filter(&alias.alias, filter, &context)?;
            }
        }

        let builder = local
            .doc_mappings()
            .into_iter()
            .fold(tmp.to_builder().state(request.state), |b, m| b.put_mapping(m));
        let builder = template_aliases
            .values()
            .chain(request.aliases.iter())
            .cloned()
            .fold(builder, |b, alias| b.put_alias(alias));
        let imd = builder.build()?;

        let mut virtual_index = None;
        let mut virtual_guard = None;
        let mut propagated = Vec::new();
        let imd = match imd.virtual_index().map(String::from) {
            None => imd,
            Some(virtual_name) => {
                enter(phase, CreationPhase::SyncingVirtual, index);
                let VirtualSync {
                    index: synced,
                    virtual_index: v,
                    propagated: p,
                    guard: g,
                } = VirtualIndexSynchronizer::new(&self.indices).sync(
                    imd,
                    &virtual_name,
                    local.as_ref(),
                    &mappings,
                    metadata,
                    &mut guard,
                )?;
                virtual_index = Some(v);
                virtual_guard = g;
                propagated = p;
                synced
            }
        };

        let new_metadata = propagated
            .iter()
            .chain(virtual_index.iter())
            .cloned()
            .fold(metadata.to_builder(), |b, i| b.put(i))
            .put(imd.clone())
            .generate_cluster_uuid_if_needed()
            .build();

        enter(phase, CreationPhase::SyncingExternalSchema, index);
        let mutations = self.sync_schema(state, &imd, virtual_index.as_ref(), &propagated)?;

        info!(
            "[{}] creating index, cause [{}], templates {:?}, shards [{}]/[{}], mappings {:?}",
            index,
            request.cause,
            template_names,
            imd.number_of_shards(),
            imd.number_of_replicas(),
            imd.mappings().keys().collect::<Vec<_>>()
        );

        let mut blocks = state.blocks().to_builder();
        for block in &request.blocks {
            blocks = blocks.add_index_block(index, block.clone());
        }
        blocks = blocks.update_blocks(&imd);
        if let Some(v) = &virtual_index {
            blocks = blocks.update_blocks(v);
        }

        let mut next = state.builder().metadata(new_metadata).blocks(blocks.build());
        if request.state == IndexState::Open {
            let mut routing = state.routing_table().to_builder().add_as_new(&imd);
            if let Some(v) = virtual_index.as_ref().filter(|v| !state.routing_table().has_index(v.name())) {
                routing = routing.add_as_new(v);
            }
            next = next.routing_table(routing.build());
        }
        let next = next.build();

        enter(phase, CreationPhase::Committed, index);
        guard.release();
        if let Some(g) = virtual_guard {
            g.release();
        }

        Ok(CreationOutcome {
            state: next,
            index: index.to_string(),
            templates: template_names,
            mutations,
            wait_for_active_shards,
        })
    }

    /// Record the keyspace and table mutations backing the new index
    ///
    /// Tables follow the virtual index mappings when there is one.
    fn sync_schema(
        &self,
        state: &ClusterState,
        imd: &IndexMetadata,
        virtual_index: Option<&IndexMetadata>,
        propagated: &[IndexMetadata],
    ) -> Result<Vec<SchemaMutation>, CreateIndexError> {
        if state.blocks().has_global_block(NO_SCHEMA_STORE_BLOCK_ID) {
            return Err(CreateIndexError::SchemaSyncFailure(
                "schema store unavailable, cannot create keyspace".to_string(),
            ));
        }

        let replication_factor = imd.number_of_replicas().checked_add(1).ok_or_else(|| {
            CreateIndexError::invalid_setting(format!(
                "cannot derive a replication factor from [{}] replicas",
                imd.number_of_replicas()
            ))
        })?;
        let mut mutations = Vec::new();
        self.schema.create_or_update_keyspace(
            imd.keyspace(),
            replication_factor,
            imd.replication(),
            &mut mutations,
        )?;

        let backing: Vec<&IndexMetadata> = std::iter::once(imd).chain(propagated.iter()).collect();
        let tables = virtual_index.unwrap_or(imd);
        for mapping in tables
            .mappings()
            .values()
            .filter(|m| m.type_name() != DEFAULT_MAPPING)
        {
            self.schema
                .update_table_schema(imd.keyspace(), mapping, &backing, &mut mutations)?;
        }
        Ok(mutations)
    }
}

fn enter(phase: &mut CreationPhase, next: CreationPhase, index: &str) {
    debug!("[{}] {} -> {}", index, phase, next);
    *phase = next;
}

/// Metadata used to materialize the local index before mappings are known
///
/// Resize targets start every shard at the highest primary term of the source.
fn validation_metadata(
    index: &str,
    settings: Settings,
    routing_num_shards: u32,
    source: Option<&IndexMetadata>,
) -> Result<IndexMetadata, CreateIndexError> {
    let mut builder = IndexMetadata::builder(index)
        .settings(settings)
        .routing_num_shards(routing_num_shards);
    if let Some(source) = source {
        let term = topology::resize_primary_term(source);
        for shard in 0..builder.number_of_shards()? {
            builder = builder.primary_term(shard, term);
        }
    }
    Ok(builder.build()?)
}
