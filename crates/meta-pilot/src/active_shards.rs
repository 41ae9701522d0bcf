//! Waiting for shard copies of a new index to become active
//!
//! Runs after the creating state has been published and never holds the
//! update queue. Each published state is checked once; gives up when the
//! timeout elapses.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use meta_core::ClusterState;

use crate::request::ActiveShardCount;
use crate::service::ClusterService;

/// Observes published states until enough shard copies are active
pub struct ActiveShardsObserver {
    service: Arc<ClusterService>,
}

impl ActiveShardsObserver {
    pub fn new(service: Arc<ClusterService>) -> Self {
        Self { service }
    }

    /// Wait until every shard of `index` has `count` active copies
    ///
    /// Returns false on timeout. `count` must already be resolved against the
    /// index settings.
    pub async fn wait_for_active_shards(
        &self,
        index: &str,
        count: ActiveShardCount,
        timeout: Duration,
    ) -> bool {
        if count == ActiveShardCount::Count(0) {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut states = self.service.subscribe();
        loop {
            let state = states.borrow_and_update().clone();
            if enough_shards_active(&state, index, count) {
                return true;
            }

            match tokio::time::timeout_at(deadline, states.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    debug!("[{}] cluster service shut down while waiting for active shards", index);
                    return false;
                }
                Err(_) => {
                    debug!(
                        "[{}] timed out waiting for [{}] active shard copies",
                        index, count
                    );
                    return false;
                }
            }
        }
    }
}

/// Whether every shard of `index` has the required number of active copies
pub fn enough_shards_active(state: &ClusterState, index: &str, count: ActiveShardCount) -> bool {
    let (Some(imd), Some(routing)) = (
        state.metadata().index(index),
        state.routing_table().index(index),
    ) else {
        return false;
    };
    let required = count.required_copies(imd.number_of_replicas());
    (0..imd.number_of_shards()).all(|shard| routing.active_copies(shard) as u64 >= required)
}
