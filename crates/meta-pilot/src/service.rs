//! Serialized cluster state updates
//!
//! The service owns the current cluster state. Update tasks run one at a time
//! in submission order; each one reads the published state and may return a
//! replacement, which is published with a bumped version before the next task
//! starts. Observers subscribe to the published states.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use meta_core::ClusterState;

/// Priority class of an update task
///
/// Informational only: it labels the task in logs, and tasks still run in
/// submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// User-facing metadata changes such as index creation
    Urgent,
    /// Routine reconciliation
    Normal,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Urgent => write!(f, "URGENT"),
            Priority::Normal => write!(f, "NORMAL"),
        }
    }
}

/// Cluster state service
pub struct ClusterService {
    /// Latest published state
    published: watch::Sender<Arc<ClusterState>>,
    /// Held for the whole run of one task; tokio's mutex is fair
    updates: Mutex<()>,
}

impl ClusterService {
    pub fn new(state: ClusterState) -> Self {
        Self {
            published: watch::Sender::new(Arc::new(state)),
            updates: Mutex::new(()),
        }
    }

    /// Currently published state
    pub fn state(&self) -> Arc<ClusterState> {
        self.published.borrow().clone()
    }

    /// Receiver marking every state published from now on as changed
    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterState>> {
        self.published.subscribe()
    }

    /// Run an update task against the published state
    ///
    /// `task` returns the next state and a value handed back to the caller.
    /// A returned state equal to the current one is not published. On error
    /// nothing is published.
    pub async fn submit_state_update<T, E, F>(
        &self,
        source: &str,
        priority: Priority,
        task: F,
    ) -> Result<(Arc<ClusterState>, T), E>
    where
        F: FnOnce(&ClusterState) -> Result<(ClusterState, T), E>,
    {
        let _running = self.updates.lock().await;
        let current = self.state();
        debug!(
            "executing cluster state update task [{}], priority [{}], version {}",
            source,
            priority,
            current.version()
        );

        let (next, value) = task(&current)?;
        if next == *current {
            debug!("cluster state update task [{}] made no changes", source);
            return Ok((current, value));
        }

        let published = Arc::new(next.builder().incr_version().build());
        self.published.send_replace(published.clone());
        info!(
            "published cluster state version {} from [{}]",
            published.version(),
            source
        );
        Ok((published, value))
    }
}
