//! File persistent storage
//!
//! Persists the cluster state to a JSON file

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use meta_core::ClusterState;

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("File not found: {0}")]
    NotFound(PathBuf),
}

/// File storage
pub struct FileStorage {
    /// Data directory
    data_dir: PathBuf,
    /// Cluster state file path
    state_path: PathBuf,
}

impl FileStorage {
    /// Create file storage
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        let state_path = data_dir.join("cluster_state.json");
        Self {
            data_dir,
            state_path,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Ensure data directory exists
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).await?;
            info!("Created data directory: {:?}", self.data_dir);
        }
        Ok(())
    }

    /// Load the cluster state
    pub async fn load(&self) -> Result<Option<ClusterState>, StorageError> {
        if !self.state_path.exists() {
            info!("Cluster state file not found, will create new cluster");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_path).await?;
        let state: ClusterState = serde_json::from_str(&content)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        info!(
            "Loaded cluster state '{}': version {}, {} indices",
            state.cluster_name(),
            state.version(),
            state.metadata().indices().len()
        );

        Ok(Some(state))
    }

    /// Save the cluster state
    pub async fn save(&self, state: &ClusterState) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        // Write to temp file first, then atomically rename
        let temp_path = self.state_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.state_path).await?;

        info!("Saved cluster state: version {}", state.version());

        Ok(())
    }

    /// Load or create the cluster state
    pub async fn load_or_create(&self, cluster_name: &str) -> Result<ClusterState, StorageError> {
        match self.load().await? {
            Some(state) => Ok(state),
            None => {
                let state = ClusterState::new(cluster_name);
                self.save(&state).await?;
                info!("Created new cluster '{}'", cluster_name);
                Ok(state)
            }
        }
    }

    /// Backup the current state file
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        if !self.state_path.exists() {
            return Err(StorageError::NotFound(self.state_path.clone()));
        }

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let backup_path = self
            .data_dir
            .join(format!("cluster_state_{}.json.bak", timestamp));

        fs::copy(&self.state_path, &backup_path).await?;
        info!("Backed up cluster state to {:?}", backup_path);

        Ok(backup_path)
    }
}
