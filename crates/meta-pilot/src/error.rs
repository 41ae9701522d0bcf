//! Create-index errors

use meta_core::MetadataError;

/// Failure of a create-index attempt
///
/// Every failure leaves the cluster state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateIndexError {
    #[error("Invalid index name [{index}], {reason}")]
    InvalidName { index: String, reason: String },
    #[error("index [{0}] already exists")]
    AlreadyExists(String),
    #[error("Validation Failed: {}", numbered(.0))]
    InvalidSettings(Vec<String>),
    #[error("Validation Failed: 1: {0};")]
    ShardLimitExceeded(String),
    #[error("{0}")]
    UnresizableSource(String),
    #[error("{0}")]
    MappingConflict(String),
    #[error("Schema synchronization failed: {0}")]
    SchemaSyncFailure(String),
    #[error("no such index [{0}]")]
    IndexNotFound(String),
    #[error("Invalid alias name [{alias}], {reason}")]
    InvalidAlias { alias: String, reason: String },
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl CreateIndexError {
    pub fn invalid_name(index: impl Into<String>, reason: impl Into<String>) -> Self {
        CreateIndexError::InvalidName {
            index: index.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_alias(alias: impl Into<String>, reason: impl Into<String>) -> Self {
        CreateIndexError::InvalidAlias {
            alias: alias.into(),
            reason: reason.into(),
        }
    }

    /// Single-message settings failure
    pub fn invalid_setting(message: impl Into<String>) -> Self {
        CreateIndexError::InvalidSettings(vec![message.into()])
    }

    /// Expected race outcome rather than a defect
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CreateIndexError::AlreadyExists(_))
    }
}

impl From<MetadataError> for CreateIndexError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::MappingParse { .. } => CreateIndexError::MappingConflict(e.to_string()),
            other => CreateIndexError::InvalidSettings(vec![other.to_string()]),
        }
    }
}

fn numbered(errors: &[String]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}: {};", i + 1, e))
        .collect::<Vec<_>>()
        .join("")
}
