//! Index and alias name validation

use meta_core::ClusterState;

use crate::config::ColonMode;
use crate::{CreateIndexError, DeprecationLogger};

/// Characters that are unsafe in file names on any supported platform
pub const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ','];

/// Longest index name accepted, in UTF-8 bytes
pub const MAX_INDEX_NAME_BYTES: usize = 255;

/// Name validator
#[derive(Debug, Clone, Copy, Default)]
pub struct NameValidator {
    colon_mode: ColonMode,
}

impl NameValidator {
    pub fn new(colon_mode: ColonMode) -> Self {
        Self { colon_mode }
    }

    /// Validate the name of a new index against the current state
    pub fn validate_index_name(
        &self,
        index: &str,
        state: &ClusterState,
        deprecation: &DeprecationLogger,
    ) -> Result<(), CreateIndexError> {
        self.validate_index_or_alias_name(index, deprecation, |reason| {
            CreateIndexError::invalid_name(index, reason)
        })?;

        if index.to_lowercase() != index {
            return Err(CreateIndexError::invalid_name(index, "must be lowercase"));
        }
        if state.routing_table().has_index(index) || state.metadata().has_index(index) {
            return Err(CreateIndexError::AlreadyExists(index.to_string()));
        }
        if state.metadata().has_alias(index) {
            return Err(CreateIndexError::invalid_name(index, "already exists as alias"));
        }
        Ok(())
    }

    /// Rules shared by index and alias names
    ///
    /// `make_error` turns a reason into the error for the kind of name checked.
    pub fn validate_index_or_alias_name<F>(
        &self,
        name: &str,
        deprecation: &DeprecationLogger,
        make_error: F,
    ) -> Result<(), CreateIndexError>
    where
        F: Fn(String) -> CreateIndexError,
    {
        if name.contains(INVALID_FILENAME_CHARS) {
            let chars: Vec<String> = INVALID_FILENAME_CHARS.iter().map(|c| c.to_string()).collect();
            return Err(make_error(format!(
                "must not contain the following characters [{}]",
                chars.join(", ")
            )));
        }
        if name.contains('#') {
            return Err(make_error("must not contain '#'".to_string()));
        }
        if name.contains(':') {
            match self.colon_mode {
                ColonMode::Deprecation => deprecation.deprecated(format!(
                    "index or alias name [{}] containing ':' is deprecated and will not be supported in the next major version",
                    name
                )),
                ColonMode::Reject => return Err(make_error("must not contain ':'".to_string())),
            }
        }
        if name.starts_with(&['_', '-', '+'][..]) {
            return Err(make_error("must not start with '_', '-', or '+'".to_string()));
        }
        if name.len() > MAX_INDEX_NAME_BYTES {
            return Err(make_error(format!(
                "index name is too long, ({} > {})",
                name.len(),
                MAX_INDEX_NAME_BYTES
            )));
        }
        if name == "." || name == ".." {
            return Err(make_error("must not be '.' or '..'".to_string()));
        }
        Ok(())
    }
}
