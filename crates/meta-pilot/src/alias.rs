//! Alias validation

use serde_json::Value;

use meta_core::{AliasMetadata, Metadata};

use crate::create::naming::NameValidator;
use crate::indices::QueryContext;
use crate::{CreateIndexError, DeprecationLogger};

/// Validates aliases attached to a new index
pub trait AliasValidator: Send + Sync {
    /// Check the alias name and routing against existing metadata
    fn validate_alias(
        &self,
        alias: &AliasMetadata,
        index: &str,
        metadata: &Metadata,
    ) -> Result<(), CreateIndexError>;

    /// Check that a filter parses in the context of the new index
    fn validate_alias_filter(
        &self,
        alias: &str,
        filter: &str,
        context: &QueryContext,
    ) -> Result<(), CreateIndexError>;
}

/// Query types accepted in alias filters
const KNOWN_QUERIES: &[&str] = &[
    "bool",
    "exists",
    "ids",
    "match",
    "match_all",
    "match_none",
    "match_phrase",
    "prefix",
    "query_string",
    "range",
    "term",
    "terms",
    "wildcard",
];

/// Default alias rules
#[derive(Debug, Clone, Default)]
pub struct DefaultAliasValidator {
    names: NameValidator,
    deprecation: DeprecationLogger,
}

impl DefaultAliasValidator {
    pub fn new(names: NameValidator, deprecation: DeprecationLogger) -> Self {
        Self { names, deprecation }
    }

    fn validate_standalone(&self, alias: &AliasMetadata) -> Result<(), CreateIndexError> {
        if alias.alias.trim().is_empty() {
            return Err(CreateIndexError::invalid_alias(
                &alias.alias,
                "alias name is required",
            ));
        }
        self.names
            .validate_index_or_alias_name(&alias.alias, &self.deprecation, |reason| {
                CreateIndexError::invalid_alias(&alias.alias, reason)
            })?;
        if alias
            .index_routing
            .as_deref()
            .is_some_and(|routing| routing.contains(','))
        {
            return Err(CreateIndexError::invalid_alias(
                &alias.alias,
                format!(
                    "alias [{}] has several index routing values associated with it",
                    alias.alias
                ),
            ));
        }
        Ok(())
    }
}

impl AliasValidator for DefaultAliasValidator {
    fn validate_alias(
        &self,
        alias: &AliasMetadata,
        _index: &str,
        metadata: &Metadata,
    ) -> Result<(), CreateIndexError> {
        self.validate_standalone(alias)?;
        if metadata.has_index(&alias.alias) {
            return Err(CreateIndexError::invalid_alias(
                &alias.alias,
                "an index exists with the same name as the alias",
            ));
        }
        Ok(())
    }

    fn validate_alias_filter(
        &self,
        alias: &str,
        filter: &str,
        context: &QueryContext,
    ) -> Result<(), CreateIndexError> {
        let parsed: Value = serde_json::from_str(filter).map_err(|e| {
            CreateIndexError::invalid_alias(
                alias,
                format!("failed to parse filter for alias [{}]: {}", alias, e),
            )
        })?;
        check_query(&parsed).map_err(|reason| {
            CreateIndexError::invalid_alias(
                alias,
                format!(
                    "failed to parse filter for alias [{}] on index [{}]: {}",
                    alias, context.index, reason
                ),
            )
        })
    }
}

fn check_query(query: &Value) -> Result<(), String> {
    let Some(object) = query.as_object() else {
        return Err("query must be an object".to_string());
    };
    let mut entries = object.iter();
    let (Some((name, body)), None) = (entries.next(), entries.next()) else {
        return Err("query must contain exactly one clause".to_string());
    };
    if !KNOWN_QUERIES.contains(&name.as_str()) {
        return Err(format!("no [query] registered for [{}]", name));
    }
    if name == "bool" {
        let Some(clauses) = body.as_object() else {
            return Err("[bool] query malformed, expected an object".to_string());
        };
        for occur in ["must", "should", "filter", "must_not"] {
            match clauses.get(occur) {
                Some(Value::Array(items)) => items.iter().try_for_each(check_query)?,
                Some(single @ Value::Object(_)) => check_query(single)?,
                Some(_) => return Err(format!("[bool] clause [{}] malformed", occur)),
                None => {}
            }
        }
    }
    Ok(())
}
