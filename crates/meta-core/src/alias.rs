//! Alias definitions

use serde::{Deserialize, Serialize};

/// Alias pointing at an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasMetadata {
    /// Alias name
    pub alias: String,
    /// Filter query source (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Routing used when indexing through the alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_routing: Option<String>,
    /// Routing used when searching through the alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_routing: Option<String>,
    /// Whether this index is the write index of the alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_index: Option<bool>,
}

impl AliasMetadata {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            filter: None,
            index_routing: None,
            search_routing: None,
            write_index: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set both index and search routing
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        let routing = routing.into();
        self.index_routing = Some(routing.clone());
        self.search_routing = Some(routing);
        self
    }

    pub fn with_index_routing(mut self, routing: impl Into<String>) -> Self {
        self.index_routing = Some(routing.into());
        self
    }

    pub fn with_search_routing(mut self, routing: impl Into<String>) -> Self {
        self.search_routing = Some(routing.into());
        self
    }

    pub fn with_write_index(mut self, write_index: bool) -> Self {
        self.write_index = Some(write_index);
        self
    }

    /// Copy of this alias under a different name
    pub fn renamed(&self, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..self.clone()
        }
    }

    /// Whether a non-empty filter is attached
    pub fn has_filter(&self) -> bool {
        self.filter.as_deref().is_some_and(|f| !f.trim().is_empty())
    }
}
