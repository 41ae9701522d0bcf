//! Index templates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AliasMetadata, Settings};

/// Index template
///
/// Settings, mappings and aliases applied to new indices whose name matches
/// one of the patterns. Higher `order` takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTemplateMetadata {
    /// Template name
    pub name: String,
    /// Precedence (higher wins)
    #[serde(default)]
    pub order: i32,
    /// Index name patterns (`*` wildcards)
    pub index_patterns: Vec<String>,
    #[serde(default)]
    pub settings: Settings,
    /// Mapping sources per type (JSON)
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasMetadata>,
}

impl IndexTemplateMetadata {
    pub fn new(name: impl Into<String>, index_patterns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            order: 0,
            index_patterns,
            settings: Settings::new(),
            mappings: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_mapping(mut self, type_name: impl Into<String>, source: impl Into<String>) -> Self {
        self.mappings.insert(type_name.into(), source.into());
        self
    }

    pub fn with_alias(mut self, alias: AliasMetadata) -> Self {
        self.aliases.insert(alias.alias.clone(), alias);
        self
    }

    /// Check if the template applies to an index name
    pub fn matches(&self, index: &str) -> bool {
        self.index_patterns.iter().any(|p| simple_match(p, index))
    }
}

/// Wildcard match where `*` matches any sequence of characters
pub fn simple_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();

    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while vi < v.len() {
        if pi < p.len() && p[pi] != '*' && p[pi] == v[vi] {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = vi;
            pi += 1;
        } else if let Some(s) = star {
            // Backtrack: let the last star absorb one more character
            pi = s + 1;
            mark += 1;
            vi = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_match() {
        assert!(simple_match("*", "anything"));
        assert!(simple_match("logs-*", "logs-2024"));
        assert!(!simple_match("logs-*", "metrics-2024"));
        assert!(simple_match("*-prod-*", "app-prod-eu"));
        assert!(simple_match("a*b*c", "aXXbYYc"));
        assert!(!simple_match("a*b*c", "aXXbYY"));
        assert!(simple_match("exact", "exact"));
        assert!(!simple_match("exact", "exactly"));
    }

    #[test]
    fn test_template_matches_any_pattern() {
        let template =
            IndexTemplateMetadata::new("t", vec!["logs-*".to_string(), "audit".to_string()]);
        assert!(template.matches("logs-a"));
        assert!(template.matches("audit"));
        assert!(!template.matches("audit-1"));
    }
}
