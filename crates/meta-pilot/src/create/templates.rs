//! Template selection and template mapping/alias merge

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use meta_core::{
    merge_defaults, parse_mapping, AliasMetadata, IndexTemplateMetadata, MappingSource, Metadata,
    SINGLE_MAPPING_NAME,
};

use crate::alias::AliasValidator;
use crate::request::CreateIndexRequest;
use crate::CreateIndexError;

/// Placeholder in template alias names replaced by the new index name
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Templates matching an index name, highest order first
///
/// Templates with equal order keep their name order.
pub fn find_templates<'a>(metadata: &'a Metadata, index: &str) -> Vec<&'a IndexTemplateMetadata> {
    let mut templates: Vec<&IndexTemplateMetadata> = metadata
        .templates()
        .values()
        .filter(|t| t.matches(index))
        .collect();
    templates.sort_by(|a, b| b.order.cmp(&a.order));
    templates
}

/// Merge template mappings into the request mappings and collect template aliases
///
/// `mappings` holds the parsed request mappings keyed by type and receives
/// the template mappings; request values always win. Returns the template
/// aliases that survive, keyed by their final name.
pub fn apply_templates(
    request: &CreateIndexRequest,
    templates: &[&IndexTemplateMetadata],
    mappings: &mut BTreeMap<String, MappingSource>,
    metadata: &Metadata,
    validator: &dyn AliasValidator,
) -> Result<BTreeMap<String, AliasMetadata>, CreateIndexError> {
    let mut template_aliases: BTreeMap<String, AliasMetadata> = BTreeMap::new();

    for template in templates {
        for (type_name, source) in &template.mappings {
            let parsed = parse_mapping(type_name, source)?;
            merge_template_mapping(mappings, template, type_name, parsed);
        }

        for (name, alias) in &template.aliases {
            if request.has_alias(name) || template_aliases.contains_key(name) {
                continue;
            }
            let alias = if alias.alias.contains(INDEX_PLACEHOLDER) {
                alias.renamed(alias.alias.replace(INDEX_PLACEHOLDER, &request.index))
            } else {
                alias.clone()
            };
            validator.validate_alias(&alias, &request.index, metadata)?;
            template_aliases.insert(alias.alias.clone(), alias);
        }
    }

    Ok(template_aliases)
}

fn merge_template_mapping(
    mappings: &mut BTreeMap<String, MappingSource>,
    template: &IndexTemplateMetadata,
    type_name: &str,
    parsed: MappingSource,
) {
    if let Some(existing) = mappings.get_mut(type_name) {
        merge_defaults(existing, &parsed);
        return;
    }

    // typeless template, typed request mapping
    if mappings.len() == 1 && type_name == SINGLE_MAPPING_NAME {
        if let Some((request_type, existing)) = mappings.iter_mut().next() {
            let rerooted = reroot(request_type, parsed);
            merge_defaults(existing, &rerooted);
        }
        return;
    }

    // typed template, typeless request mapping
    if template.mappings.len() == 1 {
        if let Some(existing) = mappings.get_mut(SINGLE_MAPPING_NAME) {
            let rerooted = reroot(SINGLE_MAPPING_NAME, parsed);
            merge_defaults(existing, &rerooted);
            return;
        }
    }

    mappings.insert(type_name.to_string(), parsed);
}

/// Keep the template body but root it at another type name
fn reroot(type_name: &str, source: MappingSource) -> MappingSource {
    let body = source
        .into_iter()
        .next()
        .map(|(_, body)| body)
        .unwrap_or_else(|| Value::Object(Map::new()));
    let mut rerooted = Map::new();
    rerooted.insert(type_name.to_string(), body);
    rerooted
}
