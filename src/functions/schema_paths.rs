//! Every path a schema appears at
//!
//! The same schema is checked by several rules, so lookups are cached in the
//! context's schema path cache, keyed by the schema's position. Only full
//! lookups are cached; a fallback answer never is.

use crate::model::RuleFunctionContext;
use crate::node::NodeRef;

fn cache_key(node: &NodeRef) -> String {
    format!("{}:{}", node.line, node.column)
}

/// The primary path of `schema` and every path it is known by.
///
/// Without a schema node or a doctor, `fallback` is the only answer.
pub fn locate_schema_property_paths(
    context: &RuleFunctionContext,
    schema: Option<&NodeRef>,
    fallback: &str,
) -> (String, Vec<String>) {
    let fallback_answer = || (fallback.to_string(), vec![fallback.to_string()]);
    let (Some(schema), Some(doctor)) = (schema, context.doctor.as_ref()) else {
        return fallback_answer();
    };

    let key = cache_key(schema);
    if let Some(paths) = context.schema_path_cache.get(&key) {
        if let Some(first) = paths.first() {
            return (first.clone(), paths.clone());
        }
    }

    let paths: Vec<String> = doctor
        .locate_models_by_key_and_value(None, schema)
        .iter()
        .map(|m| m.generate_json_path())
        .collect();
    match paths.first() {
        Some(first) => {
            let first = first.clone();
            context.schema_path_cache.insert(key, paths.clone());
            (first, paths)
        }
        None => fallback_answer(),
    }
}
