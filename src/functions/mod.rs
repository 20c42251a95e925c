//! Built-in rule functions
//!
//! Functions are looked up by name through a [`FunctionRegistry`]. The
//! registry is an explicit value: the motor receives one, the rule-set
//! compiler checks names against one, and user scripts are registered into
//! a copy of the built-in set.

pub mod core;
pub mod openapi;
pub mod owasp;
pub mod schema_direction;
pub mod schema_paths;

use crate::jsonpath::append_key;
use crate::model::{RuleFunction, RuleFunctionContext, RuleFunctionResult};
use crate::node::{find_field_path, FieldPathOptions, FieldPathResult, NodeRef};
use indexmap::IndexMap;
use std::sync::Arc;

/// Name to function map
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Arc<dyn RuleFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in function: core, OpenAPI and OWASP
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        core::register(&mut registry);
        openapi::register(&mut registry);
        owasp::register(&mut registry);
        registry
    }

    /// Add or replace a function
    pub fn register(&mut self, name: &str, function: Arc<dyn RuleFunction>) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn RuleFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn RuleFunction>)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// The `field` of the invoking action, looked up under `node`. Without a
/// field the node itself is the value.
pub(crate) fn field_value(node: &NodeRef, context: &RuleFunctionContext) -> FieldPathResult {
    let field = context.rule_action.field.as_str();
    if field.is_empty() {
        return FieldPathResult {
            key_node: None,
            value_node: Some(Arc::clone(node)),
            found: true,
        };
    }
    find_field_path(field, node, FieldPathOptions::default())
}

/// The matched path, extended by the action's field when there is one
pub(crate) fn field_path(context: &RuleFunctionContext) -> String {
    let field = context.rule_action.field.as_str();
    let given = if context.given.is_empty() { "$" } else { &context.given };
    if field.is_empty() {
        given.to_string()
    } else if field.contains(['.', '[']) {
        format!("{}.{}", given, field)
    } else {
        append_key(given, field)
    }
}

/// Every path the doctor knows `node` by. Empty without a doctor.
pub(crate) fn located_paths(context: &RuleFunctionContext, node: &NodeRef) -> Vec<String> {
    context
        .doctor
        .as_ref()
        .map(|doctor| {
            doctor
                .locate_models_by_key_and_value(None, node)
                .iter()
                .map(|m| m.generate_json_path())
                .collect()
        })
        .unwrap_or_default()
}

/// A result for `node` at `path`, carrying the invoking rule
pub(crate) fn violation(
    context: &RuleFunctionContext,
    message: impl Into<String>,
    node: &NodeRef,
    path: impl Into<String>,
) -> RuleFunctionResult {
    RuleFunctionResult::pooled()
        .with_message(message)
        .with_node(node)
        .with_path(path)
        .with_rule(&context.rule)
}

/// Like [`violation`], but the path comes from the doctor when it knows the
/// node, and every other location is listed as well
pub(crate) fn located_violation(
    context: &RuleFunctionContext,
    message: impl Into<String>,
    node: &NodeRef,
    fallback: &str,
) -> RuleFunctionResult {
    let paths = located_paths(context, node);
    let path = paths.first().cloned().unwrap_or_else(|| fallback.to_string());
    let result = violation(context, message, node, path);
    if paths.len() > 1 {
        result.with_paths(paths)
    } else {
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::doctor::NodeDoctor;
    use crate::index::{IndexConfig, SpecIndex};
    use crate::model::{Rule, RuleAction, RuleFunctionContext};
    use crate::node::{parse_document, NodeRef};
    use crate::resolver::resolve_document;
    use crate::spec_info::extract_spec_info;
    use serde_json::Value;
    use std::sync::Arc;

    /// The root mapping of a YAML snippet
    pub fn root(yaml: &str) -> NodeRef {
        let doc = parse_document(yaml).unwrap();
        doc.root().cloned().unwrap()
    }

    /// A context for one action of a throwaway rule
    pub fn context(function: &str, field: &str, options: Value) -> RuleFunctionContext {
        let mut action = RuleAction::new(function).with_field(field);
        if !options.is_null() {
            action = action.with_options(options);
        }
        let rule = Arc::new(
            Rule::new(&format!("test-{}", function))
                .with_description("test rule")
                .with_then(action.clone()),
        );
        RuleFunctionContext::new(rule).with_action(action).with_given("$")
    }

    /// A context over a whole document: index, resolved tree and doctor
    pub fn document_context(spec: &str, function: &str, options: Value) -> (RuleFunctionContext, NodeRef) {
        let info = extract_spec_info(spec.as_bytes()).unwrap();
        let doc = parse_document(spec).unwrap();
        let index = SpecIndex::new(&doc, IndexConfig::default());
        let (resolved, _) = resolve_document(&index);
        let doctor = NodeDoctor::new(&resolved);
        let ctx = context(function, "", options)
            .with_index(Arc::new(index))
            .with_document(Arc::clone(&resolved))
            .with_spec_info(Arc::new(info))
            .with_doctor(Arc::new(doctor));
        let root = resolved.root().cloned().unwrap();
        (ctx, root)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_registry() {
        let registry = FunctionRegistry::builtin();
        for name in ["truthy", "pattern", "schema", "oasOpIdUnique", "owaspNoApiKeysInUrl"] {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert_eq!(registry.names()[0], "truthy");
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn test_field_path_and_value() {
        let node = root("info:\n  title: pets\n");
        let ctx = context("truthy", "info.title", json!(null)).with_given("$");
        assert_eq!(field_path(&ctx), "$.info.title");
        assert_eq!(field_value(&node, &ctx).value_node.unwrap().value, "pets");

        let ctx = context("truthy", "x-name", json!(null)).with_given("$.info");
        assert_eq!(field_path(&ctx), "$.info.x-name");
        let ctx = context("truthy", "", json!(null)).with_given("$.info");
        assert_eq!(field_path(&ctx), "$.info");
    }
}
