//! Schema shape checks: enums, types, discriminators, `$ref` placement and
//! orphaned components

use super::{collect_schemas, unresolved_root, SchemaSite};
use crate::functions::schema_paths::locate_schema_property_paths;
use crate::functions::violation;
use crate::jsonpath::{append_index, append_key};
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::{NodeKind, NodeRef, Tag, MAX_SEARCH_DEPTH};
use std::collections::HashSet;

/// Does a scalar enum value fit the declared type
fn value_fits(value: &NodeRef, kind: &str) -> bool {
    if value.is_null() {
        return true;
    }
    match kind {
        "string" => value.is_string(),
        "integer" => value.is_int(),
        "number" => value.is_int() || value.is_float(),
        "boolean" => value.is_bool(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Enum values must match the schema's `type`
pub struct TypedEnum;

impl RuleFunction for TypedEnum {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for found in context.index.all_enums() {
            let Some(kind) = found.schema_type.as_deref() else {
                continue;
            };
            for (i, value) in found.node.children().iter().enumerate() {
                if value.is_scalar() && !value_fits(value, kind) {
                    results.push(violation(
                        context,
                        format!("enum type mismatch: `{}` is not of type `{}`", value.value, kind),
                        value,
                        append_index(&found.path, i),
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("typedEnum")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Enum values appear once
pub struct DuplicatedEnum;

impl RuleFunction for DuplicatedEnum {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for found in context.index.all_enums() {
            let mut seen: HashSet<(Tag, &str)> = HashSet::new();
            for (i, value) in found.node.children().iter().enumerate() {
                if value.is_scalar() && !seen.insert((value.tag, value.value.as_str())) {
                    results.push(violation(
                        context,
                        format!("enum contains a duplicate: {}", value.value),
                        value,
                        append_index(&found.path, i),
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("duplicatedEnum")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// A `$ref` stands alone in its mapping. Example values and extensions
/// are not inspected.
pub struct RefSiblings;

impl RefSiblings {
    fn walk(node: &NodeRef, path: &str, context: &RuleFunctionContext, results: &mut Vec<RuleFunctionResult>, depth: usize) {
        if depth > MAX_SEARCH_DEPTH {
            return;
        }
        match node.kind {
            NodeKind::Mapping => {
                if let Some((key, _)) = node.get_pair("$ref") {
                    if node.pairs().count() > 1 {
                        results.push(violation(
                            context,
                            "a $ref cannot be placed next to any other properties",
                            key,
                            path.to_string(),
                        ));
                    }
                }
                for (key, value) in node.pairs() {
                    let name = key.value.as_str();
                    if matches!(name, "example" | "examples") || name.starts_with("x-") {
                        continue;
                    }
                    Self::walk(value, &append_key(path, name), context, results, depth + 1);
                }
            }
            NodeKind::Sequence => {
                for (i, item) in node.content.iter().enumerate() {
                    Self::walk(item, &append_index(path, i), context, results, depth + 1);
                }
            }
            _ => {}
        }
    }
}

impl RuleFunction for RefSiblings {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for section in ["paths", "components", "parameters", "definitions", "responses"] {
            if let Some(node) = root.get(section) {
                Self::walk(node, &append_key("$", section), context, &mut results, 0);
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("refSiblings")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Swagger discriminators name a required string property
pub struct Discriminator;

impl RuleFunction for Discriminator {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(definitions) = unresolved_root(context)
            .filter(|_| !nodes.is_empty())
            .and_then(|r| r.get("definitions").cloned())
        else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for (name, schema) in definitions.pairs() {
            let Some((key, value)) = schema.get_pair("discriminator") else {
                continue;
            };
            let path = append_key("$.definitions", &name.value);
            if !value.is_string() {
                results.push(violation(
                    context,
                    format!("the schema '{}' uses a non string discriminator", name.value),
                    key,
                    path.clone(),
                ));
            }
            let Some(required) = schema.get("required") else {
                results.push(violation(
                    context,
                    format!(
                        "schema '{}' uses a discriminator but has no 'required' property set",
                        name.value
                    ),
                    key,
                    path,
                ));
                continue;
            };
            if !required.children().iter().any(|r| r.value == value.value) {
                results.push(violation(
                    context,
                    format!(
                        "schema '{}' uses a discriminator but is not included in 'required' properties",
                        name.value
                    ),
                    key,
                    path,
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasDiscriminator")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

const SCHEMA_TYPES: [&str; 7] = ["string", "number", "integer", "boolean", "array", "object", "null"];

const BOUNDS: [(&str, &str); 4] = [
    ("minLength", "maxLength"),
    ("minimum", "maximum"),
    ("minItems", "maxItems"),
    ("minProperties", "maxProperties"),
];

/// Schemas use known types, their `required` properties exist, and their
/// lower bounds do not exceed their upper bounds
pub struct SchemaTypeCheck;

impl SchemaTypeCheck {
    fn report(
        context: &RuleFunctionContext,
        site: &SchemaSite,
        message: String,
        anchor: &NodeRef,
        field: &str,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        let (primary, all) = locate_schema_property_paths(context, Some(&site.node), &site.path);
        let result = violation(
            context,
            context.rule.message_or(&message),
            anchor,
            append_key(&primary, field),
        );
        let result = if all.len() > 1 {
            result.with_paths(all.iter().map(|p| append_key(p, field)).collect())
        } else {
            result
        };
        results.push(result);
    }

    fn check(context: &RuleFunctionContext, site: &SchemaSite, results: &mut Vec<RuleFunctionResult>) {
        let schema = &site.node;
        if let Some(kind) = schema.get("type") {
            let values: Vec<&NodeRef> = if kind.is_seq() {
                kind.children().iter().collect()
            } else {
                vec![kind]
            };
            for value in values {
                if !SCHEMA_TYPES.contains(&value.value.as_str()) {
                    Self::report(context, site, templates::unknown_schema_type(&value.value), value, "type", results);
                }
            }
        }

        let polymorphic = ["allOf", "anyOf", "oneOf"].iter().any(|k| schema.has_key(k));
        if let (Some(required), Some(properties)) = (schema.get("required"), schema.get("properties")) {
            if !polymorphic {
                for field in required.children() {
                    if field.is_scalar() && !properties.has_key(&field.value) {
                        Self::report(
                            context,
                            site,
                            templates::required_field_missing(&field.value),
                            field,
                            "required",
                            results,
                        );
                    }
                }
            }
        }

        for (low, high) in BOUNDS {
            let (Some(min), Some(max)) = (schema.get(low), schema.get(high)) else {
                continue;
            };
            if let (Some(a), Some(b)) = (min.as_f64(), max.as_f64()) {
                if a > b {
                    Self::report(
                        context,
                        site,
                        format!("`{}` should not be greater than `{}`", low, high),
                        min,
                        low,
                        results,
                    );
                }
            }
        }
    }
}

impl RuleFunction for SchemaTypeCheck {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for site in collect_schemas(&root) {
            Self::check(context, &site, &mut results);
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("schemaTypeCheck")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

fn collect_refs(node: &NodeRef, refs: &mut Vec<String>, depth: usize) {
    if depth > MAX_SEARCH_DEPTH {
        return;
    }
    if node.is_map() {
        for (key, value) in node.pairs() {
            if key.value == "$ref" && value.is_scalar() {
                refs.push(value.value.clone());
            } else {
                collect_refs(value, refs, depth + 1);
            }
        }
    } else if node.is_seq() {
        for item in node.children() {
            collect_refs(item, refs, depth + 1);
        }
    }
}

/// Components and definitions nothing refers to
pub struct UnusedComponent;

impl UnusedComponent {
    /// (pointer, json path, key) for every reusable definition
    fn definitions(root: &NodeRef) -> Vec<(String, String, NodeRef)> {
        let mut found = Vec::new();
        if let Some(components) = root.get("components") {
            for (section, entries) in components.pairs() {
                // security schemes are referenced by name, not by pointer
                if section.value == "securitySchemes" || section.value.starts_with("x-") {
                    continue;
                }
                let base = append_key("$.components", &section.value);
                for (name, _) in entries.pairs() {
                    found.push((
                        format!("#/components/{}/{}", section.value, name.value),
                        append_key(&base, &name.value),
                        NodeRef::clone(name),
                    ));
                }
            }
        }
        for section in ["definitions", "parameters", "responses"] {
            if let Some(entries) = root.get(section) {
                for (name, _) in entries.pairs() {
                    found.push((
                        format!("#/{}/{}", section, name.value),
                        append_key(&append_key("$", section), &name.value),
                        NodeRef::clone(name),
                    ));
                }
            }
        }
        found
    }
}

impl RuleFunction for UnusedComponent {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut refs = Vec::new();
        collect_refs(&root, &mut refs, 0);
        // fragments of external references count too
        let local: Vec<&str> = refs
            .iter()
            .map(|r| match r.find('#') {
                Some(at) => &r[at..],
                None => r.as_str(),
            })
            .collect();

        Self::definitions(&root)
            .into_iter()
            .filter(|(pointer, _, _)| {
                !local
                    .iter()
                    .any(|r| *r == pointer || r.strip_prefix(pointer.as_str()).is_some_and(|rest| rest.starts_with('/')))
            })
            .map(|(pointer, path, key)| {
                let name = pointer.rsplit('/').next().unwrap_or_default().to_string();
                violation(
                    context,
                    format!("the definition '{}' is potentially unused or has been orphaned", name),
                    &key,
                    path,
                )
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasUnusedComponent")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}
