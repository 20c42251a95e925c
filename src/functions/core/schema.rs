//! JSON Schema validation of matched values

use crate::functions::{field_path, field_value, violation};
use crate::model::{FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult};
use crate::node::NodeRef;
use dashmap::DashMap;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::Arc;

/// Validate values against the `schema` option
pub struct Schema {
    name: String,
    validators: DashMap<String, Arc<Validator>>,
}

impl Schema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            validators: DashMap::new(),
        }
    }

    fn validator(&self, schema: &Value) -> Result<Arc<Validator>, String> {
        let key = schema.to_string();
        if let Some(found) = self.validators.get(&key) {
            return Ok(Arc::clone(found.value()));
        }
        let validator = Arc::new(jsonschema::validator_for(schema).map_err(|e| e.to_string())?);
        self.validators.insert(key, Arc::clone(&validator));
        Ok(validator)
    }
}

impl RuleFunction for Schema {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(schema) = context.options.get("schema") else {
            return Vec::new();
        };
        let force = context
            .options
            .get("forceValidation")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let unpack = context
            .options
            .get("unpack")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let description = context.rule_message();

        let validator = match self.validator(schema) {
            Ok(validator) => validator,
            Err(error) => {
                return nodes
                    .first()
                    .map(|node| {
                        vec![violation(
                            context,
                            format!("{}: schema cannot be compiled: {}", description, error),
                            node,
                            field_path(context),
                        )]
                    })
                    .unwrap_or_default();
            }
        };

        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            match found.value_node.filter(|_| found.found) {
                Some(value) => {
                    let targets = if unpack && value.is_seq() {
                        value.content.clone()
                    } else {
                        vec![value]
                    };
                    for target in &targets {
                        let instance = target.to_json();
                        for error in validator.iter_errors(&instance) {
                            results.push(violation(
                                context,
                                format!("{}: {}", description, error),
                                target,
                                field_path(context),
                            ));
                        }
                    }
                }
                None if force => {
                    results.push(violation(
                        context,
                        format!(
                            "{}: `{}`, is missing and is required",
                            description, context.rule_action.field
                        ),
                        node,
                        field_path(context),
                    ));
                }
                None => {}
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new(&self.name)
            .with_property("schema", "a JSON schema to validate the value against")
            .with_property("forceValidation", "report a missing field as a violation")
            .with_property("unpack", "validate each item of a sequence")
            .with_required(&["schema"])
            .with_error_message("'schema' needs a 'schema' property to validate against")
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_violations() {
        let schema = Schema::new("schema");
        let ctx = context(
            "schema",
            "info",
            json!({"schema": {"type": "object", "required": ["title"], "properties": {"title": {"type": "string"}}}}),
        );
        assert!(schema.run_rule(&[root("info:\n  title: pets\n")], &ctx).is_empty());
        let results = schema.run_rule(&[root("info:\n  version: 1\n")], &ctx);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.starts_with("test rule: "));
        assert!(results[0].message.contains("title"));
        assert_eq!(results[0].path, "$.info");
    }

    #[test]
    fn test_missing_field_forced() {
        let schema = Schema::new("schema");
        let ctx = context("schema", "info", json!({"schema": {"type": "object"}}));
        assert!(schema.run_rule(&[root("x: 1\n")], &ctx).is_empty());
        let ctx = context(
            "schema",
            "info",
            json!({"schema": {"type": "object"}, "forceValidation": true}),
        );
        let results = schema.run_rule(&[root("x: 1\n")], &ctx);
        assert_eq!(results[0].message, "test rule: `info`, is missing and is required");
    }

    #[test]
    fn test_unpack_sequence() {
        let schema = Schema::new("schema");
        let ctx = context(
            "schema",
            "tags",
            json!({"schema": {"type": "string"}, "unpack": true}),
        );
        let results = schema.run_rule(&[root("tags: [a, 2, b]\n")], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_node.as_ref().unwrap().value, "2");
    }

    #[test]
    fn test_bad_schema() {
        let schema = Schema::new("schema");
        let ctx = context("schema", "", json!({"schema": {"type": 12}}));
        let results = schema.run_rule(&[root("x: 1\n")], &ctx);
        assert!(results[0].message.contains("schema cannot be compiled"));
    }
}
