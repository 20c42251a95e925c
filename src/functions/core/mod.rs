//! Generic functions that work on any document

mod alphabetical;
mod pattern;
mod schema;

pub use alphabetical::Alphabetical;
pub use pattern::{Casing, Pattern};
pub use schema::Schema;

use super::{field_path, field_value, located_violation, violation, FunctionRegistry};
use crate::model::templates;
use crate::model::{
    options_as_string_map, FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult,
};
use crate::node::{NodeKind, NodeRef};
use serde_json::Value;
use std::sync::Arc;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register("truthy", Arc::new(Truthy));
    registry.register("falsy", Arc::new(Falsy));
    registry.register("defined", Arc::new(Defined));
    registry.register("undefined", Arc::new(Undefined));
    registry.register("blank", Arc::new(Blank));
    registry.register("casing", Arc::new(Casing));
    registry.register("alphabetical", Arc::new(Alphabetical));
    registry.register("enumeration", Arc::new(Enumeration));
    registry.register("pattern", Arc::new(Pattern::default()));
    registry.register("length", Arc::new(Length));
    registry.register("xor", Arc::new(Xor));
    registry.register("schema", Arc::new(Schema::new("schema")));
}

/// Is a scalar value falsy: empty, `false`, `0` or null
fn falsy_scalar(node: &NodeRef) -> bool {
    node.is_null()
        || (node.is_scalar() && matches!(node.value.as_str(), "" | "false" | "0"))
}

/// Is a value empty: whitespace, null, or a collection without entries
fn blank_value(node: &NodeRef) -> bool {
    match node.kind {
        NodeKind::Mapping | NodeKind::Sequence => node.content.is_empty(),
        _ => node.is_null() || node.value.trim().is_empty(),
    }
}

/// The name used in messages: the field, or the matched path
fn subject(context: &RuleFunctionContext) -> String {
    if context.rule_action.field.is_empty() {
        context.given.clone()
    } else {
        context.rule_action.field.clone()
    }
}

/// Comma separated string, or an array of scalars
pub(crate) fn option_list(options: &Value, key: &str) -> Vec<String> {
    match options.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Number option, either a number or a numeric string
pub(crate) fn option_number(options: &Value, key: &str) -> Option<f64> {
    match options.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The field must be set to a truthy value
pub struct Truthy;

impl RuleFunction for Truthy {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            let failed = match &found.value_node {
                Some(value) if found.found => falsy_scalar(value),
                _ => true,
            };
            if failed {
                let message = context.rule.message_or(&templates::field_validation(
                    context.rule_message(),
                    &subject(context),
                    "set",
                ));
                let anchor = found.key_node.as_ref().unwrap_or(node);
                results.push(violation(context, message, anchor, field_path(context)));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("truthy")
    }
}

/// The field must be missing or falsy
pub struct Falsy;

impl RuleFunction for Falsy {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            if let Some(value) = found.value_node.as_ref().filter(|_| found.found) {
                if !falsy_scalar(value) {
                    let message = context.rule.message_or(&templates::field_validation(
                        context.rule_message(),
                        &subject(context),
                        "falsy",
                    ));
                    let anchor = found.key_node.as_ref().unwrap_or(value);
                    results.push(violation(context, message, anchor, field_path(context)));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("falsy")
    }
}

/// The field must exist
pub struct Defined;

impl RuleFunction for Defined {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let mut results = Vec::new();
        for node in nodes {
            if !field_value(node, context).found {
                let message = context.rule.message_or(&templates::field_validation(
                    context.rule_message(),
                    &context.rule_action.field,
                    "defined",
                ));
                results.push(located_violation(context, message, node, &context.given));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("defined").requires_field()
    }
}

/// The field must not exist
pub struct Undefined;

impl RuleFunction for Undefined {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            if found.found && !context.rule_action.field.is_empty() {
                let message = context.rule.message_or(&templates::field_validation(
                    context.rule_message(),
                    &context.rule_action.field,
                    "undefined",
                ));
                let anchor = found.key_node.as_ref().unwrap_or(node);
                results.push(violation(context, message, anchor, field_path(context)));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("undefined").requires_field()
    }
}

/// The field, when present, must be empty
pub struct Blank;

impl RuleFunction for Blank {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            if let Some(value) = found.value_node.as_ref().filter(|_| found.found) {
                if !blank_value(value) {
                    let message = context.rule.message_or(&templates::field_validation(
                        context.rule_message(),
                        &subject(context),
                        "blank",
                    ));
                    results.push(violation(context, message, value, field_path(context)));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("blank")
    }
}

/// The value must be one of a fixed set
pub struct Enumeration;

impl RuleFunction for Enumeration {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let values = option_list(&context.options, "values");
        if values.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            let Some(value) = found.value_node.filter(|_| found.found) else {
                continue;
            };
            let candidates: Vec<&NodeRef> = if value.is_seq() {
                value.content.iter().filter(|n| n.is_scalar()).collect()
            } else if value.is_scalar() {
                vec![&value]
            } else {
                Vec::new()
            };
            for candidate in candidates {
                if !values.iter().any(|v| v == candidate.value.trim()) {
                    let message = context.rule.message_or(&templates::enumeration(
                        context.rule_message(),
                        &candidate.value,
                        &values.join(", "),
                    ));
                    results.push(violation(context, message, candidate, field_path(context)));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("enumeration")
            .with_property("values", "'enumeration' requires a set of values to operate against")
            .with_required(&["values"])
            .with_min_properties(1)
            .with_error_message(
                "'enumeration' needs 'values' to operate. A valid example of 'values' are: 'cake, egg, milk'",
            )
    }
}

/// Bounds on a string length, a number, or a collection size
pub struct Length;

fn length_error(subject: &str, condition: &str, bound: f64) -> String {
    format!("'{}' {} '{}'", subject, condition, bound)
}

impl RuleFunction for Length {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let min = option_number(&context.options, "min");
        let max = option_number(&context.options, "max");
        if min.is_none() && max.is_none() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            let Some(value) = found.value_node.filter(|_| found.found) else {
                continue;
            };
            let (measure, shown) = match value.kind {
                NodeKind::Mapping => ((value.content.len() / 2) as f64, subject(context)),
                NodeKind::Sequence => (value.content.len() as f64, subject(context)),
                _ if value.is_int() || value.is_float() => {
                    (value.as_f64().unwrap_or_default(), value.value.clone())
                }
                _ => (value.value.chars().count() as f64, value.value.clone()),
            };
            let message = match (min, max) {
                (Some(min), _) if measure < min => {
                    Some(length_error(&shown, "must be longer/greater than", min))
                }
                (_, Some(max)) if measure > max => {
                    Some(length_error(&shown, "must not be longer/greater than", max))
                }
                _ => None,
            };
            if let Some(message) = message {
                results.push(violation(
                    context,
                    context.rule.message_or(&message),
                    &value,
                    field_path(context),
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("length")
            .with_property("min", "'length' requires minimum value to check against")
            .with_property("max", "'length' needs a maximum value to check against")
            .with_min_properties(1)
            .with_max_properties(2)
            .with_error_message("'length' needs 'min' or 'max' (or both) properties being set to operate")
    }
}

/// Exactly one of two properties must be present
pub struct Xor;

impl RuleFunction for Xor {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let properties = option_list(&context.options, "properties");
        if properties.len() != 2 {
            return Vec::new();
        }
        let mut results = Vec::new();
        for node in nodes {
            let target = field_value(node, context);
            let Some(target) = target.value_node.filter(|_| target.found) else {
                continue;
            };
            let seen = properties.iter().filter(|p| target.has_key(p)).count();
            if seen != 1 {
                let message = context.rule.message_or(&templates::xor(
                    context.rule_message(),
                    &properties[0],
                    &properties[1],
                ));
                results.push(violation(context, message, &target, field_path(context)));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("xor")
            .with_property("properties", "'xor' requires two values")
            .with_required(&["properties"])
            .with_min_properties(2)
            .with_max_properties(2)
            .with_error_message(
                "'xor' function has invalid options supplied. Example valid options are 'properties' = 'a, b' or 'properties' = '1, 2'",
            )
    }
}

/// Options flattened to strings, for functions that read them that way
pub(crate) fn string_options(context: &RuleFunctionContext) -> indexmap::IndexMap<String, String> {
    options_as_string_map(&context.options)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::validate_options;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        let node = root("info:\n  title: pets\n  description: ''\n  version: 0\n");
        for (field, fails) in [
            ("info.title", false),
            ("info.description", true),
            ("info.version", true),
            ("info.contact", true),
        ] {
            let ctx = context("truthy", field, json!(null));
            assert_eq!(Truthy.run_rule(&[node.clone()], &ctx).len(), fails as usize, "{}", field);
        }
        let ctx = context("truthy", "info.contact", json!(null));
        let results = Truthy.run_rule(&[node], &ctx);
        assert_eq!(results[0].message, "test rule: `info.contact` must be set");
        assert_eq!(results[0].path, "$.info.contact");
        assert_eq!(results[0].rule_id, "test-truthy");
    }

    #[test]
    fn test_falsy_and_blank() {
        let node = root("a: true\nb: false\nc: '  '\nd: [1]\n");
        assert_eq!(Falsy.run_rule(&[node.clone()], &context("falsy", "a", json!(null))).len(), 1);
        assert!(Falsy.run_rule(&[node.clone()], &context("falsy", "b", json!(null))).is_empty());
        assert!(Falsy.run_rule(&[node.clone()], &context("falsy", "missing", json!(null))).is_empty());
        assert!(Blank.run_rule(&[node.clone()], &context("blank", "c", json!(null))).is_empty());
        assert_eq!(Blank.run_rule(&[node], &context("blank", "d", json!(null))).len(), 1);
    }

    #[test]
    fn test_defined_and_undefined() {
        let node = root("name: pets\nin: query\n");
        let ctx = context("defined", "schema", json!(null)).with_given("$.parameters[0]");
        let results = Defined.run_rule(&[node.clone()], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "test rule: `schema` must be defined");
        assert_eq!(results[0].path, "$.parameters[0]");
        assert!(Defined.run_rule(&[node.clone()], &context("defined", "name", json!(null))).is_empty());

        let ctx = context("undefined", "in", json!(null));
        let results = Undefined.run_rule(&[node], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_node.as_ref().unwrap().value, "in");
        assert_eq!(results[0].message, "test rule: `in` must be undefined");
    }

    #[test]
    fn test_defined_requires_field() {
        let action = crate::model::RuleAction::new("defined");
        let errors = validate_options(&Defined.schema(), &Value::Null, &action).unwrap_err();
        assert_eq!(errors, vec!["'defined' requires a 'field' value to be set"]);
    }

    #[test]
    fn test_enumeration() {
        let node = root("in: cookie\nlist: [query, body]\n");
        let ctx = context("enumeration", "in", json!({"values": "query, header, path"}));
        let results = Enumeration.run_rule(&[node.clone()], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].message,
            "test rule: `cookie` must equal to one of: query, header, path"
        );
        let ctx = context("enumeration", "list", json!({"values": ["query", "path"]}));
        assert_eq!(Enumeration.run_rule(&[node], &ctx).len(), 1);
    }

    #[test]
    fn test_length() {
        let node = root("name: abc\ncount: 12\nratio: 0.5\ntags: [a, b, c]\n");
        let run = |field: &str, options: Value| {
            Length.run_rule(&[node.clone()], &context("length", field, options))
        };
        assert_eq!(run("name", json!({"min": 4}))[0].message, "'abc' must be longer/greater than '4'");
        assert!(run("name", json!({"min": 3})).is_empty());
        assert_eq!(
            run("count", json!({"max": 10}))[0].message,
            "'12' must not be longer/greater than '10'"
        );
        assert_eq!(run("ratio", json!({"min": 1})).len(), 1);
        assert_eq!(run("tags", json!({"max": "2"}))[0].message, "'tags' must not be longer/greater than '2'");
        assert!(run("missing", json!({"min": 1})).is_empty());
    }

    #[test]
    fn test_xor() {
        let ctx = context("xor", "", json!({"properties": ["example", "examples"]}));
        let both = root("example: 1\nexamples: {}\n");
        let one = root("example: 1\n");
        let none = root("type: string\n");
        assert_eq!(Xor.run_rule(&[both], &ctx).len(), 1);
        assert!(Xor.run_rule(&[one], &ctx).is_empty());
        let results = Xor.run_rule(&[none], &ctx);
        assert_eq!(
            results[0].message,
            "test rule: `example` and `examples` must not be both defined or undefined"
        );
    }

    #[test]
    fn test_option_validation() {
        let action = crate::model::RuleAction::new("xor");
        assert!(validate_options(&Xor.schema(), &json!({"properties": "a, b"}), &action).is_ok());
        assert!(validate_options(&Xor.schema(), &json!({"properties": "a"}), &action).is_err());
        assert!(validate_options(&Length.schema(), &json!({"min": 1, "max": 2}), &action).is_ok());
        let errors = validate_options(&Length.schema(), &json!({"least": 1}), &action).unwrap_err();
        assert!(errors[0].contains("unknown property 'least'"));
    }
}
