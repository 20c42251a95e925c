//! Schema limits: sizes, ranges, formats and open-ended objects

use crate::functions::openapi::{collect_schemas, schema_types, unresolved_root};
use crate::functions::schema_paths::locate_schema_property_paths;
use crate::functions::violation;
use crate::jsonpath::append_key;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OWASP,
};
use crate::node::NodeRef;

/// A problem with one schema: the message and the keyword it is anchored on
type Finding = Option<(&'static str, &'static str)>;

/// Run `check` over every schema written in the document. Results point at
/// every path the schema is known by.
fn check_schemas(
    nodes: &[NodeRef],
    context: &RuleFunctionContext,
    check: impl Fn(&NodeRef, &[String]) -> Finding,
) -> Vec<RuleFunctionResult> {
    let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
        return Vec::new();
    };
    let mut results = Vec::new();
    for site in collect_schemas(&root) {
        let types = schema_types(&site.node);
        let Some((message, keyword)) = check(&site.node, &types) else {
            continue;
        };
        let anchor = site.node.get(keyword).unwrap_or(&site.node);
        let (primary, all) = locate_schema_property_paths(context, Some(&site.node), &site.path);
        let result = violation(
            context,
            context.rule.message_or(message),
            anchor,
            append_key(&primary, keyword),
        );
        results.push(if all.len() > 1 {
            result.with_paths(all.iter().map(|p| append_key(p, keyword)).collect())
        } else {
            result
        });
    }
    results
}

fn has_any(schema: &NodeRef, keys: &[&str]) -> bool {
    keys.iter().any(|k| schema.has_key(k))
}

fn is_type(types: &[String], kind: &str) -> bool {
    types.iter().any(|t| t == kind)
}

/// Arrays declare `maxItems`
pub struct ArrayLimit;

impl RuleFunction for ArrayLimit {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, types| {
            (is_type(types, "array") && !schema.has_key("maxItems"))
                .then_some(("schema of type `array` must specify `maxItems`", "type"))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspArrayLimit")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Strings are bounded by `maxLength`, `const` or `enum`
pub struct StringLimit;

impl RuleFunction for StringLimit {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, types| {
            (is_type(types, "string") && !has_any(schema, &["maxLength", "const", "enum"]))
                .then_some(("schema of type `string` must specify `maxLength`, `const` or `enum`", "type"))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspStringLimit")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Strings are restricted by `format`, `const`, `enum` or `pattern`
pub struct StringRestricted;

impl RuleFunction for StringRestricted {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, types| {
            (is_type(types, "string") && !has_any(schema, &["format", "const", "enum", "pattern"])).then_some((
                "schema of type `string` must specify `format`, `const`, `enum` or `pattern`",
                "type",
            ))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspStringRestricted")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Integers have both a lower and an upper bound, inclusive or exclusive
pub struct IntegerLimit;

impl RuleFunction for IntegerLimit {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, types| {
            // 3.0 spells exclusive bounds as booleans next to minimum/maximum
            let bound = |inclusive: &str, exclusive: &str| {
                schema.has_key(inclusive) || schema.get(exclusive).is_some_and(|v| v.is_int() || v.is_float())
            };
            let bounded = bound("minimum", "exclusiveMinimum") && bound("maximum", "exclusiveMaximum");
            (is_type(types, "integer") && !bounded).then_some((
                "schema of type `integer` must specify `minimum` and `maximum` or `exclusiveMinimum` and `exclusiveMaximum`",
                "type",
            ))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspIntegerLimit")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Integers declare `int32` or `int64`
pub struct IntegerFormat;

impl RuleFunction for IntegerFormat {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, types| {
            let sized = matches!(schema.get_str("format"), Some("int32" | "int64"));
            (is_type(types, "integer") && !sized)
                .then_some(("schema of type `integer` must specify a format of `int32` or `int64`", "type"))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspIntegerFormat")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// `additionalProperties` is absent or `false`
pub struct NoAdditionalProperties;

impl RuleFunction for NoAdditionalProperties {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, _| {
            let open = schema
                .get("additionalProperties")
                .is_some_and(|v| v.is_map() || v.as_bool() == Some(true));
            open.then_some((
                "`additionalProperties` should not be set, or set to `false`",
                "additionalProperties",
            ))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspNoAdditionalProperties")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Object-valued `additionalProperties` comes with `maxProperties`
pub struct AdditionalPropertiesConstrained;

impl RuleFunction for AdditionalPropertiesConstrained {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        check_schemas(nodes, context, |schema, _| {
            let open = schema.get("additionalProperties").is_some_and(|v| v.is_map());
            (open && !schema.has_key("maxProperties")).then_some((
                "schema should also define `maxProperties` when `additionalProperties` is an object",
                "additionalProperties",
            ))
        })
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspAdditionalPropertiesConstrained")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::*;
    use serde_json::json;

    const SPEC: &str = "openapi: 3.0.0
paths: {}
components:
  schemas:
    Pet:
      type: object
      additionalProperties:
        type: string
        maxLength: 10
        format: name
      properties:
        tags:
          type: array
          items:
            type: string
            enum: [a, b]
        name:
          type: string
          maxLength: 20
        age:
          type: integer
          format: int32
          minimum: 0
          exclusiveMaximum: 30
        count:
          type: integer
          minimum: 0
    Open:
      type: object
      additionalProperties: true
      maxProperties: 3
";

    fn run(function: &dyn RuleFunction) -> Vec<String> {
        let (ctx, root) = document_context(SPEC, "owasp", json!(null));
        function.run_rule(&[root], &ctx).into_iter().map(|r| r.path).collect()
    }

    #[test]
    fn test_array_and_strings() {
        assert_eq!(run(&ArrayLimit), vec!["$.components.schemas.Pet.properties.tags.type"]);
        assert!(run(&StringLimit).is_empty());
        assert_eq!(run(&StringRestricted), vec!["$.components.schemas.Pet.properties.name.type"]);
    }

    #[test]
    fn test_integers() {
        assert_eq!(run(&IntegerLimit), vec!["$.components.schemas.Pet.properties.count.type"]);
        assert_eq!(run(&IntegerFormat), vec!["$.components.schemas.Pet.properties.count.type"]);
    }

    #[test]
    fn test_additional_properties() {
        assert_eq!(
            run(&NoAdditionalProperties),
            vec![
                "$.components.schemas.Pet.additionalProperties",
                "$.components.schemas.Open.additionalProperties"
            ]
        );
        assert_eq!(
            run(&AdditionalPropertiesConstrained),
            vec!["$.components.schemas.Pet.additionalProperties"]
        );
    }
}
