//! Example values: present, and valid against their schemas

use super::{collect_schemas, document_root, operations, unresolved_root, Operation};
use crate::functions::schema_direction::{schema_direction, SchemaDirection};
use crate::functions::violation;
use crate::jsonpath::append_key;
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::NodeRef;
use dashmap::DashMap;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::Arc;

/// Every media type of an operation's request body and responses, with
/// its JSONPath
fn media_types(op: &Operation) -> Vec<(NodeRef, String)> {
    let mut found = Vec::new();
    let mut content = |holder: &NodeRef, path: String| {
        if let Some(content) = holder.get("content") {
            let base = append_key(&path, "content");
            for (media, value) in content.pairs() {
                found.push((NodeRef::clone(value), append_key(&base, &media.value)));
            }
        }
    };
    if let Some(body) = op.node.get("requestBody") {
        content(body, append_key(&op.json_path, "requestBody"));
    }
    if let Some(responses) = op.node.get("responses") {
        let base = append_key(&op.json_path, "responses");
        for (code, response) in responses.pairs() {
            content(response, append_key(&base, &code.value));
        }
    }
    found
}

/// Drop properties from `required` that cannot appear in the direction
/// the schema flows: `readOnly` in requests, `writeOnly` in responses.
/// A schema used both ways (or not at all) gets both dropped.
fn relax_required(schema: &mut Value, direction: SchemaDirection) {
    let drop_read = direction != SchemaDirection::Response;
    let drop_write = direction != SchemaDirection::Request;
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    let hidden: Vec<String> = object
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter(|(_, p)| {
                    let flag = |k: &str| p.get(k).and_then(Value::as_bool).unwrap_or(false);
                    (drop_read && flag("readOnly")) || (drop_write && flag("writeOnly"))
                })
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default();
    if let Some(Value::Array(required)) = object.get_mut("required") {
        required.retain(|r| r.as_str().map_or(true, |r| !hidden.iter().any(|h| h == r)));
    }
    if let Some(Value::Object(props)) = object.get_mut("properties") {
        for prop in props.values_mut() {
            relax_required(prop, direction);
        }
    }
    for key in ["items", "additionalProperties", "not"] {
        if let Some(sub) = object.get_mut(key) {
            relax_required(sub, direction);
        }
    }
    for key in ["allOf", "anyOf", "oneOf"] {
        if let Some(Value::Array(list)) = object.get_mut(key) {
            for sub in list {
                relax_required(sub, direction);
            }
        }
    }
}

/// Turn an OpenAPI schema into plain JSON Schema: `nullable` becomes a
/// `null` type and examples are dropped
fn plain_schema(schema: &mut Value) {
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    object.remove("example");
    object.remove("examples");
    object.remove("discriminator");
    object.remove("xml");
    if object.remove("nullable").and_then(|n| n.as_bool()) == Some(true) {
        if let Some(Value::String(kind)) = object.get("type").cloned() {
            object.insert("type".to_string(), Value::from(vec![kind, "null".to_string()]));
        }
    }
    for (key, value) in object.iter_mut() {
        match (key.as_str(), value) {
            ("properties" | "patternProperties", Value::Object(map)) => {
                map.values_mut().for_each(plain_schema)
            }
            (_, value @ Value::Object(_)) => plain_schema(value),
            (_, Value::Array(items)) => items.iter_mut().for_each(plain_schema),
            _ => {}
        }
    }
}

/// Examples must validate against the schema they sit next to
#[derive(Default)]
pub struct ExampleSchema {
    validators: DashMap<String, Result<Arc<Validator>, String>>,
}

impl ExampleSchema {
    fn validator(&self, schema: &Value) -> Result<Arc<Validator>, String> {
        let key = schema.to_string();
        if let Some(found) = self.validators.get(&key) {
            return found.value().clone();
        }
        let compiled = jsonschema::validator_for(schema)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        self.validators.insert(key, compiled.clone());
        compiled
    }

    fn check(
        &self,
        schema: &Value,
        example: &NodeRef,
        label: &str,
        path: String,
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        let validator = match self.validator(schema) {
            Ok(v) => v,
            Err(error) => {
                log::debug!("schema at '{}' cannot be compiled: {}", path, error);
                return;
            }
        };
        let instance = example.to_json();
        let mut errors = validator.iter_errors(&instance);
        let first = errors.next().map(|error| error.to_string());
        if let Some(error) = first {
            results.push(violation(
                context,
                format!("{} is not valid against the schema: {}", label, error),
                example,
                path,
            ));
        }
    }

    fn prepared(schema: &NodeRef, direction: SchemaDirection) -> Value {
        let mut json = schema.to_json();
        plain_schema(&mut json);
        relax_required(&mut json, direction);
        json
    }
}

impl RuleFunction for ExampleSchema {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let unresolved = unresolved_root(context).unwrap_or_else(|| NodeRef::clone(&root));
        let mut results = Vec::new();

        for site in collect_schemas(&root) {
            let Some(example) = site.node.get("example") else {
                continue;
            };
            let direction = site
                .name
                .as_deref()
                .map(|name| schema_direction(&unresolved, name))
                .unwrap_or(SchemaDirection::None);
            let schema = Self::prepared(&site.node, direction);
            self.check(
                &schema,
                example,
                "schema example",
                append_key(&site.path, "example"),
                context,
                &mut results,
            );
        }

        for op in operations(&root) {
            for (media, path) in media_types(&op) {
                let Some(schema) = media.get("schema") else {
                    continue;
                };
                let schema = Self::prepared(schema, SchemaDirection::None);
                if let Some(example) = media.get("example") {
                    self.check(&schema, example, "media type example", append_key(&path, "example"), context, &mut results);
                }
                if let Some(examples) = media.get("examples") {
                    let base = append_key(&path, "examples");
                    for (name, entry) in examples.pairs() {
                        if let Some(value) = entry.get("value") {
                            self.check(
                                &schema,
                                value,
                                &format!("example `{}`", name.value),
                                append_key(&append_key(&base, &name.value), "value"),
                                context,
                                &mut results,
                            );
                        }
                    }
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasExampleSchema")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

fn has_example(node: &NodeRef) -> bool {
    node.has_key("example") || node.has_key("examples")
}

/// Media types without examples must give one for every schema property
pub struct MissingExample;

impl RuleFunction for MissingExample {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for op in operations(&root) {
            for (media, path) in media_types(&op) {
                if has_example(&media) {
                    continue;
                }
                let Some(schema) = media.get("schema").filter(|s| !has_example(s)) else {
                    continue;
                };
                let Some(properties) = schema.get("properties") else {
                    continue;
                };
                let base = append_key(&append_key(&path, "schema"), "properties");
                for (name, property) in properties.pairs() {
                    if !has_example(property) {
                        results.push(violation(
                            context,
                            templates::missing_example(&name.value),
                            name,
                            append_key(&base, &name.value),
                        ));
                    }
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasExampleMissing")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::*;
    use serde_json::json;

    const SPEC: &str = "openapi: 3.0.0
paths:
  /pets:
    post:
      requestBody:
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/Pet'
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema:
                type: object
                properties:
                  count:
                    type: integer
                    example: 3
                  next:
                    type: string
              examples:
                broken:
                  value:
                    count: many
components:
  schemas:
    Pet:
      type: object
      required: [id, name]
      properties:
        id:
          type: integer
          readOnly: true
        name:
          type: string
        age:
          type: integer
          example: old
      example:
        name: rex
";

    #[test]
    fn test_example_schema() {
        let (ctx, root) = document_context(SPEC, "oasExampleSchema", json!(null));
        let results = ExampleSchema::default().run_rule(&[root], &ctx);
        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        // `id` is read only and Pet is only sent, so its example may leave it out
        assert!(!paths.contains(&"$.components.schemas.Pet.example"));
        assert!(paths.contains(&"$.components.schemas.Pet.properties.age.example"));
        assert!(paths.contains(
            &"$.paths['/pets'].post.responses['200'].content['application/json'].examples.broken.value"
        ));
        let broken = results.iter().find(|r| r.path.ends_with("broken.value")).unwrap();
        assert!(broken.message.starts_with("example `broken` is not valid against the schema"));
    }

    #[test]
    fn test_relax_required() {
        let mut schema = json!({
            "required": ["id", "secret", "name"],
            "properties": {
                "id": {"readOnly": true},
                "secret": {"writeOnly": true},
                "name": {}
            }
        });
        relax_required(&mut schema, SchemaDirection::Response);
        assert_eq!(schema["required"], json!(["id", "name"]));
    }

    #[test]
    fn test_missing_example() {
        let (ctx, root) = document_context(SPEC, "oasExampleMissing", json!(null));
        assert!(MissingExample.run_rule(&[root], &ctx).is_empty());

        let spec = "openapi: 3.0.0
paths:
  /a:
    get:
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema:
                properties:
                  id:
                    type: integer
                  name:
                    type: string
                    example: x
";
        let (ctx, root) = document_context(spec, "oasExampleMissing", json!(null));
        let results = MissingExample.run_rule(&[root], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].path,
            "$.paths['/a'].get.responses['200'].content['application/json'].schema.properties.id"
        );
        assert_eq!(
            results[0].message,
            "media type schema property `id` is missing `examples` or `example`"
        );
    }
}
