//! Structural validation of the whole document
//!
//! The schemas here cover the document skeleton (required top level
//! fields, the info object, path items and operations). Deeper checks are
//! left to the dedicated rules.

use super::unresolved_root;
use crate::functions::violation;
use crate::jsonpath::{append_index, append_key};
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::{NodeKind, NodeRef};
use crate::spec_info::Format;
use jsonschema::Validator;
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use std::sync::Arc;

fn info_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title", "version"],
        "properties": {
            "title": {"type": "string"},
            "version": {"type": "string"},
            "description": {"type": "string"},
            "termsOfService": {"type": "string"},
            "contact": {"type": "object"},
            "license": {"type": "object", "required": ["name"]}
        }
    })
}

fn operation_schema(responses_required: bool) -> Value {
    let required: Vec<&str> = if responses_required { vec!["responses"] } else { Vec::new() };
    json!({
        "type": "object",
        "required": required,
        "properties": {
            "tags": {"type": "array", "items": {"type": "string"}},
            "summary": {"type": "string"},
            "description": {"type": "string"},
            "operationId": {"type": "string"},
            "parameters": {"type": "array"},
            "responses": {"type": "object", "minProperties": 1},
            "deprecated": {"type": "boolean"},
            "security": {"type": "array", "items": {"type": "object"}}
        }
    })
}

fn path_item_schema(responses_required: bool) -> Value {
    let operation = operation_schema(responses_required);
    json!({
        "type": "object",
        "properties": {
            "get": operation, "put": operation, "post": operation, "delete": operation,
            "options": operation, "head": operation, "patch": operation, "trace": operation,
            "parameters": {"type": "array"}
        }
    })
}

fn swagger_schema() -> Value {
    json!({
        "type": "object",
        "required": ["swagger", "info", "paths"],
        "properties": {
            "swagger": {"enum": ["2.0"]},
            "info": info_schema(),
            "host": {"type": "string", "pattern": "^[^{}/ :\\\\]+(?::\\d+)?$"},
            "basePath": {"type": "string", "pattern": "^/"},
            "schemes": {"type": "array", "items": {"enum": ["http", "https", "ws", "wss"]}},
            "consumes": {"type": "array", "items": {"type": "string"}},
            "produces": {"type": "array", "items": {"type": "string"}},
            "paths": {
                "type": "object",
                "patternProperties": {"^/": path_item_schema(true)},
                "additionalProperties": false
            },
            "definitions": {"type": "object"},
            "parameters": {"type": "object"},
            "responses": {"type": "object"},
            "securityDefinitions": {"type": "object"},
            "security": {"type": "array"},
            "tags": {"type": "array", "items": {"type": "object", "required": ["name"]}}
        }
    })
}

fn openapi_schema(v31: bool) -> Value {
    let mut schema = json!({
        "type": "object",
        "required": ["openapi", "info"],
        "properties": {
            "openapi": {"type": "string", "pattern": "^3\\.\\d+\\.\\d+"},
            "info": info_schema(),
            "servers": {"type": "array", "items": {"type": "object", "required": ["url"]}},
            "paths": {
                "type": "object",
                "patternProperties": {"^/": path_item_schema(!v31), "^x-": {}},
                "additionalProperties": false
            },
            "components": {"type": "object"},
            "security": {"type": "array"},
            "tags": {"type": "array", "items": {"type": "object", "required": ["name"]}},
            "externalDocs": {"type": "object", "required": ["url"]}
        }
    });
    if v31 {
        schema["anyOf"] = json!([
            {"required": ["paths"]},
            {"required": ["components"]},
            {"required": ["webhooks"]}
        ]);
    } else if let Some(required) = schema["required"].as_array_mut() {
        required.push(Value::from("paths"));
    }
    schema
}

/// JSON pointer into the document, as a JSONPath and the node it lands on
fn locate(root: &NodeRef, pointer: &str) -> (String, NodeRef) {
    let mut path = "$".to_string();
    let mut current = NodeRef::clone(root);
    for raw in pointer.split('/').filter(|s| !s.is_empty()) {
        let token = raw.replace("~1", "/").replace("~0", "~");
        let next = match current.kind {
            NodeKind::Sequence => token.parse::<usize>().ok().and_then(|i| {
                path = append_index(&path, i);
                current.children().get(i).cloned()
            }),
            _ => {
                path = append_key(&path, &token);
                current.get(&token).cloned()
            }
        };
        match next {
            Some(node) => current = node,
            None => break,
        }
    }
    (path, current)
}

/// Validate the document against the skeleton schema of its format
#[derive(Default)]
pub struct OasDocumentSchema {
    swagger: OnceCell<Result<Arc<Validator>, String>>,
    openapi: OnceCell<Result<Arc<Validator>, String>>,
    openapi_31: OnceCell<Result<Arc<Validator>, String>>,
}

impl OasDocumentSchema {
    fn validator(&self, format: Format) -> Option<Arc<Validator>> {
        // None selects the swagger schema, Some(v31) an openapi one
        let (cell, openapi) = match format {
            Format::Oas2 => (&self.swagger, None),
            Format::Oas31 | Format::Oas32 => (&self.openapi_31, Some(true)),
            Format::Oas3 | Format::Oas30 => (&self.openapi, Some(false)),
            Format::AsyncApi => return None,
        };
        let compiled = cell.get_or_init(|| {
            let schema = openapi.map_or_else(swagger_schema, openapi_schema);
            jsonschema::validator_for(&schema)
                .map(Arc::new)
                .map_err(|e| e.to_string())
        });
        match compiled {
            Ok(validator) => Some(Arc::clone(validator)),
            Err(error) => {
                log::error!("document schema for {} cannot be compiled: {}", format, error);
                None
            }
        }
    }
}

impl RuleFunction for OasDocumentSchema {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let Some(validator) = context.spec_info.format().and_then(|f| self.validator(f)) else {
            return Vec::new();
        };
        let instance = root.to_json();
        let results = validator
            .iter_errors(&instance)
            .map(|error| {
                let (path, node) = locate(&root, &error.instance_path.to_string());
                violation(
                    context,
                    context
                        .rule
                        .message_or(&format!("schema invalid: {}", error)),
                    &node,
                    path,
                )
            })
            .collect();
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasSchema")
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

    #[test]
    fn test_valid_document() {
        let spec = "openapi: 3.0.1
info:
  title: pets
  version: '1.0'
paths:
  /pets:
    get:
      responses:
        '200':
          description: ok
";
        let (ctx, root) = document_context(spec, "oasSchema", json!(null));
        assert!(OasDocumentSchema::default().run_rule(&[root], &ctx).is_empty());
    }

    #[test]
    fn test_invalid_document() {
        let spec = "openapi: 3.0.1
info:
  title: pets
paths:
  /pets:
    get:
      summary: no responses
";
        let (ctx, root) = document_context(spec, "oasSchema", json!(null));
        let results = OasDocumentSchema::default().run_rule(&[root], &ctx);
        assert_eq!(results.len(), 2);
        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert!(paths.contains(&"$.info"));
        assert!(paths.contains(&"$.paths['/pets'].get"));
        assert!(results.iter().all(|r| r.message.starts_with("schema invalid: ")));
    }

    #[test]
    fn test_swagger_and_31() {
        let (ctx, root) = document_context("swagger: '2.0'\ninfo:\n  title: a\n  version: '1'\n", "oasSchema", json!(null));
        let results = OasDocumentSchema::default().run_rule(&[root], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$");

        let spec = "openapi: 3.1.0\ninfo:\n  title: a\n  version: '1'\nwebhooks: {}\n";
        let (ctx, root) = document_context(spec, "oasSchema", json!(null));
        assert!(OasDocumentSchema::default().run_rule(&[root], &ctx).is_empty());
    }
}
