//! Functions that understand OpenAPI documents
//!
//! These ignore the matched nodes beyond checking there are some; they read
//! the whole document through the context instead. Most walk the resolved
//! tree. Functions that care where something was written (unused
//! components, `$ref` siblings) walk the unresolved tree held by the index.

mod descriptions;
mod document;
mod examples;
mod operations;
mod paths;
mod schemas;
mod security;

pub use descriptions::{ComponentDescription, DescriptionDuplication, NoEvalInDescriptions, ParameterDescription};
pub use document::OasDocumentSchema;
pub use examples::{ExampleSchema, MissingExample};
pub use operations::{
    ErrorResponse, FormDataConsumeCheck, NoRequestBody, OperationDescription, OperationId,
    OperationParameters, OperationSingleTag, OperationTags, PostResponseSuccess, SuccessResponse,
    TagDefined, UniqueOperationId,
};
pub use paths::{AmbiguousPaths, PathParameters, PathsKebabCase, VerbsInPath};
pub use schemas::{Discriminator, DuplicatedEnum, RefSiblings, SchemaTypeCheck, TypedEnum, UnusedComponent};
pub use security::{ApiServers, OperationSecurityDefined};

use super::schema_direction::{LISTS, MAPS, SINGLE};
use super::FunctionRegistry;
use crate::index::is_http_method;
use crate::jsonpath::{append_index, append_key};
use crate::model::RuleFunctionContext;
use crate::node::{NodeRef, MAX_SEARCH_DEPTH};
use std::sync::Arc;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register("oasOpSuccessResponse", Arc::new(SuccessResponse));
    registry.register("oasPostResponseSuccess", Arc::new(PostResponseSuccess));
    registry.register("oasOpIdUnique", Arc::new(UniqueOperationId));
    registry.register("oasOpId", Arc::new(OperationId));
    registry.register("oasOpSingleTag", Arc::new(OperationSingleTag));
    registry.register("oasOperationTags", Arc::new(OperationTags));
    registry.register("oasTagDefined", Arc::new(TagDefined));
    registry.register("oasOpParams", Arc::new(OperationParameters));
    registry.register("oasDescriptions", Arc::new(OperationDescription));
    registry.register("oasOpErrorResponse", Arc::new(ErrorResponse));
    registry.register("noRequestBody", Arc::new(NoRequestBody));
    registry.register("oasOpFormDataConsumeCheck", Arc::new(FormDataConsumeCheck));
    registry.register("oasPathParam", Arc::new(PathParameters));
    registry.register("noAmbiguousPaths", Arc::new(AmbiguousPaths));
    registry.register("noVerbsInPath", Arc::new(VerbsInPath));
    registry.register("pathsKebabCase", Arc::new(PathsKebabCase));
    registry.register("typedEnum", Arc::new(TypedEnum));
    registry.register("duplicatedEnum", Arc::new(DuplicatedEnum));
    registry.register("refSiblings", Arc::new(RefSiblings));
    registry.register("oasDiscriminator", Arc::new(Discriminator));
    registry.register("schemaTypeCheck", Arc::new(SchemaTypeCheck));
    registry.register("oasUnusedComponent", Arc::new(UnusedComponent));
    registry.register("oasExampleSchema", Arc::new(ExampleSchema::default()));
    registry.register("oasExampleMissing", Arc::new(MissingExample));
    registry.register("noEvalDescription", Arc::new(NoEvalInDescriptions::default()));
    registry.register("oasDescriptionDuplication", Arc::new(DescriptionDuplication));
    registry.register("oasComponentDescriptions", Arc::new(ComponentDescription));
    registry.register("oasParamDescriptions", Arc::new(ParameterDescription));
    registry.register("oasOpSecurityDefined", Arc::new(OperationSecurityDefined::new("oasOpSecurityDefined", "$.components.securitySchemes")));
    registry.register("oas2OpSecurityDefined", Arc::new(OperationSecurityDefined::new("oas2OpSecurityDefined", "$.securityDefinitions")));
    registry.register("oasAPIServers", Arc::new(ApiServers));
    registry.register("oasSchema", Arc::new(OasDocumentSchema::default()));
}

/// One operation of a path item
#[derive(Debug, Clone)]
pub(crate) struct Operation {
    pub path: String,
    pub method: String,
    pub key: NodeRef,
    pub node: NodeRef,
    /// Parameters declared on the path item
    pub shared_parameters: Option<NodeRef>,
    /// `$.paths['/pets'].get`
    pub json_path: String,
}

impl Operation {
    pub fn path_item_path(&self) -> String {
        append_key("$.paths", &self.path)
    }

    /// Operation and path item parameters, operation first
    pub fn parameters(&self) -> Vec<NodeRef> {
        let mut all: Vec<NodeRef> = self
            .node
            .get("parameters")
            .map(|p| p.children().to_vec())
            .unwrap_or_default();
        if let Some(shared) = &self.shared_parameters {
            all.extend(shared.children().iter().cloned());
        }
        all
    }
}

/// The resolved root when there is one, else the indexed root
pub(crate) fn document_root(context: &RuleFunctionContext) -> Option<NodeRef> {
    context
        .root()
        .or_else(|| context.index.root())
        .cloned()
}

/// The root as written, before references were resolved
pub(crate) fn unresolved_root(context: &RuleFunctionContext) -> Option<NodeRef> {
    context
        .index
        .root()
        .or_else(|| context.root())
        .cloned()
}

/// Every operation below `paths`, in document order
pub(crate) fn operations(root: &NodeRef) -> Vec<Operation> {
    let Some(paths) = root.get("paths") else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for (path_key, item) in paths.pairs() {
        let shared = item.get("parameters").cloned();
        for (method, operation) in item.pairs() {
            if !is_http_method(&method.value) || !operation.is_map() {
                continue;
            }
            found.push(Operation {
                path: path_key.value.clone(),
                method: method.value.clone(),
                key: Arc::clone(method),
                node: Arc::clone(operation),
                shared_parameters: shared.clone(),
                json_path: append_key(&append_key("$.paths", &path_key.value), &method.value),
            });
        }
    }
    found
}

/// A place a schema is written
#[derive(Debug, Clone)]
pub(crate) struct SchemaSite {
    pub path: String,
    pub node: NodeRef,
    /// Component name for top level component schemas
    pub name: Option<String>,
}

struct SchemaWalk {
    sites: Vec<SchemaSite>,
}

impl SchemaWalk {
    fn schema(&mut self, node: &NodeRef, path: String, name: Option<String>, depth: usize) {
        if depth > MAX_SEARCH_DEPTH || !node.is_map() || node.has_key("$ref") {
            return;
        }
        self.sites.push(SchemaSite {
            path: path.clone(),
            node: Arc::clone(node),
            name,
        });
        for key in SINGLE {
            if let Some(sub) = node.get(key) {
                self.schema(sub, append_key(&path, key), None, depth + 1);
            }
        }
        for key in LISTS {
            if let Some(list) = node.get(key) {
                let base = append_key(&path, key);
                for (i, sub) in list.children().iter().enumerate() {
                    self.schema(sub, append_index(&base, i), None, depth + 1);
                }
            }
        }
        for key in MAPS {
            if let Some(map) = node.get(key) {
                let base = append_key(&path, key);
                for (name, sub) in map.pairs() {
                    self.schema(sub, append_key(&base, &name.value), None, depth + 1);
                }
            }
        }
    }

    fn holder(&mut self, holder: &NodeRef, path: &str) {
        if let Some(schema) = holder.get("schema") {
            self.schema(schema, append_key(path, "schema"), None, 0);
        }
        if let Some(content) = holder.get("content") {
            let base = append_key(path, "content");
            for (media, value) in content.pairs() {
                if let Some(schema) = value.get("schema") {
                    self.schema(schema, append_key(&append_key(&base, &media.value), "schema"), None, 0);
                }
            }
        }
        if let Some(headers) = holder.get("headers") {
            let base = append_key(path, "headers");
            for (name, header) in headers.pairs() {
                self.holder(header, &append_key(&base, &name.value));
            }
        }
    }

    fn parameters(&mut self, parameters: Option<&NodeRef>, path: &str) {
        let Some(parameters) = parameters else {
            return;
        };
        for (i, param) in parameters.children().iter().enumerate() {
            self.holder(param, &append_index(path, i));
        }
    }
}

/// Every schema written in the document: components, definitions, and
/// the schemas of parameters, bodies, responses and headers, including
/// their nested subschemas. `$ref` nodes are not schemas of their own.
pub(crate) fn collect_schemas(root: &NodeRef) -> Vec<SchemaSite> {
    let mut walk = SchemaWalk { sites: Vec::new() };

    let component_schemas = root
        .get("components")
        .and_then(|c| c.get("schemas"))
        .map(|s| (s, "$.components.schemas"))
        .or_else(|| root.get("definitions").map(|d| (d, "$.definitions")));
    if let Some((schemas, base)) = component_schemas {
        for (name, schema) in schemas.pairs() {
            walk.schema(schema, append_key(base, &name.value), Some(name.value.clone()), 0);
        }
    }

    if let Some(components) = root.get("components") {
        for section in ["parameters", "requestBodies", "responses", "headers"] {
            if let Some(entries) = components.get(section) {
                let base = append_key("$.components", section);
                for (name, entry) in entries.pairs() {
                    walk.holder(entry, &append_key(&base, &name.value));
                }
            }
        }
    }

    for operation in operations(root) {
        let op = &operation.json_path;
        walk.parameters(operation.node.get("parameters"), &append_key(op, "parameters"));
        if let Some(body) = operation.node.get("requestBody") {
            walk.holder(body, &append_key(op, "requestBody"));
        }
        if let Some(responses) = operation.node.get("responses") {
            let base = append_key(op, "responses");
            for (code, response) in responses.pairs() {
                walk.holder(response, &append_key(&base, &code.value));
            }
        }
    }
    if let Some(paths) = root.get("paths") {
        for (path, item) in paths.pairs() {
            let base = append_key(&append_key("$.paths", &path.value), "parameters");
            walk.parameters(item.get("parameters"), &base);
        }
    }
    walk.sites
}

/// The declared `type` values of a schema (a string or a list)
pub(crate) fn schema_types(schema: &NodeRef) -> Vec<String> {
    match schema.get("type") {
        Some(t) if t.is_seq() => t.children().iter().map(|v| v.value.clone()).collect(),
        Some(t) if t.is_scalar() => vec![t.value.clone()],
        _ => Vec::new(),
    }
}

/// Is a response code between `low` and `high` (inclusive)
pub(crate) fn code_in_range(code: &str, low: u16, high: u16) -> bool {
    code.parse::<u16>().is_ok_and(|c| c >= low && c <= high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::root;

    const SPEC: &str = "openapi: 3.0.0
paths:
  /pets/{id}:
    parameters:
      - name: id
        in: path
        schema:
          type: string
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                type: object
                properties:
                  name:
                    type: string
                  tags:
                    type: array
                    items:
                      $ref: '#/components/schemas/Tag'
components:
  schemas:
    Tag:
      type: string
";

    #[test]
    fn test_operations() {
        let ops = operations(&root(SPEC));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].json_path, "$.paths['/pets/{id}'].get");
        assert_eq!(ops[0].parameters().len(), 1);
        assert_eq!(ops[0].path_item_path(), "$.paths['/pets/{id}']");
    }

    #[test]
    fn test_collect_schemas() {
        let sites = collect_schemas(&root(SPEC));
        let paths: Vec<&str> = sites.iter().map(|s| s.path.as_str()).collect();
        assert!(paths.contains(&"$.components.schemas.Tag"));
        assert!(paths.contains(
            &"$.paths['/pets/{id}'].get.responses['200'].content['application/json'].schema.properties.name"
        ));
        assert!(paths.contains(&"$.paths['/pets/{id}'].parameters[0].schema"));
        // the $ref under items is not a schema site
        assert!(!paths.iter().any(|p| p.ends_with(".items")));
        assert_eq!(sites.iter().filter(|s| s.name.is_some()).count(), 1);
    }

    #[test]
    fn test_code_in_range() {
        assert!(code_in_range("404", 400, 499));
        assert!(!code_in_range("default", 400, 499));
        assert!(!code_in_range("500", 400, 499));
    }
}
