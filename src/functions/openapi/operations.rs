//! Operation hygiene: ids, tags, responses, parameters and descriptions

use super::{code_in_range, document_root, operations, Operation};
use crate::functions::core::option_list;
use crate::functions::{field_path, violation};
use crate::jsonpath::{append_index, append_key};
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::NodeRef;
use std::collections::{HashMap, HashSet};

/// Operations with a `responses` map need a 2xx or 3xx response
pub struct SuccessResponse;

impl RuleFunction for SuccessResponse {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for op in operations(&root) {
            let Some((key, responses)) = op.node.get_pair("responses") else {
                continue;
            };
            if responses.pairs().any(|(code, _)| code_in_range(&code.value, 200, 399)) {
                continue;
            }
            let name = op
                .node
                .get_str("operationId")
                .unwrap_or("undefined operation (no operationId)");
            results.push(violation(
                context,
                format!("Operation '{}' must define at least a single 2xx or 3xx response", name),
                key,
                append_key(&op.json_path, "responses"),
            ));
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpSuccessResponse")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Each matched `responses` map must hold one of the listed codes
pub struct PostResponseSuccess;

impl RuleFunction for PostResponseSuccess {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let codes = option_list(&context.options, "properties");
        if codes.is_empty() {
            return Vec::new();
        }
        nodes
            .iter()
            .filter(|node| node.is_map())
            .filter(|node| !codes.iter().any(|code| node.has_key(code)))
            .map(|node| {
                violation(
                    context,
                    format!(
                        "operations must define a success response with one of the following codes: '{}'",
                        codes.join(", ")
                    ),
                    node,
                    field_path(context),
                )
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasPostResponseSuccess")
            .with_property("properties", "response codes, one of which must be present")
            .with_required(&["properties"])
            .with_error_message("'oasPostResponseSuccess' needs a list of response codes in 'properties'")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

fn missing_operation_id(op: &Operation) -> String {
    format!(
        "the '{}' operation at path '{}' does not contain an operationId",
        op.method, op.path
    )
}

/// Every operation has an `operationId`, and no two share one
pub struct UniqueOperationId;

impl RuleFunction for UniqueOperationId {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for op in operations(&root) {
            match op.node.get_str("operationId") {
                None => results.push(violation(context, missing_operation_id(&op), &op.node, op.json_path.clone())),
                Some(id) if !seen.insert(id.to_string()) => results.push(violation(
                    context,
                    format!(
                        "the '{}' operation at path '{}' contains a duplicate operationId '{}'",
                        op.method, op.path, id
                    ),
                    &op.node,
                    op.json_path.clone(),
                )),
                Some(_) => {}
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpIdUnique")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Every operation has an `operationId`
pub struct OperationId;

impl RuleFunction for OperationId {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        operations(&root)
            .iter()
            .filter(|op| op.node.get_str("operationId").is_none())
            .map(|op| violation(context, missing_operation_id(op), &op.node, op.json_path.clone()))
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpId")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Operations carry at most one tag
pub struct OperationSingleTag;

impl RuleFunction for OperationSingleTag {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for op in operations(&root) {
            let Some((key, tags)) = op.node.get_pair("tags") else {
                continue;
            };
            if tags.children().len() > 1 {
                results.push(violation(
                    context,
                    format!(
                        "the `{}` operation at path `{}` contains more than one tag ({} is too many)",
                        op.method,
                        op.path,
                        tags.children().len()
                    ),
                    key,
                    op.json_path.clone(),
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpSingleTag")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Operations carry at least one tag
pub struct OperationTags;

impl RuleFunction for OperationTags {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for op in operations(&root) {
            let state = match op.node.get("tags") {
                None => "missing",
                Some(tags) if tags.children().is_empty() => "empty",
                Some(_) => continue,
            };
            results.push(violation(
                context,
                format!(
                    "Tags for `{}` operation at path `{}` are {}",
                    op.method, op.path, state
                ),
                &op.key,
                op.json_path.clone(),
            ));
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOperationTags")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Operation tags must be declared in the global `tags` list
pub struct TagDefined;

impl RuleFunction for TagDefined {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let global: HashSet<&str> = root
            .get("tags")
            .map(|tags| tags.children().iter().filter_map(|t| t.get_str("name")).collect())
            .unwrap_or_default();

        let mut results = Vec::new();
        for op in operations(&root) {
            let Some(tags) = op.node.get("tags") else {
                continue;
            };
            let base = append_key(&op.json_path, "tags");
            for (i, tag) in tags.children().iter().enumerate() {
                if tag.is_scalar() && !global.contains(tag.value.as_str()) {
                    results.push(violation(
                        context,
                        format!(
                            "the '{}' operation at path '{}' contains a tag '{}', that is not defined in the global document tags",
                            op.method, op.path, tag.value
                        ),
                        tag,
                        append_index(&base, i),
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasTagDefined")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Parameter placement: an `in` on every parameter, one body, never body
/// and form data together, no repeated name and location
pub struct OperationParameters;

impl OperationParameters {
    fn check(op: &Operation, context: &RuleFunctionContext, results: &mut Vec<RuleFunctionResult>) {
        let Some(parameters) = op.node.get("parameters") else {
            return;
        };
        let path = append_key(&op.json_path, "parameters");
        let mut locations: HashSet<&str> = HashSet::new();
        let mut names: HashSet<(&str, &str)> = HashSet::new();

        for param in parameters.children() {
            let Some(location) = param.get_str("in") else {
                results.push(violation(
                    context,
                    format!(
                        "the '{}' operation at path '{}' contains a parameter with no 'in' value",
                        op.method, op.path
                    ),
                    param,
                    path.clone(),
                ));
                continue;
            };
            if let Some(name) = param.get_str("name") {
                if !names.insert((name, location)) {
                    results.push(violation(
                        context,
                        format!(
                            "the '{}' operation at path '{}' contains a duplicate param '{}' in:{}",
                            op.method, op.path, name, location
                        ),
                        param,
                        path.clone(),
                    ));
                }
            }
            if locations.contains(location) {
                if location == "body" {
                    results.push(violation(
                        context,
                        format!(
                            "the '{}' operation at path '{}' contains a duplicate param in:body definition",
                            op.method, op.path
                        ),
                        param,
                        path.clone(),
                    ));
                }
                continue;
            }
            if matches!(location, "body" | "formData")
                && (locations.contains("body") || locations.contains("formData"))
            {
                results.push(violation(
                    context,
                    format!(
                        "the '{}' operation at path '{}' contains parameters using both in:body and in:formData",
                        op.method, op.path
                    ),
                    param,
                    path.clone(),
                ));
            }
            locations.insert(location);
        }
    }
}

impl RuleFunction for OperationParameters {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for op in operations(&root) {
            Self::check(&op, context, &mut results);
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpParams")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Operations, their request bodies and responses are described, with at
/// least `minWords` words
pub struct OperationDescription;

struct DescriptionCheck<'a> {
    context: &'a RuleFunctionContext,
    min_words: usize,
    results: Vec<RuleFunctionResult>,
}

impl DescriptionCheck<'_> {
    fn check(&mut self, text: Option<&str>, method: &str, location: &str, missing: &str, node: &NodeRef, path: String) {
        let message = match text.map(str::trim).filter(|t| !t.is_empty()) {
            None => format!(
                "operation method `{}` {} is missing a `{}`",
                method, location, missing
            ),
            Some(text) if text.split_whitespace().count() < self.min_words => format!(
                "operation method `{}` {} has a `{}` that must be at least `{}` words long",
                method, location, missing, self.min_words
            ),
            Some(_) => return,
        };
        self.results
            .push(violation(self.context, self.context.rule.message_or(&message), node, path));
    }
}

impl RuleFunction for OperationDescription {
    fn run_rule(&self, _nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context) else {
            return Vec::new();
        };
        let min_words = crate::functions::core::string_options(context)
            .get("minWords")
            .and_then(|w| w.parse().ok())
            .unwrap_or(0);
        let mut check = DescriptionCheck {
            context,
            min_words,
            results: Vec::new(),
        };

        for op in operations(&root) {
            let method = op.method.to_uppercase();
            let at_path = format!("at path `{}`", op.path);
            check.check(op.node.get_str("description"), &method, &at_path, "description", &op.key, op.json_path.clone());
            check.check(op.node.get_str("summary"), &method, &at_path, "summary", &op.key, op.json_path.clone());

            if let Some((key, body)) = op.node.get_pair("requestBody") {
                check.check(
                    body.get_str("description"),
                    &method,
                    &format!("`requestBody` at path `{}`", op.path),
                    "description",
                    key,
                    append_key(&op.json_path, "requestBody"),
                );
            }
            if let Some(responses) = op.node.get("responses") {
                let base = append_key(&op.json_path, "responses");
                for (code, response) in responses.pairs() {
                    check.check(
                        response.get_str("description"),
                        &method,
                        &format!("response code `{}` `responseBody` at path `{}`", code.value, op.path),
                        "description",
                        code,
                        append_key(&base, &code.value),
                    );
                }
            }
        }
        check.results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasDescriptions")
            .with_property("minWords", "the minimum number of words required in a description")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Operations declare at least one 4xx response
pub struct ErrorResponse;

impl RuleFunction for ErrorResponse {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        operations(&root)
            .iter()
            .filter(|op| {
                op.node
                    .get("responses")
                    .is_some_and(|r| !r.pairs().any(|(code, _)| code_in_range(&code.value, 400, 499)))
            })
            .map(|op| {
                violation(
                    context,
                    "Operation must define at least one 4xx error response",
                    &op.node,
                    op.json_path.clone(),
                )
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpErrorResponse")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// `GET` and `DELETE` operations have no request body
pub struct NoRequestBody;

impl RuleFunction for NoRequestBody {
    fn run_rule(&self, _nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context) else {
            return Vec::new();
        };
        operations(&root)
            .iter()
            .filter(|op| matches!(op.method.to_lowercase().as_str(), "get" | "delete"))
            .filter(|op| op.node.has_key("requestBody"))
            .map(|op| {
                let message = format!(
                    "`{}` operation should not have a requestBody defined",
                    op.method.to_uppercase()
                );
                violation(context, context.rule.message_or(&message), &op.key, op.json_path.clone())
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("noRequestBody")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

const FORM_CONSUMERS: [&str; 2] = ["application/x-www-form-urlencoded", "multipart/form-data"];

/// Swagger `in: formData` parameters need a form media type in `consumes`
pub struct FormDataConsumeCheck;

impl RuleFunction for FormDataConsumeCheck {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let global_consumes = root.get("consumes").cloned();
        let mut results = Vec::new();
        // a shared parameter is reported once per path
        let mut reported: HashMap<String, HashSet<String>> = HashMap::new();

        for op in operations(&root) {
            let consumes = op.node.get("consumes").cloned().or_else(|| global_consumes.clone());
            let valid = consumes.as_ref().is_some_and(|c| {
                c.children().iter().any(|m| FORM_CONSUMERS.contains(&m.value.as_str()))
            });
            for param in op.parameters() {
                let Some((in_key, in_value)) = param.get_pair("in") else {
                    continue;
                };
                if in_value.value != "formData" {
                    continue;
                }
                let name = param.get_str("name").unwrap_or_default().to_string();
                if !reported.entry(op.json_path.clone()).or_default().insert(name.clone()) {
                    continue;
                }
                let path = append_key(&op.json_path, "parameters");
                if consumes.is_none() {
                    results.push(violation(
                        context,
                        format!("in:formData param '{}' used without 'consumes' defined", name),
                        in_key,
                        path.clone(),
                    ));
                }
                if !valid {
                    results.push(violation(
                        context,
                        format!(
                            "in:formData param '{}' parameter must include 'application/x-www-form-urlencoded' or 'multipart/form-data' in their 'consumes' property",
                            name
                        ),
                        in_key,
                        path,
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasOpFormDataConsumeCheck")
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
tags:
  - name: pets
paths:
  /pets:
    get:
      operationId: listPets
      tags: [pets, food]
      description: list every pet
      summary: list
      responses:
        '200':
          description: ok
    post:
      operationId: listPets
      requestBody:
        content: {}
      responses:
        '500':
          description: broken
  /pets/{id}:
    delete:
      tags: []
      requestBody:
        description: it is gone
      parameters:
        - name: id
        - name: id
          in: path
        - name: id
          in: path
      responses:
        '404':
          description: missing
";

    fn run(function: &dyn RuleFunction, options: serde_json::Value) -> Vec<RuleFunctionResult> {
        let (ctx, root) = document_context(SPEC, "fn", options);
        function.run_rule(&[root], &ctx)
    }

    #[test]
    fn test_success_and_error_responses() {
        let results = run(&SuccessResponse, json!(null));
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].message,
            "Operation 'listPets' must define at least a single 2xx or 3xx response"
        );
        assert_eq!(results[0].path, "$.paths['/pets'].post.responses");
        assert!(results[1].message.contains("undefined operation (no operationId)"));

        let results = run(&ErrorResponse, json!(null));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "$.paths['/pets'].get");
    }

    #[test]
    fn test_operation_ids() {
        let results = run(&UniqueOperationId, json!(null));
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].message,
            "the 'post' operation at path '/pets' contains a duplicate operationId 'listPets'"
        );
        assert_eq!(
            results[1].message,
            "the 'delete' operation at path '/pets/{id}' does not contain an operationId"
        );
        assert_eq!(run(&OperationId, json!(null)).len(), 1);
    }

    #[test]
    fn test_tags() {
        let results = run(&OperationSingleTag, json!(null));
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("(2 is too many)"));

        let results = run(&OperationTags, json!(null));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "Tags for `post` operation at path `/pets` are missing");
        assert_eq!(results[1].message, "Tags for `delete` operation at path `/pets/{id}` are empty");

        let results = run(&TagDefined, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.paths['/pets'].get.tags[1]");
        assert!(results[0].message.contains("tag 'food'"));
    }

    #[test]
    fn test_parameters() {
        let results = run(&OperationParameters, json!(null));
        assert_eq!(results.len(), 2);
        assert!(results[0].message.ends_with("contains a parameter with no 'in' value"));
        assert!(results[1].message.ends_with("contains a duplicate param 'id' in:path"));
        assert_eq!(results[1].path, "$.paths['/pets/{id}'].delete.parameters");
    }

    #[test]
    fn test_body_and_form_data() {
        let root_node = root(
            "swagger: '2.0'\npaths:\n  /a:\n    post:\n      parameters:\n        - in: body\n          name: a\n        - in: formData\n          name: b\n        - in: body\n          name: c\n",
        );
        let ctx = context("oasOpParams", "", json!(null)).with_document(
            crate::node::Node::new(crate::node::NodeKind::Document)
                .with_content(vec![root_node.clone()])
                .into_ref(),
        );
        let results = OperationParameters.run_rule(&[root_node.clone()], &ctx);
        assert_eq!(results.len(), 2);
        assert!(results[0].message.contains("both in:body and in:formData"));
        assert!(results[1].message.contains("duplicate param in:body definition"));

        let results = FormDataConsumeCheck.run_rule(&[root_node], &ctx);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "in:formData param 'b' used without 'consumes' defined");
    }

    #[test]
    fn test_descriptions() {
        let results = run(&OperationDescription, json!({"minWords": 2}));
        let messages: Vec<&str> = results.iter().map(|r| r.message.as_str()).collect();
        assert!(messages.contains(
            &"operation method `GET` at path `/pets` has a `summary` that must be at least `2` words long"
        ));
        assert!(messages.contains(&"operation method `POST` at path `/pets` is missing a `description`"));
        assert!(messages.contains(
            &"operation method `POST` `requestBody` at path `/pets` is missing a `description`"
        ));
        assert!(!messages.iter().any(|m| m.contains("`DELETE` `requestBody`")));
    }

    #[test]
    fn test_no_request_body() {
        let results = run(&NoRequestBody, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "`DELETE` operation should not have a requestBody defined");
        assert_eq!(results[0].path, "$.paths['/pets/{id}'].delete");
    }

    #[test]
    fn test_post_response_success() {
        let ctx = context("oasPostResponseSuccess", "", json!({"properties": ["200", "201"]}));
        assert!(PostResponseSuccess.run_rule(&[root("'201': {}\n")], &ctx).is_empty());
        let results = PostResponseSuccess.run_rule(&[root("'500': {}\n")], &ctx);
        assert_eq!(
            results[0].message,
            "operations must define a success response with one of the following codes: '200, 201'"
        );
    }
}
