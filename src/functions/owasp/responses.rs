//! Error responses and rate limiting headers

use crate::functions::core::option_list;
use crate::functions::openapi::{code_in_range, document_root, operations, Operation};
use crate::functions::violation;
use crate::jsonpath::append_key;
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OWASP,
};
use crate::node::NodeRef;
use crate::spec_info::Format;
use serde_json::Value;

fn responses_of(op: &Operation) -> Option<(NodeRef, String)> {
    op.node
        .get("responses")
        .map(|r| (NodeRef::clone(r), append_key(&op.json_path, "responses")))
}

/// Every operation must document the `code` response, with a schema
pub struct CheckErrorResponse;

impl RuleFunction for CheckErrorResponse {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        if context.spec_info.format() == Some(Format::Oas2) {
            return Vec::new();
        }
        let Some(code) = option_list(&context.options, "code").into_iter().next() else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for op in operations(&root) {
            let Some((responses, path)) = responses_of(&op) else {
                continue;
            };
            let method = op.method.to_uppercase();
            match responses.get_pair(&code) {
                None => results.push(violation(
                    context,
                    format!("missing response code '{}' for '{}'", code, method),
                    &op.key,
                    path,
                )),
                Some((key, response)) => {
                    let has_schema = response
                        .get("content")
                        .and_then(|c| c.pairs().next().map(|(_, media)| media.has_key("schema")))
                        .unwrap_or(false);
                    if !has_schema {
                        results.push(violation(
                            context,
                            format!("missing schema for '{}' response on '{}'", code, method),
                            key,
                            append_key(&path, &code),
                        ));
                    }
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspCheckErrorResponse")
            .with_property("code", "the response code that must be present")
            .with_required(&["code"])
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Every operation must document at least one of the `codes` responses
pub struct DefineErrorDefinition;

impl RuleFunction for DefineErrorDefinition {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let codes = option_list(&context.options, "codes");
        if codes.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for op in operations(&root) {
            let Some((responses, path)) = responses_of(&op) else {
                continue;
            };
            let defined = responses
                .pairs()
                .any(|(code, _)| codes.iter().any(|c| c.eq_ignore_ascii_case(&code.value)));
            if !defined {
                results.push(violation(
                    context,
                    format!("missing one of `{}` response codes", codes.join("`, `")),
                    &op.key,
                    path,
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspDefineErrorDefinition")
            .with_property("codes", "response codes, one of which must be present")
            .with_required(&["codes"])
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// The `headers` option: a list of header sets. A set is a list, or a
/// comma separated string.
fn header_sets(options: &Value) -> Vec<Vec<String>> {
    let Some(Value::Array(sets)) = options.get("headers") else {
        return Vec::new();
    };
    sets.iter()
        .map(|set| match set {
            Value::Array(names) => names.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            Value::String(names) => names.split(',').map(|n| n.trim().to_string()).collect(),
            _ => Vec::new(),
        })
        .filter(|set: &Vec<String>| !set.is_empty())
        .collect()
}

/// Success and client error responses must carry every header of at least
/// one header set
pub struct HeaderDefinition;

impl RuleFunction for HeaderDefinition {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let sets = header_sets(&context.options);
        if sets.is_empty() {
            return Vec::new();
        }
        let described = sets
            .iter()
            .map(|set| format!("{{{}}}", set.join(", ")))
            .collect::<Vec<_>>()
            .join(" ");

        let mut results = Vec::new();
        for op in operations(&root) {
            let Some((responses, path)) = responses_of(&op) else {
                continue;
            };
            for (code, response) in responses.pairs() {
                if !(code_in_range(&code.value, 200, 299) || code_in_range(&code.value, 400, 499)) {
                    continue;
                }
                let satisfied = response.get("headers").is_some_and(|headers| {
                    sets.iter().any(|set| set.iter().all(|h| headers.has_key(h)))
                });
                if !satisfied {
                    let anchor = response.get_pair("headers").map(|(k, _)| k).unwrap_or(code);
                    results.push(violation(
                        context,
                        templates::response_missing_header(&code.value, &described),
                        anchor,
                        append_key(&path, &code.value),
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspHeaderDefinition")
            .with_property("headers", "sets of headers, one of which must be present in full")
            .with_required(&["headers"])
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// `429` responses must say when to retry
pub struct RatelimitRetryAfter;

impl RuleFunction for RatelimitRetryAfter {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for op in operations(&root) {
            let Some((responses, path)) = responses_of(&op) else {
                continue;
            };
            let Some((code, response)) = responses.get_pair("429") else {
                continue;
            };
            let retry = response
                .get("headers")
                .is_some_and(|h| h.pairs().any(|(k, _)| k.value.eq_ignore_ascii_case("Retry-After")));
            if !retry {
                results.push(violation(
                    context,
                    "missing 'Retry-After' header for 429 error response",
                    code,
                    append_key(&path, "429"),
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspRatelimitRetryAfter")
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
paths:
  /pets:
    get:
      responses:
        '200':
          description: ok
          headers:
            X-RateLimit-Limit:
              schema:
                type: integer
        '401':
          description: no
          content:
            application/json:
              schema:
                type: object
        '429':
          description: slow down
          headers:
            Retry-After:
              schema:
                type: integer
    post:
      responses:
        '201':
          description: made
        '401':
          description: no
        '429':
          description: slow down
";

    fn run(function: &dyn RuleFunction, options: Value) -> Vec<RuleFunctionResult> {
        let (ctx, root) = document_context(SPEC, "owasp", options);
        function.run_rule(&[root], &ctx)
    }

    #[test]
    fn test_check_error_response() {
        let results = run(&CheckErrorResponse, json!({"code": "401"}));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "missing schema for '401' response on 'POST'");
        assert_eq!(results[0].path, "$.paths['/pets'].post.responses['401']");

        let results = run(&CheckErrorResponse, json!({"code": "500"}));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "missing response code '500' for 'GET'");
    }

    #[test]
    fn test_define_error_definition() {
        let results = run(&DefineErrorDefinition, json!({"codes": ["400", "422", "4XX"]}));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "missing one of `400`, `422`, `4XX` response codes");
        assert!(run(&DefineErrorDefinition, json!({"codes": ["401"]})).is_empty());
    }

    #[test]
    fn test_header_definition() {
        let options = json!({"headers": [["X-RateLimit-Limit"], ["RateLimit-Limit", "RateLimit-Reset"]]});
        let results = run(&HeaderDefinition, options);
        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "$.paths['/pets'].get.responses['401']",
                "$.paths['/pets'].get.responses['429']",
                "$.paths['/pets'].post.responses['201']",
                "$.paths['/pets'].post.responses['401']",
                "$.paths['/pets'].post.responses['429']",
            ]
        );
        assert_eq!(
            results[0].message,
            "response with code `401`, must contain one of the defined headers: `{X-RateLimit-Limit} {RateLimit-Limit, RateLimit-Reset}`"
        );
    }

    #[test]
    fn test_retry_after() {
        let results = run(&RatelimitRetryAfter, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.paths['/pets'].post.responses['429']");
    }
}
