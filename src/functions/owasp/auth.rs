//! Authentication schemes, security requirements and transport

use super::security_schemes;
use crate::functions::core::option_list;
use crate::functions::openapi::{document_root, operations};
use crate::functions::violation;
use crate::jsonpath::{append_index, append_key};
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OWASP,
};
use crate::node::NodeRef;
use serde_json::Value;

fn scheme_kind(scheme: &NodeRef) -> String {
    scheme.get_str("type").unwrap_or_default().to_ascii_lowercase()
}

fn http_scheme(scheme: &NodeRef) -> String {
    scheme.get_str("scheme").unwrap_or_default().to_ascii_lowercase()
}

/// API keys must not travel in the query string or path
pub struct NoApiKeysInUrl;

impl RuleFunction for NoApiKeysInUrl {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        security_schemes(&root)
            .into_iter()
            .filter(|s| scheme_kind(&s.node) == "apikey")
            .filter_map(|s| {
                let location = s.node.get("in")?;
                matches!(location.value.as_str(), "query" | "path").then(|| {
                    violation(
                        context,
                        templates::api_key_in_url(&location.value),
                        location,
                        append_key(&s.path, "in"),
                    )
                })
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspNoApiKeysInUrl")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// HTTP Basic (and Negotiate) are not to be used
pub struct NoBasicAuth;

impl RuleFunction for NoBasicAuth {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        security_schemes(&root)
            .into_iter()
            .filter_map(|s| {
                let kind = scheme_kind(&s.node);
                let (anchor, field) = if kind == "basic" {
                    (s.node.get("type")?, "type")
                } else if kind == "http" && matches!(http_scheme(&s.node).as_str(), "basic" | "negotiate") {
                    (s.node.get("scheme")?, "scheme")
                } else {
                    return None;
                };
                Some(violation(
                    context,
                    "security scheme uses HTTP Basic Auth, which is an insecure practice",
                    anchor,
                    append_key(&s.path, field),
                ))
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspNoBasicAuth")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// HTTP schemes considered outdated
pub struct AuthInsecureSchemes;

impl RuleFunction for AuthInsecureSchemes {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        security_schemes(&root)
            .into_iter()
            .filter(|s| scheme_kind(&s.node) == "http")
            .filter_map(|s| {
                let scheme = s.node.get("scheme")?;
                matches!(scheme.value.to_ascii_lowercase().as_str(), "negotiate" | "oauth").then(|| {
                    violation(
                        context,
                        "authentication scheme is considered outdated or insecure",
                        scheme,
                        append_key(&s.path, "scheme"),
                    )
                })
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspAuthInsecureSchemes")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// OAuth2 and JWT bearer schemes must mention RFC8725
pub struct JwtBestPractice;

impl RuleFunction for JwtBestPractice {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        security_schemes(&root)
            .into_iter()
            .filter(|s| {
                scheme_kind(&s.node) == "oauth2"
                    || s.node
                        .get_str("bearerFormat")
                        .is_some_and(|f| f.eq_ignore_ascii_case("jwt"))
            })
            .filter(|s| !s.node.get_str("description").is_some_and(|d| d.contains("RFC8725")))
            .map(|s| {
                let anchor = s.node.get("description").unwrap_or(&s.node);
                violation(
                    context,
                    "JWTs must explicitly declare support for `RFC8725` in the description",
                    anchor,
                    s.path.clone(),
                )
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspJWTBestPractice")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Operations using the `methods` option must be covered by a security
/// requirement, either their own or the document's. Empty requirement
/// objects (optional security) are allowed when `nullable` is set.
pub struct CheckSecurity;

impl RuleFunction for CheckSecurity {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let methods: Vec<String> = option_list(&context.options, "methods")
            .into_iter()
            .map(|m| m.to_ascii_lowercase())
            .collect();
        let nullable = match context.options.get("nullable") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        let global = root.get("security");

        let mut results = Vec::new();
        for op in operations(&root) {
            if !methods.contains(&op.method.to_ascii_lowercase()) {
                continue;
            }
            let Some(security) = op.node.get("security").or(global) else {
                results.push(violation(
                    context,
                    templates::security_not_defined(&op.path, &op.method),
                    &op.key,
                    op.json_path.clone(),
                ));
                continue;
            };
            let security_path = append_key(&op.json_path, "security");
            if security.children().is_empty() {
                results.push(violation(
                    context,
                    templates::security_empty(&op.path, &op.method),
                    security,
                    security_path,
                ));
                continue;
            }
            for (i, requirement) in security.children().iter().enumerate() {
                if requirement.is_map() && requirement.content.is_empty() && !nullable {
                    results.push(violation(
                        context,
                        templates::security_null_elements(&op.path, &op.method),
                        requirement,
                        append_index(&security_path, i),
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspCheckSecurity")
            .with_property("methods", "HTTP methods to check")
            .with_property("nullable", "allow empty security requirements")
            .with_property("schemesPath", "where security schemes are declared")
            .with_required(&["methods"])
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

/// Server URLs must use TLS
pub struct HostsHttps;

impl RuleFunction for HostsHttps {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let Some(servers) = root.get("servers") else {
            return Vec::new();
        };
        servers
            .children()
            .iter()
            .enumerate()
            .filter_map(|(i, server)| {
                let url = server.get("url")?;
                (!url.value.to_ascii_lowercase().starts_with("https:")).then(|| {
                    violation(
                        context,
                        "server URLs should use TLS (https)",
                        url,
                        append_key(&append_index("$.servers", i), "url"),
                    )
                })
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspSecurityHostsHttpsOas3")
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
servers:
  - url: https://api.example.com
  - url: http://api.example.com
security:
  - key: []
paths:
  /pets:
    get:
      responses: {}
    post:
      security: []
      responses: {}
    put:
      security:
        - {}
      responses: {}
    delete:
      responses: {}
components:
  securitySchemes:
    key:
      type: apiKey
      in: query
      name: key
    basic:
      type: http
      scheme: basic
    negotiate:
      type: http
      scheme: negotiate
    oauth:
      type: oauth2
      description: tokens follow RFC8725
    jwt:
      type: http
      scheme: bearer
      bearerFormat: JWT
";

    fn run(function: &dyn RuleFunction, options: serde_json::Value) -> Vec<RuleFunctionResult> {
        let (ctx, root) = document_context(SPEC, "owasp", options);
        function.run_rule(&[root], &ctx)
    }

    #[test]
    fn test_schemes() {
        let results = run(&NoApiKeysInUrl, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "API keys must not be passed via URL parameters (`query`)");
        assert_eq!(results[0].path, "$.components.securitySchemes.key.in");

        let results = run(&NoBasicAuth, json!(null));
        assert_eq!(results.len(), 2);
        let results = run(&AuthInsecureSchemes, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.components.securitySchemes.negotiate.scheme");

        let results = run(&JwtBestPractice, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.components.securitySchemes.jwt");
    }

    #[test]
    fn test_check_security() {
        let results = run(&CheckSecurity, json!({"methods": ["post", "put", "delete"], "nullable": false}));
        let texts: Vec<&str> = results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "`security` is empty for path `/pets` in method `post`",
                "`security` has null elements for path `/pets` in method `put`",
            ]
        );
        let results = run(&CheckSecurity, json!({"methods": ["put"], "nullable": true}));
        assert!(results.is_empty());

        let (ctx, root) = document_context(
            "openapi: 3.0.0\npaths:\n  /a:\n    get:\n      responses: {}\n",
            "owaspCheckSecurity",
            json!({"methods": "get"}),
        );
        let results = CheckSecurity.run_rule(&[root], &ctx);
        assert_eq!(results[0].message, "`security` was not defined for path `/a` in method `get`");
    }

    #[test]
    fn test_hosts_https() {
        let results = run(&HostsHttps, json!(null));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.servers[1].url");
    }
}
