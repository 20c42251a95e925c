//! Security requirements and servers

use super::{operations, unresolved_root};
use crate::functions::violation;
use crate::jsonpath::{append_index, append_key, JsonPath};
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::NodeRef;
use reqwest::Url;

/// Security requirements must name a declared security scheme
pub struct OperationSecurityDefined {
    name: String,
    default_schemes_path: String,
}

impl OperationSecurityDefined {
    pub fn new(name: &str, default_schemes_path: &str) -> Self {
        Self {
            name: name.to_string(),
            default_schemes_path: default_schemes_path.to_string(),
        }
    }

    fn check(
        requirements: &NodeRef,
        base: &str,
        owner: &str,
        schemes: Option<&NodeRef>,
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        for (i, requirement) in requirements.children().iter().enumerate() {
            for (name, _) in requirement.pairs() {
                if schemes.is_some_and(|s| s.has_key(&name.value)) {
                    continue;
                }
                results.push(violation(
                    context,
                    format!(
                        "{} references an undefined security schema '{}'",
                        owner, name.value
                    ),
                    name,
                    append_key(&append_index(base, i), &name.value),
                ));
            }
        }
    }
}

impl RuleFunction for OperationSecurityDefined {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let schemes_path = context
            .option_str("schemesPath")
            .unwrap_or(&self.default_schemes_path);
        let schemes = match JsonPath::compile(schemes_path) {
            Ok(path) => path.find_nodes(&root).into_iter().next(),
            Err(error) => {
                log::warn!("'{}' is not a usable schemesPath: {}", schemes_path, error);
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        if let Some(global) = root.get("security") {
            Self::check(global, "$.security", "document security", schemes.as_ref(), context, &mut results);
        }
        for op in operations(&root) {
            if let Some(security) = op.node.get("security") {
                Self::check(
                    security,
                    &append_key(&op.json_path, "security"),
                    &format!("operation at '{}'", op.path),
                    schemes.as_ref(),
                    context,
                    &mut results,
                );
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new(&self.name)
            .with_property("schemesPath", "JSONPath to the map of declared security schemes")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Substitute server variables with their defaults
fn expand_variables(url: &str, server: &NodeRef) -> String {
    let mut expanded = url.to_string();
    if let Some(variables) = server.get("variables") {
        for (name, variable) in variables.pairs() {
            if let Some(default) = variable.get_str("default") {
                expanded = expanded.replace(&format!("{{{}}}", name.value), default);
            }
        }
    }
    expanded
}

fn url_problem(url: &str) -> Option<&'static str> {
    // relative URLs resolve against the document location
    let valid = if url.contains("://") {
        Url::parse(url).is_ok_and(|parsed| parsed.has_host())
    } else {
        !url.is_empty()
    };
    if !valid {
        return Some("Server URL is not valid: no hostname or path provided");
    }
    if url.len() > 1 && url.ends_with('/') {
        return Some("Server URL is not valid: must not have a trailing slash");
    }
    None
}

/// Servers are declared and each has a usable URL
pub struct ApiServers;

impl RuleFunction for ApiServers {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let Some((key, servers)) = root.get_pair("servers") else {
            return vec![violation(context, "No servers defined for the specification", &root, "$")];
        };
        if servers.children().is_empty() {
            return vec![violation(
                context,
                "Servers definition is empty, contains no servers!",
                key,
                "$.servers",
            )];
        }

        let mut results = Vec::new();
        for (i, server) in servers.children().iter().enumerate() {
            let path = append_index("$.servers", i);
            let Some(url) = server.get("url") else {
                results.push(violation(context, "Server definition is missing a URL", server, path));
                continue;
            };
            if let Some(problem) = url_problem(&expand_variables(&url.value, server)) {
                results.push(violation(context, problem, url, append_key(&path, "url")));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasAPIServers")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}
