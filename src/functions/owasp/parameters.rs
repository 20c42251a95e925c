//! Parameter checks: secrets in URLs and guessable identifiers

use super::parameters;
use crate::functions::openapi::document_root;
use crate::functions::violation;
use crate::jsonpath::append_key;
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OWASP,
};
use crate::node::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;

static CREDENTIALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*(client_?secret|token|access_?token|refresh_?token|id_?token|password|secret|api-?key).*$")
        .expect("valid regex")
});

/// Query and path parameters must not be named like credentials
pub struct NoCredentialsInUrl;

impl RuleFunction for NoCredentialsInUrl {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        parameters(&root)
            .into_iter()
            .filter(|(param, _)| matches!(param.get_str("in"), Some("query" | "path")))
            .filter_map(|(param, path)| {
                let name = param.get("name")?;
                CREDENTIALS.is_match(&name.value).then(|| {
                    violation(
                        context,
                        templates::credentials_in_url(&name.value),
                        name,
                        append_key(&path, "name"),
                    )
                })
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspNoCredentialsInUrl")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}

fn is_identifier(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "id" || name.ends_with("_id") || name.ends_with("-id")
}

/// Identifier parameters must not be integers
pub struct NoNumericIds;

impl RuleFunction for NoNumericIds {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        parameters(&root)
            .into_iter()
            .filter(|(param, _)| param.get_str("name").is_some_and(is_identifier))
            .filter_map(|(param, path)| {
                // swagger parameters carry their type directly
                let (holder, path) = match param.get("schema") {
                    Some(schema) => (schema.clone(), append_key(&path, "schema")),
                    None => (param, path),
                };
                let kind = holder.get("type")?;
                let integer = if kind.is_seq() {
                    kind.children().iter().any(|t| t.value == "integer")
                } else {
                    kind.value == "integer"
                };
                integer.then(|| {
                    violation(
                        context,
                        "don't use numeric IDs, use random IDs that cannot be guessed like UUIDs",
                        kind,
                        append_key(&path, "type"),
                    )
                })
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("owaspNoNumericIDs")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OWASP
    }
}
