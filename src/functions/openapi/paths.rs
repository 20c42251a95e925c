//! Path template checks

use super::document_root;
use crate::functions::violation;
use crate::index::is_http_method;
use crate::jsonpath::append_key;
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::NodeRef;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{;?\??([a-zA-Z0-9_-]+)\*?\}").expect("valid regex"));

static TEMPLATE_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{.+?\}$").expect("valid regex"));

static KEBAB_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[{}a-z\d\-.]+$").expect("valid regex"));

/// Path parameters declared in a `parameters` list, by name
fn declared_path_params(
    parameters: Option<&NodeRef>,
    label: &str,
    context: &RuleFunctionContext,
    path: &str,
    results: &mut Vec<RuleFunctionResult>,
) -> IndexMap<String, NodeRef> {
    let mut declared = IndexMap::new();
    let Some(parameters) = parameters else {
        return declared;
    };
    for param in parameters.children() {
        if param.get_str("in") != Some("path") {
            continue;
        }
        let Some((_, name)) = param.get_pair("name") else {
            continue;
        };
        if let Some(required) = param.get("required") {
            if required.as_bool() != Some(true) {
                results.push(violation(
                    context,
                    format!("`{}` `{}` must have 'required' parameter that is set to 'true'", path, label),
                    required,
                    append_key("$.paths", path),
                ));
            }
        }
        if declared.contains_key(&name.value) {
            results.push(violation(
                context,
                format!(
                    "`{}` `{}` has a parameter '{}' defined multiple times",
                    path, label, name.value
                ),
                name,
                append_key("$.paths", path),
            ));
            continue;
        }
        declared.insert(name.value.clone(), Arc::clone(param));
    }
    declared
}

/// Path templates and path parameters agree: every `{name}` is declared,
/// every declared path parameter is used, and no two paths are the same
/// once parameter names are ignored
pub struct PathParameters;

impl PathParameters {
    fn compare(
        path: &str,
        elements: &IndexSet<String>,
        declared: &IndexMap<String, NodeRef>,
        anchor: &NodeRef,
        json_path: &str,
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        for name in declared.keys() {
            if !elements.contains(name) {
                results.push(violation(
                    context,
                    format!("parameter '{}' must be used in path '{}'", name, path),
                    anchor,
                    json_path.to_string(),
                ));
            }
        }
        for name in elements {
            if !declared.contains_key(name) {
                results.push(violation(
                    context,
                    format!(
                        "Operation must define parameter '{}' as expected by path '{}'",
                        name, path
                    ),
                    anchor,
                    json_path.to_string(),
                ));
            }
        }
    }
}

impl RuleFunction for PathParameters {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = document_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let Some(paths) = root.get("paths") else {
            return Vec::new();
        };
        let mut results = Vec::new();
        let mut normalized_seen: IndexMap<String, String> = IndexMap::new();

        for (path_key, item) in paths.pairs() {
            let path = path_key.value.as_str();
            let item_path = append_key("$.paths", path);

            let normalized = PATH_PARAM.replace_all(path, "%").to_string();
            match normalized_seen.get(&normalized) {
                Some(previous) => results.push(violation(
                    context,
                    format!(
                        "Paths '{}' and '{}' must not be equivalent, paths must be unique",
                        previous, path
                    ),
                    path_key,
                    item_path.clone(),
                )),
                None => {
                    normalized_seen.insert(normalized, path.to_string());
                }
            }

            let mut elements = IndexSet::new();
            for capture in PATH_PARAM.captures_iter(path) {
                let name = capture[1].to_string();
                if !elements.insert(name.clone()) {
                    results.push(violation(
                        context,
                        format!("Path '{}' must not use the parameter '{}' multiple times", path, name),
                        path_key,
                        item_path.clone(),
                    ));
                }
            }

            let shared = declared_path_params(item.get("parameters"), "parameters", context, path, &mut results);
            let mut has_operations = false;
            for (method, operation) in item.pairs() {
                if !is_http_method(&method.value) {
                    continue;
                }
                has_operations = true;
                let mut declared = shared.clone();
                declared.extend(declared_path_params(
                    operation.get("parameters"),
                    &method.value,
                    context,
                    path,
                    &mut results,
                ));
                Self::compare(
                    path,
                    &elements,
                    &declared,
                    method,
                    &append_key(&item_path, &method.value),
                    context,
                    &mut results,
                );
            }
            if !has_operations {
                Self::compare(path, &elements, &shared, path_key, &item_path, context, &mut results);
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasPathParam")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Do two templates match the same requests
fn ambiguous(a: &str, b: &str) -> bool {
    let segments_a: Vec<&str> = a.split('/').skip(1).collect();
    let segments_b: Vec<&str> = b.split('/').skip(1).collect();
    if segments_a.len() != segments_b.len() {
        return false;
    }
    let (mut vars_a, mut vars_b) = (0, 0);
    for (sa, sb) in segments_a.iter().zip(&segments_b) {
        let (va, vb) = (TEMPLATE_SEGMENT.is_match(sa), TEMPLATE_SEGMENT.is_match(sb));
        if va || vb {
            vars_a += usize::from(va);
            vars_b += usize::from(vb);
        } else if sa != sb {
            return false;
        }
    }
    vars_a == vars_b
}

/// No two paths may resolve to the same request
pub struct AmbiguousPaths;

impl RuleFunction for AmbiguousPaths {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(paths) = document_root(context)
            .filter(|_| !nodes.is_empty())
            .and_then(|r| r.get("paths").cloned())
        else {
            return Vec::new();
        };
        let mut seen: Vec<&str> = Vec::new();
        let mut results = Vec::new();
        for (key, _) in paths.pairs() {
            for previous in &seen {
                if ambiguous(previous, &key.value) {
                    results.push(violation(
                        context,
                        format!(
                            "Paths are ambiguous with one another: `{}` and `{}`",
                            previous, key.value
                        ),
                        key,
                        append_key("$.paths", &key.value),
                    ));
                }
            }
            seen.push(&key.value);
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("noAmbiguousPaths")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Path segments must not be HTTP verbs
pub struct VerbsInPath;

impl RuleFunction for VerbsInPath {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(paths) = document_root(context)
            .filter(|_| !nodes.is_empty())
            .and_then(|r| r.get("paths").cloned())
        else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for (key, _) in paths.pairs() {
            if let Some(verb) = key.value.split('/').skip(1).find(|s| is_http_method(s)) {
                results.push(violation(
                    context,
                    templates::verb_in_path(&key.value, verb),
                    key,
                    append_key("$.paths", &key.value),
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("noVerbsInPath")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Path segments are kebab-case; template segments are exempt
pub struct PathsKebabCase;

impl PathsKebabCase {
    fn offending(path: &str) -> Vec<&str> {
        path.split('/')
            .skip(1)
            .filter(|s| !s.is_empty())
            .filter(|s| !(s.starts_with('{') && s.ends_with('}')))
            .filter(|s| !KEBAB_SEGMENT.is_match(s))
            .collect()
    }
}

impl RuleFunction for PathsKebabCase {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(paths) = document_root(context)
            .filter(|_| !nodes.is_empty())
            .and_then(|r| r.get("paths").cloned())
        else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for (key, _) in paths.pairs() {
            if key.value == "/" {
                continue;
            }
            let segments = Self::offending(&key.value);
            if !segments.is_empty() {
                results.push(violation(
                    context,
                    templates::kebab_case(&segments.join("`, `")),
                    key,
                    append_key("$.paths", &key.value),
                ));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("pathsKebabCase")
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
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
    get:
      parameters:
        - name: owner
          in: path
          required: false
  /pets/{id}:
    get: {}
  /getPets/{a}/{a}:
    get:
      parameters:
        - name: a
          in: path
          required: true
  /Pet_Store/items:
    get: {}
  /pets/mine:
    get: {}
";

    fn run(function: &dyn RuleFunction) -> Vec<String> {
        let (ctx, root) = document_context(SPEC, "fn", json!(null));
        function.run_rule(&[root], &ctx).into_iter().map(|r| r.message).collect()
    }

    #[test]
    fn test_path_parameters() {
        let messages = run(&PathParameters);
        assert!(messages.contains(&"`/pets/{petId}` `get` must have 'required' parameter that is set to 'true'".to_string()));
        assert!(messages.contains(&"parameter 'owner' must be used in path '/pets/{petId}'".to_string()));
        assert!(messages.contains(
            &"Paths '/pets/{petId}' and '/pets/{id}' must not be equivalent, paths must be unique".to_string()
        ));
        assert!(messages.contains(
            &"Operation must define parameter 'id' as expected by path '/pets/{id}'".to_string()
        ));
        assert!(messages.contains(&"Path '/getPets/{a}/{a}' must not use the parameter 'a' multiple times".to_string()));
        assert_eq!(messages.len(), 5);
    }

    #[test]
    fn test_ambiguous() {
        assert!(ambiguous("/pets/{id}", "/pets/{petId}"));
        assert!(!ambiguous("/pets/{id}", "/pets/mine"));
        assert!(!ambiguous("/pets", "/pets/{id}"));
        let messages = run(&AmbiguousPaths);
        assert_eq!(messages, vec!["Paths are ambiguous with one another: `/pets/{petId}` and `/pets/{id}`"]);
    }

    #[test]
    fn test_verbs_and_kebab_case() {
        assert_eq!(run(&VerbsInPath), Vec::<String>::new());
        let ctx = context("noVerbsInPath", "", json!(null));
        let node = root("paths:\n  /pets/get: {}\n");
        let ctx = ctx.with_document(
            crate::node::Node::new(crate::node::NodeKind::Document)
                .with_content(vec![node.clone()])
                .into_ref(),
        );
        let results = VerbsInPath.run_rule(&[node], &ctx);
        assert_eq!(results[0].message, "path `/pets/get` contains an HTTP Verb `get`");
        assert_eq!(results[0].path, "$.paths['/pets/get']");

        let messages = run(&PathsKebabCase);
        assert_eq!(
            messages,
            vec![
                "path segments `getPets` do not use kebab-case",
                "path segments `Pet_Store` do not use kebab-case"
            ]
        );
    }
}
