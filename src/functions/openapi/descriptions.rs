//! Description and summary checks

use super::{operations, unresolved_root};
use crate::functions::core::option_number;
use crate::functions::violation;
use crate::jsonpath::{append_index, append_key};
use crate::model::templates;
use crate::model::{
    FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult, FUNCTION_CATEGORY_OPENAPI,
};
use crate::node::NodeRef;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Descriptions must not carry script content matching `pattern`
#[derive(Default)]
pub struct NoEvalInDescriptions {
    cache: DashMap<String, Result<Regex, String>>,
}

impl NoEvalInDescriptions {
    fn compile(&self, pattern: &str) -> Result<Regex, String> {
        if let Some(found) = self.cache.get(pattern) {
            return found.value().clone();
        }
        let compiled = Regex::new(pattern).map_err(|e| e.to_string());
        self.cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

impl RuleFunction for NoEvalInDescriptions {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(pattern) = context.option_str("pattern").filter(|p| !p.is_empty()) else {
            return Vec::new();
        };
        if nodes.is_empty() {
            return Vec::new();
        }
        let rx = match self.compile(pattern) {
            Ok(rx) => rx,
            Err(error) => {
                return vec![violation(
                    context,
                    templates::regex_error(context.rule_message(), pattern, &error),
                    &nodes[0],
                    "$",
                )]
            }
        };
        context
            .index
            .all_descriptions()
            .iter()
            .filter(|d| rx.is_match(&d.content))
            .map(|d| {
                violation(
                    context,
                    context.rule.message_or(&format!(
                        "description contains content with '{}', forbidden",
                        pattern
                    )),
                    &d.node,
                    d.path.clone(),
                )
            })
            .collect()
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("noEvalDescription")
            .with_property("pattern", "the pattern to look for")
            .with_required(&["pattern"])
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// The same description or summary text used more than once
pub struct DescriptionDuplication;

impl RuleFunction for DescriptionDuplication {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let mut first_seen: HashMap<(bool, &str), usize> = HashMap::new();
        let mut results = Vec::new();
        for found in context.index.all_descriptions() {
            let text = found.content.trim();
            if text.is_empty() {
                continue;
            }
            match first_seen.get(&(found.is_summary, text)) {
                None => {
                    first_seen.insert((found.is_summary, text), found.node.line);
                }
                Some(line) => {
                    let label = if found.is_summary { "Summary" } else { "Description" };
                    results.push(violation(
                        context,
                        format!(
                            "{} at line '{}' is a duplicate of line '{}'",
                            label, found.node.line, line
                        ),
                        &found.node,
                        found.path.clone(),
                    ));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasDescriptionDuplication")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

const DESCRIBED_COMPONENTS: [&str; 8] = [
    "schemas",
    "parameters",
    "requestBodies",
    "responses",
    "examples",
    "headers",
    "links",
    "securitySchemes",
];

/// Components carry a description of at least `minWords` words
pub struct ComponentDescription;

impl RuleFunction for ComponentDescription {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(components) = unresolved_root(context)
            .filter(|_| !nodes.is_empty())
            .and_then(|r| r.get("components").cloned())
        else {
            return Vec::new();
        };
        let min_words = option_number(&context.options, "minWords").unwrap_or(0.0) as usize;
        let mut results = Vec::new();
        for section in DESCRIBED_COMPONENTS {
            let Some(entries) = components.get(section) else {
                continue;
            };
            let base = append_key("$.components", section);
            for (name, component) in entries.pairs() {
                if !component.is_map() || component.has_key("$ref") {
                    continue;
                }
                let path = append_key(&base, &name.value);
                match component.get("description") {
                    None => results.push(violation(
                        context,
                        format!(
                            "Component '{}' of type '{}' is missing a description",
                            name.value, section
                        ),
                        name,
                        path,
                    )),
                    Some(description) => {
                        let words = word_count(&description.value);
                        if words < min_words {
                            results.push(violation(
                                context,
                                format!(
                                    "Component '{}' of type '{}' description must be at least {} words long, ({} is not enough)",
                                    name.value, section, min_words, words
                                ),
                                description,
                                append_key(&path, "description"),
                            ));
                        }
                    }
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasComponentDescriptions")
            .with_property("minWords", "the minimum number of words a description must contain")
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_OPENAPI
    }
}

/// Parameters carry a description. References are checked where they lead.
pub struct ParameterDescription;

impl ParameterDescription {
    fn check(
        params: &NodeRef,
        base: &str,
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        for (i, param) in params.children().iter().enumerate() {
            if param.is_map() && !param.has_key("$ref") && !param.has_key("description") {
                results.push(Self::missing(param, append_index(base, i), context));
            }
        }
    }

    fn missing(param: &NodeRef, path: String, context: &RuleFunctionContext) -> RuleFunctionResult {
        let name = param.get_str("name").unwrap_or_default();
        violation(
            context,
            format!("the parameter '{}' does not contain a description", name),
            param,
            path,
        )
    }
}

impl RuleFunction for ParameterDescription {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let Some(root) = unresolved_root(context).filter(|_| !nodes.is_empty()) else {
            return Vec::new();
        };
        let mut results = Vec::new();

        let shared: Vec<(String, NodeRef)> = root
            .get("paths")
            .map(|paths| {
                paths
                    .pairs()
                    .filter_map(|(p, item)| {
                        item.get("parameters")
                            .map(|params| (append_key(&append_key("$.paths", &p.value), "parameters"), params.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        for (base, params) in &shared {
            Self::check(params, base, context, &mut results);
        }
        for op in operations(&root) {
            if let Some(params) = op.node.get("parameters") {
                Self::check(params, &append_key(&op.json_path, "parameters"), context, &mut results);
            }
        }

        let reusable = root
            .get("components")
            .and_then(|c| c.get("parameters"))
            .map(|p| (p, "$.components.parameters"))
            .or_else(|| root.get("parameters").map(|p| (p, "$.parameters")));
        if let Some((params, base)) = reusable {
            for (name, param) in params.pairs() {
                if param.is_map() && !param.has_key("$ref") && !param.has_key("description") {
                    results.push(Self::missing(param, append_key(base, &name.value), context));
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("oasParamDescriptions")
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
info:
  title: pets
  description: a pet store
paths:
  /pets/{id}:
    parameters:
      - name: id
        in: path
        required: true
    get:
      summary: get a pet
      description: a pet store
      parameters:
        - name: verbose
          in: query
          description: more detail
        - $ref: '#/components/parameters/Limit'
      responses:
        '200':
          description: <script>eval(alert)</script>
components:
  parameters:
    Limit:
      name: limit
      in: query
  schemas:
    Pet:
      type: object
      description: a pet
    Owner:
      type: object
";

    #[test]
    fn test_no_eval() {
        let (ctx, root) = document_context(SPEC, "noEvalDescription", json!({"pattern": "eval\\("}));
        let results = NoEvalInDescriptions::default().run_rule(&[root.clone()], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "description contains content with 'eval\\(', forbidden");

        let (ctx, _) = document_context(SPEC, "noEvalDescription", json!({"pattern": "eval("}));
        let results = NoEvalInDescriptions::default().run_rule(&[root], &ctx);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("cannot be compiled"));
    }

    #[test]
    fn test_duplication() {
        let (ctx, root) = document_context(SPEC, "oasDescriptionDuplication", json!(null));
        let results = DescriptionDuplication.run_rule(&[root], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "Description at line '13' is a duplicate of line '4'");
    }

    #[test]
    fn test_component_descriptions() {
        let (ctx, root) = document_context(SPEC, "oasComponentDescriptions", json!({"minWords": 3}));
        let results = ComponentDescription.run_rule(&[root], &ctx);
        let texts: Vec<&str> = results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Component 'Pet' of type 'schemas' description must be at least 3 words long, (2 is not enough)",
                "Component 'Owner' of type 'schemas' is missing a description",
                "Component 'Limit' of type 'parameters' is missing a description",
            ]
        );
    }

    #[test]
    fn test_parameter_descriptions() {
        let (ctx, root) = document_context(SPEC, "oasParamDescriptions", json!(null));
        let results = ParameterDescription.run_rule(&[root], &ctx);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "the parameter 'id' does not contain a description");
        assert_eq!(results[0].path, "$.paths['/pets/{id}'].parameters[0]");
        assert_eq!(results[1].path, "$.components.parameters.Limit");
    }
}
