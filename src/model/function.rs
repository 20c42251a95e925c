//! The rule function contract

use super::result::RuleFunctionResult;
use super::rule::{Rule, RuleAction};
use crate::doctor::DoctorDocument;
use crate::index::SpecIndex;
use crate::node::{Node, NodeKind, NodeRef};
use crate::spec_info::SpecInfo;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const FUNCTION_CATEGORY_CORE: &str = "core";
pub const FUNCTION_CATEGORY_OPENAPI: &str = "openapi";
pub const FUNCTION_CATEGORY_OWASP: &str = "owasp";
pub const FUNCTION_CATEGORY_CUSTOM: &str = "custom";

/// A declared option of a function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionProperty {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Validation pattern for the option value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// What a function accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<FunctionProperty>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub requires_field: bool,
    #[serde(default)]
    pub min_properties: usize,
    #[serde(default)]
    pub max_properties: usize,
    #[serde(default)]
    pub error_message: String,
}

impl FunctionSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_property(mut self, name: &str, description: &str) -> Self {
        self.properties.push(FunctionProperty {
            name: name.to_string(),
            description: description.to_string(),
            pattern: None,
        });
        self
    }

    pub fn with_required(mut self, required: &[&str]) -> Self {
        self.required = required.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn requires_field(mut self) -> Self {
        self.requires_field = true;
        self
    }

    pub fn with_min_properties(mut self, min: usize) -> Self {
        self.min_properties = min;
        self
    }

    pub fn with_max_properties(mut self, max: usize) -> Self {
        self.max_properties = max;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn property_description(&self, name: &str) -> &str {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.description.as_str())
            .unwrap_or("")
    }
}

/// A function a rule action can call
pub trait RuleFunction: Send + Sync {
    /// Check the matched nodes, returning one result per violation
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult>;

    fn schema(&self) -> FunctionSchema;

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_CORE
    }
}

/// Everything a function sees for one invocation
#[derive(Clone)]
pub struct RuleFunctionContext {
    pub rule: Arc<Rule>,
    pub rule_action: RuleAction,
    /// Options of the action, `null` when none
    pub options: Value,
    /// The `given` path that produced the nodes
    pub given: String,
    pub index: Arc<SpecIndex>,
    /// Document the rule runs against (resolved unless the rule opts out)
    pub document: NodeRef,
    pub spec_info: Arc<SpecInfo>,
    pub doctor: Option<Arc<dyn DoctorDocument>>,
    /// Schema location (`line:column`) to every JSONPath it appears at
    pub schema_path_cache: Arc<DashMap<String, Vec<String>>>,
    /// Suppress per-invocation logging
    pub silent: bool,
}

impl std::fmt::Debug for RuleFunctionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleFunctionContext")
            .field("rule", &self.rule.id)
            .field("rule_action", &self.rule_action)
            .field("given", &self.given)
            .finish()
    }
}

impl RuleFunctionContext {
    /// A context with an empty document and index
    pub fn new(rule: Arc<Rule>) -> Self {
        let rule_action = rule.then.actions().first().map(|a| (*a).clone()).unwrap_or_default();
        Self {
            options: rule_action.options(),
            given: rule.given.paths().first().map(|g| g.to_string()).unwrap_or_default(),
            rule,
            rule_action,
            index: Arc::new(SpecIndex::empty()),
            document: Node::new(NodeKind::Document).into_ref(),
            spec_info: Arc::new(SpecInfo::default()),
            doctor: None,
            schema_path_cache: Arc::new(DashMap::new()),
            silent: false,
        }
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.options = action.options();
        self.rule_action = action;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_given(mut self, given: &str) -> Self {
        self.given = given.to_string();
        self
    }

    pub fn with_index(mut self, index: Arc<SpecIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_document(mut self, document: NodeRef) -> Self {
        self.document = document;
        self
    }

    pub fn with_spec_info(mut self, info: Arc<SpecInfo>) -> Self {
        self.spec_info = info;
        self
    }

    pub fn with_doctor(mut self, doctor: Arc<dyn DoctorDocument>) -> Self {
        self.doctor = Some(doctor);
        self
    }

    /// The rule's message, or its description
    pub fn rule_message(&self) -> &str {
        self.rule.rule_message()
    }

    /// A string option
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// The root mapping of the document
    pub fn root(&self) -> Option<&NodeRef> {
        self.document.root()
    }
}

fn count_option(value: &Value) -> usize {
    match value {
        Value::String(s) if s.contains(',') => s.split(',').count(),
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Check an invocation's options against the function's schema.
///
/// Checks property bounds, then the field requirement, then required
/// options, then unknown keys. Dotted property names (`separator.char`)
/// allow their top-level key.
pub fn validate_options(
    schema: &FunctionSchema,
    options: &Value,
    action: &RuleAction,
) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let supplied = options.as_object();
    let count: usize = supplied
        .map(|o| o.values().map(count_option).sum())
        .unwrap_or(0);

    if schema.min_properties > 0 && count < schema.min_properties {
        errors.push(format!(
            "{}: minimum property number not met ({})",
            schema.error_message, schema.min_properties
        ));
    }
    if schema.max_properties > 0 && count > schema.max_properties {
        errors.push(format!(
            "{}: maximum number ({}) of properties exceeded. '{}' provided.",
            schema.error_message, schema.max_properties, count
        ));
    }
    if schema.requires_field && action.field.is_empty() {
        errors.push(format!("'{}' requires a 'field' value to be set", schema.name));
    }
    for required in &schema.required {
        if !supplied.is_some_and(|o| o.contains_key(required)) {
            errors.push(format!(
                "{}: missing required property: {} ({})",
                schema.error_message,
                required,
                schema.property_description(required)
            ));
        }
    }
    if let Some(supplied) = supplied.filter(|_| !schema.properties.is_empty()) {
        for key in supplied.keys() {
            let prefix = format!("{}.", key);
            let known = schema
                .properties
                .iter()
                .any(|p| &p.name == key || p.name.starts_with(&prefix));
            if !known {
                let valid: Vec<&str> = schema.properties.iter().map(|p| p.name.as_str()).collect();
                errors.push(format!(
                    "{}: unknown property '{}' supplied, valid properties are: {}",
                    schema.error_message,
                    key,
                    valid.join(", ")
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Flatten options into strings: arrays are joined with `,`, nested objects
/// become `parent.child` keys
pub fn options_as_string_map(options: &Value) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    if let Some(map) = options.as_object() {
        for (key, value) in map {
            flatten_option(key, value, &mut out);
        }
    }
    out
}

fn flatten_option(key: &str, value: &Value, out: &mut IndexMap<String, String>) {
    match value {
        Value::String(s) => {
            out.insert(key.to_string(), s.clone());
        }
        Value::Array(items) => {
            let joined: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            out.insert(key.to_string(), joined.join(","));
        }
        Value::Object(map) => {
            for (child, v) in map {
                flatten_option(&format!("{}.{}", key, child), v, out);
            }
        }
        Value::Null => {}
        other => {
            out.insert(key.to_string(), other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn casing_schema() -> FunctionSchema {
        FunctionSchema::new("casing")
            .with_property("type", "the casing type")
            .with_property("disallowDigits", "no digits")
            .with_property("separator.char", "separator")
            .with_property("separator.allowLeading", "leading separator")
            .with_required(&["type"])
            .with_min_properties(1)
            .with_max_properties(4)
            .with_error_message("'casing' function has invalid options supplied")
    }

    #[test]
    fn test_validate_ok_with_dotted_property() {
        let options = json!({"type": "camel", "separator": {"char": "-"}});
        assert!(validate_options(&casing_schema(), &options, &RuleAction::new("casing")).is_ok());
    }

    #[test]
    fn test_validate_missing_required_and_min() {
        let errors =
            validate_options(&casing_schema(), &json!({}), &RuleAction::new("casing")).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("minimum property number not met (1)"));
        assert!(errors[1].contains("missing required property: type (the casing type)"));
    }

    #[test]
    fn test_validate_max_and_unknown() {
        let schema = FunctionSchema::new("xor")
            .with_property("properties", "two properties")
            .with_max_properties(2)
            .with_error_message("'xor' function has invalid options supplied");
        let errors = validate_options(
            &schema,
            &json!({"properties": "a,b,c", "bogus": true}),
            &RuleAction::new("xor"),
        )
        .unwrap_err();
        assert!(errors[0].contains("maximum number (2) of properties exceeded. '4' provided."));
        assert!(errors[1].contains("unknown property 'bogus' supplied"));
    }

    #[test]
    fn test_validate_requires_field() {
        let schema = FunctionSchema::new("truthy").requires_field();
        let errors = validate_options(&schema, &Value::Null, &RuleAction::new("truthy")).unwrap_err();
        assert_eq!(errors, vec!["'truthy' requires a 'field' value to be set"]);
        let action = RuleAction::new("truthy").with_field("description");
        assert!(validate_options(&schema, &Value::Null, &action).is_ok());
    }

    #[test]
    fn test_options_as_string_map() {
        let map = options_as_string_map(&json!({
            "type": "kebab",
            "values": ["a", "b", 3],
            "separator": {"char": "-", "allowLeading": true}
        }));
        assert_eq!(map["type"], "kebab");
        assert_eq!(map["values"], "a,b,3");
        assert_eq!(map["separator.char"], "-");
        assert_eq!(map["separator.allowLeading"], "true");
    }

    #[test]
    fn test_context_takes_first_action() {
        let rule = Rule::new("r")
            .with_given("$.info")
            .with_then(RuleAction::new("pattern").with_options(json!({"match": "^a"})));
        let ctx = RuleFunctionContext::new(Arc::new(rule));
        assert_eq!(ctx.given, "$.info");
        assert_eq!(ctx.option_str("match"), Some("^a"));
        assert!(ctx.root().is_none());
    }
}
