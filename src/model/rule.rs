//! Rule definitions

use super::category::RuleCategory;
use crate::spec_info::{format_matches, Format};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[default]
    Warn,
    Info,
    Hint,
}

impl Severity {
    /// Spectral's numeric form: error 0, warn 1, info 2, hint 3
    pub fn as_int(&self) -> u8 {
        match self {
            Severity::Error => 0,
            Severity::Warn => 1,
            Severity::Info => 2,
            Severity::Hint => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warn => write!(f, "warn"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warn" | "warning" => Ok(Severity::Warn),
            "info" | "information" => Ok(Severity::Info),
            "hint" => Ok(Severity::Hint),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// One or more JSONPath expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Given {
    One(String),
    Many(Vec<String>),
}

impl Default for Given {
    fn default() -> Self {
        Given::One("$".to_string())
    }
}

impl Given {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Given::One(p) => vec![p.as_str()],
            Given::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }

    /// Single expressions render as-is, lists are joined with `, `
    pub fn display(&self) -> String {
        self.paths().join(", ")
    }
}

impl From<&str> for Given {
    fn from(path: &str) -> Self {
        Given::One(path.to_string())
    }
}

/// What a rule does with each matched node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default)]
    pub function: String,
    #[serde(
        default,
        rename = "functionOptions",
        skip_serializing_if = "Option::is_none"
    )]
    pub function_options: Option<Value>,
}

impl RuleAction {
    pub fn new(function: &str) -> Self {
        Self {
            function: function.to_string(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.function_options = Some(options);
        self
    }

    /// Options as a JSON value, `null` when none were given
    pub fn options(&self) -> Value {
        self.function_options.clone().unwrap_or(Value::Null)
    }
}

/// One or more rule actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Then {
    One(RuleAction),
    Many(Vec<RuleAction>),
}

impl Default for Then {
    fn default() -> Self {
        Then::One(RuleAction::default())
    }
}

impl Then {
    pub fn actions(&self) -> Vec<&RuleAction> {
        match self {
            Then::One(a) => vec![a],
            Then::Many(actions) => actions.iter().collect(),
        }
    }
}

impl From<RuleAction> for Then {
    fn from(action: RuleAction) -> Self {
        Then::One(action)
    }
}

impl From<Vec<RuleAction>> for Then {
    fn from(actions: Vec<RuleAction>) -> Self {
        Then::Many(actions)
    }
}

fn default_true() -> bool {
    true
}

/// A lint rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique rule identifier (e.g. `operation-operationId`)
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Message template; empty falls back to the description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub given: Given,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<Format>,

    /// Run against the resolved document
    #[serde(default = "default_true")]
    pub resolved: bool,

    #[serde(default)]
    pub recommended: bool,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub then: Then,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RuleCategory>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub how_to_fix: String,

    /// Name of a registered auto-fix function
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auto_fix_function: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documentation_url: String,
}

impl Rule {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            resolved: true,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    pub fn with_given(mut self, given: impl Into<Given>) -> Self {
        self.given = given.into();
        self
    }

    pub fn with_givens(mut self, given: &[&str]) -> Self {
        self.given = Given::Many(given.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn with_then(mut self, then: impl Into<Then>) -> Self {
        self.then = then.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, id: &str) -> Self {
        self.category = RuleCategory::builtin(id);
        self
    }

    pub fn with_formats(mut self, formats: &[Format]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn with_how_to_fix(mut self, text: &str) -> Self {
        self.how_to_fix = text.to_string();
        self
    }

    pub fn recommended(mut self) -> Self {
        self.recommended = true;
        self
    }

    /// Run against the unresolved document
    pub fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    /// Does this rule run against a document with the given label?
    /// Rules without formats, or documents without a label, always match.
    pub fn matches_format(&self, doc_format: Option<Format>) -> bool {
        match doc_format {
            Some(doc) if !self.formats.is_empty() => {
                self.formats.iter().any(|f| format_matches(*f, doc))
            }
            _ => true,
        }
    }

    /// The message, or the description when no message is set
    pub fn rule_message(&self) -> &str {
        if self.message.is_empty() {
            &self.description
        } else {
            &self.message
        }
    }

    /// The rule's message when set, otherwise `default`
    pub fn message_or(&self, default: &str) -> String {
        if self.message.is_empty() {
            default.to_string()
        } else {
            self.message.clone()
        }
    }

    pub fn category_id(&self) -> &str {
        self.category.as_ref().map(|c| c.id.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_parse() {
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!(
            "loud".parse::<Severity>().unwrap_err(),
            "Unknown severity: loud"
        );
        assert_eq!(Severity::Hint.as_int(), 3);
    }

    #[test]
    fn test_rule_deserialize_single_and_many() {
        let rule: Rule = serde_json::from_value(json!({
            "description": "d",
            "given": "$.info",
            "severity": "error",
            "then": {"field": "contact", "function": "truthy"}
        }))
        .unwrap();
        assert!(rule.resolved);
        assert_eq!(rule.given.paths(), vec!["$.info"]);
        assert_eq!(rule.then.actions()[0].field, "contact");
        assert_eq!(rule.severity, Severity::Error);

        let rule: Rule = serde_json::from_value(json!({
            "given": ["$.a", "$.b"],
            "formats": ["oas3_1"],
            "resolved": false,
            "category": "tags",
            "then": [
                {"function": "truthy"},
                {"function": "pattern", "functionOptions": {"match": "^a"}}
            ]
        }))
        .unwrap();
        assert!(!rule.resolved);
        assert_eq!(rule.given.display(), "$.a, $.b");
        assert_eq!(rule.then.actions().len(), 2);
        assert_eq!(rule.formats, vec![Format::Oas31]);
        assert_eq!(rule.category_id(), "tags");
    }

    #[test]
    fn test_matches_format() {
        let rule = Rule::new("r").with_formats(&[Format::Oas3]);
        assert!(rule.matches_format(Some(Format::Oas31)));
        assert!(!rule.matches_format(Some(Format::Oas2)));
        assert!(rule.matches_format(None));
        assert!(Rule::new("any").matches_format(Some(Format::Oas2)));
    }

    #[test]
    fn test_rule_message_fallback() {
        let rule = Rule::new("r").with_description("describe");
        assert_eq!(rule.rule_message(), "describe");
        assert_eq!(rule.message_or("default"), "default");
        let rule = rule.with_message("custom");
        assert_eq!(rule.rule_message(), "custom");
        assert_eq!(rule.message_or("default"), "custom");
    }
}
