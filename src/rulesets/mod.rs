//! Rule sets
//!
//! The built-in rule bags (`all`, `recommended`, OWASP) and the compiler
//! that turns a Spectral-compatible rule-set document into a ready to run
//! [`RuleSet`]:
//!
//! ```yaml
//! extends: [[vacuum:oas, recommended]]
//! functions: [checkTitle]
//! rules:
//!   info-description: off
//!   operation-tags: error
//!   paths-kebab-case: true
//!   title-check:
//!     given: $.info
//!     then:
//!       field: title
//!       function: checkTitle
//! ```

pub mod openapi;
pub mod owasp;

pub use openapi::openapi_rules;
pub use owasp::owasp_rules;

use crate::functions::FunctionRegistry;
use crate::index::remote::{FileReader, FsReader, RemoteFetcher};
use crate::jsonpath::JsonPath;
use crate::model::category::CATEGORY_VALIDATION;
use crate::model::{Rule, RuleCategory, RuleCategoryRegistry, Severity};
use crate::spec_info::Format;
use indexmap::IndexMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const VACUUM_OPENAPI: &str = "vacuum:oas";
pub const SPECTRAL_OPENAPI: &str = "spectral:oas";
pub const VACUUM_OWASP: &str = "vacuum:owasp";
pub const SPECTRAL_OWASP: &str = "spectral:owasp";
pub const VACUUM_ALL_RULESETS: &str = "vacuum:all";
pub const RECOMMENDED: &str = "recommended";
pub const ALL: &str = "all";
pub const OFF: &str = "off";

const MAX_EXTENDS_DEPTH: usize = 10;

/// Errors raised while building a rule set
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("unable to parse rule set: {0}")]
    Parse(String),

    #[error("rules not valid: {0}")]
    Invalid(String),

    #[error("rule '{rule}' uses unknown function '{function}'")]
    UnknownFunction { rule: String, function: String },

    #[error("rule '{rule}' has an unknown severity '{severity}'")]
    Severity { rule: String, severity: String },

    #[error("rule '{rule}' has an invalid given path: {message}")]
    Given { rule: String, message: String },

    #[error("function '{0}' is declared but was not loaded")]
    FunctionNotLoaded(String),

    #[error("unable to extend rule set '{location}': {message}")]
    Extends { location: String, message: String },
}

/// One `extends` entry: a name, or a `[name, mode]` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtendsEntry {
    Name(String),
    Pair(String, String),
}

/// `extends` is a single name or a list of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extends {
    One(String),
    Many(Vec<ExtendsEntry>),
}

/// A collection of rules, and the raw definitions it was built from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(
        default,
        rename = "documentationUrl",
        alias = "documentationUri",
        skip_serializing_if = "String::is_empty"
    )]
    pub documentation_uri: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<Format>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Extends>,

    /// Raw `rules` entries: severity strings, booleans or full definitions
    #[serde(default, rename = "rules")]
    pub rule_definitions: IndexMap<String, Value>,

    /// Names of custom functions the rules expect to be loaded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<String>,

    #[serde(skip)]
    pub rules: IndexMap<String, Rule>,
}

impl RuleSet {
    /// `extends` normalized to name -> mode. A bare name is its own mode.
    pub fn extends_value(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        match &self.extends {
            Some(Extends::One(name)) => {
                out.insert(name.clone(), name.clone());
            }
            Some(Extends::Many(entries)) => {
                for entry in entries {
                    match entry {
                        ExtendsEntry::Name(name) => out.insert(name.clone(), name.clone()),
                        ExtendsEntry::Pair(name, mode) => out.insert(name.clone(), mode.clone()),
                    };
                }
            }
            None => {}
        }
        out
    }

    /// Check every rule against a function registry: functions must be
    /// registered and `given` paths must compile
    pub fn validate(&self, registry: &FunctionRegistry) -> Result<(), RuleSetError> {
        for name in &self.functions {
            if !registry.contains(name) {
                return Err(RuleSetError::FunctionNotLoaded(name.clone()));
            }
        }
        for (id, rule) in &self.rules {
            for given in rule.given.paths() {
                JsonPath::compile(given).map_err(|e| RuleSetError::Given {
                    rule: id.clone(),
                    message: e.to_string(),
                })?;
            }
            for action in rule.then.actions() {
                if !registry.contains(&action.function) {
                    return Err(RuleSetError::UnknownFunction {
                        rule: id.clone(),
                        function: action.function.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Rules sorted by id
    pub fn sorted_rules(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.values().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }
}

static RULE_SET_SCHEMA: Lazy<Value> = Lazy::new(|| {
    let severity = json!({"enum": ["error", "warn", "warning", "info", "information", "hint", "off"]});
    let format = json!({"enum": ["oas2", "oas3", "oas3_0", "oas3_1", "oas3_2", "asyncapi"]});
    let strings = json!({"anyOf": [
        {"type": "string"},
        {"type": "array", "items": {"type": "string"}}
    ]});
    let action = json!({
        "type": "object",
        "properties": {
            "field": {"type": "string"},
            "function": {"type": "string"},
            "functionOptions": {}
        },
        "required": ["function"]
    });
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "documentationUrl": {"type": "string"},
            "documentationUri": {"type": "string"},
            "description": {"type": "string"},
            "formats": {"type": "array", "items": format},
            "extends": {"anyOf": [
                {"type": "string"},
                {"type": "array", "items": {"anyOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}, "minItems": 2, "maxItems": 2}
                ]}}
            ]},
            "functions": {"type": "array", "items": {"type": "string"}},
            "rules": {
                "type": "object",
                "additionalProperties": {"anyOf": [
                    {"type": "boolean"},
                    severity,
                    {
                        "type": "object",
                        "properties": {
                            "given": strings,
                            "then": {"anyOf": [action, {"type": "array", "items": action}]},
                            "severity": severity,
                            "formats": {"type": "array", "items": format},
                            "description": {"type": "string"},
                            "message": {"type": "string"},
                            "recommended": {"type": "boolean"},
                            "resolved": {"type": "boolean"}
                        },
                        "required": ["given", "then"]
                    }
                ]}
            }
        }
    })
});

/// Validate a rule-set document against the embedded schema
fn check_document(document: &Value) -> Result<(), RuleSetError> {
    let validator =
        jsonschema::validator_for(&RULE_SET_SCHEMA).map_err(|e| RuleSetError::Invalid(e.to_string()))?;
    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| {
            let at = e.instance_path.to_string();
            if at.is_empty() {
                e.to_string()
            } else {
                format!("{} (at {})", e, at)
            }
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RuleSetError::Invalid(errors.join(", ")))
    }
}

/// Decode a full rule definition. Severity tokens are normalized first.
fn decode_rule(id: &str, definition: &Value) -> Result<Rule, RuleSetError> {
    let mut definition = definition.clone();
    if let Some(severity) = definition.get("severity").and_then(Value::as_str) {
        let normalized: Severity = severity.parse().map_err(|_| RuleSetError::Severity {
            rule: id.to_string(),
            severity: severity.to_string(),
        })?;
        definition["severity"] = Value::String(normalized.to_string());
    }
    let mut rule: Rule = serde_json::from_value(definition)
        .map_err(|e| RuleSetError::Parse(format!("rule '{}': {}", id, e)))?;
    rule.id = id.to_string();
    Ok(rule)
}

/// Parse a rule-set document from JSON or YAML bytes
pub fn create_rule_set_from_data(data: &[u8]) -> Result<RuleSet, RuleSetError> {
    let text = String::from_utf8_lossy(data);
    let trimmed = text.trim();
    let document: Value = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        serde_json::from_str(trimmed).map_err(|e| RuleSetError::Parse(e.to_string()))?
    } else {
        serde_yaml::from_str(&text).map_err(|e| RuleSetError::Parse(e.to_string()))?
    };
    // an empty document is an empty rule set
    let document = if document.is_null() { json!({}) } else { document };
    check_document(&document)?;

    let mut rule_set: RuleSet =
        serde_json::from_value(document).map_err(|e| RuleSetError::Parse(e.to_string()))?;
    for (id, definition) in &rule_set.rule_definitions {
        if definition.is_object() {
            rule_set.rules.insert(id.clone(), decode_rule(id, definition)?);
        }
    }
    Ok(rule_set)
}

/// A rule set made of the given rules and nothing else
pub fn create_rule_set_from_rule_map(rules: IndexMap<String, Rule>) -> RuleSet {
    RuleSet {
        documentation_uri: "https://quobix.com/vacuum/rulesets/understanding".to_string(),
        description: format!("a custom ruleset composed of {} rules", rules.len()),
        formats: vec![Format::Oas2, Format::Oas3],
        extends: Some(Extends::Many(vec![ExtendsEntry::Pair(
            VACUUM_OPENAPI.to_string(),
            OFF.to_string(),
        )])),
        rules,
        ..Default::default()
    }
}

/// Fetches the bytes of an extended rule set by location
pub trait RuleSetLoader: Send + Sync {
    fn load(&self, location: &str) -> Result<Vec<u8>, String>;
}

/// Loads local extends relative to a base directory, and remote ones
/// through a [`RemoteFetcher`] when one is configured
pub struct DefaultRuleSetLoader {
    base_path: PathBuf,
    reader: Arc<dyn FileReader>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
}

impl DefaultRuleSetLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            reader: Arc::new(FsReader),
            fetcher: None,
        }
    }

    /// The loader for extends of the rule-set file at `path`
    pub fn for_file(path: &Path) -> Self {
        Self::new(path.parent().unwrap_or(Path::new(".")))
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }
}

impl RuleSetLoader for DefaultRuleSetLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>, String> {
        if is_remote(location) {
            return match &self.fetcher {
                Some(fetcher) => fetcher.fetch(location),
                None => Err("remote rule sets are not enabled".to_string()),
            };
        }
        let path = Path::new(location);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        };
        self.reader.read(&path)
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn is_external(location: &str) -> bool {
    is_remote(location)
        || matches!(
            Path::new(location).extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml" | "json")
        )
}

/// The built-in rule library, and the compiler for supplied rule sets
pub struct RuleSets {
    openapi: IndexMap<String, Rule>,
    owasp: IndexMap<String, Rule>,
    categories: RuleCategoryRegistry,
    loader: Option<Arc<dyn RuleSetLoader>>,
}

impl Default for RuleSets {
    fn default() -> Self {
        Self {
            openapi: openapi_rules(),
            owasp: owasp_rules(),
            categories: RuleCategoryRegistry::default(),
            loader: None,
        }
    }
}

impl RuleSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: Arc<dyn RuleSetLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_categories(mut self, categories: RuleCategoryRegistry) -> Self {
        self.categories = categories;
        self
    }

    /// Every built-in OpenAPI rule
    pub fn generate_openapi_default_rule_set(&self) -> RuleSet {
        RuleSet {
            documentation_uri: "https://quobix.com/vacuum/rulesets/all".to_string(),
            description: "Every single rule that is built-in to vacuum. The full monty".to_string(),
            rules: self.openapi.clone(),
            ..Default::default()
        }
    }

    /// Only the recommended OpenAPI rules
    pub fn generate_openapi_recommended_rule_set(&self) -> RuleSet {
        RuleSet {
            documentation_uri: "https://quobix.com/vacuum/rulesets/recommended".to_string(),
            description: "Recommended rules for a high quality specification.".to_string(),
            rules: recommended(&self.openapi),
            ..Default::default()
        }
    }

    pub fn generate_owasp_rule_set(&self) -> RuleSet {
        RuleSet {
            documentation_uri: "https://quobix.com/vacuum/rulesets/owasp".to_string(),
            description: "All OWASP Rules, or 'hard mode' as we call it.".to_string(),
            rules: self.owasp.clone(),
            ..Default::default()
        }
    }

    /// Materialize a supplied rule set: pick the bases named by `extends`,
    /// pull in extended files, then apply the rule entries on top
    pub fn generate_rule_set_from_supplied(&self, supplied: &RuleSet) -> Result<RuleSet, RuleSetError> {
        self.generate(supplied, 0)
    }

    fn generate(&self, supplied: &RuleSet, depth: usize) -> Result<RuleSet, RuleSetError> {
        let extends = supplied.extends_value();
        let mut rule_set = RuleSet {
            documentation_uri: supplied.documentation_uri.clone(),
            description: supplied.description.clone(),
            formats: supplied.formats.clone(),
            extends: supplied.extends.clone(),
            rule_definitions: supplied.rule_definitions.clone(),
            functions: supplied.functions.clone(),
            rules: IndexMap::new(),
        };

        let mut off = false;
        for (name, mode) in &extends {
            if mode == OFF || name == OFF {
                off = true;
                continue;
            }
            match name.as_str() {
                VACUUM_OPENAPI | SPECTRAL_OPENAPI => {
                    let base = if mode == ALL {
                        self.generate_openapi_default_rule_set()
                    } else {
                        self.generate_openapi_recommended_rule_set()
                    };
                    if rule_set.documentation_uri.is_empty() {
                        rule_set.documentation_uri = base.documentation_uri;
                    }
                    rule_set.rules.extend(base.rules);
                }
                VACUUM_OWASP | SPECTRAL_OWASP => {
                    rule_set.rules.extend(self.owasp.clone());
                }
                VACUUM_ALL_RULESETS => {
                    rule_set.rules.extend(self.openapi.clone());
                    rule_set.rules.extend(self.owasp.clone());
                    if rule_set.description.is_empty() {
                        rule_set.description = "All OpenAPI and OWASP rules combined".to_string();
                    }
                }
                other if is_external(other) => {}
                other => warn!("unknown rule set '{}' in extends, ignoring it", other),
            }
        }
        if off {
            rule_set.rules.clear();
            rule_set.description = format!(
                "All disabled ruleset, processing {} supplied rules",
                supplied.rule_definitions.len()
            );
            if rule_set.documentation_uri.is_empty() {
                rule_set.documentation_uri = "https://quobix.com/vacuum/rulesets/no-rules".to_string();
            }
        }

        for location in extends.keys().filter(|l| is_external(l)) {
            let extended = self.load_extended(location, depth)?;
            debug!("extended rule set '{}' adds {} rules", location, extended.rules.len());
            rule_set.rules.extend(extended.rules);
        }

        for (id, definition) in &supplied.rule_definitions {
            self.apply_definition(&mut rule_set, &extends, id, definition)?;
        }
        for (id, rule) in &supplied.rules {
            if !supplied.rule_definitions.contains_key(id) {
                rule_set.rules.insert(id.clone(), rule.clone());
            }
        }
        if rule_set.documentation_uri.is_empty() {
            rule_set.documentation_uri = "https://quobix.com/vacuum/rulesets/understanding".to_string();
        }
        Ok(rule_set)
    }

    fn load_extended(&self, location: &str, depth: usize) -> Result<RuleSet, RuleSetError> {
        let extends_error = |message: String| RuleSetError::Extends {
            location: location.to_string(),
            message,
        };
        if depth >= MAX_EXTENDS_DEPTH {
            return Err(extends_error("maximum rule set inheritance depth exceeded".to_string()));
        }
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| extends_error("no rule set loader configured".to_string()))?;
        let bytes = loader.load(location).map_err(extends_error)?;
        let parsed = create_rule_set_from_data(&bytes).map_err(|e| extends_error(e.to_string()))?;
        self.generate(&parsed, depth + 1)
    }

    fn apply_definition(
        &self,
        rule_set: &mut RuleSet,
        extends: &IndexMap<String, String>,
        id: &str,
        definition: &Value,
    ) -> Result<(), RuleSetError> {
        match definition {
            Value::String(token) if token == OFF => {
                rule_set.rules.shift_remove(id);
            }
            Value::String(token) => {
                let severity: Severity = token.parse().map_err(|_| RuleSetError::Severity {
                    rule: id.to_string(),
                    severity: token.clone(),
                })?;
                match rule_set.rules.get_mut(id) {
                    Some(rule) => rule.severity = severity,
                    None => warn!("rule '{}' does not exist, ignoring it", id),
                }
            }
            Value::Bool(true) => {
                let owasp_allowed = extends.contains_key(VACUUM_ALL_RULESETS)
                    || extends.contains_key(VACUUM_OWASP)
                    || extends.contains_key(SPECTRAL_OWASP);
                let builtin = self
                    .openapi
                    .get(id)
                    .or_else(|| self.owasp.get(id).filter(|_| owasp_allowed));
                match builtin {
                    Some(rule) => {
                        rule_set.rules.insert(id.to_string(), rule.clone());
                    }
                    None => warn!("rule '{}' does not exist, ignoring it", id),
                }
            }
            Value::Bool(false) => {
                rule_set.rules.shift_remove(id);
            }
            Value::Object(fields) => {
                if fields.get("severity").and_then(Value::as_str) == Some(OFF) {
                    rule_set.rules.shift_remove(id);
                    return Ok(());
                }
                let mut rule = decode_rule(id, definition)?;
                rule.category = match rule.category.take() {
                    Some(category) => Some(
                        self.categories
                            .get(&category.id)
                            .cloned()
                            .unwrap_or(category),
                    ),
                    None => rule_set
                        .rules
                        .get(id)
                        .and_then(|existing| existing.category.clone())
                        .or_else(|| RuleCategory::builtin(CATEGORY_VALIDATION)),
                };
                rule_set.rules.insert(id.to_string(), rule);
            }
            other => warn!("rule '{}' has an unsupported definition: {}", id, other),
        }
        Ok(())
    }
}

fn recommended(rules: &IndexMap<String, Rule>) -> IndexMap<String, Rule> {
    rules
        .iter()
        .filter(|(_, rule)| rule.recommended)
        .map(|(id, rule)| (id.clone(), rule.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::category::CATEGORY_OWASP;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn build(yaml: &str) -> RuleSet {
        let supplied = create_rule_set_from_data(yaml.as_bytes()).unwrap();
        RuleSets::new().generate_rule_set_from_supplied(&supplied).unwrap()
    }

    #[test]
    fn test_recommended_is_a_subset() {
        let sets = RuleSets::new();
        let all = sets.generate_openapi_default_rule_set();
        let recommended = sets.generate_openapi_recommended_rule_set();
        assert!(recommended.rules.len() < all.rules.len());
        assert!(recommended.rules.values().all(|r| r.recommended));
        assert!(recommended.rules.keys().all(|id| all.rules.contains_key(id)));
    }

    #[test]
    fn test_extends_value() {
        let rule_set = create_rule_set_from_data(
            br#"{"extends": [["spectral:oas", "all"], "vacuum:owasp"], "rules": {}}"#,
        )
        .unwrap();
        let extends = rule_set.extends_value();
        assert_eq!(extends["spectral:oas"], "all");
        assert_eq!(extends["vacuum:owasp"], "vacuum:owasp");
    }

    #[test]
    fn test_unknown_top_level_key() {
        let err = create_rule_set_from_data(b"nope: 1\nrules: {}\n").unwrap_err();
        assert!(err.to_string().starts_with("rules not valid: "), "{}", err);
    }

    #[test]
    fn test_unknown_severity_token() {
        let err = create_rule_set_from_data(b"rules:\n  info-description: loud\n").unwrap_err();
        assert!(matches!(err, RuleSetError::Invalid(_)));
    }

    #[test]
    fn test_severity_overrides() {
        let rule_set = build(
            "extends: [[\"spectral:oas\", \"recommended\"]]\nrules:\n  info-description: warn\n  operation-operationId: \"off\"\n  operation-tags: warning\n",
        );
        assert_eq!(rule_set.rules["info-description"].severity, Severity::Warn);
        assert!(!rule_set.rules.contains_key("operation-operationId"));
        assert!(rule_set.rules.contains_key("operation-tags"));
    }

    #[test]
    fn test_boolean_overrides() {
        let rule_set = build(
            "extends: [[\"vacuum:oas\", \"recommended\"]]\nrules:\n  paths-kebab-case: true\n  info-description: false\n  not-a-rule: true\n",
        );
        assert!(rule_set.rules.contains_key("paths-kebab-case"));
        assert!(!rule_set.rules.contains_key("info-description"));
        assert!(!rule_set.rules.contains_key("not-a-rule"));
    }

    #[test]
    fn test_owasp_and_combined_extends() {
        let rule_set = build("extends: [[\"spectral:owasp\", \"all\"]]\nrules: {}\n");
        assert_eq!(rule_set.rules.len(), 23);
        assert!(rule_set.rules.values().all(|r| r.category_id() == CATEGORY_OWASP));

        let combined = build("extends: \"vacuum:all\"\n");
        assert_eq!(combined.rules.len(), openapi_rules().len() + 23);
        assert_eq!(combined.description, "All OpenAPI and OWASP rules combined");
    }

    #[test]
    fn test_off_keeps_user_rules() {
        let rule_set = build(
            "extends: [[\"vacuum:oas\", \"off\"]]\nrules:\n  title-check:\n    description: titles matter\n    given: $.info\n    then:\n      field: title\n      function: truthy\n",
        );
        assert_eq!(rule_set.rules.len(), 1);
        let rule = &rule_set.rules["title-check"];
        assert_eq!(rule.id, "title-check");
        assert_eq!(rule.category_id(), CATEGORY_VALIDATION);
        assert!(rule.resolved);
        assert_eq!(rule.severity, Severity::Warn);
        assert_eq!(
            rule_set.description,
            "All disabled ruleset, processing 1 supplied rules"
        );
    }

    #[test]
    fn test_user_rule_category_and_severity() {
        let rule_set = build(
            "rules:\n  tidy-tags:\n    given: $.tags\n    severity: information\n    category: tags\n    resolved: false\n    then:\n      function: truthy\n",
        );
        let rule = &rule_set.rules["tidy-tags"];
        assert_eq!(rule.severity, Severity::Info);
        assert_eq!(rule.category.as_ref().unwrap().name, "Tags");
        assert!(!rule.resolved);
    }

    #[test]
    fn test_file_extends() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("base.yaml"),
            "rules:\n  base-rule:\n    given: $\n    then:\n      function: defined\n      field: info\n",
        )
        .unwrap();
        let supplied = create_rule_set_from_data(
            b"extends: [[\"vacuum:oas\", \"off\"], \"base.yaml\"]\nrules:\n  base-rule: error\n",
        )
        .unwrap();
        let sets = RuleSets::new().with_loader(Arc::new(DefaultRuleSetLoader::new(dir.path())));
        let rule_set = sets.generate_rule_set_from_supplied(&supplied).unwrap();
        assert_eq!(rule_set.rules.len(), 1);
        assert_eq!(rule_set.rules["base-rule"].severity, Severity::Error);

        let err = RuleSets::new().generate_rule_set_from_supplied(&supplied).unwrap_err();
        assert!(matches!(err, RuleSetError::Extends { .. }));
    }

    #[test]
    fn test_validate_against_registry() {
        let registry = FunctionRegistry::builtin();
        let sets = RuleSets::new();
        assert!(sets.generate_openapi_default_rule_set().validate(&registry).is_ok());
        assert!(sets.generate_owasp_rule_set().validate(&registry).is_ok());

        let rule_set = build(
            "rules:\n  custom:\n    given: $\n    then:\n      function: checkTitle\n",
        );
        let err = rule_set.validate(&registry).unwrap_err();
        assert_eq!(err.to_string(), "rule 'custom' uses unknown function 'checkTitle'");

        let rule_set = build("functions: [checkTitle]\nrules: {}\n");
        let err = rule_set.validate(&registry).unwrap_err();
        assert_eq!(err.to_string(), "function 'checkTitle' is declared but was not loaded");
    }

    #[test]
    fn test_rule_map() {
        let mut rules = IndexMap::new();
        rules.insert("only".to_string(), Rule::new("only").with_then(crate::model::RuleAction::new("truthy")));
        let rule_set = create_rule_set_from_rule_map(rules);
        let built = RuleSets::new().generate_rule_set_from_supplied(&rule_set).unwrap();
        assert_eq!(built.rules.len(), 1);
        assert_eq!(built.description, "All disabled ruleset, processing 0 supplied rules");
    }
}
