//! Regular expression and casing checks

use super::string_options;
use crate::functions::{field_path, field_value, violation};
use crate::model::templates;
use crate::model::{FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult};
use crate::node::NodeRef;
use dashmap::DashMap;
use regex::Regex;

/// Turn `/expr/flags` into an inline-flagged expression; anything else is
/// used as written
fn expression_source(pattern: &str) -> String {
    if let Some(body) = pattern.strip_prefix('/') {
        if let Some(end) = body.rfind('/') {
            let (expr, flags) = (&body[..end], &body[end + 1..]);
            let flags: String = flags.chars().filter(|c| matches!(c, 'i' | 'm' | 's' | 'x')).collect();
            if flags.is_empty() {
                return expr.to_string();
            }
            return format!("(?{}){}", flags, expr);
        }
    }
    pattern.to_string()
}

/// Values must match (or must not match) an expression
#[derive(Default)]
pub struct Pattern {
    cache: DashMap<String, Result<Regex, String>>,
}

impl Pattern {
    fn compile(&self, pattern: &str) -> Result<Regex, String> {
        if let Some(found) = self.cache.get(pattern) {
            return found.value().clone();
        }
        let compiled = Regex::new(&expression_source(pattern)).map_err(|e| e.to_string());
        self.cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    fn check(
        &self,
        node: &NodeRef,
        expression: &str,
        must_match: bool,
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        let message = match self.compile(expression) {
            Err(error) => Some(templates::regex_error(context.rule_message(), expression, &error)),
            Ok(rx) if must_match && !rx.is_match(&node.value) => Some(templates::pattern_mismatch(
                context.rule_message(),
                &node.value,
                expression,
            )),
            Ok(rx) if !must_match && rx.is_match(&node.value) => {
                Some(templates::pattern_match(context.rule_message(), expression))
            }
            Ok(_) => None,
        };
        if let Some(message) = message {
            results.push(violation(
                context,
                context.rule.message_or(&message),
                node,
                field_path(context),
            ));
        }
    }
}

impl RuleFunction for Pattern {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let matches = context.option_str("match").filter(|m| !m.is_empty());
        let not_matches = context.option_str("notMatch").filter(|m| !m.is_empty());
        if matches.is_none() && not_matches.is_none() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            let Some(value) = found.value_node.filter(|_| found.found) else {
                continue;
            };
            // a map is checked by its keys
            let targets: Vec<NodeRef> = if value.is_map() {
                value.pairs().map(|(k, _)| k.clone()).collect()
            } else if value.is_scalar() {
                vec![value]
            } else {
                continue;
            };
            for target in &targets {
                if let Some(expression) = matches {
                    self.check(target, expression, true, context, &mut results);
                }
                if let Some(expression) = not_matches {
                    self.check(target, expression, false, context, &mut results);
                }
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("pattern")
            .with_property("match", "'pattern' requires a match")
            .with_property("notMatch", "'pattern' needs something to not match against")
            .with_min_properties(1)
            .with_max_properties(2)
            .with_error_message("'pattern' needs 'match' or 'notMatch' properties being set to operate")
    }
}

const CASING_TYPES: [&str; 7] = ["flat", "camel", "pascal", "kebab", "cobol", "snake", "macro"];

fn casing_expression(kind: &str, allow_digits: bool) -> Option<String> {
    let d = if allow_digits { "0-9" } else { "" };
    let expression = match kind {
        "flat" => format!("[a-z][a-z{d}]*"),
        "camel" => format!("[a-z][a-z{d}]*(?:[A-Z{d}](?:[a-z{d}]+|$))*"),
        "pascal" => format!("[A-Z][a-z{d}]*(?:[A-Z{d}](?:[a-z{d}]+|$))*"),
        "kebab" => format!("[a-z][a-z{d}]*(?:-[a-z{d}]+)*"),
        "cobol" => format!("[A-Z][A-Z{d}]*(?:-[A-Z{d}]+)*"),
        "snake" => format!("[a-z][a-z{d}]*(?:_[a-z{d}]+)*"),
        "macro" => format!("[A-Z][A-Z{d}]*(?:_[A-Z{d}]+)*"),
        _ => return None,
    };
    Some(expression)
}

fn parse_flag(value: Option<&String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Values must follow a casing convention
pub struct Casing;

impl RuleFunction for Casing {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let options = string_options(context);
        let Some(kind) = options.get("type") else {
            return Vec::new();
        };
        let allow_digits = !parse_flag(options.get("disallowDigits"));
        let Some(body) = casing_expression(kind, allow_digits) else {
            return vec![violation(
                context,
                format!(
                    "'{}' is not a known casing type, use one of: {}",
                    kind,
                    CASING_TYPES.join(", ")
                ),
                nodes.first().unwrap_or(&context.document),
                field_path(context),
            )];
        };
        let separator = options.get("separator.char").filter(|s| !s.is_empty());
        let allow_leading = parse_flag(options.get("separator.allowLeading"));

        let full = match separator {
            None => format!("^{}$", body),
            Some(sep) => {
                let sep = format!("[{}]", regex::escape(sep));
                if allow_leading {
                    format!("^(?:{sep})?{body}(?:{sep}{body})*$")
                } else {
                    format!("^{body}(?:{sep}{body})*$")
                }
            }
        };
        let rx = match Regex::new(&full) {
            Ok(rx) => rx,
            Err(error) => {
                log::warn!("casing expression for '{}' did not compile: {}", kind, error);
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for node in nodes {
            let found = field_value(node, context);
            let Some(value) = found.value_node.filter(|v| found.found && v.is_scalar()) else {
                continue;
            };
            if separator.is_some_and(|s| allow_leading && *s == value.value) {
                continue;
            }
            if !rx.is_match(&value.value) {
                let message = context.rule.message_or(&templates::field_message(
                    context.rule_message(),
                    &value.value,
                    &format!("is not {} case", kind),
                ));
                results.push(violation(context, message, &value, field_path(context)));
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("casing")
            .with_property(
                "type",
                "'casing' requires a 'type' to be supplied, which can be one of: flat, camel, pascal, kebab, cobol, snake, macro",
            )
            .with_property("disallowDigits", "don't allow digits in any matched pattern")
            .with_property("separator.char", "use a separator character")
            .with_property("separator.allowLeading", "allow a leading separator or not")
            .with_required(&["type"])
            .with_error_message(
                "'casing' function has invalid options supplied. Example valid options are 'type' = 'camel' or 'disallowDigits' = true",
            )
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::testing::*;
    use super::*;
    use crate::node::Node;
    use serde_json::json;

    fn scalar(value: &str) -> NodeRef {
        Node::plain(value).with_position(1, 1).into_ref()
    }

    #[test]
    fn test_expression_source() {
        assert_eq!(expression_source("/^abc$/i"), "(?i)^abc$");
        assert_eq!(expression_source("/a/"), "a");
        assert_eq!(expression_source("^a"), "^a");
    }

    #[test]
    fn test_pattern_match_and_not_match() {
        let pattern = Pattern::default();
        let ctx = context("pattern", "", json!({"match": "^[a-z]+$", "notMatch": "cake"}));
        assert!(pattern.run_rule(&[scalar("pizza")], &ctx).is_empty());
        let results = pattern.run_rule(&[scalar("Pizza")], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].message,
            "test rule: `Pizza` does not match the expression `^[a-z]+$`"
        );
        let results = pattern.run_rule(&[scalar("cake")], &ctx);
        assert_eq!(results[0].message, "test rule: matches the expression `cake`");
    }

    #[test]
    fn test_pattern_bad_regex_and_keys() {
        let pattern = Pattern::default();
        let ctx = context("pattern", "", json!({"match": "[a-"}));
        let results = pattern.run_rule(&[scalar("x")], &ctx);
        assert!(results[0].message.contains("cannot be compiled into a regular expression"));
        // cached failures report the same way
        assert_eq!(pattern.run_rule(&[scalar("y")], &ctx).len(), 1);

        let node = root("paths:\n  /pets: {}\n  pets: {}\n");
        let ctx = context("pattern", "paths", json!({"match": "^/"}));
        let results = pattern.run_rule(&[node], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_node.as_ref().unwrap().value, "pets");
    }

    #[test]
    fn test_casing_types() {
        let cases = [
            ("camel", "petStore", true),
            ("camel", "PetStore", false),
            ("pascal", "PetStore", true),
            ("kebab", "pet-store", true),
            ("kebab", "pet_store", false),
            ("snake", "pet_store", true),
            ("macro", "PET_STORE", true),
            ("cobol", "PET-STORE", true),
            ("flat", "petstore", true),
            ("flat", "petStore", false),
        ];
        for (kind, value, ok) in cases {
            let ctx = context("casing", "", json!({"type": kind}));
            assert_eq!(Casing.run_rule(&[scalar(value)], &ctx).is_empty(), ok, "{} {}", kind, value);
        }
        let ctx = context("casing", "", json!({"type": "camel"}));
        assert_eq!(
            Casing.run_rule(&[scalar("Pet")], &ctx)[0].message,
            "test rule: `Pet` is not camel case"
        );
    }

    #[test]
    fn test_casing_digits_and_separator() {
        let ctx = context("casing", "", json!({"type": "camel", "disallowDigits": true}));
        assert_eq!(Casing.run_rule(&[scalar("pet2")], &ctx).len(), 1);

        let ctx = context(
            "casing",
            "",
            json!({"type": "macro", "separator": {"char": "-", "allowLeading": true}}),
        );
        assert!(Casing.run_rule(&[scalar("X-API-KEY")], &ctx).is_empty());
        assert!(Casing.run_rule(&[scalar("-X")], &ctx).is_empty());
        assert!(Casing.run_rule(&[scalar("-")], &ctx).is_empty());
        assert_eq!(Casing.run_rule(&[scalar("x-api")], &ctx).len(), 1);
    }
}
