//! Ordering checks for sequences and mappings

use crate::functions::{field_path, field_value, violation};
use crate::model::templates;
use crate::model::{FunctionSchema, RuleFunction, RuleFunctionContext, RuleFunctionResult};
use crate::node::{NodeKind, NodeRef};

/// Sequences (or mapping keys) must be sorted
pub struct Alphabetical;

const ERROR_MESSAGE: &str = "'alphabetical' function has invalid options supplied. To sort objects use 'keyedBy' and decide which property on the array of objects you want to use.";

impl Alphabetical {
    /// Adjacent pairs of `values` that are out of order
    fn string_violations<'a>(values: &[(&'a str, &'a NodeRef)]) -> Vec<(&'a str, &'a str, &'a NodeRef)> {
        values
            .windows(2)
            .filter(|pair| pair[0].0 > pair[1].0)
            .map(|pair| (pair[1].0, pair[0].0, pair[1].1))
            .collect()
    }

    fn check_numbers(
        items: &[NodeRef],
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        let numbers: Vec<(f64, &NodeRef)> = items
            .iter()
            .filter_map(|n| n.as_f64().map(|v| (v, n)))
            .collect();
        for pair in numbers.windows(2) {
            if pair[0].0 > pair[1].0 {
                let message = context.rule.message_or(&templates::numerical_ordering(
                    context.rule_message(),
                    &pair[1].1.value,
                    &pair[0].1.value,
                ));
                results.push(violation(context, message, pair[1].1, field_path(context)));
            }
        }
    }

    fn report_strings(
        values: &[(&str, &NodeRef)],
        context: &RuleFunctionContext,
        results: &mut Vec<RuleFunctionResult>,
    ) {
        for (value, before, node) in Self::string_violations(values) {
            let message = context.rule.message_or(&templates::alphabetical(
                context.rule_message(),
                value,
                before,
            ));
            results.push(violation(context, message, node, field_path(context)));
        }
    }
}

impl RuleFunction for Alphabetical {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let keyed_by = context.option_str("keyedBy").filter(|k| !k.is_empty());
        let mut results = Vec::new();

        for node in nodes {
            let found = field_value(node, context);
            let Some(value) = found.value_node.filter(|_| found.found) else {
                continue;
            };
            match value.kind {
                NodeKind::Mapping => match keyed_by {
                    // a mapping without `keyedBy` is checked by its keys
                    None => {
                        let keys: Vec<(&str, &NodeRef)> =
                            value.pairs().map(|(k, _)| (k.value.as_str(), k)).collect();
                        Self::report_strings(&keys, context, &mut results);
                    }
                    Some(key) => {
                        let values: Vec<(&str, &NodeRef)> = value
                            .pairs()
                            .filter_map(|(_, v)| v.get(key))
                            .map(|v| (v.value.as_str(), v))
                            .collect();
                        Self::report_strings(&values, context, &mut results);
                    }
                },
                NodeKind::Sequence => {
                    let items = &value.content;
                    if items.is_empty() || items.iter().any(|n| n.is_bool()) {
                        continue;
                    }
                    let first = &items[0];
                    if first.is_map() {
                        let Some(key) = keyed_by else {
                            results.push(violation(
                                context,
                                format!("{}: {}", context.rule_message(), ERROR_MESSAGE),
                                &value,
                                field_path(context),
                            ));
                            continue;
                        };
                        let values: Vec<(&str, &NodeRef)> = items
                            .iter()
                            .filter_map(|item| item.get(key))
                            .map(|v| (v.value.as_str(), v))
                            .collect();
                        Self::report_strings(&values, context, &mut results);
                    } else if first.is_int() || first.is_float() {
                        Self::check_numbers(items, context, &mut results);
                    } else if first.is_string() {
                        let values: Vec<(&str, &NodeRef)> = items
                            .iter()
                            .filter(|n| n.is_string())
                            .map(|n| (n.value.as_str(), n))
                            .collect();
                        Self::report_strings(&values, context, &mut results);
                    }
                }
                _ => {}
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("alphabetical")
            .with_property("keyedBy", "this is the key of an object you want to use to sort objects")
            .with_error_message(ERROR_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_sequence() {
        let node = root("tags: [pizza, cake, burger]\n");
        let ctx = context("alphabetical", "tags", json!(null));
        let results = Alphabetical.run_rule(&[node], &ctx);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].message,
            "test rule: `cake` must be placed before `pizza` (alphabetical)"
        );
        assert_eq!(results[0].path, "$.tags");
    }

    #[test]
    fn test_numbers_and_sorted() {
        let ctx = context("alphabetical", "nums", json!(null));
        let results = Alphabetical.run_rule(&[root("nums: [1, 3, 2]\n")], &ctx);
        assert_eq!(
            results[0].message,
            "test rule: `2` is less than `3`, they need to be swapped (numerical ordering)"
        );
        assert!(Alphabetical.run_rule(&[root("nums: [1, 2.5, 3]\n")], &ctx).is_empty());
        assert!(Alphabetical.run_rule(&[root("nums: [true, false]\n")], &ctx).is_empty());
    }

    #[test]
    fn test_keyed_by() {
        let node = root("tags:\n  - name: b\n  - name: a\n");
        let ctx = context("alphabetical", "tags", json!({"keyedBy": "name"}));
        let results = Alphabetical.run_rule(&[node.clone()], &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_node.as_ref().unwrap().line, 3);

        let ctx = context("alphabetical", "tags", json!(null));
        let results = Alphabetical.run_rule(&[node], &ctx);
        assert!(results[0].message.contains("To sort objects use 'keyedBy'"));
    }

    #[test]
    fn test_mapping_keys() {
        let node = root("paths:\n  /b: {}\n  /a: {}\n");
        let ctx = context("alphabetical", "paths", json!(null));
        assert_eq!(Alphabetical.run_rule(&[node], &ctx).len(), 1);
    }
}
