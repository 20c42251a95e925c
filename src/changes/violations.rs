//! Changes reported as violations

use super::{Change, DocumentChanges};
use crate::model::category::CATEGORY_VALIDATION;
use crate::model::{Rule, RuleAction, RuleFunctionResult, Severity};
use crate::node::Node;
use chrono::Utc;
use std::sync::Arc;

pub const BREAKING_CHANGE: &str = "breaking-change";
pub const API_CHANGE: &str = "api-change";

const MAX_VALUE_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeViolationOptions {
    /// Warn on every non-breaking change
    pub warn_on_changes: bool,
    /// Error on every breaking change
    pub error_on_breaking: bool,
}

fn change_rule(id: &str, description: &str, severity: Severity, fix: &str) -> Rule {
    Rule::new(id)
        .with_description(description)
        .with_given("$")
        .with_then(RuleAction::new("blank"))
        .with_severity(severity)
        .with_category(CATEGORY_VALIDATION)
        .with_how_to_fix(fix)
}

pub fn breaking_change_rule() -> Rule {
    change_rule(
        BREAKING_CHANGE,
        "Detects breaking API changes that may affect consumers",
        Severity::Error,
        "Review this breaking change carefully. Consider versioning your API or communicating the change to \
         consumers before deployment.",
    )
}

pub fn api_change_rule() -> Rule {
    change_rule(
        API_CHANGE,
        "Detects API changes between specification versions",
        Severity::Warn,
        "Review this API change to ensure it behaves as expected.",
    )
}

/// Cut `value` to the length limit, ending in `...` when shortened
fn truncate(value: &str) -> String {
    if value.chars().count() <= MAX_VALUE_LENGTH {
        return value.to_string();
    }
    let kept: String = value.chars().take(MAX_VALUE_LENGTH - 3).collect();
    format!("{}...", kept)
}

fn change_message(prefix: &str, change: &Change) -> String {
    let kind = change.change_type;
    if change.property.is_empty() {
        return format!("{}: {} detected", prefix, kind);
    }
    match (change.original.is_empty(), change.new.is_empty()) {
        (false, false) => format!(
            "{}: {} '{}' changed from '{}' to '{}'",
            prefix,
            kind,
            change.property,
            truncate(&change.original),
            truncate(&change.new)
        ),
        (false, true) => format!(
            "{}: {} '{}' (was: '{}')",
            prefix,
            kind,
            change.property,
            truncate(&change.original)
        ),
        (true, false) => format!("{}: {} '{}' (now: '{}')", prefix, kind, change.property, truncate(&change.new)),
        (true, true) => format!("{}: {} '{}'", prefix, kind, change.property),
    }
}

fn change_path(change: &Change) -> String {
    if !change.path.is_empty() {
        change.path.clone()
    } else if !change.property.is_empty() {
        format!("$.{}", change.property)
    } else {
        "$".to_string()
    }
}

fn violation(change: &Change, prefix: &str, rule: &Arc<Rule>) -> RuleFunctionResult {
    let mut result = RuleFunctionResult::new(change_message(prefix, change))
        .with_path(change_path(change))
        .with_rule(rule);
    if let Some(context) = &change.context {
        let (line, column) = context.location();
        let node = Node::string("").with_position(line, column).into_ref();
        result = result.with_nodes(&node, &node);
    }
    result.timestamp = Some(Utc::now());
    result
}

/// One `breaking-change` error per breaking change and one `api-change`
/// warning per other change, as enabled by `options`
pub fn generate_change_violations(
    changes: &DocumentChanges,
    options: ChangeViolationOptions,
) -> Vec<RuleFunctionResult> {
    if !options.warn_on_changes && !options.error_on_breaking {
        return Vec::new();
    }
    let breaking = Arc::new(breaking_change_rule());
    let api = Arc::new(api_change_rule());
    changes
        .all_changes()
        .into_iter()
        .filter_map(|change| {
            if change.breaking && options.error_on_breaking {
                Some(violation(change, "Breaking change", &breaking))
            } else if !change.breaking && options.warn_on_changes {
                Some(violation(change, "API change", &api))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeGroup, ChangeType};
    use pretty_assertions::assert_eq;

    fn diff() -> DocumentChanges {
        DocumentChanges::new(ChangeGroup {
            changes: vec![
                Change::new(ChangeType::Modified, "title")
                    .with_values("pets", "pet store")
                    .with_new_position(3, 10),
                Change::new(ChangeType::PropertyRemoved, "deprecated")
                    .with_values("true", "")
                    .with_original_position(20, 9)
                    .with_path("$.paths['/pets'].get.deprecated")
                    .breaking(),
                Change::new(ChangeType::ObjectAdded, "servers"),
            ],
            ..Default::default()
        })
    }

    #[test]
    fn test_generates_both_kinds() {
        let options = ChangeViolationOptions {
            warn_on_changes: true,
            error_on_breaking: true,
        };
        let results = generate_change_violations(&diff(), options);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].rule_id, API_CHANGE);
        assert_eq!(results[0].severity(), Severity::Warn);
        assert_eq!(
            results[0].message,
            "API change: modified 'title' changed from 'pets' to 'pet store'"
        );
        assert_eq!(results[0].path, "$.title");
        assert_eq!((results[0].start_line(), results[0].start_column()), (3, 10));

        assert_eq!(results[1].rule_id, BREAKING_CHANGE);
        assert_eq!(results[1].severity(), Severity::Error);
        assert_eq!(results[1].message, "Breaking change: property removed 'deprecated' (was: 'true')");
        assert_eq!(results[1].path, "$.paths['/pets'].get.deprecated");
        assert_eq!(results[1].start_line(), 20);

        assert_eq!(results[2].message, "API change: object added 'servers'");
        assert_eq!(results[2].category_id(), Some(CATEGORY_VALIDATION));
    }

    #[test]
    fn test_options_select_changes() {
        let breaking_only = ChangeViolationOptions {
            error_on_breaking: true,
            ..Default::default()
        };
        let results = generate_change_violations(&diff(), breaking_only);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_id, BREAKING_CHANGE);
        assert!(generate_change_violations(&diff(), ChangeViolationOptions::default()).is_empty());
    }

    #[test]
    fn test_truncates_long_values() {
        let long = "x".repeat(80);
        let change = Change::new(ChangeType::PropertyAdded, "description").with_values("", &long);
        let message = change_message("API change", &change);
        assert_eq!(
            message,
            format!("API change: property added 'description' (now: '{}...')", "x".repeat(47))
        );
        assert_eq!(change_path(&Change::default()), "$");
    }
}
