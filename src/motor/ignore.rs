//! Suppressing results
//!
//! Two mechanisms: `x-lint-ignore` directives written inside the document,
//! and ignore files mapping rule ids to the JSONPaths they should stay quiet
//! about:
//!
//! ```yaml
//! operation-operationId:
//!   - $.paths['/pets'].get
//! ```

use crate::jsonpath::{append_index, append_key};
use crate::model::RuleFunctionResult;
use crate::node::{NodeKind, NodeRef, MAX_SEARCH_DEPTH};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const IGNORE_KEY: &str = "x-lint-ignore";

/// Rule id to the paths whose results are dropped
pub type IgnoredItems = HashMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("unable to read ignore file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to parse ignore file: {0}")]
    Parse(String),
}

/// Parse an ignore file's contents
pub fn parse_ignored_items(text: &str) -> Result<IgnoredItems, IgnoreError> {
    if text.trim().is_empty() {
        return Ok(IgnoredItems::new());
    }
    serde_yaml::from_str(text).map_err(|e| IgnoreError::Parse(e.to_string()))
}

pub fn load_ignore_file(path: &Path) -> Result<IgnoredItems, IgnoreError> {
    let text = std::fs::read_to_string(path)?;
    parse_ignored_items(&text)
}

/// Is `result` listed in `ignored`, by its path or any of its other paths?
pub fn is_ignored(result: &RuleFunctionResult, ignored: &IgnoredItems) -> bool {
    let Some(paths) = ignored.get(result.effective_rule_id()) else {
        return false;
    };
    paths
        .iter()
        .any(|p| *p == result.path || result.paths.contains(p))
}

/// Drop every result listed in `ignored`
pub fn filter_ignored_results(
    results: Vec<RuleFunctionResult>,
    ignored: &IgnoredItems,
) -> Vec<RuleFunctionResult> {
    if ignored.is_empty() {
        return results;
    }
    results
        .into_iter()
        .filter(|r| !is_ignored(r, ignored))
        .collect()
}

/// Does a matched path point at an ignore directive itself?
pub fn is_ignore_key_path(path: &str) -> bool {
    path.ends_with(&format!(".{}", IGNORE_KEY)) || path.ends_with(&format!("['{}']", IGNORE_KEY))
}

/// `path` is `scope` or somewhere below it
fn within(path: &str, scope: &str) -> bool {
    if scope == "$" || path == scope {
        return true;
    }
    path.strip_prefix(scope)
        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
}

/// The `x-lint-ignore` directives of a document, by the path of the mapping
/// that holds them
#[derive(Debug, Clone, Default)]
pub struct InlineIgnores {
    scopes: Vec<(String, Vec<String>)>,
}

impl InlineIgnores {
    /// Walk `document` (a document node or its root) for directives
    pub fn collect(document: &NodeRef) -> Self {
        let mut ignores = Self::default();
        let root = document.root().unwrap_or(document);
        ignores.walk(root, "$", 0);
        ignores
    }

    fn walk(&mut self, node: &NodeRef, path: &str, depth: usize) {
        if depth > MAX_SEARCH_DEPTH {
            return;
        }
        match node.kind {
            NodeKind::Mapping => {
                for (key, value) in node.pairs() {
                    if key.value == IGNORE_KEY {
                        let ids = rule_ids(value);
                        if !ids.is_empty() {
                            self.scopes.push((path.to_string(), ids));
                        }
                        continue;
                    }
                    self.walk(value, &append_key(path, &key.value), depth + 1);
                }
            }
            NodeKind::Sequence => {
                for (i, item) in node.children().iter().enumerate() {
                    self.walk(item, &append_index(path, i), depth + 1);
                }
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Is `rule_id` silenced at `path`?
    pub fn ignores(&self, rule_id: &str, path: &str) -> bool {
        self.scopes
            .iter()
            .any(|(scope, ids)| ids.iter().any(|id| id == rule_id) && within(path, scope))
    }
}

/// A directive's value: one rule id, or a list of them
fn rule_ids(value: &NodeRef) -> Vec<String> {
    match value.kind {
        NodeKind::Scalar if !value.value.is_empty() => vec![value.value.clone()],
        NodeKind::Sequence => value
            .children()
            .iter()
            .filter(|item| item.is_scalar())
            .map(|item| item.value.clone())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    const SPEC: &str = "openapi: 3.0.0
info:
  title: pets
  x-lint-ignore: info-description
paths:
  /pets:
    get:
      x-lint-ignore:
        - operation-operationId
        - operation-tags
      responses: {}
";

    #[test]
    fn test_collects_directives() {
        let ignores = InlineIgnores::collect(&parse_document(SPEC).unwrap());
        assert_eq!(ignores.len(), 2);
        assert!(ignores.ignores("info-description", "$.info"));
        assert!(ignores.ignores("info-description", "$.info.description"));
        assert!(!ignores.ignores("info-description", "$.information"));
        assert!(ignores.ignores("operation-tags", "$.paths['/pets'].get.tags"));
        assert!(!ignores.ignores("operation-tags", "$.paths['/pets']"));
        assert!(!ignores.ignores("info-contact", "$.info"));
    }

    #[test]
    fn test_ignore_key_paths() {
        assert!(is_ignore_key_path("$.info.x-lint-ignore"));
        assert!(is_ignore_key_path("$.paths['/a']['x-lint-ignore']"));
        assert!(!is_ignore_key_path("$.info"));
    }

    #[test]
    fn test_ignore_file() {
        let ignored = parse_ignored_items("my-rule:\n  - $.info\n  - $.paths\n").unwrap();
        let kept = RuleFunctionResult::new("kept").with_path("$.servers");
        let mut dropped = RuleFunctionResult::new("dropped").with_path("$.info");
        dropped.rule_id = "my-rule".to_string();
        let mut other_path = RuleFunctionResult::new("other").with_path("$.x");
        other_path.rule_id = "my-rule".to_string();
        other_path.paths = vec!["$.x".to_string(), "$.paths".to_string()];

        let results = filter_ignored_results(vec![kept, dropped, other_path], &ignored);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "kept");
        assert!(parse_ignored_items("").unwrap().is_empty());
        assert!(parse_ignored_items("- nope").is_err());
    }
}
