//! Document changes from a diff engine
//!
//! A diff report is a tree of groups, each holding the changes found at its
//! level. Results can be narrowed to the changed regions of the new document
//! ([`filter`]) and changes can be reported as violations themselves
//! ([`violations`]).

pub mod filter;
pub mod violations;

pub use filter::{ChangeFilter, FilterStats};
pub use violations::{
    api_change_rule, breaking_change_rule, generate_change_violations, ChangeViolationOptions,
    API_CHANGE, BREAKING_CHANGE,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangesError {
    #[error("failed to read change report file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse change report JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Kind of change, encoded as the diff engine's numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChangeType {
    #[default]
    Modified,
    PropertyAdded,
    ObjectAdded,
    ObjectRemoved,
    PropertyRemoved,
}

impl ChangeType {
    pub fn is_removal(self) -> bool {
        matches!(self, ChangeType::ObjectRemoved | ChangeType::PropertyRemoved)
    }

    pub fn is_addition(self) -> bool {
        matches!(self, ChangeType::ObjectAdded | ChangeType::PropertyAdded)
    }
}

impl TryFrom<u8> for ChangeType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ChangeType::Modified),
            2 => Ok(ChangeType::PropertyAdded),
            3 => Ok(ChangeType::ObjectAdded),
            4 => Ok(ChangeType::ObjectRemoved),
            5 => Ok(ChangeType::PropertyRemoved),
            other => Err(format!("unknown change type {}", other)),
        }
    }
}

impl From<ChangeType> for u8 {
    fn from(change: ChangeType) -> Self {
        match change {
            ChangeType::Modified => 1,
            ChangeType::PropertyAdded => 2,
            ChangeType::ObjectAdded => 3,
            ChangeType::ObjectRemoved => 4,
            ChangeType::PropertyRemoved => 5,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeType::Modified => "modified",
            ChangeType::PropertyAdded => "property added",
            ChangeType::ObjectAdded => "object added",
            ChangeType::ObjectRemoved => "object removed",
            ChangeType::PropertyRemoved => "property removed",
        };
        f.write_str(label)
    }
}

/// Where a change sits in the original and new documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column: Option<usize>,
}

impl ChangeContext {
    /// Line and column, preferring the new document
    pub fn location(&self) -> (usize, usize) {
        (
            self.new_line.or(self.original_line).unwrap_or(0),
            self.new_column.or(self.original_column).unwrap_or(0),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ChangeContext>,
    #[serde(rename = "change", default)]
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new: String,
    #[serde(default)]
    pub breaking: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl Change {
    pub fn new(change_type: ChangeType, property: &str) -> Self {
        Self {
            change_type,
            property: property.to_string(),
            ..Default::default()
        }
    }

    pub fn with_values(mut self, original: &str, new: &str) -> Self {
        self.original = original.to_string();
        self.new = new.to_string();
        self
    }

    pub fn with_new_position(mut self, line: usize, column: usize) -> Self {
        let context = self.context.get_or_insert_with(ChangeContext::default);
        context.new_line = Some(line);
        context.new_column = Some(column);
        self
    }

    pub fn with_original_position(mut self, line: usize, column: usize) -> Self {
        let context = self.context.get_or_insert_with(ChangeContext::default);
        context.original_line = Some(line);
        context.original_column = Some(column);
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn breaking(mut self) -> Self {
        self.breaking = true;
        self
    }

    /// Line in the new document, when the change survives into it
    pub fn new_line(&self) -> Option<usize> {
        self.context.as_ref().and_then(|c| c.new_line)
    }
}

/// Changes at one level of the document, and the groups below it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, ChangeGroup>,
}

impl ChangeGroup {
    /// Build a group from any JSON tree: `changes` arrays hold changes,
    /// every other object or array is a child group.
    fn from_value(value: &Value) -> Self {
        let mut group = ChangeGroup::default();
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if key == "changes" {
                        if let Value::Array(items) = child {
                            group.changes.extend(
                                items
                                    .iter()
                                    .filter_map(|item| serde_json::from_value::<Change>(item.clone()).ok()),
                            );
                        }
                        continue;
                    }
                    let nested = ChangeGroup::from_value(child);
                    if !nested.is_empty() {
                        group.children.insert(key.clone(), nested);
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let nested = ChangeGroup::from_value(item);
                    if !nested.is_empty() {
                        group.children.insert(i.to_string(), nested);
                    }
                }
            }
            _ => {}
        }
        group
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.children.values().all(ChangeGroup::is_empty)
    }

    fn collect<'a>(&'a self, into: &mut Vec<&'a Change>) {
        into.extend(self.changes.iter());
        for child in self.children.values() {
            child.collect(into);
        }
    }
}

/// Every change between two versions of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentChanges {
    #[serde(flatten)]
    pub root: ChangeGroup,
}

impl DocumentChanges {
    pub fn new(root: ChangeGroup) -> Self {
        Self { root }
    }

    /// Parse an exported diff report
    pub fn from_json(data: &[u8]) -> Result<Self, ChangesError> {
        let value: Value = serde_json::from_slice(data)?;
        Ok(Self::new(ChangeGroup::from_value(&value)))
    }

    pub fn load(path: &Path) -> Result<Self, ChangesError> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// All changes, depth first
    pub fn all_changes(&self) -> Vec<&Change> {
        let mut changes = Vec::new();
        self.root.collect(&mut changes);
        changes
    }

    pub fn total_changes(&self) -> usize {
        self.all_changes().len()
    }

    pub fn total_breaking_changes(&self) -> usize {
        self.all_changes().iter().filter(|c| c.breaking).count()
    }

    pub fn stats(&self) -> ChangeStats {
        ChangeStats::from_changes(self)
    }
}

/// Counts by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeStats {
    pub total: usize,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub breaking: usize,
}

impl ChangeStats {
    pub fn from_changes(changes: &DocumentChanges) -> Self {
        let mut stats = Self::default();
        for change in changes.all_changes() {
            stats.total += 1;
            if change.change_type.is_addition() {
                stats.added += 1;
            } else if change.change_type.is_removal() {
                stats.removed += 1;
            } else {
                stats.modified += 1;
            }
            if change.breaking {
                stats.breaking += 1;
            }
        }
        stats
    }

    pub fn non_breaking(&self) -> usize {
        self.total - self.breaking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"{
      "infoChanges": {
        "changes": [
          {"context": {"originalLine": 3, "originalColumn": 3, "newLine": 3, "newColumn": 3},
           "change": 1, "property": "title", "original": "pets", "new": "pet store"}
        ]
      },
      "pathsChanges": {
        "pathItemsChanges": {
          "/pets": {
            "getChanges": {
              "changes": [
                {"context": {"newLine": 12, "newColumn": 9}, "change": 2, "property": "summary", "new": "list"},
                {"context": {"originalLine": 20, "originalColumn": 9}, "change": 5, "property": "deprecated",
                 "original": "true", "breaking": true}
              ]
            }
          }
        }
      },
      "changes": [{"change": 3, "property": "servers"}]
    }"#;

    #[test]
    fn test_loads_report_tree() {
        let changes = DocumentChanges::from_json(REPORT.as_bytes()).unwrap();
        assert_eq!(changes.total_changes(), 4);
        assert_eq!(changes.total_breaking_changes(), 1);

        let all = changes.all_changes();
        assert_eq!(all[0].property, "servers");
        assert_eq!(all[1].change_type, ChangeType::Modified);
        assert_eq!(all[1].new, "pet store");
        assert_eq!(all[2].new_line(), Some(12));
        assert_eq!(all[3].change_type, ChangeType::PropertyRemoved);
        assert_eq!(all[3].new_line(), None);
        assert_eq!(all[3].context.as_ref().unwrap().location(), (20, 9));
    }

    #[test]
    fn test_stats() {
        let stats = DocumentChanges::from_json(REPORT.as_bytes()).unwrap().stats();
        assert_eq!(
            stats,
            ChangeStats {
                total: 4,
                added: 2,
                modified: 1,
                removed: 1,
                breaking: 1,
            }
        );
        assert_eq!(stats.non_breaking(), 3);
    }

    #[test]
    fn test_change_type_codes() {
        assert_eq!(ChangeType::try_from(4), Ok(ChangeType::ObjectRemoved));
        assert!(ChangeType::try_from(9).is_err());
        assert_eq!(u8::from(ChangeType::PropertyAdded), 2);
        assert_eq!(ChangeType::ObjectAdded.to_string(), "object added");

        let bad = DocumentChanges::from_json(br#"{"changes": [{"change": 42}]}"#).unwrap();
        assert_eq!(bad.total_changes(), 0);
        assert!(DocumentChanges::from_json(b"not json").is_err());
    }
}
