//! Spectral-compatible result shape

use crate::model::result::{Range, RuleFunctionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static QUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\['([\w{}/:_-]+)'").expect("valid regex"));
static INDEXED_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\[(\d+)]").expect("valid regex"));

/// One result as Spectral reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralResult {
    pub code: String,
    pub path: Vec<String>,
    pub message: String,
    /// error 0, warn 1, info 2, hint 3
    pub severity: u8,
    pub range: Range,
    pub source: String,
}

pub struct SpectralReport;

impl SpectralReport {
    /// Convert results; ranges are taken as they stand, so prepare the set
    /// for serialization first
    pub fn from_results(results: &[RuleFunctionResult], source: &str) -> Vec<SpectralResult> {
        results
            .iter()
            .map(|r| SpectralResult {
                code: r.effective_rule_id().to_string(),
                path: split_path(&r.path),
                message: r.message.clone(),
                severity: r.severity().as_int(),
                range: r.range,
                source: source.to_string(),
            })
            .collect()
    }
}

/// Break a JSONPath into Spectral path segments
pub fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in path.split('.') {
        if piece.is_empty() {
            parts.push("..".to_string());
            continue;
        }
        if piece == "$" {
            continue;
        }
        if let Some(caps) = QUOTED_KEY.captures(piece) {
            parts.push(caps[1].to_string());
            parts.push(caps[2].to_string());
        } else if let Some(caps) = INDEXED_KEY.captures(piece) {
            parts.push(caps[1].to_string());
            parts.push(caps[2].to_string());
        } else {
            parts.push(piece.to_string());
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rule::{Rule, Severity};
    use std::sync::Arc;

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("$.paths['/pets/{id}'].get"),
            vec!["paths", "/pets/{id}", "get"]
        );
        assert_eq!(split_path("$.tags[1].name"), vec!["tags", "1", "name"]);
        assert_eq!(split_path("$..description"), vec!["..", "description"]);
        assert!(split_path("$").is_empty());
    }

    #[test]
    fn test_from_results() {
        let rule = Arc::new(Rule::new("info-contact").with_severity(Severity::Hint));
        let result = RuleFunctionResult::new("missing contact")
            .with_path("$.info")
            .with_rule(&rule);
        let report = SpectralReport::from_results(&[result], "api.yaml");
        assert_eq!(report[0].code, "info-contact");
        assert_eq!(report[0].severity, 3);
        assert_eq!(report[0].path, vec!["info"]);
        assert_eq!(report[0].source, "api.yaml");
    }
}
