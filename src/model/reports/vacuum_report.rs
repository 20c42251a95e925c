//! Replayable lint report
//!
//! A report holds everything needed to render the results again without
//! re-linting: spec info, statistics and the prepared result set. It can be
//! stored as plain or gzipped JSON.

use super::statistics::ReportStatistics;
use super::ReportError;
use crate::model::result::RuleResultSet;
use crate::model::rule::Rule;
use crate::node::Node;
use crate::spec_info::SpecInfo;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacuumReport {
    pub generated: DateTime<Utc>,
    pub spec_info: SpecInfo,
    #[serde(default)]
    pub statistics: Option<ReportStatistics>,
    pub result_set: RuleResultSet,
}

impl VacuumReport {
    /// Wrap a result set; ranges and rule ids are flattened first
    pub fn new(
        spec_info: SpecInfo,
        statistics: Option<ReportStatistics>,
        mut result_set: RuleResultSet,
    ) -> Self {
        result_set.prepare_for_serialization();
        Self {
            generated: Utc::now(),
            spec_info,
            statistics,
            result_set,
        }
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_gzip(&self) -> Result<Vec<u8>, ReportError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(serde_json::to_vec(self)?.as_slice())?;
        Ok(encoder.finish()?)
    }

    /// Write gzipped JSON
    pub fn write_gzip(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_gzip()?)?;
        Ok(())
    }

    /// Read a report, plain or gzipped. Start and end nodes are rebuilt from
    /// each range and rules are re-attached by id.
    pub fn load(data: &[u8], rules: &HashMap<String, Arc<Rule>>) -> Result<Self, ReportError> {
        let mut report: VacuumReport = if data.starts_with(&GZIP_MAGIC) {
            let mut decompressed = Vec::new();
            GzDecoder::new(data).read_to_end(&mut decompressed)?;
            serde_json::from_slice(&decompressed)?
        } else {
            serde_json::from_slice(data)?
        };

        report.result_set.results_mut().par_iter_mut().for_each(|result| {
            let range = result.range;
            result.start_node = Some(
                Node::string("")
                    .with_position(range.start.line, range.start.character)
                    .into_ref(),
            );
            result.end_node = Some(
                Node::string("")
                    .with_position(range.end.line, range.end.character)
                    .into_ref(),
            );
        });
        report.result_set.attach_rules(rules);
        Ok(report)
    }

    pub fn load_file(path: &Path, rules: &HashMap<String, Arc<Rule>>) -> Result<Self, ReportError> {
        let data = std::fs::read(path)?;
        Self::load(&data, rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::result::RuleFunctionResult;
    use crate::model::rule::Severity;
    use crate::spec_info::extract_spec_info;

    fn report() -> (VacuumReport, HashMap<String, Arc<Rule>>) {
        let rule = Arc::new(Rule::new("info-contact").with_severity(Severity::Warn).with_category("info"));
        let node = Node::string("info").with_position(3, 1).into_ref();
        let set = RuleResultSet::new(vec![RuleFunctionResult::new("no contact")
            .with_path("$.info")
            .with_node(&node)
            .with_rule(&rule)]);
        let info = extract_spec_info(b"openapi: 3.0.0\ninfo:\n  title: t\n").unwrap();
        let mut rules = HashMap::new();
        rules.insert(rule.id.clone(), rule);
        (VacuumReport::new(info, None, set), rules)
    }

    #[test]
    fn test_gzip_round_trip() {
        let (original, rules) = report();
        let data = original.to_gzip().unwrap();
        assert_eq!(&data[..2], &GZIP_MAGIC);
        let loaded = VacuumReport::load(&data, &rules).unwrap();
        let result = &loaded.result_set.results()[0];
        assert_eq!(result.start_node.as_ref().unwrap().line, 3);
        assert_eq!(result.end_node.as_ref().unwrap().column, 5);
        assert_eq!(result.rule.as_ref().unwrap().id, "info-contact");
        assert_eq!(loaded.spec_info.version, "3.0.0");
        assert_eq!(loaded.result_set.get_results_by_rule_category("info").len(), 1);
    }

    #[test]
    fn test_plain_json_and_file() {
        let (original, rules) = report();
        let json = original.to_json().unwrap();
        assert!(json.contains("\"resultSet\""));
        let loaded = VacuumReport::load(json.as_bytes(), &rules).unwrap();
        assert_eq!(loaded.result_set.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json.gz");
        original.write_gzip(&path).unwrap();
        assert!(VacuumReport::load_file(&path, &rules).is_ok());
        assert!(VacuumReport::load(b"not a report", &rules).is_err());
    }
}
