//! JUnit XML output formatter
//!
//! One suite per rule category, for CI systems that read test reports.

use super::{LintReport, OutputFormatter};
use crate::model::reports::{build_junit_report, ReportError};
use crate::model::RuleFunctionResult;

#[derive(Default)]
pub struct JUnitFormatter;

impl JUnitFormatter {
    pub fn new() -> Self {
        Self
    }

    fn escape_xml(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }
}

impl OutputFormatter for JUnitFormatter {
    fn format(&self, report: &LintReport<'_>) -> Result<String, ReportError> {
        build_junit_report(report.results, report.duration, report.fail_on_warn, Some(report.file)).to_xml()
    }

    fn format_result(&self, file: &str, result: &RuleFunctionResult) -> String {
        format!(
            "<testcase name=\"{}\" classname=\"{}\" file=\"{}\"><failure>{}</failure></testcase>",
            Self::escape_xml(result.category_id().unwrap_or_default()),
            Self::escape_xml(result.effective_rule_id()),
            Self::escape_xml(file),
            Self::escape_xml(&result.message)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Rule, RuleResultSet, Severity};
    use std::sync::Arc;

    #[test]
    fn test_junit_format() {
        let rule = Arc::new(
            Rule::new("info-contact")
                .with_severity(Severity::Error)
                .with_category("info"),
        );
        let results = RuleResultSet::new(vec![RuleFunctionResult::new("missing <contact>")
            .with_path("$.info")
            .with_rule(&rule)]);
        let output = JUnitFormatter::new().format(&LintReport::new("api.yaml", &results)).unwrap();
        assert!(output.contains("<?xml version"));
        assert!(output.contains("<testsuite"));
        assert!(output.contains("classname=\"info-contact\""));
        assert!(output.contains("<failure"));
        assert!(output.contains("&lt;contact&gt;"));
    }

    #[test]
    fn test_xml_escaping() {
        assert_eq!(JUnitFormatter::escape_xml("<>&\"'"), "&lt;&gt;&amp;&quot;&apos;");
    }
}
