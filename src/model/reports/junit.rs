//! JUnit report model and XML writer
//!
//! One suite per category that has results, in report order. Errors fail,
//! warnings fail only when asked to; info and hints pass.

use super::ReportError;
use crate::model::category::RuleCategoryRegistry;
use crate::model::result::{RuleFunctionResult, RuleResultSet};
use crate::model::rule::Severity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub message: String,
    /// `ERROR`, `WARN`, ...
    pub failure_type: String,
    pub file: Option<String>,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// Category name
    pub name: String,
    /// Rule id
    pub class_name: String,
    pub line: usize,
    pub failure: Option<Failure>,
    pub properties: Vec<Property>,
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub tests: usize,
    pub failures: usize,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestSuites {
    pub suites: Vec<TestSuite>,
    pub tests: usize,
    pub failures: usize,
    /// Seconds
    pub time: f64,
}

fn failure_contents(result: &RuleFunctionResult, line: usize) -> String {
    format!(
        "\n\t{}\n\t\n    JSON Path: {}\n\tRule: {}\n\tSeverity: {}\n\tLine: {}",
        result.message,
        result.path,
        result.effective_rule_id(),
        result.severity(),
        line
    )
}

fn failure_type(severity: Severity) -> String {
    severity.to_string().to_uppercase()
}

/// Build the JUnit model. `source` names the linted file when results carry
/// no origin of their own.
pub fn build_junit_report(
    results: &RuleResultSet,
    elapsed: Duration,
    fail_on_warn: bool,
    source: Option<&str>,
) -> TestSuites {
    let registry = RuleCategoryRegistry::new();
    let mut report = TestSuites {
        time: elapsed.as_secs_f64(),
        ..Default::default()
    };

    for category in registry.ordered() {
        let category_results = results.get_results_by_rule_category(&category.id);
        if category_results.is_empty() {
            continue;
        }
        let mut failures = 0;
        let mut test_cases = Vec::with_capacity(category_results.len());
        for result in &category_results {
            let severity = result.severity();
            let failed = severity == Severity::Error || (fail_on_warn && severity == Severity::Warn);
            let line = result.start_node.as_ref().map(|n| n.line).unwrap_or(1);
            let file = result
                .origin
                .as_ref()
                .map(|o| o.absolute_location.clone())
                .filter(|l| !l.is_empty())
                .or_else(|| source.map(str::to_string));

            let mut properties = vec![
                Property::new("path", result.path.clone()),
                Property::new("rule", result.effective_rule_id()),
                Property::new("severity", severity.to_string()),
                Property::new("line", line.to_string()),
            ];
            if let Some(file) = &file {
                properties.push(Property::new("file", file.clone()));
            }

            let failure = failed.then(|| Failure {
                message: result.message.clone(),
                failure_type: failure_type(severity),
                file: file.clone(),
                contents: failure_contents(result, line),
            });
            if failed {
                failures += 1;
            }

            test_cases.push(TestCase {
                name: category.name.clone(),
                class_name: result.effective_rule_id().to_string(),
                line,
                failure,
                properties,
                file,
            });
        }
        report.tests += test_cases.len();
        report.failures += failures;
        report.suites.push(TestSuite {
            name: category.name.clone(),
            tests: category_results.len(),
            failures,
            test_cases,
        });
    }
    report
}

type XmlWriter = Writer<Vec<u8>>;

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), ReportError> {
    writer
        .write_event(event)
        .map_err(|e| ReportError::Xml(e.to_string()))
}

impl TestSuites {
    /// Render as indented XML
    pub fn to_xml(&self) -> Result<String, ReportError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("testsuites");
        root.push_attribute(("tests", self.tests.to_string().as_str()));
        root.push_attribute(("failures", self.failures.to_string().as_str()));
        root.push_attribute(("time", format!("{:.3}", self.time).as_str()));
        emit(&mut writer, Event::Start(root))?;

        for suite in &self.suites {
            let mut start = BytesStart::new("testsuite");
            start.push_attribute(("name", suite.name.as_str()));
            start.push_attribute(("tests", suite.tests.to_string().as_str()));
            start.push_attribute(("failures", suite.failures.to_string().as_str()));
            emit(&mut writer, Event::Start(start))?;
            for case in &suite.test_cases {
                write_case(&mut writer, case)?;
            }
            emit(&mut writer, Event::End(BytesEnd::new("testsuite")))?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("testsuites")))?;
        String::from_utf8(writer.into_inner()).map_err(|e| ReportError::Xml(e.to_string()))
    }
}

fn write_case(writer: &mut XmlWriter, case: &TestCase) -> Result<(), ReportError> {
    let mut start = BytesStart::new("testcase");
    start.push_attribute(("name", case.name.as_str()));
    start.push_attribute(("classname", case.class_name.as_str()));
    start.push_attribute(("line", case.line.to_string().as_str()));
    if let Some(file) = &case.file {
        start.push_attribute(("file", file.as_str()));
    }
    emit(writer, Event::Start(start))?;

    if let Some(failure) = &case.failure {
        let mut start = BytesStart::new("failure");
        start.push_attribute(("message", failure.message.as_str()));
        start.push_attribute(("type", failure.failure_type.as_str()));
        if let Some(file) = &failure.file {
            start.push_attribute(("file", file.as_str()));
        }
        emit(writer, Event::Start(start))?;
        emit(writer, Event::Text(BytesText::new(&failure.contents)))?;
        emit(writer, Event::End(BytesEnd::new("failure")))?;
    }

    emit(writer, Event::Start(BytesStart::new("properties")))?;
    for property in &case.properties {
        let mut element = BytesStart::new("property");
        element.push_attribute(("name", property.name.as_str()));
        element.push_attribute(("value", property.value.as_str()));
        emit(writer, Event::Empty(element))?;
    }
    emit(writer, Event::End(BytesEnd::new("properties")))?;
    emit(writer, Event::End(BytesEnd::new("testcase")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rule::Rule;
    use crate::node::Node;
    use std::sync::Arc;

    fn set() -> RuleResultSet {
        let error = Arc::new(
            Rule::new("info-contact")
                .with_severity(Severity::Error)
                .with_category("info"),
        );
        let warn = Arc::new(
            Rule::new("operation-tags")
                .with_severity(Severity::Warn)
                .with_category("tags"),
        );
        let node = Node::string("x").with_position(7, 1).into_ref();
        RuleResultSet::new(vec![
            RuleFunctionResult::new("no <contact>")
                .with_path("$.info")
                .with_node(&node)
                .with_rule(&error),
            RuleFunctionResult::new("no tags").with_path("$.paths").with_rule(&warn),
        ])
    }

    #[test]
    fn test_build_groups_by_category() {
        let report = build_junit_report(&set(), Duration::from_millis(1500), false, Some("api.yaml"));
        assert_eq!(report.suites.len(), 2);
        assert_eq!(report.suites[0].name, "Contract Information");
        assert_eq!(report.suites[1].name, "Tags");
        assert_eq!(report.tests, 2);
        assert_eq!(report.failures, 1);
        let case = &report.suites[0].test_cases[0];
        assert_eq!(case.class_name, "info-contact");
        assert_eq!(case.line, 7);
        assert_eq!(case.failure.as_ref().unwrap().failure_type, "ERROR");
        assert!(case.properties.iter().any(|p| p.name == "file" && p.value == "api.yaml"));
        // warnings pass unless asked otherwise, and default to line 1
        assert!(report.suites[1].test_cases[0].failure.is_none());
        assert_eq!(report.suites[1].test_cases[0].line, 1);
    }

    #[test]
    fn test_fail_on_warn() {
        let report = build_junit_report(&set(), Duration::ZERO, true, None);
        assert_eq!(report.failures, 2);
        assert_eq!(
            report.suites[1].test_cases[0].failure.as_ref().unwrap().failure_type,
            "WARN"
        );
    }

    #[test]
    fn test_to_xml_escapes() {
        let xml = build_junit_report(&set(), Duration::ZERO, false, None)
            .to_xml()
            .unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<testsuites tests=\"2\" failures=\"1\""));
        assert!(xml.contains("message=\"no &lt;contact&gt;\""));
        assert!(xml.contains("classname=\"operation-tags\""));
        assert!(xml.contains("<property name=\"rule\" value=\"info-contact\"/>"));
    }
}
