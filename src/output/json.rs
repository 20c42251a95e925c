//! JSON output formatters: vacuum results, Spectral results and full reports

use super::{LintReport, OutputFormatter};
use crate::model::reports::{ReportError, SpectralReport, VacuumReport};
use crate::model::RuleFunctionResult;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn to_string<T: Serialize>(&self, value: &T) -> Result<String, ReportError> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    file: &'a str,
    #[serde(flatten)]
    result_set: crate::model::RuleResultSet,
    hint_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    execution_errors: Vec<String>,
    duration_ms: u128,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &LintReport<'_>) -> Result<String, ReportError> {
        let mut result_set = report.results.clone();
        result_set.prepare_for_serialization();
        let output = JsonOutput {
            file: report.file,
            hint_count: result_set.get_hint_count(),
            result_set,
            execution_errors: report.errors.iter().map(ToString::to_string).collect(),
            duration_ms: report.duration.as_millis(),
        };
        self.to_string(&output)
    }

    fn format_result(&self, _file: &str, result: &RuleFunctionResult) -> String {
        let mut result = result.clone();
        result.prepare_for_serialization();
        self.to_string(&result).unwrap_or_default()
    }
}

/// Spectral-compatible JSON array
#[derive(Default)]
pub struct SpectralFormatter;

impl SpectralFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputFormatter for SpectralFormatter {
    fn format(&self, report: &LintReport<'_>) -> Result<String, ReportError> {
        let mut result_set = report.results.clone();
        result_set.prepare_for_serialization();
        let results = SpectralReport::from_results(result_set.results(), report.file);
        Ok(serde_json::to_string_pretty(&results)?)
    }

    fn format_result(&self, file: &str, result: &RuleFunctionResult) -> String {
        let mut result = result.clone();
        result.prepare_for_serialization();
        let spectral = SpectralReport::from_results(std::slice::from_ref(&result), file);
        serde_json::to_string(&spectral[0]).unwrap_or_default()
    }
}

/// Replayable vacuum report as JSON
pub struct ReportFormatter;

impl OutputFormatter for ReportFormatter {
    fn format(&self, report: &LintReport<'_>) -> Result<String, ReportError> {
        let spec_info = report.spec_info.cloned().unwrap_or_default();
        VacuumReport::new(spec_info, report.statistics.cloned(), report.results.clone()).to_json()
    }

    fn format_result(&self, file: &str, result: &RuleFunctionResult) -> String {
        JsonFormatter::new().format_result(file, result)
    }
}
