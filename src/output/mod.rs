//! Output formatters for lint results

mod json;
mod junit;
mod text;

pub use json::{JsonFormatter, ReportFormatter, SpectralFormatter};
pub use junit::JUnitFormatter;
pub use text::TextFormatter;

use crate::config::OutputFormat;
use crate::model::reports::{ReportError, ReportStatistics};
use crate::model::{RuleFunctionResult, RuleResultSet};
use crate::motor::ExecutionError;
use crate::spec_info::SpecInfo;
use std::time::Duration;

/// Everything a formatter may render for one linted document
pub struct LintReport<'a> {
    pub file: &'a str,
    pub results: &'a RuleResultSet,
    pub errors: &'a [ExecutionError],
    pub spec_info: Option<&'a SpecInfo>,
    pub statistics: Option<&'a ReportStatistics>,
    pub duration: Duration,
    pub fail_on_warn: bool,
}

impl<'a> LintReport<'a> {
    pub fn new(file: &'a str, results: &'a RuleResultSet) -> Self {
        Self {
            file,
            results,
            errors: &[],
            spec_info: None,
            statistics: None,
            duration: Duration::ZERO,
            fail_on_warn: false,
        }
    }
}

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the entire lint report
    fn format(&self, report: &LintReport<'_>) -> Result<String, ReportError>;

    /// Format a single result
    fn format_result(&self, file: &str, result: &RuleFunctionResult) -> String;
}

/// Formatter for a configured output format
pub fn formatter_for(format: OutputFormat, colored: bool, details: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new().with_details(details);
            Box::new(if colored { formatter } else { formatter.without_color() })
        }
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
        OutputFormat::Spectral => Box::new(SpectralFormatter::new()),
        OutputFormat::Junit => Box::new(JUnitFormatter::new()),
        OutputFormat::Report => Box::new(ReportFormatter),
    }
}
