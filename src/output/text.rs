//! Human-readable text output formatter

use super::{LintReport, OutputFormatter};
use crate::model::reports::ReportError;
use crate::model::{RuleFunctionResult, Severity};
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show how-to-fix text and documentation links
    pub show_details: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_details: false,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn with_details(mut self, details: bool) -> Self {
        self.show_details = details;
        self
    }

    fn paint(&self, text: String, paint: impl Fn(String) -> ColoredString) -> String {
        if self.colored {
            paint(text).to_string()
        } else {
            text
        }
    }

    fn severity_str(&self, severity: Severity) -> String {
        let s = severity.to_string();
        if !self.colored {
            return s;
        }
        match severity {
            Severity::Error => s.red().bold().to_string(),
            Severity::Warn => s.yellow().bold().to_string(),
            Severity::Info => s.blue().to_string(),
            Severity::Hint => s.dimmed().to_string(),
        }
    }

    fn count(&self, count: usize, singular: &str, plural: &str, paint: fn(String) -> ColoredString) -> Option<String> {
        if count == 0 {
            return None;
        }
        let s = format!("{} {}", count, if count == 1 { singular } else { plural });
        Some(self.paint(s, paint))
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &LintReport<'_>) -> Result<String, ReportError> {
        let mut output = String::new();

        if !report.results.is_empty() {
            output.push_str(&self.paint(report.file.to_string(), |s| s.underline()));
            output.push('\n');
            for result in report.results.iter() {
                output.push_str(&self.format_result(report.file, result));
                output.push('\n');
            }
        }

        for error in report.errors {
            output.push_str(&format!("{}: {}\n", self.paint("execution error".to_string(), |s| s.red()), error));
        }

        if self.show_stats {
            let results = report.results;
            let counts: Vec<String> = [
                self.count(results.get_error_count(), "error", "errors", |s| s.red()),
                self.count(results.get_warn_count(), "warning", "warnings", |s| s.yellow()),
                self.count(results.get_info_count(), "info", "infos", |s| s.blue()),
                self.count(results.get_hint_count(), "hint", "hints", |s| s.dimmed()),
            ]
            .into_iter()
            .flatten()
            .collect();

            output.push_str(&format!("\n{}", report.file));
            if counts.is_empty() {
                output.push_str(&format!(": {}", self.paint("no issues".to_string(), |s| s.green())));
            } else {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            if let Some(statistics) = report.statistics {
                output.push_str(&format!("Quality score: {}/100\n", statistics.overall_score));
            }
            output.push_str(&format!("Finished in {:.2}s\n", report.duration.as_secs_f64()));
        }

        Ok(output)
    }

    fn format_result(&self, file: &str, result: &RuleFunctionResult) -> String {
        let mut output = format!(
            "{}:{}:{}: {}[{}]: {}\n",
            file,
            result.start_line(),
            result.start_column(),
            self.severity_str(result.severity()),
            self.paint(result.effective_rule_id().to_string(), |s| s.cyan()),
            result.message
        );
        if !result.path.is_empty() {
            output.push_str(&format!("   {} path: {}\n", self.paint("=".to_string(), |s| s.blue()), result.path));
        }

        if self.show_details {
            if let Some(rule) = &result.rule {
                if !rule.how_to_fix.is_empty() {
                    output.push_str(&format!(
                        "   {} fix: {}\n",
                        self.paint("=".to_string(), |s| s.green()),
                        rule.how_to_fix
                    ));
                }
                if !rule.documentation_url.is_empty() {
                    output.push_str(&format!(
                        "   {} docs: {}\n",
                        self.paint("=".to_string(), |s| s.blue()),
                        rule.documentation_url
                    ));
                }
            }
        }

        output
    }
}
