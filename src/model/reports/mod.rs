//! Report shapes built from a result set

pub mod junit;
pub mod spectral;
pub mod statistics;
pub mod vacuum_report;

pub use junit::{build_junit_report, TestSuites};
pub use spectral::{SpectralReport, SpectralResult};
pub use statistics::{calculate_quality_score, create_report_statistics, ReportStatistics};
pub use vacuum_report::VacuumReport;

use thiserror::Error;

/// Errors raised while writing or reading reports
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),
}
