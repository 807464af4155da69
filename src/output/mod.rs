//! Report structures and formatters

pub mod formatter;
pub mod report;

pub use formatter::{format_frame, format_schema, save_report_to_file, suggest_filename, ReportGenerator};
pub use report::QueryReport;
