//! Result of one question or statement, ready for formatting

use crate::error::SpeakSqlError;
use crate::frame::{DataFrame, Value};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything a formatter needs to present one query run
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    /// Natural-language question, absent when SQL was given directly
    pub question: Option<String>,

    /// Statement that was executed
    pub sql: String,

    pub columns: Vec<String>,

    pub rows: Vec<Vec<Value>>,

    /// Number of rows the query produced, before any truncation
    pub row_count: usize,

    /// True when `rows` holds fewer rows than `row_count`
    pub truncated: bool,

    /// Query failure shown in place of a result
    pub error: Option<String>,

    pub model: Option<String>,

    pub source_file: Option<String>,

    pub generated_at: DateTime<Utc>,

    pub generation_ms: u64,

    pub execution_ms: u64,
}

impl QueryReport {
    pub fn success(sql: impl Into<String>, result: DataFrame) -> Self {
        let columns = result.column_names();
        let row_count = result.num_rows();
        Self {
            question: None,
            sql: sql.into(),
            columns,
            rows: result.rows,
            row_count,
            truncated: false,
            error: None,
            model: None,
            source_file: None,
            generated_at: Utc::now(),
            generation_ms: 0,
            execution_ms: 0,
        }
    }

    pub fn failure(sql: impl Into<String>, error: &SpeakSqlError) -> Self {
        Self {
            question: None,
            sql: sql.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            error: Some(error.to_string()),
            model: None,
            source_file: None,
            generated_at: Utc::now(),
            generation_ms: 0,
            execution_ms: 0,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_source(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn with_timings(mut self, generation_ms: u64, execution_ms: u64) -> Self {
        self.generation_ms = generation_ms;
        self.execution_ms = execution_ms;
        self
    }

    /// Keep at most `max_rows` rows for presentation
    pub fn truncate(&mut self, max_rows: usize) {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn total_ms(&self) -> u64 {
        self.generation_ms + self.execution_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, DataType};

    fn frame(rows: usize) -> DataFrame {
        DataFrame::new(
            vec![Column::new("n", DataType::Integer)],
            (0..rows as i64).map(|i| vec![Value::Integer(i)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_success_report() {
        let report = QueryReport::success("SELECT n FROM df", frame(3))
            .with_question("list n")
            .with_model("gemini-1.5-flash")
            .with_timings(120, 4);

        assert!(report.is_success());
        assert_eq!(report.columns, vec!["n"]);
        assert_eq!(report.row_count, 3);
        assert_eq!(report.total_ms(), 124);
        assert_eq!(report.question.as_deref(), Some("list n"));
    }

    #[test]
    fn test_truncate_keeps_row_count() {
        let mut report = QueryReport::success("SELECT n FROM df", frame(10));
        report.truncate(4);
        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.row_count, 10);
        assert!(report.truncated);

        let mut report = QueryReport::success("SELECT n FROM df", frame(2));
        report.truncate(4);
        assert!(!report.truncated);
    }

    #[test]
    fn test_failure_report() {
        let err = SpeakSqlError::Query("no such column: x".to_string());
        let report = QueryReport::failure("SELECT x FROM df", &err);
        assert!(!report.is_success());
        assert!(report.rows.is_empty());
        assert_eq!(report.error.as_deref(), Some("Query error: no such column: x"));
    }

    #[test]
    fn test_serializes_values_untagged() {
        let report = QueryReport::success("SELECT n FROM df", frame(1));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rows"], serde_json::json!([[0]]));
        assert_eq!(json["error"], serde_json::Value::Null);
    }
}
