//! Question to SQL to result pipeline

use crate::error::{Result, SpeakSqlError};
use crate::frame::DataFrame;
use crate::llm::prompts::{PromptParams, PromptTemplates};
use crate::llm::{extract_sql, LlmProvider};
use crate::output::QueryReport;
use crate::sql::{Catalog, QueryExecutor};
use log::{debug, info, warn};
use std::time::Instant;

/// Turns questions about a frame into SQL with a model, then runs the SQL
pub struct QueryAssistant<P: LlmProvider> {
    provider: P,
    templates: PromptTemplates,
}

impl<P: LlmProvider> QueryAssistant<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            templates: PromptTemplates::default(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.name()
    }

    /// Ask the model for a single SQL statement answering `question`
    pub async fn generate_sql(&self, frame: &DataFrame, table_name: &str, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SpeakSqlError::InvalidInput("question must not be empty".to_string()));
        }

        let params = PromptParams::new(table_name, frame.column_names());
        let instructions = self.templates.render_text_to_sql(&params);
        debug!("Prompt is {} characters", instructions.len());

        let reply = self.provider.generate(&instructions, question).await?;
        debug!("Raw model reply: {}", reply);

        let sql = extract_sql(&reply)?;
        info!("Generated SQL: {}", sql);
        Ok(sql)
    }

    /// Execute `sql` with `frame` bound as `table_name`
    pub fn run_sql(&self, frame: &DataFrame, table_name: &str, sql: &str) -> Result<DataFrame> {
        execute(frame, table_name, sql)
    }

    /// Generate and execute. A failing statement is recorded in the report
    /// rather than returned as an error.
    pub async fn ask(&self, frame: &DataFrame, table_name: &str, question: &str) -> Result<QueryReport> {
        let start = Instant::now();
        let sql = self.generate_sql(frame, table_name, question).await?;
        let generation_ms = start.elapsed().as_millis() as u64;

        let (report, execution_ms) = timed_report(frame, table_name, &sql);
        Ok(report
            .with_question(question.trim())
            .with_model(self.provider.name())
            .with_timings(generation_ms, execution_ms))
    }
}

/// Run `sql` against a single frame
pub fn execute(frame: &DataFrame, table_name: &str, sql: &str) -> Result<DataFrame> {
    let catalog = Catalog::new().with_table(table_name, frame.clone());
    QueryExecutor::new(&catalog).execute(sql)
}

/// Execute and wrap the outcome in a report, with the execution time in ms
pub fn timed_report(frame: &DataFrame, table_name: &str, sql: &str) -> (QueryReport, u64) {
    let start = Instant::now();
    let report = match execute(frame, table_name, sql) {
        Ok(result) => QueryReport::success(sql, result),
        Err(e) => {
            warn!("Query failed: {}", e);
            QueryReport::failure(sql, &e)
        }
    };
    (report, start.elapsed().as_millis() as u64)
}
