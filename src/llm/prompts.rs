//! Instruction prompt sent alongside every question

use serde::{Deserialize, Serialize};

/// Prompt template for turning a question into SQL
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub text_to_sql: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            text_to_sql: TEXT_TO_SQL_TEMPLATE.to_string(),
        }
    }
}

/// Parameters for prompt template substitution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptParams {
    pub table_name: String,
    pub columns: Vec<String>,
}

impl PromptParams {
    pub fn new(table_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }
}

impl PromptTemplates {
    /// Render the instruction block for a table and its columns
    pub fn render_text_to_sql(&self, params: &PromptParams) -> String {
        let first_column = params
            .columns
            .first()
            .map(String::as_str)
            .unwrap_or("id");

        self.text_to_sql
            .replace("{table}", &params.table_name)
            .replace("{columns}", &params.columns.join(", "))
            .replace("{first_column}", first_column)
    }
}

const TEXT_TO_SQL_TEMPLATE: &str = r#"You are an expert in converting English questions to SQL query!
The SQL database has the name {table} and has the following columns - {columns}.

For example:
Example 1 - How many entries of records are present?, the SQL command will be something like this:
SELECT COUNT(*) FROM {table};

Example 2 - Tell me all the entries where {first_column} is equal to "value", the SQL command will be something like this:
SELECT * FROM {table} WHERE {first_column}="value";

Please do not include ``` at the beginning or end and the SQL keyword in the output."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_sql_rendering() {
        let templates = PromptTemplates::default();
        let params = PromptParams::new(
            "df",
            vec!["name".to_string(), "age".to_string(), "city".to_string()],
        );

        let prompt = templates.render_text_to_sql(&params);

        assert!(prompt.contains("has the name df"));
        assert!(prompt.contains("following columns - name, age, city."));
        assert!(prompt.contains("SELECT COUNT(*) FROM df;"));
        assert!(prompt.contains("where name is equal to \"value\""));
        assert!(prompt.contains("SELECT * FROM df WHERE name=\"value\";"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_custom_table_name() {
        let templates = PromptTemplates::default();
        let params = PromptParams::new("sales", vec!["region".to_string()]);

        let prompt = templates.render_text_to_sql(&params);

        assert!(prompt.contains("SELECT COUNT(*) FROM sales;"));
        assert!(prompt.contains("SELECT * FROM sales WHERE region=\"value\";"));
    }

    #[test]
    fn test_template_forbids_fences() {
        let templates = PromptTemplates::default();
        assert!(templates.text_to_sql.contains("do not include ```"));
    }
}
