//! Output formatters for query reports and data previews

use crate::config::OutputFormat;
use crate::error::{Result, SpeakSqlError};
use crate::frame::{DataFrame, Value};
use crate::output::report::QueryReport;
use askama::Template;
use colored::{Color, Colorize};
use std::path::Path;

/// Trait for formatting query reports
pub trait OutputFormatter {
    fn format_report(&self, report: &QueryReport) -> Result<String>;
}

/// Console formatter with a box-drawn result table
pub struct ConsoleFormatter {
    use_colors: bool,
}

/// JSON formatter for scripting and pipelines
pub struct JsonFormatter {
    pretty: bool,
}

/// Markdown formatter for notes and documentation
pub struct MarkdownFormatter {
    include_metadata: bool,
}

/// CSV formatter, result rows only
pub struct CsvFormatter;

/// Standalone HTML page
pub struct HtmlFormatter {
    include_styles: bool,
}

/// Report generator that coordinates different formatters
pub struct ReportGenerator {
    console_formatter: ConsoleFormatter,
    json_formatter: JsonFormatter,
    markdown_formatter: MarkdownFormatter,
    csv_formatter: CsvFormatter,
    html_formatter: HtmlFormatter,
    row_limit: Option<usize>,
}

/// Askama template for HTML output
#[derive(Template)]
#[template(source = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SpeakSQL Query Report</title>
    {% if include_styles %}
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 1000px;
            margin: 0 auto;
            padding: 20px;
            background: #f8f9fa;
        }
        .container {
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
        }
        h1 {
            color: #333;
            text-align: center;
            border-bottom: 3px solid #4CAF50;
            padding-bottom: 15px;
        }
        h2 { color: #4CAF50; }
        pre.sql {
            background: #272822;
            color: #f8f8f2;
            padding: 15px;
            border-radius: 6px;
            overflow-x: auto;
        }
        table { border-collapse: collapse; width: 100%; margin: 15px 0; }
        th, td { border: 1px solid #dee2e6; padding: 6px 10px; text-align: left; }
        th { background: #e9ecef; }
        tr:nth-child(even) td { background: #f8f9fa; }
        td.null { color: #adb5bd; font-style: italic; }
        .error {
            background: #f8d7da;
            color: #721c24;
            padding: 15px;
            border-radius: 6px;
            border-left: 4px solid #dc3545;
        }
        .metadata {
            background: #e9ecef;
            padding: 15px;
            border-radius: 6px;
            margin-top: 30px;
            font-size: 0.9em;
            color: #6c757d;
        }
    </style>
    {% endif %}
</head>
<body>
    <div class="container">
        <h1>SpeakSQL Query Report</h1>

        {% if has_question %}
        <h2>Question</h2>
        <p>{{ question }}</p>
        {% endif %}

        <h2>SQL</h2>
        <pre class="sql">{{ sql }}</pre>

        <h2>Results</h2>
        {% if has_error %}
        <div class="error"><strong>Query error:</strong> {{ error }}</div>
        {% else %}
        <table>
            <thead>
                <tr>{% for column in columns %}<th>{{ column }}</th>{% endfor %}</tr>
            </thead>
            <tbody>
                {% for row in rows %}
                <tr>{% for cell in row %}{% if cell.is_null %}<td class="null">NULL</td>{% else %}<td>{{ cell.text }}</td>{% endif %}{% endfor %}</tr>
                {% endfor %}
            </tbody>
        </table>
        <p>{{ row_summary }}</p>
        {% endif %}

        <div class="metadata">
            <p><strong>Generated by SpeakSQL v{{ version }}</strong> at {{ generated_at }}</p>
            {% if has_model %}<p><strong>Model:</strong> {{ model }} | <strong>Generation:</strong> {{ generation_ms }}ms</p>{% endif %}
            <p><strong>Execution:</strong> {{ execution_ms }}ms{% if has_source %} | <strong>Data:</strong> {{ source_file }}{% endif %}</p>
        </div>
    </div>
</body>
</html>"#, ext = "html")]
struct HtmlTemplate {
    include_styles: bool,
    has_question: bool,
    question: String,
    sql: String,
    has_error: bool,
    error: String,
    columns: Vec<String>,
    rows: Vec<Vec<HtmlCell>>,
    row_summary: String,
    generated_at: String,
    version: String,
    has_model: bool,
    model: String,
    generation_ms: u64,
    execution_ms: u64,
    has_source: bool,
    source_file: String,
}

#[derive(Debug, Clone)]
struct HtmlCell {
    is_null: bool,
    text: String,
}

/// Plain text of a cell; NULL prints as `NULL`
fn cell_text(value: &Value) -> String {
    value.to_string()
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Integer(_) | Value::Float(_))
}

/// "3 rows" / "showing 100 of 250 rows"
fn row_summary(report: &QueryReport) -> String {
    let noun = if report.row_count == 1 { "row" } else { "rows" };
    if report.truncated {
        format!("showing {} of {} {}", report.rows.len(), report.row_count, noun)
    } else {
        format!("{} {}", report.row_count, noun)
    }
}

/// Render rows as a box-drawn table. Numbers are right-aligned.
pub fn render_table(columns: &[String], rows: &[Vec<Value>], use_colors: bool) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let border = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{}{}{}\n", left, segments.join(mid), right)
    };
    let pad = |text: &str, width: usize, right_align: bool| {
        let fill = " ".repeat(width.saturating_sub(text.chars().count()));
        if right_align {
            format!("{}{}", fill, text)
        } else {
            format!("{}{}", text, fill)
        }
    };

    let mut output = String::new();
    output.push_str(&border("┌", "┬", "┐"));

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(name, &width)| {
            let padded = pad(name, width, false);
            if use_colors {
                padded.bold().to_string()
            } else {
                padded
            }
        })
        .collect();
    output.push_str(&format!("│ {} │\n", header.join(" │ ")));
    output.push_str(&border("├", "┼", "┤"));

    for (row, texts) in rows.iter().zip(&cells) {
        let line: Vec<String> = row
            .iter()
            .zip(texts)
            .zip(&widths)
            .map(|((value, text), &width)| {
                let padded = pad(text, width, is_numeric(value));
                if use_colors && value.is_null() {
                    padded.color(Color::BrightBlack).to_string()
                } else {
                    padded
                }
            })
            .collect();
        output.push_str(&format!("│ {} │\n", line.join(" │ ")));
    }

    output.push_str(&border("└", "┴", "┘"));
    output
}

/// Data preview used by `preview` and `.head`
pub fn format_frame(frame: &DataFrame, use_colors: bool) -> String {
    let mut output = render_table(&frame.column_names(), &frame.rows, use_colors);
    output.push_str(&format!(
        "[{} rows x {} columns]\n",
        frame.num_rows(),
        frame.num_columns()
    ));
    output
}

/// Column list with inferred types
pub fn format_schema(frame: &DataFrame, table_name: &str, use_colors: bool) -> String {
    let title = format!("Table {}", table_name);
    let mut output = if use_colors {
        format!("{}\n", title.bold())
    } else {
        format!("{}\n", title)
    };
    for column in &frame.columns {
        let data_type = column.data_type.to_string();
        let data_type = if use_colors {
            data_type.color(Color::Cyan).to_string()
        } else {
            data_type
        };
        output.push_str(&format!("  {} {}\n", column.name, data_type));
    }
    output
}

impl ConsoleFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn format_header(&self, title: &str) -> String {
        if self.use_colors {
            format!("{} {}\n", "▓".color(Color::Green).bold(), title.color(Color::Green).bold())
        } else {
            format!("▓ {}\n", title)
        }
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_report(&self, report: &QueryReport) -> Result<String> {
        let mut output = String::new();

        if let Some(question) = &report.question {
            output.push_str(&self.format_header("Question"));
            output.push_str(&format!("{}\n\n", question));
        }

        output.push_str(&self.format_header("SQL"));
        output.push_str(&format!("{}\n\n", self.colorize(&report.sql, Color::Cyan)));

        output.push_str(&self.format_header("Results"));
        match &report.error {
            Some(error) => {
                output.push_str(&format!("{}\n", self.colorize(error, Color::Red)));
            }
            None => {
                output.push_str(&render_table(&report.columns, &report.rows, self.use_colors));
                output.push_str(&format!("{}\n", self.colorize(&row_summary(report), Color::BrightBlack)));
            }
        }

        let mut footer = Vec::new();
        if let Some(model) = &report.model {
            footer.push(format!("model {} ({}ms)", model, report.generation_ms));
        }
        footer.push(format!("executed in {}ms", report.execution_ms));
        output.push_str(&format!("\n{}\n", self.colorize(&footer.join(" | "), Color::BrightBlack)));

        Ok(output)
    }
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_report(&self, report: &QueryReport) -> Result<String> {
        if self.pretty {
            Ok(serde_json::to_string_pretty(report)?)
        } else {
            Ok(serde_json::to_string(report)?)
        }
    }
}

impl MarkdownFormatter {
    pub fn new(include_metadata: bool) -> Self {
        Self { include_metadata }
    }

    fn escape(text: &str) -> String {
        text.replace('|', "\\|").replace('\n', " ")
    }
}

impl OutputFormatter for MarkdownFormatter {
    fn format_report(&self, report: &QueryReport) -> Result<String> {
        let mut content = String::new();
        content.push_str("# SpeakSQL Query Report\n\n");

        if let Some(question) = &report.question {
            content.push_str(&format!("**Question:** {}\n\n", question));
        }

        content.push_str("```sql\n");
        content.push_str(&report.sql);
        content.push_str("\n```\n\n");

        match &report.error {
            Some(error) => content.push_str(&format!("> **Query error:** {}\n", error)),
            None => {
                let header: Vec<String> = report.columns.iter().map(|c| Self::escape(c)).collect();
                content.push_str(&format!("| {} |\n", header.join(" | ")));
                let rule: Vec<&str> = report.columns.iter().map(|_| "---").collect();
                content.push_str(&format!("| {} |\n", rule.join(" | ")));
                for row in &report.rows {
                    let cells: Vec<String> = row.iter().map(|v| Self::escape(&cell_text(v))).collect();
                    content.push_str(&format!("| {} |\n", cells.join(" | ")));
                }
                content.push_str(&format!("\n_{}_\n", row_summary(report)));
            }
        }

        if self.include_metadata {
            content.push_str("\n---\n\n");
            content.push_str(&format!(
                "*Generated by SpeakSQL v{} on {}*\n",
                env!("CARGO_PKG_VERSION"),
                report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if let Some(model) = &report.model {
                content.push_str(&format!("*Model: {} ({}ms)*\n", model, report.generation_ms));
            }
            if let Some(source) = &report.source_file {
                content.push_str(&format!("*Data: {}*\n", source));
            }
        }

        Ok(content)
    }
}

impl OutputFormatter for CsvFormatter {
    fn format_report(&self, report: &QueryReport) -> Result<String> {
        if let Some(error) = &report.error {
            return Err(SpeakSqlError::OutputFormatting(format!(
                "no result to write as CSV: {}",
                error
            )));
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&report.columns)?;
        for row in &report.rows {
            writer.write_record(row.iter().map(|v| v.to_text().unwrap_or_default()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| SpeakSqlError::OutputFormatting(format!("CSV writer failed: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| SpeakSqlError::OutputFormatting(format!("CSV output is not UTF-8: {}", e)))
    }
}

impl HtmlFormatter {
    pub fn new(include_styles: bool) -> Self {
        Self { include_styles }
    }

    fn create_template_data(&self, report: &QueryReport) -> HtmlTemplate {
        let rows = report
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|value| HtmlCell {
                        is_null: value.is_null(),
                        text: cell_text(value),
                    })
                    .collect()
            })
            .collect();

        HtmlTemplate {
            include_styles: self.include_styles,
            has_question: report.question.is_some(),
            question: report.question.clone().unwrap_or_default(),
            sql: report.sql.clone(),
            has_error: report.error.is_some(),
            error: report.error.clone().unwrap_or_default(),
            columns: report.columns.clone(),
            rows,
            row_summary: row_summary(report),
            generated_at: report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            has_model: report.model.is_some(),
            model: report.model.clone().unwrap_or_default(),
            generation_ms: report.generation_ms,
            execution_ms: report.execution_ms,
            has_source: report.source_file.is_some(),
            source_file: report.source_file.clone().unwrap_or_default(),
        }
    }
}

impl OutputFormatter for HtmlFormatter {
    fn format_report(&self, report: &QueryReport) -> Result<String> {
        self.create_template_data(report)
            .render()
            .map_err(|e| SpeakSqlError::OutputFormatting(format!("HTML template error: {}", e)))
    }
}

impl ReportGenerator {
    pub fn new() -> Self {
        Self::with_options(true, true, true, true)
    }

    pub fn with_options(
        use_colors: bool,
        pretty_json: bool,
        include_metadata: bool,
        include_html_styles: bool,
    ) -> Self {
        Self {
            console_formatter: ConsoleFormatter::new(use_colors),
            json_formatter: JsonFormatter::new(pretty_json),
            markdown_formatter: MarkdownFormatter::new(include_metadata),
            csv_formatter: CsvFormatter,
            html_formatter: HtmlFormatter::new(include_html_styles),
            row_limit: None,
        }
    }

    /// Cap the rows shown by console, Markdown and HTML reports
    pub fn with_row_limit(mut self, row_limit: Option<usize>) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn generate_report(&self, report: &QueryReport, format: &OutputFormat) -> Result<String> {
        let formatter: &dyn OutputFormatter = match format {
            OutputFormat::Console => &self.console_formatter,
            OutputFormat::Json => &self.json_formatter,
            OutputFormat::Markdown => &self.markdown_formatter,
            OutputFormat::Csv => &self.csv_formatter,
            OutputFormat::Html => &self.html_formatter,
        };
        match self.row_limit {
            Some(limit) if format.truncates() && report.rows.len() > limit => {
                let mut shown = report.clone();
                shown.truncate(limit);
                formatter.format_report(&shown)
            }
            _ => formatter.format_report(report),
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// Utility functions for saving reports
pub fn save_report_to_file(content: &str, file_path: &Path) -> Result<()> {
    use std::fs;
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file_path, content)?;
    Ok(())
}

pub fn suggest_filename(format: &OutputFormat, source_name: &str, timestamp: bool) -> String {
    let base_name = Path::new(source_name)
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();

    let timestamp_suffix = if timestamp {
        format!("_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
    } else {
        String::new()
    };

    format!("{}_query{}.{}", base_name, timestamp_suffix, format.extension())
}
