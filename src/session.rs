//! Interactive shell state and line commands

use crate::assistant::{timed_report, QueryAssistant};
use crate::error::{Result, SpeakSqlError};
use crate::frame::DataFrame;
use crate::input::InputManager;
use crate::llm::LlmProvider;
use crate::output::QueryReport;
use log::info;
use std::path::{Path, PathBuf};

pub const HELP_TEXT: &str = "\
Commands:
  .load <path>    load a CSV or TSV file
  .schema         show columns and their types
  .head [n]       show the first n rows
  .sql <query>    run SQL directly
  .last           ask the previous question again
  .help           show this help
  .quit, .exit    leave the shell
Anything else is sent to the model as a question.";

/// One line of shell input
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Load(PathBuf),
    Schema,
    Head(Option<usize>),
    Sql(String),
    Last,
    Help,
    Quit,
    Ask(String),
    Empty,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ShellCommand::Empty);
        }
        if !line.starts_with('.') {
            return Ok(ShellCommand::Ask(line.to_string()));
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name.to_lowercase().as_str() {
            ".load" if rest.is_empty() => Err(SpeakSqlError::InvalidInput("usage: .load <path>".to_string())),
            ".load" => Ok(ShellCommand::Load(PathBuf::from(rest))),
            ".schema" => Ok(ShellCommand::Schema),
            ".head" if rest.is_empty() => Ok(ShellCommand::Head(None)),
            ".head" => rest
                .parse()
                .map(|n| ShellCommand::Head(Some(n)))
                .map_err(|_| SpeakSqlError::InvalidInput(format!("not a row count: {}", rest))),
            ".sql" if rest.is_empty() => Err(SpeakSqlError::InvalidInput("usage: .sql <query>".to_string())),
            ".sql" => Ok(ShellCommand::Sql(rest.to_string())),
            ".last" => Ok(ShellCommand::Last),
            ".help" => Ok(ShellCommand::Help),
            ".quit" | ".exit" => Ok(ShellCommand::Quit),
            other => Err(SpeakSqlError::InvalidInput(format!(
                "unknown command {} (type .help for a list)",
                other
            ))),
        }
    }
}

/// What the shell should show after a command
#[derive(Debug)]
pub enum ShellOutcome {
    Loaded { path: PathBuf, rows: usize, columns: usize },
    Schema(DataFrame),
    Preview(DataFrame),
    Report(QueryReport),
    Help,
    Quit,
    Nothing,
}

/// Data and history kept for the lifetime of one shell
pub struct Session {
    input: InputManager,
    frame: Option<DataFrame>,
    source: Option<PathBuf>,
    table_name: String,
    preview_rows: usize,
    last_question: Option<String>,
}

impl Session {
    pub fn new(input: InputManager, table_name: impl Into<String>, preview_rows: usize) -> Self {
        Self {
            input,
            frame: None,
            source: None,
            table_name: table_name.into(),
            preview_rows,
            last_question: None,
        }
    }

    /// Read `path` from disk, replacing any earlier frame. Files edited
    /// between loads are read again.
    pub async fn load(&mut self, path: &Path) -> Result<&DataFrame> {
        self.input.clear_cache();
        let frame = self.input.load_frame(path).await?;
        info!("Session now queries {} as {}", path.display(), self.table_name);
        self.source = Some(path.to_path_buf());
        self.last_question = None;
        Ok(self.frame.insert(frame))
    }

    pub fn frame(&self) -> Result<&DataFrame> {
        self.frame
            .as_ref()
            .ok_or_else(|| SpeakSqlError::InvalidInput("no data loaded; use .load <path>".to_string()))
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn last_question(&self) -> Option<&str> {
        self.last_question.as_deref()
    }

    /// Run one command. Questions need an assistant; everything else works
    /// without one.
    pub async fn handle<P: LlmProvider>(
        &mut self,
        command: ShellCommand,
        assistant: Option<&QueryAssistant<P>>,
    ) -> Result<ShellOutcome> {
        match command {
            ShellCommand::Empty => Ok(ShellOutcome::Nothing),
            ShellCommand::Help => Ok(ShellOutcome::Help),
            ShellCommand::Quit => Ok(ShellOutcome::Quit),
            ShellCommand::Load(path) => {
                let frame = self.load(&path).await?;
                let (rows, columns) = (frame.num_rows(), frame.num_columns());
                Ok(ShellOutcome::Loaded { path, rows, columns })
            }
            ShellCommand::Schema => Ok(ShellOutcome::Schema(self.frame()?.clone())),
            ShellCommand::Head(n) => Ok(ShellOutcome::Preview(self.frame()?.head(n.unwrap_or(self.preview_rows)))),
            ShellCommand::Sql(sql) => {
                let (report, execution_ms) = timed_report(self.frame()?, &self.table_name, &sql);
                Ok(ShellOutcome::Report(self.annotate(report.with_timings(0, execution_ms))))
            }
            ShellCommand::Last => {
                let question = self
                    .last_question
                    .clone()
                    .ok_or_else(|| SpeakSqlError::InvalidInput("no question asked yet".to_string()))?;
                self.ask(&question, assistant).await
            }
            ShellCommand::Ask(question) => self.ask(&question, assistant).await,
        }
    }

    async fn ask<P: LlmProvider>(
        &mut self,
        question: &str,
        assistant: Option<&QueryAssistant<P>>,
    ) -> Result<ShellOutcome> {
        let assistant = assistant.ok_or_else(|| {
            SpeakSqlError::Llm("no model available; only .sql statements can be run".to_string())
        })?;
        let frame = self.frame()?;
        let report = assistant.ask(frame, &self.table_name, question).await?;
        self.last_question = Some(question.to_string());
        Ok(ShellOutcome::Report(self.annotate(report)))
    }

    fn annotate(&self, report: QueryReport) -> QueryReport {
        match &self.source {
            Some(path) => report.with_source(path.display().to_string()),
            None => report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Value;
    use async_trait::async_trait;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn generate(&self, _instructions: &str, question: &str) -> Result<String> {
            // treat the question as the SQL answer
            Ok(format!("{};", question))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn csv_file() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "city,population").unwrap();
        writeln!(file, "Lyon,522000").unwrap();
        writeln!(file, "Nice,342000").unwrap();
        writeln!(file, "Paris,2100000").unwrap();
        file
    }

    fn session() -> Session {
        Session::new(InputManager::new(), "df", 2)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ShellCommand::parse("  ").unwrap(), ShellCommand::Empty);
        assert_eq!(ShellCommand::parse(".load data.csv").unwrap(), ShellCommand::Load(PathBuf::from("data.csv")));
        assert_eq!(ShellCommand::parse(".SCHEMA").unwrap(), ShellCommand::Schema);
        assert_eq!(ShellCommand::parse(".head").unwrap(), ShellCommand::Head(None));
        assert_eq!(ShellCommand::parse(".head 10").unwrap(), ShellCommand::Head(Some(10)));
        assert_eq!(
            ShellCommand::parse(".sql SELECT 1").unwrap(),
            ShellCommand::Sql("SELECT 1".to_string())
        );
        assert_eq!(ShellCommand::parse(".exit").unwrap(), ShellCommand::Quit);
        assert_eq!(
            ShellCommand::parse("how many cities?").unwrap(),
            ShellCommand::Ask("how many cities?".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(ShellCommand::parse(".load").is_err());
        assert!(ShellCommand::parse(".head many").is_err());
        assert!(ShellCommand::parse(".drop").is_err());
    }

    #[tokio::test]
    async fn test_commands_need_data() {
        let mut session = session();
        let err = session
            .handle::<EchoProvider>(ShellCommand::Schema, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(".load"));
    }

    #[tokio::test]
    async fn test_load_head_and_sql() {
        let file = csv_file();
        let mut session = session();

        let outcome = session
            .handle::<EchoProvider>(ShellCommand::Load(file.path().to_path_buf()), None)
            .await
            .unwrap();
        assert!(matches!(outcome, ShellOutcome::Loaded { rows: 3, columns: 2, .. }));
        assert_eq!(session.source(), Some(file.path()));

        match session.handle::<EchoProvider>(ShellCommand::Head(None), None).await.unwrap() {
            ShellOutcome::Preview(frame) => assert_eq!(frame.num_rows(), 2),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let sql = ShellCommand::Sql("SELECT city FROM df WHERE population > 400000".to_string());
        match session.handle::<EchoProvider>(sql, None).await.unwrap() {
            ShellOutcome::Report(report) => {
                assert_eq!(report.row_count, 2);
                assert!(report.question.is_none());
                assert!(report.source_file.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reload_picks_up_edits() {
        let mut file = csv_file();
        let mut session = session();
        let path = file.path().to_path_buf();

        let outcome = session.handle::<EchoProvider>(ShellCommand::Load(path.clone()), None).await.unwrap();
        assert!(matches!(outcome, ShellOutcome::Loaded { rows: 3, .. }));

        writeln!(file, "Lille,236000").unwrap();
        file.flush().unwrap();
        let outcome = session.handle::<EchoProvider>(ShellCommand::Load(path), None).await.unwrap();
        assert!(matches!(outcome, ShellOutcome::Loaded { rows: 4, .. }));
    }

    #[tokio::test]
    async fn test_ask_and_last() {
        let file = csv_file();
        let mut session = session();
        session.load(file.path()).await.unwrap();
        let assistant = QueryAssistant::new(EchoProvider);

        let err = session.handle(ShellCommand::Last, Some(&assistant)).await.unwrap_err();
        assert!(err.to_string().contains("no question asked yet"));

        let question = ShellCommand::Ask("SELECT MAX(population) FROM df".to_string());
        session.handle(question, Some(&assistant)).await.unwrap();
        assert_eq!(session.last_question(), Some("SELECT MAX(population) FROM df"));

        match session.handle(ShellCommand::Last, Some(&assistant)).await.unwrap() {
            ShellOutcome::Report(report) => {
                assert_eq!(report.rows, vec![vec![Value::Integer(2100000)]]);
                assert_eq!(report.model.as_deref(), Some("echo"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_questions_need_a_model() {
        let file = csv_file();
        let mut session = session();
        session.load(file.path()).await.unwrap();

        let err = session
            .handle::<EchoProvider>(ShellCommand::Ask("how many?".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SpeakSqlError::Llm(_)));
        assert!(session.last_question().is_none());
    }
}
