//! Error handling for the SpeakSQL application

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeakSqlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("API key not found: set {0} in the environment or in a .env file")]
    MissingApiKey(String),

    #[error("SQL parse error: {0}")]
    SqlParse(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Output formatting error: {0}")]
    OutputFormatting(String),
}

pub type Result<T> = std::result::Result<T, SpeakSqlError>;

/// Convert anyhow errors to our custom error type
impl From<anyhow::Error> for SpeakSqlError {
    fn from(err: anyhow::Error) -> Self {
        SpeakSqlError::InvalidInput(err.to_string())
    }
}

impl From<csv::Error> for SpeakSqlError {
    fn from(err: csv::Error) -> Self {
        SpeakSqlError::Csv(err.to_string())
    }
}

impl From<reqwest::Error> for SpeakSqlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SpeakSqlError::Network(format!("request timed out: {}", err))
        } else {
            SpeakSqlError::Network(err.to_string())
        }
    }
}

impl From<sqlparser::parser::ParserError> for SpeakSqlError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        SpeakSqlError::SqlParse(err.to_string())
    }
}

