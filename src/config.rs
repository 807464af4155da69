//! Configuration management for SpeakSQL

use crate::error::{Result, SpeakSqlError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_base: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Name the loaded file is queried under
    pub table_name: String,
    pub preview_rows: usize,
    pub delimiter: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub color_output: bool,
    pub max_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Console,
    Json,
    Markdown,
    Html,
    Csv,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: None,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            table_name: "df".to_string(),
            preview_rows: 5,
            delimiter: ',',
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Console,
            color_output: true,
            max_rows: 100,
        }
    }
}

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "console" | "text" => Ok(OutputFormat::Console),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(SpeakSqlError::InvalidInput(format!(
                "Unsupported output format: {}. Use: console, json, markdown, html, csv",
                other
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Console => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
            OutputFormat::Csv => "csv",
        }
    }

    /// Formats meant for reading, where `output.max_rows` caps the table.
    /// CSV and JSON are data exports and always carry every row.
    pub fn truncates(&self) -> bool {
        matches!(self, OutputFormat::Console | OutputFormat::Markdown | OutputFormat::Html)
    }
}

impl Config {
    /// Load from `config_path`, writing defaults there on first use
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| SpeakSqlError::Configuration(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SpeakSqlError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("speaksql")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(SpeakSqlError::Configuration("llm.model must not be empty".to_string()));
        }
        if !is_identifier(&self.data.table_name) {
            return Err(SpeakSqlError::Configuration(format!(
                "data.table_name '{}' is not a valid SQL identifier",
                self.data.table_name
            )));
        }
        if !self.data.delimiter.is_ascii() {
            return Err(SpeakSqlError::Configuration(
                "data.delimiter must be a single ASCII character".to_string(),
            ));
        }
        Ok(())
    }

    /// Set one scalar field by its dotted key, e.g. `llm.model`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.clone();
        match key {
            "llm.model" => self.llm.model = value.to_string(),
            "llm.api_base" => self.llm.api_base = value.to_string(),
            "llm.api_key_env" => self.llm.api_key_env = value.to_string(),
            "llm.timeout_secs" => self.llm.timeout_secs = parse_field(key, value)?,
            "llm.temperature" => {
                self.llm.temperature = match value {
                    "" | "none" => None,
                    v => Some(parse_field(key, v)?),
                }
            }
            "data.table_name" => self.data.table_name = value.to_string(),
            "data.preview_rows" => self.data.preview_rows = parse_field(key, value)?,
            "data.delimiter" => {
                self.data.delimiter = match value {
                    "\\t" | "tab" => '\t',
                    v => parse_field(key, v)?,
                }
            }
            "output.format" => self.output.format = OutputFormat::parse(value)?,
            "output.color_output" => self.output.color_output = parse_field(key, value)?,
            "output.max_rows" => self.output.max_rows = parse_field(key, value)?,
            _ => {
                return Err(SpeakSqlError::Configuration(format!(
                    "Unknown config key: {}",
                    key
                )))
            }
        }
        if let Err(e) = self.validate() {
            *self = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Delimiter byte for the CSV reader
    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.data.delimiter as u8
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SpeakSqlError::Configuration(format!("Invalid value for {}: {}", key, value)))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
