//! CLI interface for SpeakSQL

use crate::config::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Extensions accepted for data files
pub const DATA_EXTENSIONS: &[&str] = &["csv", "tsv", "tab", "txt"];

#[derive(Parser)]
#[command(name = "speaksql")]
#[command(about = "Ask questions about a CSV file in plain English")]
#[command(long_about = "Load a CSV file, have a Gemini model translate your question into SQL, and run that SQL against the data locally")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question about a CSV file
    Ask {
        /// Path to the data file (CSV, TSV)
        #[arg(long)]
        csv: PathBuf,

        /// Question in plain English
        #[arg(short, long)]
        question: String,

        /// Output format: console, json, markdown, html, csv
        #[arg(short, long)]
        output: Option<String>,

        /// Save output to file
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Gemini model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Table name the data is queried under
        #[arg(short, long)]
        table: Option<String>,

        /// Print the generated SQL without running it
        #[arg(long)]
        show_sql_only: bool,
    },

    /// Run a SQL statement against a CSV file
    Sql {
        /// Path to the data file (CSV, TSV)
        #[arg(long)]
        csv: PathBuf,

        /// SQL statement to run
        #[arg(short, long)]
        query: String,

        /// Output format: console, json, markdown, html, csv
        #[arg(short, long)]
        output: Option<String>,

        /// Save output to file
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Table name the data is queried under
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Show the first rows and the inferred schema of a CSV file
    Preview {
        /// Path to the data file (CSV, TSV)
        #[arg(long)]
        csv: PathBuf,

        /// Number of rows to show
        #[arg(short, long)]
        rows: Option<usize>,
    },

    /// Start an interactive shell
    Shell {
        /// Data file to load on start
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Reset configuration to defaults
    Reset,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "llm.model")
        key: String,

        /// Configuration value
        value: String,
    },
}

/// Parse and validate output format
pub fn parse_output_format(format: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(format).map_err(|e| e.to_string())
}

/// Validate file extension
pub fn validate_file_extension(path: &Path, allowed_extensions: &[&str]) -> Result<(), String> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => {
            if allowed_extensions.contains(&ext.to_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "Unsupported file extension: .{}. Allowed: {}",
                    ext,
                    allowed_extensions.join(", ")
                ))
            }
        }
        None => Err("File has no extension".to_string()),
    }
}
