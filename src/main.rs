//! SpeakSQL: ask questions about CSV files in plain English

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use speaksql::assistant::{timed_report, QueryAssistant};
use speaksql::cli::{self, Cli, Commands, ConfigAction, DATA_EXTENSIONS};
use speaksql::config::{Config, OutputFormat};
use speaksql::error::{Result, SpeakSqlError};
use speaksql::frame::DataFrame;
use speaksql::input::InputManager;
use speaksql::llm::GeminiClient;
use speaksql::output::{format_frame, format_schema, save_report_to_file, suggest_filename, QueryReport, ReportGenerator};
use speaksql::session::{Session, ShellCommand, ShellOutcome, HELP_TEXT};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // The API key may come from a .env file
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Could not read .env file: {}", e),
    }

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let use_colors = config.output.color_output && !cli.no_color;
    if !use_colors {
        colored::control::set_override(false);
    }

    // Execute command
    if let Err(e) = run_command(cli.command, config, &config_path, use_colors).await {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_command(command: Commands, mut config: Config, config_path: &Path, use_colors: bool) -> Result<()> {
    match command {
        Commands::Ask {
            csv,
            question,
            output,
            save,
            model,
            table,
            show_sql_only,
        } => {
            let format = resolve_format(output.as_deref(), &config)?;
            let table = table.unwrap_or_else(|| config.data.table_name.clone());
            if let Some(model) = model {
                config.llm.model = model;
            }

            let frame = load_frame(&csv, &config).await?;
            let assistant = QueryAssistant::new(GeminiClient::from_config(&config.llm)?);
            info!("Asking {} about {}", assistant.model_name(), csv.display());

            let progress = spinner("Generating SQL query...");
            let start = Instant::now();
            let sql = assistant.generate_sql(&frame, &table, &question).await;
            progress.finish_and_clear();
            let sql = sql?;
            let generation_ms = start.elapsed().as_millis() as u64;

            if show_sql_only {
                println!("{}", sql);
                return Ok(());
            }

            let progress = spinner("Executing SQL query...");
            let (report, execution_ms) = timed_report(&frame, &table, &sql);
            progress.finish_and_clear();

            let report = report
                .with_question(question.trim())
                .with_model(assistant.model_name())
                .with_source(csv.display().to_string())
                .with_timings(generation_ms, execution_ms);
            emit_report(report, &format, save.as_deref(), &csv, &config, use_colors)?;
        }

        Commands::Sql {
            csv,
            query,
            output,
            save,
            table,
        } => {
            let format = resolve_format(output.as_deref(), &config)?;
            let table = table.unwrap_or_else(|| config.data.table_name.clone());
            let frame = load_frame(&csv, &config).await?;

            let progress = spinner("Executing SQL query...");
            let (report, execution_ms) = timed_report(&frame, &table, query.trim());
            progress.finish_and_clear();

            let report = report
                .with_source(csv.display().to_string())
                .with_timings(0, execution_ms);
            emit_report(report, &format, save.as_deref(), &csv, &config, use_colors)?;
        }

        Commands::Preview { csv, rows } => {
            let frame = load_frame(&csv, &config).await?;
            let rows = rows.unwrap_or(config.data.preview_rows);
            println!("{}", format_schema(&frame, &config.data.table_name, use_colors));
            print!("{}", format_frame(&frame.head(rows), use_colors));
        }

        Commands::Shell { csv } => {
            run_shell(&config, csv, use_colors).await?;
        }

        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                let content = toml::to_string_pretty(&config)
                    .map_err(|e| SpeakSqlError::Configuration(format!("Failed to serialize config: {}", e)))?;
                println!("# {}", config_path.display());
                print!("{}", content);
            }

            Some(ConfigAction::Path) => {
                println!("{}", config_path.display());
            }

            Some(ConfigAction::Reset) => {
                Config::default().save_to(config_path)?;
                println!("Configuration reset to defaults");
            }

            Some(ConfigAction::Set { key, value }) => {
                config.set_value(&key, &value)?;
                config.save_to(config_path)?;
                println!("Set {} = {}", key, value);
            }
        },
    }

    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

fn resolve_format(output: Option<&str>, config: &Config) -> Result<OutputFormat> {
    match output {
        Some(name) => cli::parse_output_format(name).map_err(SpeakSqlError::InvalidInput),
        None => Ok(config.output.format),
    }
}

fn input_manager(config: &Config) -> InputManager {
    // a non-default delimiter overrides the one implied by the extension
    let delimiter = (config.data.delimiter != ',').then(|| config.delimiter_byte());
    InputManager::new().with_delimiter(delimiter)
}

async fn load_frame(path: &Path, config: &Config) -> Result<DataFrame> {
    cli::validate_file_extension(path, DATA_EXTENSIONS)
        .map_err(|e| SpeakSqlError::InvalidInput(format!("Data file: {}", e)))?;
    input_manager(config).load_frame(path).await
}

fn emit_report(
    report: QueryReport,
    format: &OutputFormat,
    save: Option<&Path>,
    source: &Path,
    config: &Config,
    use_colors: bool,
) -> Result<()> {
    // saved files keep every row; max_rows only applies to what is printed
    match save {
        Some(target) => {
            let target = if target.is_dir() {
                target.join(suggest_filename(format, &source.to_string_lossy(), true))
            } else {
                target.to_path_buf()
            };
            let content = ReportGenerator::with_options(false, true, true, true).generate_report(&report, format)?;
            save_report_to_file(&content, &target)?;
            println!("Report saved to {}", target.display());
        }
        None => {
            let content = ReportGenerator::with_options(use_colors, true, true, true)
                .with_row_limit(Some(config.output.max_rows))
                .generate_report(&report, format)?;
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

async fn run_shell(config: &Config, csv: Option<PathBuf>, use_colors: bool) -> anyhow::Result<()> {
    let assistant = match GeminiClient::from_config(&config.llm) {
        Ok(client) => Some(QueryAssistant::new(client)),
        Err(e) => {
            warn!("Questions are disabled: {}", e);
            println!("{}", format!("Questions are disabled: {}", e).yellow());
            None
        }
    };

    let mut session = Session::new(
        input_manager(config),
        config.data.table_name.clone(),
        config.data.preview_rows,
    );
    let generator =
        ReportGenerator::with_options(use_colors, true, true, true).with_row_limit(Some(config.output.max_rows));

    println!("SpeakSQL shell. Type .help for commands.");
    if let Some(path) = csv {
        let outcome = session.handle(ShellCommand::Load(path), assistant.as_ref()).await;
        render_outcome(outcome, &session, &generator, use_colors);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "speaksql>".bold());
        std::io::stdout().flush().context("failed to flush stdout")?;

        let line = match lines.next_line().await.context("failed to read from stdin")? {
            Some(line) => line,
            None => break,
        };

        let command = match ShellCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{} {}", "error:".red().bold(), e);
                continue;
            }
        };

        let asks_model = matches!(command, ShellCommand::Ask(_) | ShellCommand::Last);
        let progress = asks_model.then(|| spinner("Generating SQL query..."));
        let outcome = session.handle(command, assistant.as_ref()).await;
        if let Some(progress) = progress {
            progress.finish_and_clear();
        }

        if render_outcome(outcome, &session, &generator, use_colors) {
            break;
        }
    }
    Ok(())
}

/// Print one shell outcome; true when the shell should exit
fn render_outcome(
    outcome: Result<ShellOutcome>,
    session: &Session,
    generator: &ReportGenerator,
    use_colors: bool,
) -> bool {
    let rendered = match outcome {
        Ok(ShellOutcome::Quit) => return true,
        Ok(ShellOutcome::Nothing) => return false,
        Ok(ShellOutcome::Help) => Ok(format!("{}\n", HELP_TEXT)),
        Ok(ShellOutcome::Loaded { path, rows, columns }) => Ok(format!(
            "Loaded {} ({} rows x {} columns) as table {}\n",
            path.display(),
            rows,
            columns,
            session.table_name()
        )),
        Ok(ShellOutcome::Schema(frame)) => Ok(format_schema(&frame, session.table_name(), use_colors)),
        Ok(ShellOutcome::Preview(frame)) => Ok(format_frame(&frame, use_colors)),
        Ok(ShellOutcome::Report(report)) => generator.generate_report(&report, &OutputFormat::Console),
        Err(e) => Err(e),
    };

    match rendered {
        Ok(text) => print!("{}", text),
        Err(e) => println!("{} {}", "error:".red().bold(), e),
    }
    false
}
