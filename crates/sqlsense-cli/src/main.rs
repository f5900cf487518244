use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sqlsense_core::{Config, Diagnostic, Report, SchemaSnapshot, Severity};
use sqlsense_sql::text::LineIndex;
use sqlsense_sql::{Classifier, Locator, References, SqlParser, StatementSpan, Validator};

/// sqlsense - SQL text intelligence from the command line
#[derive(Parser)]
#[command(name = "sqlsense")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlsense.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a SQL file, against a schema snapshot when one is available
    Validate {
        /// SQL file to validate
        file: PathBuf,

        /// Schema snapshot JSON (default: lsp.schema_snapshot from the config)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the statement under a cursor
    Locate {
        file: PathBuf,

        /// 1-based cursor line
        #[arg(short, long)]
        line: usize,

        /// 1-based cursor column
        #[arg(long, default_value_t = 1)]
        column: usize,
    },

    /// Classify what would be completed at a cursor
    Complete {
        file: PathBuf,

        /// 1-based cursor line
        #[arg(short, long)]
        line: usize,

        /// 1-based cursor column
        #[arg(long, default_value_t = 1)]
        column: usize,
    },

    /// List every statement in a file
    Statements { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Validate {
            file,
            schema,
            json,
            output,
        } => validate_command(
            &config,
            &file,
            schema.as_deref(),
            json,
            output.as_deref(),
            cli.verbose,
        ),
        Commands::Locate { file, line, column } => locate_command(&config, &file, line, column),
        Commands::Complete { file, line, column } => {
            complete_command(&config, &file, line, column)
        }
        Commands::Statements { file } => statements_command(&config, &file),
    }
}

/// Engine logs go to stderr; `RUST_LOG` wins over the verbosity flag
fn init_tracing(verbose: bool) {
    let default = if verbose { "sqlsense=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        debug!(path = %path.display(), "loading config");
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let default_path = Path::new("sqlsense.toml");
    if default_path.exists() {
        return Config::from_file(default_path).context("Failed to load sqlsense.toml");
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

fn read_source(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Snapshot from the flag, else from the config, else none
fn load_schema(
    config: &Config,
    path: Option<&Path>,
    verbose: bool,
) -> Result<Option<SchemaSnapshot>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match config.schema_snapshot_path() {
            Some(path) if path.exists() => path,
            _ => {
                if verbose {
                    eprintln!("{}", "No schema snapshot, checking syntax only".yellow());
                }
                return Ok(None);
            }
        },
    };

    if verbose {
        eprintln!("{} {}", "Loading schema snapshot from:".cyan(), path.display());
    }
    let snapshot = SchemaSnapshot::from_json_file(&path)
        .with_context(|| format!("Failed to load schema snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Validate command - syntax and schema checks for one file
fn validate_command(
    config: &Config,
    file: &Path,
    schema: Option<&Path>,
    json: bool,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let text = read_source(file)?;
    let snapshot = load_schema(config, schema, verbose)?;

    if verbose {
        eprintln!("{} {}", "Validating".cyan(), file.display());
    }

    let diagnostics = Validator::from_config(config).validate(&text, snapshot.as_ref());
    let report = Report::from_diagnostics(diagnostics).with_source(file.display().to_string());
    info!(
        file = %file.display(),
        schema = snapshot.is_some(),
        errors = report.summary.errors,
        warnings = report.summary.warnings,
        "validated"
    );

    if let Some(output) = output {
        report
            .save_to_file(output)
            .with_context(|| format!("Failed to write report to {}", output.display()))?;
        if verbose {
            eprintln!("{} {}", "Report saved to:".green(), output.display());
        }
    }

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report, file, &text);
    }

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Locate command - the statement an editor would execute
fn locate_command(config: &Config, file: &Path, line: usize, column: usize) -> Result<()> {
    let text = read_source(file)?;
    debug!(file = %file.display(), line, column, "locating statement");

    match Locator::from_config(config).locate(&text, line, column) {
        Some(span) => {
            println!("{}", span_header(&span).bold());
            println!("{}", span.text);
        }
        None => {
            println!("{}", "no statement at cursor".yellow());
            println!("{}", text.trim());
        }
    }

    Ok(())
}

/// Complete command - completion context and aliases in scope
fn complete_command(config: &Config, file: &Path, line: usize, column: usize) -> Result<()> {
    let text = read_source(file)?;
    let before = text_before_cursor(&text, line, column)
        .with_context(|| format!("{}:{} is outside {}", line, column, file.display()))?;

    let context = Classifier::from_config(config).classify(before, Some(&text));
    debug!(file = %file.display(), line, column, context = context.kind(), "classified cursor");
    println!("{} {}", "Context:".bold(), context.kind().green());
    println!("  {:?}", context);

    let statement = Locator::from_config(config)
        .locate(&text, line, column)
        .map(|span| span.text)
        .unwrap_or_else(|| text.clone());
    let references = References::extract_with(&SqlParser::from_config(config), &statement);

    let mut aliases: Vec<_> = references.alias_map().iter().collect();
    aliases.sort_by(|a, b| a.0.cmp(b.0));

    println!();
    println!("{}", "Aliases:".bold());
    if aliases.is_empty() {
        println!("  (none)");
    }
    for (alias, binding) in aliases {
        print!("  {} -> {}.{}", alias.cyan(), binding.schema, binding.table);
        if !binding.columns.is_empty() {
            print!(" ({})", binding.columns.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Statements command - every statement span in the file
fn statements_command(config: &Config, file: &Path) -> Result<()> {
    let text = read_source(file)?;
    let spans = Locator::from_config(config).statement_spans(&text);
    debug!(file = %file.display(), statements = spans.len(), "split statements");

    if spans.is_empty() {
        println!("{}", "No statements found".yellow());
        return Ok(());
    }

    for (i, span) in spans.iter().enumerate() {
        println!(
            "{:>4}  {}  {}",
            i + 1,
            span_header(span).cyan(),
            first_line(&span.text)
        );
    }

    Ok(())
}

/// Text before a 1-based cursor
fn text_before_cursor(text: &str, line: usize, column: usize) -> Option<&str> {
    let offset = LineIndex::new(text).offset(line, column)?;
    Some(&text[..offset])
}

fn span_header(span: &StatementSpan) -> String {
    format!(
        "{}:{}-{}:{}",
        span.start_line, span.start_column, span.end_line, span.end_column
    )
}

fn first_line(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();
    if lines.next().is_some() {
        format!("{} ...", first)
    } else {
        first.to_string()
    }
}

/// Print diagnostics with the offending source line
fn print_report(report: &Report, file: &Path, text: &str) {
    let index = LineIndex::new(text);

    for diag in &report.diagnostics {
        println!("{}", format_diagnostic(diag, file));

        if let Some(source) = index.line_text(diag.start_line()) {
            let width = if diag.end_line() == diag.start_line() {
                diag.end_column().saturating_sub(diag.start_column()).max(1)
            } else {
                1
            };
            println!("    {}", source);
            println!(
                "    {}{}",
                " ".repeat(diag.start_column().saturating_sub(1)),
                "^".repeat(width).bright_red()
            );
        }
    }

    if !report.diagnostics.is_empty() {
        println!();
    }

    let summary = &report.summary;
    let errors = format!("{} errors", summary.errors);
    let warnings = format!("{} warnings", summary.warnings);
    println!(
        "{}, {}, {} info",
        if summary.errors > 0 { errors.red().bold() } else { errors.green() },
        if summary.warnings > 0 { warnings.yellow() } else { warnings.green() },
        summary.info
    );

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    }
}

fn format_diagnostic(diag: &Diagnostic, file: &Path) -> String {
    let severity = match diag.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Info => "info".cyan(),
    };
    format!(
        "{}:{}:{} {} {} {}",
        file.display(),
        diag.start_line(),
        diag.start_column(),
        severity,
        diag.code.as_str().bold(),
        diag.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn cursor_prefix() {
        let text = "SELECT 1;\nSELECT Id FROM ";
        assert_eq!(text_before_cursor(text, 2, 8), Some("SELECT 1;\nSELECT "));
        assert_eq!(text_before_cursor(text, 2, 99), Some(text));
        assert_eq!(text_before_cursor(text, 3, 1), None);
    }

    #[test]
    fn statement_summaries() {
        let spans = sqlsense_sql::statement_spans("SELECT 1;\nSELECT Id\nFROM Users");
        let lines: Vec<String> = spans
            .iter()
            .map(|span| format!("{} {}", span_header(span), first_line(&span.text)))
            .collect();
        assert_eq!(
            lines,
            vec![
                "1:1-1:9 SELECT 1".to_string(),
                "2:1-3:11 SELECT Id ...".to_string(),
            ]
        );
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn commands_log_what_they_did() {
        let path = std::env::temp_dir().join(format!("sqlsense-cli-{}.sql", std::process::id()));
        std::fs::write(&path, "SELECT 1;\nSELECT 2;").unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            statements_command(&Config::default(), &path).unwrap();
        });

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("split statements"));
        assert!(logged.contains("statements=2"));
    }

    #[test]
    fn diagnostic_line_names_the_code() {
        colored::control::set_override(false);
        let diag = sqlsense_sql::validate("SELECT * FROM", None).remove(0);
        let line = format_diagnostic(&diag, Path::new("query.sql"));
        assert!(line.starts_with("query.sql:1:"));
        assert!(line.contains("error SYNTAX_ERROR"));
    }
}
