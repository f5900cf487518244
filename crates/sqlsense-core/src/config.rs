//! Configuration schema (sqlsense.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use crate::diagnostic::{DiagnosticCode, Severity};

/// SQL dialect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// SQL Server (T-SQL)
    MsSql,

    /// MySQL
    MySql,

    /// PostgreSQL
    Postgres,

    /// Generic ANSI SQL
    Generic,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::MsSql
    }
}

fn default_fallback_dialect() -> DialectConfig {
    DialectConfig::MySql
}

fn default_batch_separator() -> String {
    "GO".to_string()
}

/// Severity overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Completion classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// AST-based classification is only attempted on buffers shorter than this
    #[serde(default = "CompletionConfig::default_max_ast_chars")]
    pub max_ast_chars: usize,

    /// Identifiers treated as schema names when followed by a dot
    #[serde(default = "CompletionConfig::default_known_schemas")]
    pub known_schemas: Vec<String>,
}

impl CompletionConfig {
    fn default_max_ast_chars() -> usize {
        10_000
    }

    fn default_known_schemas() -> Vec<String> {
        vec![
            "dbo".to_string(),
            "sys".to_string(),
            "information_schema".to_string(),
        ]
    }

    /// Check whether an identifier names a known schema (case-insensitive)
    pub fn is_known_schema(&self, name: &str) -> bool {
        self.known_schemas
            .iter()
            .any(|schema| schema.eq_ignore_ascii_case(name))
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_ast_chars: Self::default_max_ast_chars(),
            known_schemas: Self::default_known_schemas(),
        }
    }
}

/// Semantic validation toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Emit the SELECT_STAR advisory on terminal result sets
    #[serde(default = "enabled")]
    pub select_star: bool,

    /// Emit UPDATE_WITHOUT_WHERE / DELETE_WITHOUT_WHERE warnings
    #[serde(default = "enabled")]
    pub missing_where: bool,

    /// Largest edit distance for "did you mean" suggestions
    #[serde(default = "ValidationConfig::default_max_suggestion_distance")]
    pub max_suggestion_distance: usize,
}

fn enabled() -> bool {
    true
}

impl ValidationConfig {
    fn default_max_suggestion_distance() -> usize {
        2
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            select_star: true,
            missing_where: true,
            max_suggestion_distance: Self::default_max_suggestion_distance(),
        }
    }
}

/// Language server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LspConfig {
    /// Delay between the last keystroke and full-document validation
    #[serde(default = "LspConfig::default_debounce_ms")]
    pub debounce_ms: u64,

    /// Schema snapshot JSON, relative to the workspace root
    #[serde(default)]
    pub schema_snapshot: Option<PathBuf>,
}

impl LspConfig {
    fn default_debounce_ms() -> u64 {
        500
    }
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            schema_snapshot: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Standalone line that separates batches
    #[serde(default = "default_batch_separator")]
    pub batch_separator: String,

    /// Dialect tried first by the parse ladder
    #[serde(default)]
    pub primary_dialect: DialectConfig,

    /// More permissive dialect tried second
    #[serde(default = "default_fallback_dialect")]
    pub fallback_dialect: DialectConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    /// Severity overrides
    #[serde(default)]
    pub severity: SeverityThreshold,

    #[serde(default)]
    pub lsp: LspConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_separator: default_batch_separator(),
            primary_dialect: DialectConfig::default(),
            fallback_dialect: default_fallback_dialect(),
            completion: CompletionConfig::default(),
            validation: ValidationConfig::default(),
            severity: SeverityThreshold::default(),
            lsp: LspConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Resolve the configured schema snapshot path against the project root
    pub fn schema_snapshot_path(&self) -> Option<PathBuf> {
        self.lsp
            .schema_snapshot
            .as_ref()
            .map(|path| self.project_root.join(path))
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
