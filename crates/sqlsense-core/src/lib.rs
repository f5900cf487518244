//! sqlsense Core
//!
//! Core domain model with stable, versioned types shared by the engine,
//! the CLI and the language server.
//! Never rename diagnostic codes - they are part of the public API.

pub mod config;
pub mod diagnostic;
pub mod report;
pub mod schema;

pub use config::{
    CompletionConfig, Config, ConfigError, DialectConfig, LspConfig, SeverityThreshold,
    ValidationConfig,
};
pub use diagnostic::{Diagnostic, DiagnosticCode, Position, Severity, TextRange};
pub use report::{Report, ReportSummary, ReportVersion};
pub use schema::{
    ColumnInfo, RoutineInfo, RoutineParameter, SchemaError, SchemaSnapshot, TableInfo,
};
