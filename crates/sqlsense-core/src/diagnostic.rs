//! Diagnostic codes and positioned findings
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// The buffer could not be parsed by any dialect/normalization attempt
    SyntaxError,

    /// A referenced table does not exist in the schema snapshot
    TableNotFound,

    /// A referenced column does not exist in any table in scope
    ColumnNotFound,

    /// An unqualified column exists in more than one table in scope
    AmbiguousColumn,

    /// A terminal result set uses SELECT *
    SelectStar,

    /// UPDATE statement with no WHERE clause
    UpdateWithoutWhere,

    /// DELETE statement with no WHERE clause
    DeleteWithoutWhere,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::ColumnNotFound => "COLUMN_NOT_FOUND",
            Self::AmbiguousColumn => "AMBIGUOUS_COLUMN",
            Self::SelectStar => "SELECT_STAR",
            Self::UpdateWithoutWhere => "UPDATE_WITHOUT_WHERE",
            Self::DeleteWithoutWhere => "DELETE_WITHOUT_WHERE",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
///
/// Exactly three tiers; editors map them onto error/warning/information markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational advisory
    Info,

    /// Warning - should be reviewed but the query is runnable
    Warning,

    /// Error - the query will fail against the database
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A 1-based line/column position in the analyzed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed, counted in characters)
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// The first character of the buffer
    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open range; `end` is the position just past the last character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A range covering `len` characters on a single line
    pub fn on_line(line: usize, column: usize, len: usize) -> Self {
        Self {
            start: Position::new(line, column),
            end: Position::new(line, column + len),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message (includes the "did you mean" suffix when present)
    pub message: String,

    /// Where in the original buffer the finding applies
    pub range: TextRange,

    /// Nearest schema name for unresolved identifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic anchored at the start of the buffer
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            range: TextRange::on_line(1, 1, 1),
            suggestion: None,
        }
    }

    /// Set the range
    pub fn with_range(mut self, range: TextRange) -> Self {
        self.range = range;
        self
    }

    /// Attach a "did you mean" suggestion and append it to the message
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        self.message = format!("{}. Did you mean '{}'?", self.message, suggestion);
        self.suggestion = Some(suggestion);
        self
    }

    pub fn start_line(&self) -> usize {
        self.range.start.line
    }

    pub fn start_column(&self) -> usize {
        self.range.start.column
    }

    pub fn end_line(&self) -> usize {
        self.range.end.line
    }

    pub fn end_column(&self) -> usize {
        self.range.end.column
    }
}
