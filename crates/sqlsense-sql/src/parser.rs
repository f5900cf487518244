//! AST resolution with a fallback ladder
//!
//! Text typed into an editor is usually incomplete. The parser tries an
//! ordered list of (normalization, dialect) strategies and the first one that
//! parses wins. Callers that only want structure use [`SqlParser::parse`],
//! which never fails loudly; validation uses [`SqlParser::parse_strict`] to get
//! the parser's own error back.

use crate::ast::SqlStatement;
use crate::normalize::{normalize_identifiers, normalize_qualified_names};
use crate::text::{is_ident_char, mask_text, LineIndex, Mask};
use regex::Regex;
use sqlparser::dialect::{Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::{Parser, ParserError};
use sqlsense_core::{Config, DialectConfig, Diagnostic, DiagnosticCode, Severity, TextRange};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Table name appended by the CTE completion rung; never reported to callers
pub const PLACEHOLDER_TABLE: &str = "__sqlsense_placeholder__";

/// Trailing keywords that leave a clause open
const INCOMPLETE_TAIL_KEYWORDS: &[&str] = &[
    "AND", "AS", "BY", "DELETE", "FROM", "HAVING", "IN", "INSERT", "INTO", "JOIN", "NOT", "ON",
    "OR", "SELECT", "SET", "UPDATE", "VALUES", "WHERE",
];

/// Whether a table name is the synthetic placeholder
pub fn is_placeholder(name: &str) -> bool {
    name.eq_ignore_ascii_case(PLACEHOLDER_TABLE)
}

/// How the text is rewritten before parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Every bracketed identifier rewritten
    Identifiers,
    /// Only `[schema].[table]` pairs rewritten
    QualifiedNames,
    /// Identifiers rewritten and a placeholder table appended
    Placeholder,
    /// Text as typed
    Verbatim,
}

/// Which configured dialect a strategy uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectRole {
    Primary,
    Fallback,
}

/// One rung of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseStrategy {
    pub normalization: Normalization,
    pub dialect: DialectRole,
}

impl ParseStrategy {
    const fn new(normalization: Normalization, dialect: DialectRole) -> Self {
        Self {
            normalization,
            dialect,
        }
    }
}

impl std::fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.normalization, self.dialect)
    }
}

/// Strategies in priority order
pub const LADDER: &[ParseStrategy] = &[
    ParseStrategy::new(Normalization::Identifiers, DialectRole::Primary),
    ParseStrategy::new(Normalization::Identifiers, DialectRole::Fallback),
    ParseStrategy::new(Normalization::QualifiedNames, DialectRole::Primary),
    ParseStrategy::new(Normalization::QualifiedNames, DialectRole::Fallback),
    ParseStrategy::new(Normalization::Placeholder, DialectRole::Primary),
    ParseStrategy::new(Normalization::Placeholder, DialectRole::Fallback),
    ParseStrategy::new(Normalization::Verbatim, DialectRole::Primary),
];

fn dialect_for(config: DialectConfig) -> Box<dyn Dialect> {
    match config {
        DialectConfig::MsSql => Box::new(MsSqlDialect {}),
        DialectConfig::MySql => Box::new(MySqlDialect {}),
        DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
        DialectConfig::Generic => Box::new(GenericDialect {}),
    }
}

/// Delimited identifier quote understood by a dialect
fn quote_for(config: DialectConfig) -> char {
    match config {
        DialectConfig::MySql => '`',
        DialectConfig::MsSql | DialectConfig::Postgres | DialectConfig::Generic => '"',
    }
}

fn cte_pattern() -> &'static Regex {
    static CTE: OnceLock<Regex> = OnceLock::new();
    CTE.get_or_init(|| {
        Regex::new(r#"(?i)\bWITH\s+(?:\[[^\]]*\]|"[^"]*"|[^\s(]+)\s*(?:\([^)]*\))?\s*AS\s*\("#)
            .expect("valid regex")
    })
}

/// Whether the text introduces a CTE
pub fn has_cte(text: &str) -> bool {
    cte_pattern().is_match(&mask_text(text, Mask::Literals))
}

/// The token that leaves the text syntactically open, if any
pub fn incomplete_tail(text: &str) -> Option<String> {
    let masked = mask_text(text, Mask::Comments);
    let trimmed = masked.trim_end();
    let last = trimmed.chars().last()?;
    if matches!(last, '=' | ',' | '(' | '.' | '<' | '>') {
        return Some(last.to_string());
    }
    // A closing quote or bracket ends a complete token
    if matches!(last, '\'' | '"' | ']') {
        return None;
    }
    let word: String = trimmed
        .chars()
        .rev()
        .take_while(|c| is_ident_char(*c))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let upper = word.to_ascii_uppercase();
    INCOMPLETE_TAIL_KEYWORDS
        .contains(&upper.as_str())
        .then_some(upper)
}

/// Parser with a primary and a fallback dialect
#[derive(Debug, Clone)]
pub struct SqlParser {
    primary: DialectConfig,
    fallback: DialectConfig,
}

impl SqlParser {
    /// SQL Server first, MySQL as the permissive fallback
    pub fn new() -> Self {
        Self::from_dialects(DialectConfig::MsSql, DialectConfig::MySql)
    }

    pub fn from_dialects(primary: DialectConfig, fallback: DialectConfig) -> Self {
        Self { primary, fallback }
    }

    /// Create a parser from a config
    pub fn from_config(config: &Config) -> Self {
        Self::from_dialects(config.primary_dialect, config.fallback_dialect)
    }

    fn dialect(&self, role: DialectRole) -> DialectConfig {
        match role {
            DialectRole::Primary => self.primary,
            DialectRole::Fallback => self.fallback,
        }
    }

    /// Rewrite the text for a strategy; `None` when the rung does not apply
    fn prepare(&self, strategy: ParseStrategy, text: &str) -> Option<String> {
        let quote = quote_for(self.dialect(strategy.dialect));
        match strategy.normalization {
            Normalization::Identifiers => Some(normalize_identifiers(text, quote)),
            Normalization::QualifiedNames => Some(normalize_qualified_names(text, quote)),
            Normalization::Placeholder => {
                if has_cte(text) && incomplete_tail(text).is_some() {
                    let normalized = normalize_identifiers(text, quote);
                    // On its own line so a trailing line comment cannot swallow it
                    Some(format!("{}\n{}", normalized.trim_end(), PLACEHOLDER_TABLE))
                } else {
                    None
                }
            }
            Normalization::Verbatim => Some(text.to_string()),
        }
    }

    /// Run strategies in order; first success wins
    fn run_ladder<'s>(
        &self,
        text: &str,
        strategies: impl IntoIterator<Item = &'s ParseStrategy>,
    ) -> Option<ParsedSql> {
        let mut attempted: Vec<(DialectConfig, String)> = Vec::new();

        for strategy in strategies {
            let Some(prepared) = self.prepare(*strategy, text) else {
                continue;
            };
            let dialect = self.dialect(strategy.dialect);
            if attempted.iter().any(|(d, t)| *d == dialect && *t == prepared) {
                continue;
            }

            match Parser::parse_sql(&*dialect_for(dialect), &prepared) {
                Ok(statements) => {
                    debug!(strategy = %strategy, statements = statements.len(), "parse succeeded");
                    return Some(ParsedSql {
                        statements: statements.iter().map(SqlStatement::lower).collect(),
                        strategy: *strategy,
                    });
                }
                Err(e) => {
                    trace!(strategy = %strategy, error = %e, "parse attempt failed");
                    attempted.push((dialect, prepared));
                }
            }
        }

        None
    }

    /// Parse for structure; `None` means "fall back to text heuristics"
    ///
    /// Text ending in an open clause is rejected without parsing unless it
    /// introduces a CTE, in which case the placeholder rung can still recover
    /// the CTE bindings.
    pub fn parse(&self, text: &str) -> Option<ParsedSql> {
        if text.trim().is_empty() {
            return None;
        }
        if let Some(tail) = incomplete_tail(text) {
            if !has_cte(text) {
                trace!(tail = %tail, "skipping parse of incomplete text");
                return None;
            }
        }
        self.run_ladder(text, LADDER)
    }

    /// Parse for validation; no placeholder is ever injected
    ///
    /// On failure the error comes from the primary dialect on the text as
    /// typed, so its location refers to the caller's buffer.
    pub fn parse_strict(&self, text: &str) -> Result<ParsedSql, ParseError> {
        let strategies = LADDER
            .iter()
            .filter(|strategy| strategy.normalization != Normalization::Placeholder);
        if let Some(parsed) = self.run_ladder(text, strategies) {
            return Ok(parsed);
        }

        let verbatim = ParseStrategy::new(Normalization::Verbatim, DialectRole::Primary);
        match Parser::parse_sql(&*dialect_for(self.primary), text) {
            Ok(statements) => Ok(ParsedSql {
                statements: statements.iter().map(SqlStatement::lower).collect(),
                strategy: verbatim,
            }),
            Err(error) => Err(ParseError {
                sql: text.to_string(),
                error,
                strategy: verbatim,
            }),
        }
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL, lowered to the statement IR
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSql {
    pub statements: Vec<SqlStatement>,

    /// Ladder rung that produced the AST
    pub strategy: ParseStrategy,
}

impl ParsedSql {
    pub fn first_statement(&self) -> Option<&SqlStatement> {
        self.statements.first()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Whether the synthetic placeholder table was injected
    pub fn has_placeholder(&self) -> bool {
        self.strategy.normalization == Normalization::Placeholder
    }
}

/// SQL parsing error with the text and strategy that produced it
#[derive(Debug, thiserror::Error)]
#[error("SQL parse error ({strategy}): {error}")]
pub struct ParseError {
    pub sql: String,

    #[source]
    pub error: ParserError,

    pub strategy: ParseStrategy,
}

fn location_pattern() -> &'static Regex {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    LOCATION.get_or_init(|| {
        Regex::new(r"\s*at Line: (\d+), Column: (\d+)").expect("valid regex")
    })
}

impl ParseError {
    /// 1-based line and column reported by the parser, if any
    pub fn location(&self) -> Option<(usize, usize)> {
        let message = self.error.to_string();
        let caps = location_pattern().captures(&message)?;
        let line = caps.get(1)?.as_str().parse().ok()?;
        let column = caps.get(2)?.as_str().parse().ok()?;
        (line > 0 && column > 0).then_some((line, column))
    }

    /// Parser message without the location suffix or error-kind prefix
    pub fn detail(&self) -> String {
        let message = match &self.error {
            ParserError::ParserError(msg) | ParserError::TokenizerError(msg) => msg.clone(),
            other => other.to_string(),
        };
        location_pattern().replace(&message, "").trim().to_string()
    }

    /// Convert to a SYNTAX_ERROR diagnostic
    ///
    /// `start_line` is the buffer line where the parsed text begins.
    pub fn to_diagnostic(&self, start_line: usize) -> Diagnostic {
        let (line, column) = self.location().unwrap_or((1, 1));

        // Underline the offending word when the location lands on one
        let width = LineIndex::new(&self.sql)
            .offset(line, column)
            .map(|offset| {
                self.sql[offset..]
                    .chars()
                    .take_while(|c| is_ident_char(*c))
                    .count()
            })
            .unwrap_or(0)
            .max(1);

        Diagnostic::new(
            DiagnosticCode::SyntaxError,
            Severity::Error,
            format!("Syntax error: {}", self.detail()),
        )
        .with_range(TextRange::on_line(start_line + line - 1, column, width))
    }
}
