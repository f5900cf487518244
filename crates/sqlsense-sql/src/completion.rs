//! Completion context classification
//!
//! Decides what kind of candidate belongs at the cursor. Runs on every
//! keystroke, so the cheap keyword checks come first and the AST is only
//! consulted for buffers under the configured size.

use crate::ast::SqlStatement;
use crate::normalize::unquote;
use crate::parser::SqlParser;
use crate::references::{cte_pattern, split_qualified, IDENT};
use crate::segmenter::{statement_pieces, Segmenter};
use crate::text::{ends_in_literal_or_comment, find_word, is_ident_char, mask_text, Mask};
use regex::Regex;
use sqlsense_core::Config;
use std::sync::OnceLock;

/// What should be completed at the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
    /// Statement keywords
    Keyword,

    /// Table names, after `FROM`, `JOIN`, `INTO` and friends
    Table { last_keyword: String },

    /// Columns of every table in scope
    Column {
        last_keyword: Option<String>,
        in_cte: bool,
    },

    /// Columns of one alias, after `alias.`
    AliasColumn { alias: String },

    /// Objects in a schema, after `schema.`
    Schema { schema: String, partial: String },

    /// Stored procedures and functions
    Routine { last_keyword: String },

    /// Database names, after `USE`
    Database,

    /// Columns of the UPDATE target
    UpdateColumn { target_table: Option<String> },

    /// Columns of the INSERT target
    InsertColumn { target_table: Option<String> },
}

impl CompletionContext {
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionContext::Keyword => "keyword",
            CompletionContext::Table { .. } => "table",
            CompletionContext::Column { .. } => "column",
            CompletionContext::AliasColumn { .. } => "alias_column",
            CompletionContext::Schema { .. } => "schema",
            CompletionContext::Routine { .. } => "routine",
            CompletionContext::Database => "database",
            CompletionContext::UpdateColumn { .. } => "update_column",
            CompletionContext::InsertColumn { .. } => "insert_column",
        }
    }
}

/// Keywords whose next token is a table name
const TABLE_KEYWORDS: &[&str] = &["APPLY", "FROM", "INTO", "JOIN", "TABLE", "UPDATE"];

/// Words that can precede `JOIN` or `APPLY`
const JOIN_MODIFIERS: &[&str] = &["CROSS", "FULL", "INNER", "LEFT", "OUTER", "RIGHT"];

/// Keywords whose next token is a column or expression
const COLUMN_KEYWORDS: &[&str] = &[
    "AND", "DISTINCT", "ELSE", "HAVING", "ON", "OR", "SELECT", "THEN", "WHEN", "WHERE",
];

/// Keywords that open a clause, tracked to annotate column contexts
const CLAUSE_KEYWORDS: &[&str] = &[
    "AND", "APPLY", "ELSE", "FROM", "HAVING", "INTO", "JOIN", "ON", "OR", "SELECT", "SET",
    "THEN", "UPDATE", "USING", "VALUES", "WHEN", "WHERE",
];

/// Classifies the cursor position of a buffer
#[derive(Debug, Clone)]
pub struct Classifier {
    parser: SqlParser,
    segmenter: Segmenter,
    known_schemas: Vec<String>,
    max_ast_chars: usize,
}

impl Classifier {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            parser: SqlParser::from_config(config),
            segmenter: Segmenter::from_config(config),
            known_schemas: config.completion.known_schemas.clone(),
            max_ast_chars: config.completion.max_ast_chars,
        }
    }

    fn is_known_schema(&self, name: &str) -> bool {
        self.known_schemas
            .iter()
            .any(|schema| schema.eq_ignore_ascii_case(name))
    }

    /// Classify the cursor at the end of `before`
    ///
    /// `full` is the whole buffer; when `before` is a prefix of it and the
    /// buffer is small enough, the statement under the cursor is parsed.
    pub fn classify(&self, before: &str, full: Option<&str>) -> CompletionContext {
        if ends_in_literal_or_comment(before) {
            return CompletionContext::Keyword;
        }

        let masked = mask_text(before, Mask::Literals);
        let statement = match masked.rfind(';') {
            Some(i) => &masked[i + 1..],
            None => masked.as_str(),
        };
        let (prefix, partial) = split_partial(statement);

        if let Some(context) = self.dot_context(prefix, partial) {
            return context;
        }
        if let Some(last_keyword) = table_keyword(prefix) {
            return CompletionContext::Table { last_keyword };
        }
        if let Some(full) = full.filter(|full| full.len() < self.max_ast_chars) {
            if let Some(context) = self.ast_context(before, full, prefix) {
                return context;
            }
        }
        keyword_context(prefix)
    }

    /// `identifier.` right before the cursor
    fn dot_context(&self, prefix: &str, partial: &str) -> Option<CompletionContext> {
        let head = prefix.strip_suffix('.')?;
        let (qualifier, rest) = trailing_identifier(head)?;

        // `1.` is a number being typed
        let delimited = head.ends_with(']') || head.ends_with('"');
        if !delimited && qualifier.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        // `FROM x.` can only be a schema, whatever its name
        if self.is_known_schema(&qualifier) || table_keyword(rest).is_some() {
            Some(CompletionContext::Schema {
                schema: qualifier,
                partial: unquote(partial),
            })
        } else {
            Some(CompletionContext::AliasColumn { alias: qualifier })
        }
    }

    fn ast_context(&self, before: &str, full: &str, prefix: &str) -> Option<CompletionContext> {
        if !full.starts_with(before) {
            return None;
        }
        let statement = self.statement_at(full, before.len())?;
        let parsed = self.parser.parse(&statement)?;
        let clause = last_clause(prefix);

        match parsed.first_statement()? {
            SqlStatement::Update(update) => {
                if find_word(prefix, "WHERE", 0).is_some() {
                    Some(CompletionContext::Column {
                        last_keyword: clause,
                        in_cte: false,
                    })
                } else {
                    Some(CompletionContext::UpdateColumn {
                        target_table: update.table.as_ref().map(|table| table.name.clone()),
                    })
                }
            }
            SqlStatement::Insert(insert) => {
                let in_source = find_word(prefix, "SELECT", 0).is_some()
                    || find_word(prefix, "VALUES", 0).is_some();
                (!in_source).then(|| CompletionContext::InsertColumn {
                    target_table: Some(insert.table.name.clone()),
                })
            }
            SqlStatement::Select(_) => {
                // Right after a table name the user wants keywords, not columns
                if matches!(clause.as_deref(), Some("FROM" | "JOIN" | "APPLY")) {
                    return None;
                }
                Some(CompletionContext::Column {
                    last_keyword: clause,
                    in_cte: inside_cte_body(prefix),
                })
            }
            SqlStatement::Delete(_) | SqlStatement::Other => None,
        }
    }

    /// Text of the statement that contains byte `offset` of `full`
    fn statement_at(&self, full: &str, offset: usize) -> Option<String> {
        let batch = self
            .segmenter
            .split_batches(full)
            .into_iter()
            .find(|batch| batch.offset <= offset && offset <= batch.offset + batch.text.len())?;
        let relative = offset - batch.offset;
        statement_pieces(&batch.text)
            .into_iter()
            .find(|piece| piece.start <= relative && relative <= piece.end)
            .map(|piece| piece.text)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify with the default configuration
pub fn classify(before: &str, full: Option<&str>) -> CompletionContext {
    Classifier::new().classify(before, full)
}

/// Split off the identifier being typed at the end of `text`
fn split_partial(text: &str) -> (&str, &str) {
    let mut start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    // A half-typed delimited identifier keeps its opening quote
    if matches!(text[..start].chars().last(), Some('[' | '"')) {
        start -= 1;
    }
    (&text[..start], &text[start..])
}

/// The identifier ending `text`, unquoted, and what precedes it
fn trailing_identifier(text: &str) -> Option<(String, &str)> {
    let start = if let Some(inner) = text.strip_suffix(']') {
        inner.rfind('[')?
    } else if let Some(inner) = text.strip_suffix('"') {
        inner.rfind('"')?
    } else {
        text.char_indices()
            .rev()
            .take_while(|(_, c)| is_ident_char(*c))
            .last()?
            .0
    };
    Some((unquote(&text[start..]), &text[..start]))
}

/// Table-introducing keyword in the last one or two tokens
fn table_keyword(prefix: &str) -> Option<String> {
    let mut tokens = prefix
        .split_whitespace()
        .rev()
        .map(|token| token.trim_start_matches(|c: char| !is_ident_char(c)).to_ascii_uppercase());
    let last = tokens.next()?;
    if !TABLE_KEYWORDS.contains(&last.as_str()) {
        return None;
    }
    if matches!(last.as_str(), "JOIN" | "APPLY") {
        if let Some(modifier) = tokens.next().filter(|t| JOIN_MODIFIERS.contains(&t.as_str())) {
            return Some(format!("{} {}", modifier, last));
        }
    }
    Some(last)
}

/// The most recent clause keyword, with `ORDER BY`-style pairs joined
fn last_clause(text: &str) -> Option<String> {
    let mut last = None;
    let mut previous = String::new();
    for word in text.split(|c: char| !is_ident_char(c)).filter(|w| !w.is_empty()) {
        let upper = word.to_ascii_uppercase();
        if upper == "BY" && matches!(previous.as_str(), "ORDER" | "GROUP" | "PARTITION") {
            last = Some(format!("{} BY", previous));
        } else if CLAUSE_KEYWORDS.contains(&upper.as_str()) {
            last = Some(upper.clone());
        }
        previous = upper;
    }
    last
}

/// Whether the end of `text` is inside an unclosed CTE body
fn inside_cte_body(text: &str) -> bool {
    cte_pattern().find_iter(text).any(|body| {
        let mut depth = 1usize;
        for c in text[body.end()..].chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    })
}

fn update_pattern() -> &'static Regex {
    static UPDATE: OnceLock<Regex> = OnceLock::new();
    UPDATE.get_or_init(|| {
        let pattern = format!(
            r"(?i)\bUPDATE\s+(?P<table>{IDENT}(?:\s*\.\s*{IDENT})*)(?:\s+(?:AS\s+)?{IDENT})?\s+SET\b"
        );
        Regex::new(&pattern).expect("valid regex")
    })
}

fn insert_pattern() -> &'static Regex {
    static INSERT: OnceLock<Regex> = OnceLock::new();
    INSERT.get_or_init(|| {
        let pattern =
            format!(r"(?i)\bINSERT\s+(?:INTO\s+)?(?P<table>{IDENT}(?:\s*\.\s*{IDENT})*)\s*\([^()]*$");
        Regex::new(&pattern).expect("valid regex")
    })
}

fn target_name(caps: &regex::Captures<'_>) -> Option<String> {
    caps.name("table")
        .and_then(|table| split_qualified(table.as_str()).pop())
}

/// `UPDATE t SET |` or `UPDATE t SET a = 1, |` before any WHERE
fn update_context(text: &str, last_word: &str) -> Option<CompletionContext> {
    let caps = update_pattern().captures_iter(text).last()?;
    let set_end = caps.get(0)?.end();
    if find_word(text, "WHERE", set_end).is_some() {
        return None;
    }
    let assignments = &text[set_end..];
    let after_set = last_word.eq_ignore_ascii_case("SET") && assignments.trim().is_empty();
    let after_assignment = text.ends_with(',') && assignments.contains('=');
    (after_set || after_assignment).then(|| CompletionContext::UpdateColumn {
        target_table: target_name(&caps),
    })
}

/// Keyword-driven classification of the text before the cursor
fn keyword_context(prefix: &str) -> CompletionContext {
    let text = prefix.trim_end();
    let Some(last_char) = text.chars().last() else {
        return CompletionContext::Keyword;
    };
    let (_, last_word) = split_partial(text);
    let last_word = last_word.to_ascii_uppercase();

    if let Some(caps) = insert_pattern().captures(text) {
        return CompletionContext::InsertColumn {
            target_table: target_name(&caps),
        };
    }
    if let Some(context) = update_context(text, &last_word) {
        return context;
    }

    match last_word.as_str() {
        "USE" => return CompletionContext::Database,
        "EXEC" | "EXECUTE" | "CALL" => {
            return CompletionContext::Routine {
                last_keyword: last_word,
            }
        }
        _ => {}
    }

    let clause = last_clause(text);
    let in_cte = inside_cte_body(text);
    let column = |last_keyword: Option<String>| CompletionContext::Column {
        last_keyword,
        in_cte,
    };

    if COLUMN_KEYWORDS.contains(&last_word.as_str()) {
        return column(Some(last_word));
    }
    if last_word == "BY" && clause.as_deref().is_some_and(|c| c.ends_with(" BY")) {
        return column(clause);
    }

    match last_char {
        '(' | '=' | '<' | '>' | '!' | '+' | '-' | '/' | '%' => column(clause),
        ',' if clause.as_deref() == Some("FROM") => CompletionContext::Table {
            last_keyword: "FROM".to_string(),
        },
        ',' => column(clause),
        _ => CompletionContext::Keyword,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(last_keyword: &str) -> CompletionContext {
        CompletionContext::Column {
            last_keyword: Some(last_keyword.to_string()),
            in_cte: false,
        }
    }

    fn table(last_keyword: &str) -> CompletionContext {
        CompletionContext::Table {
            last_keyword: last_keyword.to_string(),
        }
    }

    #[test]
    fn select_and_from() {
        assert_eq!(classify("SELECT ", None), column("SELECT"));
        assert_eq!(classify("FROM ", None), table("FROM"));
        assert_eq!(classify("SELECT * FROM Us", None), table("FROM"));
    }

    #[test]
    fn table_keywords_with_modifiers() {
        assert_eq!(classify("SELECT * FROM Users u LEFT JOIN ", None), table("LEFT JOIN"));
        assert_eq!(classify("SELECT * FROM Users u CROSS APPLY ", None), table("CROSS APPLY"));
        assert_eq!(classify("INSERT INTO ", None), table("INTO"));
        assert_eq!(classify("UPDATE ", None), table("UPDATE"));
        assert_eq!(classify("TRUNCATE TABLE ", None), table("TABLE"));
        assert_eq!(classify("SELECT * FROM Users u, ", None), table("FROM"));
    }

    #[test]
    fn dot_contexts() {
        assert_eq!(
            classify("SELECT * FROM dbo.Users u WHERE u.", None),
            CompletionContext::AliasColumn {
                alias: "u".to_string()
            }
        );
        assert_eq!(
            classify("SELECT [o].Na", None),
            CompletionContext::AliasColumn {
                alias: "o".to_string()
            }
        );
        assert_eq!(
            classify("SELECT * FROM dbo.", None),
            CompletionContext::Schema {
                schema: "dbo".to_string(),
                partial: String::new(),
            }
        );
        assert_eq!(
            classify("SELECT * FROM sales.Ord", None),
            CompletionContext::Schema {
                schema: "sales".to_string(),
                partial: "Ord".to_string(),
            }
        );
        assert_eq!(
            classify("SELECT * FROM INFORMATION_SCHEMA.", None),
            CompletionContext::Schema {
                schema: "INFORMATION_SCHEMA".to_string(),
                partial: String::new(),
            }
        );
    }

    #[test]
    fn numbers_are_not_qualifiers() {
        assert_eq!(classify("SELECT 1.", None), CompletionContext::Keyword);
        assert_eq!(classify("SELECT Total * 1.5", None), CompletionContext::Keyword);
        assert_eq!(
            classify("SELECT [2024].", None),
            CompletionContext::AliasColumn {
                alias: "2024".to_string()
            }
        );
    }

    #[test]
    fn column_keywords_and_operators() {
        assert_eq!(classify("SELECT * FROM t WHERE a > ", None), column("WHERE"));
        assert_eq!(classify("SELECT * FROM t WHERE a = 1 AND ", None), column("AND"));
        assert_eq!(classify("SELECT * FROM t ORDER BY ", None), column("ORDER BY"));
        assert_eq!(classify("SELECT a, ", None), column("SELECT"));
        assert_eq!(classify("SELECT COUNT(", None), column("SELECT"));
        assert_eq!(classify("SELECT * FROM a JOIN b ON ", None), column("ON"));
    }

    #[test]
    fn statement_specific_targets() {
        assert_eq!(
            classify("UPDATE dbo.Users SET ", None),
            CompletionContext::UpdateColumn {
                target_table: Some("Users".to_string())
            }
        );
        assert_eq!(
            classify("UPDATE Users SET Name = 'x', ", None),
            CompletionContext::UpdateColumn {
                target_table: Some("Users".to_string())
            }
        );
        assert_eq!(
            classify("UPDATE Users SET Name = 'x' WHERE ", None),
            column("WHERE")
        );
        assert_eq!(
            classify("INSERT INTO [dbo].[Orders] (Id, ", None),
            CompletionContext::InsertColumn {
                target_table: Some("Orders".to_string())
            }
        );
    }

    #[test]
    fn routines_and_databases() {
        assert_eq!(classify("USE ", None), CompletionContext::Database);
        assert_eq!(
            classify("EXEC ", None),
            CompletionContext::Routine {
                last_keyword: "EXEC".to_string()
            }
        );
    }

    #[test]
    fn keyword_default() {
        assert_eq!(classify("", None), CompletionContext::Keyword);
        assert_eq!(classify("SELECT * FROM t ", None), CompletionContext::Keyword);
        assert_eq!(classify("SELECT * FROM t WHERE Name = 'FROM ", None), CompletionContext::Keyword);
        assert_eq!(classify("SELECT 1 -- FROM ", None), CompletionContext::Keyword);
        assert_eq!(classify("SEL", None), CompletionContext::Keyword);
    }

    #[test]
    fn only_the_current_statement_counts() {
        assert_eq!(classify("UPDATE t SET a = 1; SELECT ", None), column("SELECT"));
        assert_eq!(classify("SELECT * FROM a; SELECT b, ", None), column("SELECT"));
    }

    #[test]
    fn ast_marks_cte_bodies() {
        let full = "WITH c AS (SELECT Na FROM Users) SELECT * FROM c";
        let before = "WITH c AS (SELECT Na";
        assert_eq!(
            classify(before, Some(full)),
            CompletionContext::Column {
                last_keyword: Some("SELECT".to_string()),
                in_cte: true,
            }
        );

        let before = "WITH c AS (SELECT Name FROM Users) SELECT Na";
        let full = "WITH c AS (SELECT Name FROM Users) SELECT Na FROM c";
        assert_eq!(classify(before, Some(full)), column("SELECT"));
    }

    #[test]
    fn ast_targets_for_dml() {
        assert_eq!(
            classify(
                "INSERT INTO Orders (Id, Tot",
                Some("INSERT INTO Orders (Id, Tot) VALUES (1, 2)")
            ),
            CompletionContext::InsertColumn {
                target_table: Some("Orders".to_string())
            }
        );
        assert_eq!(
            classify(
                "SELECT 1;\nUPDATE Users SET Na",
                Some("SELECT 1;\nUPDATE Users SET Na = 1 WHERE Id = 2")
            ),
            CompletionContext::UpdateColumn {
                target_table: Some("Users".to_string())
            }
        );
    }

    #[test]
    fn large_buffers_skip_the_ast() {
        let mut config = Config::default();
        config.completion.max_ast_chars = 10;
        let classifier = Classifier::from_config(&config);
        let full = "WITH c AS (SELECT Na FROM Users) SELECT * FROM c";
        assert_eq!(
            classifier.classify("WITH c AS (SELECT Na", Some(full)),
            CompletionContext::Column {
                last_keyword: Some("SELECT".to_string()),
                in_cte: true,
            }
        );
        assert_eq!(
            classifier.classify("INSERT INTO Orders (Id) SELECT Id FROM t WHERE Id = 1 AND x", None),
            column("AND")
        );
    }

    #[test]
    fn partial_identifiers() {
        assert_eq!(split_partial("SELECT * FROM [Us"), ("SELECT * FROM ", "[Us"));
        assert_eq!(split_partial("SELECT u."), ("SELECT u.", ""));
        assert_eq!(
            trailing_identifier("SELECT [My Alias]"),
            Some(("My Alias".to_string(), "SELECT "))
        );
    }
}
