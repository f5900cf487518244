//! Engine results to LSP types
//!
//! Engine positions are 1-based lines and character columns; LSP positions
//! are 0-based.

use sqlsense_core::{Diagnostic as SqlDiagnostic, SchemaSnapshot, Severity, TableInfo};
use sqlsense_sql::text::LineIndex;
use sqlsense_sql::{AliasBinding, CompletionContext, References, StatementSpan};
use tower_lsp::lsp_types::{
    CodeLens, Command, CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity,
    NumberOrString, Position, Range, Url,
};

/// Command the editor runs for a statement's "Run" lens
pub const RUN_STATEMENT_COMMAND: &str = "sqlsense.runStatement";

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "LEFT JOIN", "INNER JOIN", "CROSS APPLY", "ON", "AND",
    "OR", "NOT", "IN", "EXISTS", "BETWEEN", "LIKE", "IS NULL", "AS", "DISTINCT", "TOP",
    "GROUP BY", "HAVING", "ORDER BY", "UNION ALL", "CASE", "WHEN", "THEN", "ELSE", "END",
    "INSERT INTO", "VALUES", "UPDATE", "SET", "DELETE FROM", "WITH", "EXEC", "DECLARE", "USE",
];

pub fn to_lsp_position(line: usize, column: usize) -> Position {
    Position::new(
        line.saturating_sub(1) as u32,
        column.saturating_sub(1) as u32,
    )
}

/// Byte offset of an LSP position, clamped to the end of its line
pub fn offset_of(text: &str, position: Position) -> Option<usize> {
    LineIndex::new(text).offset(position.line as usize + 1, position.character as usize + 1)
}

pub fn to_lsp_diagnostic(diag: &SqlDiagnostic) -> Diagnostic {
    let severity = match diag.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
    };

    Diagnostic {
        range: Range::new(
            to_lsp_position(diag.start_line(), diag.start_column()),
            to_lsp_position(diag.end_line(), diag.end_column()),
        ),
        severity: Some(severity),
        code: Some(NumberOrString::String(diag.code.as_str().to_string())),
        source: Some("sqlsense".to_string()),
        message: diag.message.clone(),
        ..Default::default()
    }
}

/// "Run" lens over one statement
pub fn statement_lens(uri: &Url, span: &StatementSpan) -> CodeLens {
    CodeLens {
        range: Range::new(
            to_lsp_position(span.start_line, span.start_column),
            to_lsp_position(span.end_line, span.end_column),
        ),
        command: Some(Command {
            title: "Run".to_string(),
            command: RUN_STATEMENT_COMMAND.to_string(),
            arguments: Some(vec![
                serde_json::json!(uri.as_str()),
                serde_json::json!(span.text),
            ]),
        }),
        data: None,
    }
}

/// Candidates for a completion context
///
/// Without a snapshot only keywords and names found in the text itself
/// (CTEs, derived-table columns) are offered.
pub fn completion_items(
    context: &CompletionContext,
    references: &References,
    schema: Option<&SchemaSnapshot>,
) -> Vec<CompletionItem> {
    let mut items = Vec::new();

    match context {
        CompletionContext::Keyword => {
            items.extend(KEYWORDS.iter().map(|k| item(k, CompletionItemKind::KEYWORD, None)));
        }
        CompletionContext::Table { .. } => {
            let mut ctes: Vec<_> = references.ctes().values().collect();
            ctes.sort_by(|a, b| a.table.cmp(&b.table));
            for cte in ctes {
                items.push(item(&cte.table, CompletionItemKind::REFERENCE, Some("CTE")));
            }
            if let Some(schema) = schema {
                for name in schema.schema_names() {
                    items.push(item(name, CompletionItemKind::FOLDER, Some("schema")));
                }
                items.extend(schema.tables.iter().map(table_item));
            }
        }
        CompletionContext::Column { .. } => {
            let mut aliases: Vec<_> = references.alias_map().iter().collect();
            aliases.sort_by(|a, b| a.0.cmp(b.0));
            for (alias, binding) in aliases {
                let detail = format!("{} ({}.{})", alias, binding.schema, binding.table);
                for column in binding_columns(binding, schema) {
                    items.push(item(&column, CompletionItemKind::FIELD, Some(&detail)));
                }
            }
        }
        CompletionContext::AliasColumn { alias } => {
            let columns = match references.resolve(alias) {
                Some(binding) => binding_columns(binding, schema),
                None => table_columns(schema.and_then(|s| s.find_table(None, alias))),
            };
            items.extend(
                columns
                    .iter()
                    .map(|c| item(c, CompletionItemKind::FIELD, Some(alias))),
            );
        }
        CompletionContext::Schema { schema: name, partial } => {
            if let Some(schema) = schema {
                let partial = partial.to_lowercase();
                let matches = |candidate: &str| candidate.to_lowercase().starts_with(&partial);
                items.extend(
                    schema
                        .tables_in_schema(name)
                        .filter(|t| matches(&t.table_name))
                        .map(table_item),
                );
                items.extend(
                    schema
                        .routines
                        .iter()
                        .filter(|r| r.schema_name.eq_ignore_ascii_case(name))
                        .filter(|r| matches(&r.routine_name))
                        .map(|r| {
                            item(&r.routine_name, CompletionItemKind::FUNCTION, Some(&r.routine_type))
                        }),
                );
            }
        }
        CompletionContext::Routine { .. } => {
            if let Some(schema) = schema {
                items.extend(schema.routines.iter().map(|r| {
                    let detail = format!("{}.{} ({})", r.schema_name, r.routine_name, r.routine_type);
                    item(&r.routine_name, CompletionItemKind::FUNCTION, Some(&detail))
                }));
            }
        }
        CompletionContext::Database => {
            if let Some(schema) = schema {
                items.push(item(&schema.database_name, CompletionItemKind::MODULE, Some("database")));
            }
        }
        CompletionContext::UpdateColumn { target_table }
        | CompletionContext::InsertColumn { target_table } => {
            if let Some(target) = target_table {
                let columns = match references.resolve(target) {
                    Some(binding) => binding_columns(binding, schema),
                    None => table_columns(schema.and_then(|s| s.find_table(None, target))),
                };
                items.extend(
                    columns
                        .iter()
                        .map(|c| item(c, CompletionItemKind::FIELD, Some(target))),
                );
            }
        }
    }

    dedupe(items)
}

fn item(label: &str, kind: CompletionItemKind, detail: Option<&str>) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        detail: detail.map(str::to_string),
        ..Default::default()
    }
}

fn table_item(table: &TableInfo) -> CompletionItem {
    let kind = if table.table_type.eq_ignore_ascii_case("VIEW") {
        CompletionItemKind::INTERFACE
    } else {
        CompletionItemKind::STRUCT
    };
    item(&table.table_name, kind, Some(&table.qualified_name()))
}

fn table_columns(table: Option<&TableInfo>) -> Vec<String> {
    table
        .map(|t| t.column_names().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Columns behind a binding: the snapshot for tables, the recorded list for
/// CTEs and derived tables, the source table for `SELECT *` CTEs
fn binding_columns(binding: &AliasBinding, schema: Option<&SchemaSnapshot>) -> Vec<String> {
    if binding.is_physical() {
        return table_columns(schema.and_then(|s| s.find_table(Some(&binding.schema), &binding.table)));
    }
    if !binding.columns.is_empty() {
        return binding.columns.clone();
    }
    match &binding.source_table {
        Some(source) => {
            table_columns(schema.and_then(|s| s.find_table(source.schema.as_deref(), &source.name)))
        }
        None => Vec::new(),
    }
}

/// First item per label wins
fn dedupe(items: Vec<CompletionItem>) -> Vec<CompletionItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.label.to_lowercase()))
        .collect()
}
