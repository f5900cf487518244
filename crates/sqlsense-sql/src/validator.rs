//! Semantic validation against a schema snapshot
//!
//! Each batch is parsed strictly. A batch that does not parse yields a single
//! SYNTAX_ERROR and nothing else; a batch that parses is checked statement by
//! statement when a snapshot is available. Positions always come from the text
//! the user typed, never from the normalized text handed to the parser.

use crate::ast::{
    Expression, Projection, QueryBlock, Relation, SelectBlock, SqlStatement, TableName,
    TableSource,
};
use crate::parser::{is_placeholder, SqlParser};
use crate::segmenter::{statement_pieces, Batch, Segmenter};
use crate::suggest::nearest;
use crate::text::{find_word, is_ident_char, locate_identifier_from, mask_text, LineIndex, Mask};
use crate::visitor::ColumnCollector;
use sqlsense_core::{
    Config, Diagnostic, DiagnosticCode, SchemaSnapshot, Severity, SeverityThreshold, TableInfo,
    TextRange, ValidationConfig,
};
use std::collections::HashMap;
use tracing::debug;

/// Schemas whose objects are never in a snapshot
const SYSTEM_SCHEMAS: &[&str] = &["sys", "information_schema"];

/// Words that put a table name right after them
const TABLE_KEYWORDS: &[&str] = &["FROM", "JOIN", "APPLY", "INTO", "UPDATE", "TABLE"];

/// Validates buffers against an optional schema snapshot
#[derive(Debug, Clone)]
pub struct Validator {
    parser: SqlParser,
    segmenter: Segmenter,
    validation: ValidationConfig,
    severity: SeverityThreshold,
}

impl Validator {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            parser: SqlParser::from_config(config),
            segmenter: Segmenter::from_config(config),
            validation: config.validation.clone(),
            severity: config.severity.clone(),
        }
    }

    /// Validate a whole buffer
    ///
    /// Without a snapshot only syntax is checked. Diagnostics are ordered by
    /// position.
    pub fn validate(&self, text: &str, schema: Option<&SchemaSnapshot>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for batch in self.segmenter.split_batches(text) {
            let parsed = match self.parser.parse_strict(&batch.text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    debug!(line = batch.start_line, error = %err, "batch failed to parse");
                    let diagnostic = err.to_diagnostic(batch.start_line);
                    diagnostics.push(self.apply_severity(diagnostic));
                    continue;
                }
            };
            let Some(schema) = schema else {
                continue;
            };

            let pieces = statement_pieces(&batch.text);
            // When the split disagrees with the parser, attribute everything
            // to the whole batch
            let aligned = pieces.len() == parsed.statements.len();
            let index = LineIndex::new(&batch.text);

            for (i, statement) in parsed.statements.iter().enumerate() {
                let span = if aligned {
                    StatementText {
                        text: &pieces[i].text,
                        start: pieces[i].start,
                    }
                } else {
                    StatementText {
                        text: &batch.text,
                        start: 0,
                    }
                };

                let mut checker = Checker::new(schema, &self.validation);
                checker.check_statement(statement, span.text);
                // Repeated findings for one anchor land on successive matches
                let mut cursors = HashMap::new();
                for finding in checker.findings {
                    let range = span.range_of(&finding.anchor, &mut cursors, &index, &batch);
                    let mut diagnostic =
                        Diagnostic::new(finding.code, finding.severity, finding.message)
                            .with_range(range);
                    if let Some(suggestion) = finding.suggestion {
                        diagnostic = diagnostic.with_suggestion(suggestion);
                    }
                    diagnostics.push(self.apply_severity(diagnostic));
                }
            }
        }

        diagnostics.sort_by_key(|d| (d.start_line(), d.start_column()));
        diagnostics
    }

    fn apply_severity(&self, mut diagnostic: Diagnostic) -> Diagnostic {
        diagnostic.severity = self.severity.get_severity(diagnostic.code, diagnostic.severity);
        diagnostic
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate with the default configuration
pub fn validate(text: &str, schema: Option<&SchemaSnapshot>) -> Vec<Diagnostic> {
    Validator::new().validate(text, schema)
}

/// The literal text of one statement and its byte offset in the batch
struct StatementText<'t> {
    text: &'t str,
    start: usize,
}

impl StatementText<'_> {
    fn range_of(
        &self,
        anchor: &Anchor,
        cursors: &mut HashMap<Anchor, usize>,
        index: &LineIndex<'_>,
        batch: &Batch,
    ) -> TextRange {
        let from = cursors.get(anchor).copied().unwrap_or(0);
        let found = anchor
            .find(self.text, from)
            .or_else(|| anchor.find(self.text, 0));
        if let Some((offset, len)) = found {
            cursors.insert(anchor.clone(), offset + len);
        }
        let (offset, len) = found.unwrap_or_else(|| {
            // Statement start, underlining its first word
            let first = self.text.split_whitespace().next().map_or(1, str::len);
            (0, first)
        });
        let width = self
            .text
            .get(offset..offset + len)
            .map_or(1, |matched| matched.chars().count())
            .max(1);
        let position = index.position(self.start + offset);
        TextRange::on_line(batch.start_line + position.line - 1, position.column, width)
    }
}

/// What a finding points at in the statement text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Anchor {
    Identifier {
        qualifier: Option<String>,
        name: String,
    },
    /// A table name, preferably where a FROM-like keyword introduces it
    Table {
        schema: Option<String>,
        name: String,
    },
    Keyword(&'static str),
    Star,
}

impl Anchor {
    fn identifier(qualifier: Option<&str>, name: &str) -> Self {
        Anchor::Identifier {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
        }
    }

    fn table(schema: Option<&str>, name: &str) -> Self {
        Anchor::Table {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Byte offset and length in `text`, at or after `from`
    fn find(&self, text: &str, from: usize) -> Option<(usize, usize)> {
        match self {
            Anchor::Identifier { qualifier, name } => {
                locate_identifier_from(text, qualifier.as_deref(), name, from, |_, _| true)
            }
            Anchor::Table { schema, name } => {
                locate_identifier_from(text, schema.as_deref(), name, from, follows_table_keyword)
                    .or_else(|| {
                        locate_identifier_from(text, schema.as_deref(), name, from, |_, _| true)
                    })
            }
            Anchor::Keyword(word) => {
                let masked = mask_text(text, Mask::LiteralsAndIdentifiers);
                find_word(&masked, word, from).map(|at| (at, word.len()))
            }
            Anchor::Star => {
                let masked = mask_text(text, Mask::LiteralsAndIdentifiers);
                let select = find_word(&masked, "SELECT", from)?;
                let star = masked[select..].find('*')? + select;
                Some((star, 1))
            }
        }
    }
}

/// A diagnostic before it has a position
#[derive(Debug)]
struct Finding {
    code: DiagnosticCode,
    severity: Severity,
    message: String,
    suggestion: Option<String>,
    anchor: Anchor,
}

/// What a name in scope stands for
#[derive(Debug, Clone)]
enum Source<'s> {
    Table(&'s TableInfo),
    /// A CTE or derived table with known output columns
    Derived { name: String, columns: Vec<String> },
    /// Something whose columns cannot be known
    Opaque,
}

impl Source<'_> {
    /// `None` when the columns are unknown
    fn has_column(&self, column: &str) -> Option<bool> {
        match self {
            Source::Table(table) => Some(table.find_column(column).is_some()),
            Source::Derived { columns, .. } => {
                Some(columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
            }
            Source::Opaque => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Source::Table(table) => table.qualified_name(),
            Source::Derived { name, .. } => name.clone(),
            Source::Opaque => String::new(),
        }
    }

    fn column_names(&self) -> Vec<&str> {
        match self {
            Source::Table(table) => table.column_names(),
            Source::Derived { columns, .. } => columns.iter().map(String::as_str).collect(),
            Source::Opaque => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Binding<'s> {
    /// Alias, or the bare name when unaliased
    key: String,
    source: Source<'s>,
}

type Scope<'s> = Vec<Binding<'s>>;

#[derive(Debug, Clone)]
struct CteBinding {
    name: String,
    columns: Option<Vec<String>>,
}

/// Walks one statement and collects findings
struct Checker<'s, 'c> {
    schema: &'s SchemaSnapshot,
    config: &'c ValidationConfig,
    scopes: Vec<Scope<'s>>,
    ctes: Vec<CteBinding>,
    findings: Vec<Finding>,
}

impl<'s, 'c> Checker<'s, 'c> {
    fn new(schema: &'s SchemaSnapshot, config: &'c ValidationConfig) -> Self {
        Self {
            schema,
            config,
            scopes: Vec::new(),
            ctes: Vec::new(),
            findings: Vec::new(),
        }
    }

    fn push(
        &mut self,
        code: DiagnosticCode,
        severity: Severity,
        message: String,
        suggestion: Option<String>,
        anchor: Anchor,
    ) {
        self.findings.push(Finding {
            code,
            severity,
            message,
            suggestion,
            anchor,
        });
    }

    fn check_statement(&mut self, statement: &SqlStatement, text: &str) {
        match statement {
            SqlStatement::Select(query) => self.check_query(query, true),
            SqlStatement::Insert(insert) => {
                let mut scope = Scope::new();
                self.bind_table(&insert.table, None, &mut scope);
                if let Some(Source::Table(table)) = scope.first().map(|b| &b.source) {
                    for column in &insert.columns {
                        self.check_target_column(table, column);
                    }
                }
                if let Some(source) = &insert.source {
                    self.check_query(source, false);
                }
            }
            SqlStatement::Update(update) => {
                // `UPDATE alias SET ... FROM ...` binds its target in the FROM
                // clause, which the IR does not carry
                if !has_top_level_from_after_set(text) {
                    let mut scope = Scope::new();
                    if let Some(table) = &update.table {
                        self.bind_table(table, update.alias.as_deref(), &mut scope);
                    }
                    if let Some(Source::Table(table)) = scope.first().map(|b| &b.source) {
                        for column in &update.assignments {
                            self.check_target_column(table, column);
                        }
                    }
                    self.scopes.push(scope);
                    for value in &update.values {
                        self.check_expr(value, &[]);
                    }
                    if let Some(selection) = &update.selection {
                        self.check_expr(selection, &[]);
                    }
                    self.scopes.pop();
                }

                if update.selection.is_none() && self.config.missing_where {
                    let target = update
                        .table
                        .as_ref()
                        .map_or_else(|| "the target table".to_string(), |t| format!("'{}'", t));
                    self.push(
                        DiagnosticCode::UpdateWithoutWhere,
                        Severity::Warning,
                        format!("UPDATE without WHERE affects every row of {}", target),
                        None,
                        Anchor::Keyword("UPDATE"),
                    );
                }
            }
            SqlStatement::Delete(delete) => {
                let mut scope = Scope::new();
                for source in &delete.from {
                    self.bind_source(source, &mut scope);
                }
                self.scopes.push(scope);
                for source in &delete.from {
                    self.check_join_conditions(source);
                }
                if let Some(selection) = &delete.selection {
                    self.check_expr(selection, &[]);
                }
                self.scopes.pop();

                if delete.selection.is_none() && self.config.missing_where {
                    self.push(
                        DiagnosticCode::DeleteWithoutWhere,
                        Severity::Warning,
                        "DELETE without WHERE removes every row".to_string(),
                        None,
                        Anchor::Keyword("DELETE"),
                    );
                }
            }
            SqlStatement::Other => {}
        }
    }

    /// Validate a query; CTE bodies and nested queries never get the
    /// SELECT * advisory
    fn check_query(&mut self, query: &QueryBlock, top_level: bool) {
        let cte_mark = self.ctes.len();

        for cte in &query.ctes {
            let declared = (!cte.columns.is_empty()).then(|| cte.columns.clone());

            // A recursive member reads the CTE itself; until the body is
            // known only the declared columns are trusted
            self.ctes.push(CteBinding {
                name: cte.name.clone(),
                columns: declared.clone(),
            });
            self.check_query(&cte.query, false);
            self.ctes.pop();

            let columns = declared.or_else(|| self.query_columns(&cte.query));
            self.ctes.push(CteBinding {
                name: cte.name.clone(),
                columns,
            });
        }

        match query.selects.as_slice() {
            [select] => self.check_select(select, top_level, &query.order_by),
            selects => {
                for select in selects {
                    self.check_select(select, top_level, &[]);
                }
                // ORDER BY on a set operation names output columns; only its
                // subqueries are checked
                for expr in &query.order_by {
                    for subquery in ColumnCollector::collect(expr).subqueries {
                        self.check_query(subquery, false);
                    }
                }
            }
        }

        self.ctes.truncate(cte_mark);
    }

    fn check_select(&mut self, select: &SelectBlock, top_level: bool, order_by: &[Expression]) {
        let mut scope = Scope::new();
        let mut resolved = true;
        for source in &select.from {
            resolved &= self.bind_source(source, &mut scope);
        }
        self.scopes.push(scope);

        for source in &select.from {
            self.check_join_conditions(source);
        }
        for item in &select.projection {
            if let Projection::Expr { expr, .. } = item {
                self.check_expr(expr, &[]);
            }
        }
        let clauses = select
            .selection
            .iter()
            .chain(select.group_by.iter())
            .chain(select.having.iter());
        for expr in clauses {
            self.check_expr(expr, &[]);
        }

        let aliases: Vec<&str> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                Projection::Expr {
                    alias: Some(alias), ..
                } => Some(alias.as_str()),
                _ => None,
            })
            .collect();
        for expr in order_by {
            self.check_expr(expr, &aliases);
        }

        self.scopes.pop();

        if top_level
            && resolved
            && self.config.select_star
            && !select.from.is_empty()
            && select.has_wildcard()
        {
            self.push(
                DiagnosticCode::SelectStar,
                Severity::Info,
                "SELECT * returns every column; list the columns you need".to_string(),
                None,
                Anchor::Star,
            );
        }
    }

    /// Bind a FROM item and its joins; false when a table is missing
    fn bind_source(&mut self, source: &TableSource, scope: &mut Scope<'s>) -> bool {
        source
            .relations()
            .fold(true, |resolved, relation| self.bind_relation(relation, scope) && resolved)
    }

    fn bind_relation(&mut self, relation: &Relation, scope: &mut Scope<'s>) -> bool {
        match relation {
            Relation::Table { name, alias } => self.bind_table(name, alias.as_deref(), scope),
            Relation::Derived { query, alias } => {
                self.check_query(query, false);
                let source = match self.query_columns(query) {
                    Some(columns) => Source::Derived {
                        name: alias.clone().unwrap_or_default(),
                        columns,
                    },
                    None => Source::Opaque,
                };
                scope.push(Binding {
                    key: alias.clone().unwrap_or_default(),
                    source,
                });
                true
            }
            Relation::Nested(source) => self.bind_source(source, scope),
            Relation::Other { alias } => {
                scope.push(Binding {
                    key: alias.clone().unwrap_or_default(),
                    source: Source::Opaque,
                });
                true
            }
        }
    }

    fn bind_table(&mut self, name: &TableName, alias: Option<&str>, scope: &mut Scope<'s>) -> bool {
        let key = alias.unwrap_or(&name.name).to_string();
        let (source, resolved) = self.resolve_table(name);
        scope.push(Binding { key, source });
        resolved
    }

    fn resolve_table(&mut self, name: &TableName) -> (Source<'s>, bool) {
        if name.is_session_object() || is_placeholder(&name.name) {
            return (Source::Opaque, true);
        }
        if name.schema.is_none() {
            if let Some(cte) = self.find_cte(&name.name) {
                let source = match cte.columns {
                    Some(columns) => Source::Derived {
                        name: cte.name,
                        columns,
                    },
                    None => Source::Opaque,
                };
                return (source, true);
            }
        }

        let schema: &'s SchemaSnapshot = self.schema;
        if let Some(table) = schema.find_table(name.schema.as_deref(), &name.name) {
            return (Source::Table(table), true);
        }
        let system = name
            .schema
            .as_deref()
            .is_some_and(|s| SYSTEM_SCHEMAS.iter().any(|sys| sys.eq_ignore_ascii_case(s)));
        if system {
            return (Source::Opaque, true);
        }

        let candidates: Vec<&str> = match name.schema.as_deref() {
            Some(schema_name) => schema
                .tables_in_schema(schema_name)
                .map(|t| t.table_name.as_str())
                .collect(),
            None => schema.table_names(),
        };
        let suggestion = nearest(&name.name, candidates, self.config.max_suggestion_distance);
        self.push(
            DiagnosticCode::TableNotFound,
            Severity::Error,
            format!("Table '{}' not found", name),
            suggestion.map(str::to_string),
            Anchor::table(name.schema.as_deref(), &name.name),
        );
        (Source::Opaque, false)
    }

    fn find_cte(&self, name: &str) -> Option<CteBinding> {
        self.ctes
            .iter()
            .rev()
            .find(|cte| cte.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Output columns of a query, expanding wildcards where possible
    fn query_columns(&self, query: &QueryBlock) -> Option<Vec<String>> {
        let select = query.selects.first()?;
        let mut columns = Vec::new();
        for item in &select.projection {
            match item {
                Projection::Wildcard => {
                    for source in &select.from {
                        for relation in source.relations() {
                            columns.extend(self.relation_columns(relation)?);
                        }
                    }
                }
                Projection::QualifiedWildcard(qualifier) => {
                    let relation = select
                        .from
                        .iter()
                        .flat_map(TableSource::relations)
                        .find(|relation| relation_key(relation).eq_ignore_ascii_case(qualifier))?;
                    columns.extend(self.relation_columns(relation)?);
                }
                Projection::Expr { .. } => {
                    if let Some(name) = item.output_name() {
                        columns.push(name.to_string());
                    }
                }
            }
        }
        Some(columns)
    }

    fn relation_columns(&self, relation: &Relation) -> Option<Vec<String>> {
        match relation {
            Relation::Table { name, .. } => {
                if name.schema.is_none() {
                    if let Some(cte) = self.find_cte(&name.name) {
                        return cte.columns;
                    }
                }
                let table = self.schema.find_table(name.schema.as_deref(), &name.name)?;
                Some(table.column_names().into_iter().map(str::to_string).collect())
            }
            Relation::Derived { query, .. } => self.query_columns(query),
            Relation::Nested(source) => {
                let mut columns = Vec::new();
                for relation in source.relations() {
                    columns.extend(self.relation_columns(relation)?);
                }
                Some(columns)
            }
            Relation::Other { .. } => None,
        }
    }

    fn check_join_conditions(&mut self, source: &TableSource) {
        if let Relation::Nested(inner) = &source.relation {
            self.check_join_conditions(inner);
        }
        for join in &source.joins {
            if let Relation::Nested(inner) = &join.relation {
                self.check_join_conditions(inner);
            }
            if let Some(on) = &join.on {
                self.check_expr(on, &[]);
            }
        }
    }

    /// SET and INSERT column lists name columns of the target only
    fn check_target_column(&mut self, table: &TableInfo, column: &str) {
        if table.find_column(column).is_some() {
            return;
        }
        let suggestion = nearest(column, table.column_names(), self.config.max_suggestion_distance);
        self.push(
            DiagnosticCode::ColumnNotFound,
            Severity::Error,
            format!("Column '{}' not found in '{}'", column, table.qualified_name()),
            suggestion.map(str::to_string),
            Anchor::identifier(None, column),
        );
    }

    /// Check the columns of an expression; `aliases` are SELECT-list names
    /// visible to ORDER BY
    fn check_expr(&mut self, expr: &Expression, aliases: &[&str]) {
        let collected = ColumnCollector::collect(expr);
        for column in &collected.columns {
            match &column.qualifier {
                Some(qualifier) => self.check_qualified(qualifier, &column.name),
                None => {
                    if !aliases.iter().any(|a| a.eq_ignore_ascii_case(&column.name)) {
                        self.check_unqualified(&column.name);
                    }
                }
            }
        }
        for subquery in collected.subqueries {
            self.check_query(subquery, false);
        }
    }

    fn lookup(&self, key: &str) -> Option<&Binding<'s>> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|binding| binding.key.eq_ignore_ascii_case(key))
    }

    fn check_qualified(&mut self, qualifier: &str, name: &str) {
        // Unknown qualifiers are left alone; they may be outer references the
        // IR does not model
        let Some(binding) = self.lookup(qualifier) else {
            return;
        };
        if binding.source.has_column(name) != Some(false) {
            return;
        }
        let label = binding.source.label();
        let suggestion = nearest(
            name,
            binding.source.column_names(),
            self.config.max_suggestion_distance,
        )
        .map(str::to_string);
        self.push(
            DiagnosticCode::ColumnNotFound,
            Severity::Error,
            format!("Column '{}' not found in '{}'", name, label),
            suggestion,
            Anchor::identifier(Some(qualifier), name),
        );
    }

    fn check_unqualified(&mut self, name: &str) {
        let tables = match self.resolve_unqualified(name) {
            Resolution::Found => return,
            Resolution::Ambiguous(tables) => tables,
            Resolution::Missing => {
                let candidates: Vec<&str> = self
                    .scopes
                    .iter()
                    .rev()
                    .find(|scope| !scope.is_empty())
                    .map(|scope| scope.iter().flat_map(|b| b.source.column_names()).collect())
                    .unwrap_or_default();
                let suggestion = nearest(name, candidates, self.config.max_suggestion_distance)
                    .map(str::to_string);
                self.push(
                    DiagnosticCode::ColumnNotFound,
                    Severity::Error,
                    format!("Column '{}' not found", name),
                    suggestion,
                    Anchor::identifier(None, name),
                );
                return;
            }
        };

        self.push(
            DiagnosticCode::AmbiguousColumn,
            Severity::Warning,
            format!("Column '{}' is ambiguous (found in {})", name, tables.join(", ")),
            None,
            Anchor::identifier(None, name),
        );
    }

    /// The innermost scope that knows the column wins; correlated references
    /// fall through to outer scopes
    fn resolve_unqualified(&self, name: &str) -> Resolution {
        if self.scopes.iter().all(|scope| scope.is_empty()) {
            return Resolution::Found;
        }
        for scope in self.scopes.iter().rev() {
            let matches: Vec<String> = scope
                .iter()
                .filter(|binding| binding.source.has_column(name) == Some(true))
                .map(|binding| binding.source.label())
                .collect();
            match matches.len() {
                0 if scope.iter().any(|b| matches!(b.source, Source::Opaque)) => {
                    return Resolution::Found
                }
                0 => continue,
                1 => return Resolution::Found,
                _ => return Resolution::Ambiguous(matches),
            }
        }
        Resolution::Missing
    }
}

enum Resolution {
    Found,
    Ambiguous(Vec<String>),
    Missing,
}

/// Whether the match at `at` is the name right after a FROM-like keyword or
/// a comma
fn follows_table_keyword(masked: &str, at: usize) -> bool {
    let before = masked[..at].trim_end();
    if before.ends_with(',') {
        return true;
    }
    let word_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map_or(before.len(), |(i, _)| i);
    let word = &before[word_start..];
    TABLE_KEYWORDS.iter().any(|keyword| keyword.eq_ignore_ascii_case(word))
}

fn relation_key(relation: &Relation) -> &str {
    match relation {
        Relation::Table { name, alias } => alias.as_deref().unwrap_or(&name.name),
        Relation::Derived { alias, .. } | Relation::Other { alias } => {
            alias.as_deref().unwrap_or_default()
        }
        Relation::Nested(_) => "",
    }
}

/// Whether an UPDATE has its own FROM clause, outside any subquery
fn has_top_level_from_after_set(text: &str) -> bool {
    let masked = mask_text(text, Mask::LiteralsAndIdentifiers);
    let Some(set) = find_word(&masked, "SET", 0) else {
        return false;
    };
    let mut from = set;
    while let Some(at) = find_word(&masked, "FROM", from) {
        let depth = masked[set..at].chars().fold(0i32, |depth, c| match c {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        });
        if depth == 0 {
            return true;
        }
        from = at + 4;
    }
    false
}
