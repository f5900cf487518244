//! Alias, CTE and table reference extraction
//!
//! The AST is walked when the ladder produces one. When it does not, a text
//! scan over the words that follow `FROM`, `JOIN` and list commas recovers the
//! common `[schema].[table] [AS] alias` shapes.

use crate::ast::{CteDef, Projection, QueryBlock, Relation, SqlStatement, TableName};
use crate::normalize::unquote;
use crate::parser::{is_placeholder, SqlParser};
use crate::text::{mask_text, Mask};
use crate::visitor::{walk_statement, Visitor};
use regex::Regex;
use sqlsense_core::schema::DEFAULT_SCHEMA;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::debug;

/// Schema label used for CTE bindings
pub const CTE_SCHEMA: &str = "cte";

/// Schema label used for derived-table bindings
pub const SUBQUERY_SCHEMA: &str = "subquery";

/// Keywords that can follow a table name and must not be read as its alias
const STOP_WORDS: &[&str] = &[
    "AND", "APPLY", "AS", "BY", "CROSS", "ELSE", "END", "EXCEPT", "FETCH", "FOR", "FROM", "FULL",
    "GO", "GROUP", "HAVING", "INNER", "INTERSECT", "INTO", "JOIN", "LEFT", "LIMIT", "NATURAL",
    "NOT", "OFFSET", "ON", "OPTION", "OR", "ORDER", "OUTER", "OUTPUT", "PIVOT", "RETURNING",
    "RIGHT", "SELECT", "SET", "TABLESAMPLE", "THEN", "UNION", "UNPIVOT", "USING", "VALUES",
    "WHEN", "WHERE", "WINDOW", "WITH",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.iter().any(|stop| stop.eq_ignore_ascii_case(word))
}

/// What kind of relation an alias stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// A table in the default schema
    Default,
    /// A common table expression
    Cte,
    /// A derived table
    Subquery,
    /// A table in another schema
    Named,
}

/// What an alias (or unaliased table name) resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasBinding {
    pub kind: SchemaKind,

    /// Real schema, or the `cte` / `subquery` label
    pub schema: String,

    /// Table, CTE or derived-table name
    pub table: String,

    /// Known column names for CTEs and derived tables
    pub columns: Vec<String>,

    /// Physical table behind a `SELECT *` CTE
    pub source_table: Option<TableName>,
}

impl AliasBinding {
    fn table(name: &TableName) -> Self {
        let schema = name.schema.clone().unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        let kind = if schema.eq_ignore_ascii_case(DEFAULT_SCHEMA) {
            SchemaKind::Default
        } else {
            SchemaKind::Named
        };
        Self {
            kind,
            schema,
            table: name.name.clone(),
            columns: Vec::new(),
            source_table: None,
        }
    }

    fn cte(name: &str, columns: Vec<String>, source_table: Option<TableName>) -> Self {
        Self {
            kind: SchemaKind::Cte,
            schema: CTE_SCHEMA.to_string(),
            table: name.to_string(),
            columns,
            source_table,
        }
    }

    fn subquery(alias: &str, columns: Vec<String>) -> Self {
        Self {
            kind: SchemaKind::Subquery,
            schema: SUBQUERY_SCHEMA.to_string(),
            table: alias.to_string(),
            columns,
            source_table: None,
        }
    }

    /// Whether the binding names a physical table
    pub fn is_physical(&self) -> bool {
        matches!(self.kind, SchemaKind::Default | SchemaKind::Named)
    }
}

/// A physically referenced table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Everything the extractor found in one text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References {
    aliases: HashMap<String, AliasBinding>,
    tables: Vec<TableRef>,
    ctes: HashMap<String, AliasBinding>,
}

impl References {
    /// Parse with the default ladder and extract, falling back to a text scan
    pub fn extract(text: &str) -> Self {
        Self::extract_with(&SqlParser::new(), text)
    }

    pub fn extract_with(parser: &SqlParser, text: &str) -> Self {
        match parser.parse(text) {
            Some(parsed) => Self::from_statements(&parsed.statements),
            None => {
                debug!("reference extraction fell back to text scan");
                Self::from_text(text)
            }
        }
    }

    /// Walk lowered statements
    pub fn from_statements(statements: &[SqlStatement]) -> Self {
        let mut refs = Self::default();
        for statement in statements {
            walk_statement(&mut refs, statement);
        }
        refs
    }

    /// Pattern-match raw text
    pub fn from_text(text: &str) -> Self {
        let masked = mask_text(text, Mask::Literals);
        let mut refs = Self::default();

        for caps in cte_pattern().captures_iter(&masked) {
            let Some(name) = caps.get(1) else { continue };
            let name = unquote(name.as_str());
            let columns = caps
                .get(2)
                .map(|list| {
                    list.as_str()
                        .split(',')
                        .map(unquote)
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            refs.bind_cte(&name, columns, None);
        }

        for keyword in keyword_pattern().find_iter(&masked) {
            refs.scan_table_list(&masked, keyword.end());
        }

        refs
    }

    /// Read `name [AS] alias` items separated by commas, starting at `pos`
    fn scan_table_list(&mut self, masked: &str, mut pos: usize) {
        while let Some(caps) = table_pattern().captures(&masked[pos..]) {
            let Some(name) = caps.name("name") else { break };
            let parts: Vec<String> = split_qualified(name.as_str());
            let Some(table) = TableName::from_parts(&parts) else { break };
            if is_stop_word(&table.name) {
                break;
            }

            let mut end = name.end();
            let alias = match caps.name("alias") {
                Some(alias) if !is_stop_word(alias.as_str()) => {
                    end = alias.end();
                    Some(unquote(alias.as_str()))
                }
                _ => None,
            };
            self.bind_table(&table, alias.as_deref());

            pos += end;
            let rest = &masked[pos..];
            let trimmed = rest.trim_start();
            if !trimmed.starts_with(',') {
                break;
            }
            pos += rest.len() - trimmed.len() + 1;
        }
    }

    fn bind_cte(&mut self, name: &str, columns: Vec<String>, source: Option<TableName>) {
        let binding = AliasBinding::cte(name, columns, source);
        self.ctes.insert(name.to_lowercase(), binding.clone());
        self.aliases.insert(name.to_lowercase(), binding);
    }

    fn bind_table(&mut self, name: &TableName, alias: Option<&str>) {
        if is_placeholder(&name.name) {
            return;
        }
        let key = alias.unwrap_or(&name.name).to_lowercase();

        if name.schema.is_none() {
            if let Some(cte) = self.ctes.get(&name.name.to_lowercase()) {
                let binding = cte.clone();
                self.aliases.insert(key, binding);
                return;
            }
        }

        let binding = AliasBinding::table(name);
        self.tables.push(TableRef {
            schema: binding.schema.clone(),
            table: binding.table.clone(),
        });
        self.aliases.insert(key, binding);
    }

    /// In-scope alias keys, lowercased
    pub fn used_aliases(&self) -> BTreeSet<String> {
        self.aliases.keys().cloned().collect()
    }

    /// Alias key to binding
    pub fn alias_map(&self) -> &HashMap<String, AliasBinding> {
        &self.aliases
    }

    /// Physical tables in discovery order, duplicates kept
    pub fn referenced_tables(&self) -> &[TableRef] {
        &self.tables
    }

    /// Look up an alias case-insensitively
    pub fn resolve(&self, alias: &str) -> Option<&AliasBinding> {
        self.aliases.get(&alias.to_lowercase())
    }

    /// CTE bindings by lowercased name
    pub fn ctes(&self) -> &HashMap<String, AliasBinding> {
        &self.ctes
    }
}

impl Visitor for References {
    fn visit_cte(&mut self, cte: &CteDef) {
        let columns = if cte.columns.is_empty() {
            cte.query.output_columns()
        } else {
            cte.columns.clone()
        };
        self.bind_cte(&cte.name, columns, star_source(&cte.query));
    }

    fn visit_relation(&mut self, relation: &Relation) {
        match relation {
            Relation::Table { name, alias } => self.bind_table(name, alias.as_deref()),
            Relation::Derived {
                query,
                alias: Some(alias),
            } => {
                self.aliases.insert(
                    alias.to_lowercase(),
                    AliasBinding::subquery(alias, query.output_columns()),
                );
            }
            _ => {}
        }
    }
}

/// The single table behind `SELECT * FROM t`, if that is the query's shape
fn star_source(query: &QueryBlock) -> Option<TableName> {
    let [select] = query.selects.as_slice() else {
        return None;
    };
    if !select.projection.iter().any(|p| matches!(p, Projection::Wildcard)) {
        return None;
    }
    let [source] = select.from.as_slice() else {
        return None;
    };
    match (&source.relation, source.joins.is_empty()) {
        (Relation::Table { name, .. }, true) if !is_placeholder(&name.name) => Some(name.clone()),
        _ => None,
    }
}

/// One identifier: bracketed, double-quoted or bare
pub(crate) const IDENT: &str = r#"(?:\[[^\]]+\]|"[^"]+"|[A-Za-z_#@][\w$#@]*)"#;

pub(crate) fn cte_pattern() -> &'static Regex {
    static CTE: OnceLock<Regex> = OnceLock::new();
    CTE.get_or_init(|| {
        let pattern = format!(r"(?i)(?:\bWITH|,)\s*({IDENT})\s*(?:\(([^)]*)\))?\s*AS\s*\(");
        Regex::new(&pattern).expect("valid regex")
    })
}

fn keyword_pattern() -> &'static Regex {
    static KEYWORD: OnceLock<Regex> = OnceLock::new();
    KEYWORD.get_or_init(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\b").expect("valid regex"))
}

fn table_pattern() -> &'static Regex {
    static TABLE: OnceLock<Regex> = OnceLock::new();
    TABLE.get_or_init(|| {
        let pattern = format!(
            r"(?i)^\s*(?P<name>{IDENT}(?:\s*\.\s*{IDENT}){{0,3}})(?:\s+(?:AS\s+)?(?P<alias>{IDENT}))?"
        );
        Regex::new(&pattern).expect("valid regex")
    })
}

/// Split `a . [b c] . "d"` into unquoted parts
pub(crate) fn split_qualified(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closer: Option<char> = None;

    for c in name.chars() {
        match closer {
            Some(close) if c == close => {
                closer = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None => match c {
                '[' => {
                    closer = Some(']');
                    current.push(c);
                }
                '"' => {
                    closer = Some('"');
                    current.push(c);
                }
                '.' => parts.push(unquote(&std::mem::take(&mut current))),
                c if c.is_whitespace() => {}
                _ => current.push(c),
            },
        }
    }
    parts.push(unquote(&current));
    parts
}

/// Lowercased alias keys in scope
pub fn used_aliases(text: &str) -> BTreeSet<String> {
    References::extract(text).used_aliases()
}

/// Alias key to binding
pub fn alias_map(text: &str) -> HashMap<String, AliasBinding> {
    References::extract(text).aliases
}

/// Physical tables in discovery order
pub fn referenced_tables(text: &str) -> Vec<TableRef> {
    References::extract(text).tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(schema: &str, name: &str) -> TableRef {
        TableRef {
            schema: schema.to_string(),
            table: name.to_string(),
        }
    }

    #[test]
    fn join_aliases_resolve_to_tables() {
        let map = alias_map("SELECT * FROM dbo.Users u JOIN Orders o ON u.Id = o.UserId");

        assert_eq!(map.len(), 2);
        assert_eq!(map["u"].schema, "dbo");
        assert_eq!(map["u"].table, "Users");
        assert_eq!(map["o"].schema, "dbo");
        assert_eq!(map["o"].table, "Orders");
        assert_eq!(map["o"].kind, SchemaKind::Default);
    }

    #[test]
    fn cte_bindings_carry_columns_and_source() {
        let refs = References::extract(
            "WITH active AS (SELECT * FROM dbo.Users WHERE Active = 1), \
             totals (UserId, Total) AS (SELECT UserId, SUM(Amount) FROM sales.Orders GROUP BY UserId) \
             SELECT a.Name, t.Total FROM active a JOIN totals t ON t.UserId = a.Id",
        );

        let active = refs.resolve("ACTIVE").unwrap();
        assert_eq!(active.kind, SchemaKind::Cte);
        assert_eq!(active.source_table, Some(TableName::new(Some("dbo"), "Users")));

        let t = refs.resolve("t").unwrap();
        assert_eq!(t.kind, SchemaKind::Cte);
        assert_eq!(t.table, "totals");
        assert_eq!(t.columns, vec!["UserId", "Total"]);

        assert_eq!(refs.resolve("a").unwrap().table, "active");
        assert_eq!(
            refs.referenced_tables(),
            &[table("dbo", "Users"), table("sales", "Orders")]
        );
        assert_eq!(refs.resolve("sales").map(|b| b.kind), None);
    }

    #[test]
    fn derived_tables_bind_their_columns() {
        let refs = References::extract(
            "SELECT x.Total FROM (SELECT UserId, SUM(Amount) AS Total FROM Orders GROUP BY UserId) x",
        );
        let x = refs.resolve("x").unwrap();
        assert_eq!(x.kind, SchemaKind::Subquery);
        assert_eq!(x.schema, SUBQUERY_SCHEMA);
        assert_eq!(x.columns, vec!["UserId", "Total"]);
        assert_eq!(refs.referenced_tables(), &[table("dbo", "Orders")]);
    }

    #[test]
    fn nested_subqueries_are_walked() {
        let refs = References::extract(
            "SELECT * FROM Users u WHERE u.Id IN \
             (SELECT o.UserId FROM Orders o WHERE o.Total > (SELECT AVG(Total) FROM hist.Orders))",
        );
        assert_eq!(
            refs.used_aliases().into_iter().collect::<Vec<_>>(),
            vec!["o", "orders", "u"]
        );
        assert_eq!(
            refs.referenced_tables(),
            &[table("dbo", "Users"), table("dbo", "Orders"), table("hist", "Orders")]
        );
        assert_eq!(refs.resolve("orders").unwrap().kind, SchemaKind::Named);
    }

    #[test]
    fn later_binding_shadows_earlier() {
        let map = alias_map("SELECT * FROM Users x JOIN Orders X ON 1 = 1");
        assert_eq!(map.len(), 1);
        assert_eq!(map["x"].table, "Orders");
    }

    #[test]
    fn text_scan_handles_brackets_and_lists() {
        let refs = References::from_text("SELECT * FROM [dbo].[Users] AS u, Orders o WHERE u.");
        assert_eq!(refs.resolve("u").unwrap().table, "Users");
        assert_eq!(refs.resolve("o").unwrap().table, "Orders");
        assert_eq!(refs.alias_map().len(), 2);
    }

    #[test]
    fn text_scan_skips_stop_words() {
        let refs = References::from_text("SELECT * FROM Users WHERE Id = ");
        assert_eq!(refs.used_aliases().into_iter().collect::<Vec<_>>(), vec!["users"]);

        let refs = References::from_text("SELECT 'FROM Fake f' FROM Real r LEFT JOIN [sales].[Orders Archive] ON");
        assert_eq!(
            refs.used_aliases().into_iter().collect::<Vec<_>>(),
            vec!["orders archive", "r"]
        );
        assert_eq!(refs.resolve("orders archive").unwrap().schema, "sales");
    }

    #[test]
    fn text_scan_finds_ctes() {
        let refs = References::from_text(
            "WITH recent (Id, Total) AS (SELECT Id, Total FROM Orders) SELECT * FROM recent r WHERE r.",
        );
        let recent = refs.resolve("recent").unwrap();
        assert_eq!(recent.kind, SchemaKind::Cte);
        assert_eq!(recent.columns, vec!["Id", "Total"]);
        assert_eq!(refs.resolve("r").unwrap().kind, SchemaKind::Cte);
        assert_eq!(refs.referenced_tables(), &[table("dbo", "Orders")]);
    }

    #[test]
    fn cte_survives_incomplete_tail() {
        let aliases = used_aliases(";WITH cte_name AS (SELECT * FROM t) SELECT * FROM cte_n");
        assert!(aliases.contains("cte_name"));

        let refs = References::extract("WITH c AS (SELECT Id FROM Orders) SELECT * FROM ");
        assert!(refs.resolve("c").is_some());
        assert_eq!(refs.referenced_tables(), &[table("dbo", "Orders")]);
    }

    #[test]
    fn split_qualified_names() {
        assert_eq!(split_qualified("[dbo] . [Order Items]"), vec!["dbo", "Order Items"]);
        assert_eq!(split_qualified("db.\"s\".t"), vec!["db", "s", "t"]);
    }
}
