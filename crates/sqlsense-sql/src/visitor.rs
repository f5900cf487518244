//! Single traversal over the statement IR
//!
//! The reference extractor, the completion classifier and the validator all
//! walk the same tree. They implement [`Visitor`] and let the `walk_*`
//! functions handle nesting.

use crate::ast::{
    ColumnRef, CteDef, Expression, Projection, QueryBlock, Relation, SelectBlock, SqlStatement,
    TableSource,
};

/// Callbacks fired while walking a statement
///
/// Every method has an empty default so implementors only override what they
/// collect.
pub trait Visitor {
    /// A CTE definition, before its body is walked
    fn visit_cte(&mut self, _cte: &CteDef) {}

    /// A FROM/JOIN item, a DML target, or a nested join group
    fn visit_relation(&mut self, _relation: &Relation) {}

    /// A column reference in any expression position
    fn visit_column(&mut self, _column: &ColumnRef) {}

    /// Before descending into a nested query (CTE body, derived table,
    /// expression subquery). Returning `false` skips it.
    fn enter_query(&mut self, _query: &QueryBlock) -> bool {
        true
    }
}

pub fn walk_statement<V: Visitor + ?Sized>(visitor: &mut V, statement: &SqlStatement) {
    match statement {
        SqlStatement::Select(query) => walk_query(visitor, query),
        SqlStatement::Insert(insert) => {
            visitor.visit_relation(&Relation::Table {
                name: insert.table.clone(),
                alias: None,
            });
            if let Some(source) = &insert.source {
                if visitor.enter_query(source) {
                    walk_query(visitor, source);
                }
            }
        }
        SqlStatement::Update(update) => {
            if let Some(table) = &update.table {
                visitor.visit_relation(&Relation::Table {
                    name: table.clone(),
                    alias: update.alias.clone(),
                });
            }
            for value in &update.values {
                walk_expression(visitor, value);
            }
            if let Some(selection) = &update.selection {
                walk_expression(visitor, selection);
            }
        }
        SqlStatement::Delete(delete) => {
            for source in &delete.from {
                walk_source(visitor, source);
            }
            if let Some(selection) = &delete.selection {
                walk_expression(visitor, selection);
            }
        }
        SqlStatement::Other => {}
    }
}

/// Walk a query: CTEs first, then each SELECT, then ORDER BY
pub fn walk_query<V: Visitor + ?Sized>(visitor: &mut V, query: &QueryBlock) {
    for cte in &query.ctes {
        visitor.visit_cte(cte);
        if visitor.enter_query(&cte.query) {
            walk_query(visitor, &cte.query);
        }
    }
    for select in &query.selects {
        walk_select(visitor, select);
    }
    for expr in &query.order_by {
        walk_expression(visitor, expr);
    }
}

pub fn walk_select<V: Visitor + ?Sized>(visitor: &mut V, select: &SelectBlock) {
    for source in &select.from {
        walk_source(visitor, source);
    }
    for item in &select.projection {
        if let Projection::Expr { expr, .. } = item {
            walk_expression(visitor, expr);
        }
    }
    let clauses = select
        .selection
        .iter()
        .chain(select.group_by.iter())
        .chain(select.having.iter());
    for expr in clauses {
        walk_expression(visitor, expr);
    }
}

pub fn walk_source<V: Visitor + ?Sized>(visitor: &mut V, source: &TableSource) {
    walk_relation(visitor, &source.relation);
    for join in &source.joins {
        walk_relation(visitor, &join.relation);
        if let Some(on) = &join.on {
            walk_expression(visitor, on);
        }
    }
}

pub fn walk_relation<V: Visitor + ?Sized>(visitor: &mut V, relation: &Relation) {
    visitor.visit_relation(relation);
    match relation {
        Relation::Derived { query, .. } => {
            if visitor.enter_query(query) {
                walk_query(visitor, query);
            }
        }
        Relation::Nested(source) => walk_source(visitor, source),
        Relation::Table { .. } | Relation::Other { .. } => {}
    }
}

pub fn walk_expression<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expression) {
    match expr {
        Expression::Column(column) => visitor.visit_column(column),
        Expression::Subquery(query) => {
            if visitor.enter_query(query) {
                walk_query(visitor, query);
            }
        }
        Expression::Compound(parts) => {
            for part in parts {
                walk_expression(visitor, part);
            }
        }
        Expression::Literal => {}
    }
}

/// Columns of one expression, leaving nested queries to the caller
#[derive(Debug, Default)]
pub struct ColumnCollector<'a> {
    pub columns: Vec<ColumnRef>,
    pub subqueries: Vec<&'a QueryBlock>,
}

impl<'a> ColumnCollector<'a> {
    pub fn collect(expr: &'a Expression) -> Self {
        let mut collector = Self::default();
        collector.walk(expr);
        collector
    }

    // Subqueries are gathered by reference, so this walk cannot go through
    // the `Visitor` trait, whose callbacks only see short-lived borrows.
    fn walk(&mut self, expr: &'a Expression) {
        match expr {
            Expression::Column(column) => self.columns.push(column.clone()),
            Expression::Subquery(query) => self.subqueries.push(query),
            Expression::Compound(parts) => parts.iter().for_each(|part| self.walk(part)),
            Expression::Literal => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TableName;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::MsSqlDialect;
    use sqlparser::parser::Parser;

    fn lower(sql: &str) -> SqlStatement {
        let statements = Parser::parse_sql(&MsSqlDialect {}, sql).unwrap();
        SqlStatement::lower(&statements[0])
    }

    #[derive(Default)]
    struct Recorder {
        ctes: Vec<String>,
        tables: Vec<String>,
        columns: Vec<String>,
        skip_nested: bool,
    }

    impl Visitor for Recorder {
        fn visit_cte(&mut self, cte: &CteDef) {
            self.ctes.push(cte.name.clone());
        }

        fn visit_relation(&mut self, relation: &Relation) {
            if let Relation::Table { name, .. } = relation {
                self.tables.push(name.to_string());
            }
        }

        fn visit_column(&mut self, column: &ColumnRef) {
            self.columns.push(column.name.clone());
        }

        fn enter_query(&mut self, _query: &QueryBlock) -> bool {
            !self.skip_nested
        }
    }

    const NESTED: &str = "WITH c AS (SELECT Id FROM A) \
        SELECT x.Name FROM c JOIN (SELECT Name, Id FROM B) x ON x.Id = c.Id \
        WHERE c.Id IN (SELECT Id FROM D WHERE Flag = 1)";

    #[test]
    fn walks_every_nesting_level() {
        let mut recorder = Recorder::default();
        walk_statement(&mut recorder, &lower(NESTED));

        assert_eq!(recorder.ctes, vec!["c"]);
        assert_eq!(recorder.tables, vec!["A", "c", "B", "D"]);
        assert_eq!(
            recorder.columns,
            vec!["Id", "Name", "Id", "Id", "Id", "Name", "Id", "Id", "Flag"]
        );
    }

    #[test]
    fn enter_query_can_prune() {
        let mut recorder = Recorder {
            skip_nested: true,
            ..Default::default()
        };
        walk_statement(&mut recorder, &lower(NESTED));

        assert_eq!(recorder.tables, vec!["c"]);
        assert_eq!(recorder.columns, vec!["Id", "Id", "Name", "Id"]);
    }

    #[test]
    fn dml_targets_are_relations() {
        let mut recorder = Recorder::default();
        walk_statement(&mut recorder, &lower("UPDATE dbo.Users SET Name = Nick WHERE Id = 1"));
        assert_eq!(recorder.tables, vec![TableName::new(Some("dbo"), "Users").to_string()]);
        assert_eq!(recorder.columns, vec!["Nick", "Id"]);
    }

    #[test]
    fn collector_stops_at_subqueries() {
        let SqlStatement::Select(query) = lower("SELECT 1 FROM t WHERE a = b AND c IN (SELECT d FROM e)")
        else {
            panic!("expected a SELECT");
        };
        let selection = query.selects[0].selection.as_ref().unwrap();
        let collected = ColumnCollector::collect(selection);
        let names: Vec<&str> = collected.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(collected.subqueries.len(), 1);
    }
}
