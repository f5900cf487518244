//! Typed statement IR lowered from the sqlparser AST
//!
//! The engine only cares about the shape of four statement kinds. Lowering
//! happens once, at the parser boundary, so the extractor, the classifier and
//! the validator never probe sqlparser nodes directly.

use crate::normalize::unquote;
use sqlparser::ast as sql;

/// Functions whose first argument is a date part keyword, not a column
pub const DATE_PART_FUNCTIONS: &[&str] = &[
    "DATEADD",
    "DATEDIFF",
    "DATEDIFF_BIG",
    "DATENAME",
    "DATEPART",
    "DATETRUNC",
];

/// A possibly schema-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.into(),
        }
    }

    /// Keep the last two parts of `server.db.schema.table`
    pub fn from_parts(parts: &[String]) -> Option<Self> {
        let (name, rest) = parts.split_last()?;
        Some(Self {
            schema: rest.last().cloned(),
            name: name.clone(),
        })
    }

    fn from_object_name(name: &sql::ObjectName) -> Self {
        let parts: Vec<String> = name.0.iter().map(|ident| ident.value.clone()).collect();
        Self::from_parts(&parts).unwrap_or_else(|| Self::new(None, name.to_string()))
    }

    /// Temp tables and table variables never appear in a schema snapshot
    pub fn is_session_object(&self) -> bool {
        self.name.starts_with('#') || self.name.starts_with('@')
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column reference, optionally qualified by a table or alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

/// An expression reduced to what name resolution needs
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnRef),
    Subquery(Box<QueryBlock>),
    Compound(Vec<Expression>),
    Literal,
}

/// One item of a SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard,
    QualifiedWildcard(String),
    Expr {
        expr: Expression,
        alias: Option<String>,
    },
}

impl Projection {
    /// Name the item contributes to the result set, if any
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Projection::Expr { alias: Some(alias), .. } => Some(alias.as_str()),
            Projection::Expr {
                expr: Expression::Column(column),
                alias: None,
            } => Some(column.name.as_str()),
            _ => None,
        }
    }
}

/// A FROM item
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Table {
        name: TableName,
        alias: Option<String>,
    },
    Derived {
        query: Box<QueryBlock>,
        alias: Option<String>,
    },
    Nested(Box<TableSource>),
    /// Table-valued functions and other sources without a schema entry
    Other { alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub relation: Relation,
    pub on: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSource {
    pub relation: Relation,
    pub joins: Vec<JoinClause>,
}

impl TableSource {
    /// The base relation followed by every joined relation
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        std::iter::once(&self.relation).chain(self.joins.iter().map(|join| &join.relation))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectBlock {
    pub projection: Vec<Projection>,
    pub from: Vec<TableSource>,
    pub selection: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
}

impl SelectBlock {
    pub fn has_wildcard(&self) -> bool {
        self.projection
            .iter()
            .any(|item| matches!(item, Projection::Wildcard | Projection::QualifiedWildcard(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CteDef {
    pub name: String,
    /// Explicit column list, `WITH c (a, b) AS (...)`
    pub columns: Vec<String>,
    pub query: QueryBlock,
}

/// A query with its CTEs; set operations are flattened into `selects`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryBlock {
    pub ctes: Vec<CteDef>,
    pub selects: Vec<SelectBlock>,
    pub order_by: Vec<Expression>,
}

impl QueryBlock {
    /// Column names of the result set, taken from the first SELECT
    pub fn output_columns(&self) -> Vec<String> {
        self.selects
            .first()
            .map(|select| {
                select
                    .projection
                    .iter()
                    .filter_map(Projection::output_name)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableName,
    pub columns: Vec<String>,
    pub source: Option<QueryBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// `None` when the target is not a plain table
    pub table: Option<TableName>,
    pub alias: Option<String>,
    /// SET targets, in order
    pub assignments: Vec<String>,
    pub values: Vec<Expression>,
    pub selection: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub from: Vec<TableSource>,
    pub selection: Option<Expression>,
}

/// A lowered statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    Select(QueryBlock),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Other,
}

impl SqlStatement {
    pub fn lower(statement: &sql::Statement) -> Self {
        match statement {
            sql::Statement::Query(query) => SqlStatement::Select(lower_query(query)),
            sql::Statement::Insert(insert) => SqlStatement::Insert(InsertStatement {
                table: TableName::from_object_name(&insert.table_name),
                columns: insert.columns.iter().map(|c| c.value.clone()).collect(),
                source: insert.source.as_deref().map(lower_query),
            }),
            sql::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => {
                let (target, alias) = match &table.relation {
                    sql::TableFactor::Table { name, alias, .. } => (
                        Some(TableName::from_object_name(name)),
                        alias.as_ref().map(|a| a.name.value.clone()),
                    ),
                    _ => (None, None),
                };
                SqlStatement::Update(UpdateStatement {
                    table: target,
                    alias,
                    assignments: assignments.iter().flat_map(assignment_targets).collect(),
                    values: assignments.iter().map(|a| lower_expr(&a.value)).collect(),
                    selection: selection.as_ref().map(lower_expr),
                })
            }
            sql::Statement::Delete(delete) => {
                let from = match &delete.from {
                    sql::FromTable::WithFromKeyword(tables) | sql::FromTable::WithoutKeyword(tables) => {
                        tables.iter().map(lower_table_with_joins).collect()
                    }
                };
                SqlStatement::Delete(DeleteStatement {
                    from,
                    selection: delete.selection.as_ref().map(lower_expr),
                })
            }
            _ => SqlStatement::Other,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SqlStatement::Select(_) => "SELECT",
            SqlStatement::Insert(_) => "INSERT",
            SqlStatement::Update(_) => "UPDATE",
            SqlStatement::Delete(_) => "DELETE",
            SqlStatement::Other => "OTHER",
        }
    }
}

fn assignment_targets(assignment: &sql::Assignment) -> Vec<String> {
    let last = |name: &sql::ObjectName| name.0.last().map(|ident| ident.value.clone());
    match &assignment.target {
        sql::AssignmentTarget::ColumnName(name) => last(name).into_iter().collect(),
        sql::AssignmentTarget::Tuple(names) => names.iter().filter_map(last).collect(),
    }
}

fn lower_query(query: &sql::Query) -> QueryBlock {
    let ctes = query
        .with
        .as_ref()
        .map(|with| with.cte_tables.iter().map(lower_cte).collect())
        .unwrap_or_default();

    let mut selects = Vec::new();
    collect_selects(&query.body, &mut selects);

    let order_by = query
        .order_by
        .as_ref()
        .map(|order_by| order_by.exprs.iter().map(|item| lower_expr(&item.expr)).collect())
        .unwrap_or_default();

    QueryBlock {
        ctes,
        selects,
        order_by,
    }
}

fn lower_cte(cte: &sql::Cte) -> CteDef {
    CteDef {
        name: cte.alias.name.value.clone(),
        columns: cte
            .alias
            .columns
            .iter()
            .map(|column| unquote(&column.to_string()))
            .collect(),
        query: lower_query(&cte.query),
    }
}

fn collect_selects(body: &sql::SetExpr, out: &mut Vec<SelectBlock>) {
    match body {
        sql::SetExpr::Select(select) => out.push(lower_select(select)),
        sql::SetExpr::Query(query) => out.extend(lower_query(query).selects),
        sql::SetExpr::SetOperation { left, right, .. } => {
            collect_selects(left, out);
            collect_selects(right, out);
        }
        _ => {}
    }
}

fn lower_select(select: &sql::Select) -> SelectBlock {
    let group_by = match &select.group_by {
        sql::GroupByExpr::Expressions(exprs, _) => exprs.iter().map(lower_expr).collect(),
        sql::GroupByExpr::All(_) => Vec::new(),
    };

    SelectBlock {
        projection: select.projection.iter().map(lower_select_item).collect(),
        from: select.from.iter().map(lower_table_with_joins).collect(),
        selection: select.selection.as_ref().map(lower_expr),
        group_by,
        having: select.having.as_ref().map(lower_expr),
    }
}

fn lower_select_item(item: &sql::SelectItem) -> Projection {
    match item {
        sql::SelectItem::UnnamedExpr(expr) => Projection::Expr {
            expr: lower_expr(expr),
            alias: None,
        },
        sql::SelectItem::ExprWithAlias { expr, alias } => Projection::Expr {
            expr: lower_expr(expr),
            alias: Some(alias.value.clone()),
        },
        sql::SelectItem::Wildcard(_) => Projection::Wildcard,
        sql::SelectItem::QualifiedWildcard(name, _) => Projection::QualifiedWildcard(
            name.0.last().map(|ident| ident.value.clone()).unwrap_or_default(),
        ),
    }
}

fn lower_table_with_joins(table: &sql::TableWithJoins) -> TableSource {
    TableSource {
        relation: lower_factor(&table.relation),
        joins: table
            .joins
            .iter()
            .map(|join| JoinClause {
                relation: lower_factor(&join.relation),
                on: join_condition(&join.join_operator).map(lower_expr),
            })
            .collect(),
    }
}

fn join_condition(operator: &sql::JoinOperator) -> Option<&sql::Expr> {
    let constraint = match operator {
        sql::JoinOperator::Inner(c)
        | sql::JoinOperator::LeftOuter(c)
        | sql::JoinOperator::RightOuter(c)
        | sql::JoinOperator::FullOuter(c) => c,
        _ => return None,
    };
    match constraint {
        sql::JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

fn lower_factor(factor: &sql::TableFactor) -> Relation {
    match factor {
        sql::TableFactor::Table {
            name, alias, args, ..
        } => {
            let alias = alias.as_ref().map(|a| a.name.value.clone());
            if args.is_some() {
                Relation::Other { alias }
            } else {
                Relation::Table {
                    name: TableName::from_object_name(name),
                    alias,
                }
            }
        }
        sql::TableFactor::Derived {
            subquery, alias, ..
        } => Relation::Derived {
            query: Box::new(lower_query(subquery)),
            alias: alias.as_ref().map(|a| a.name.value.clone()),
        },
        sql::TableFactor::NestedJoin {
            table_with_joins, ..
        } => Relation::Nested(Box::new(lower_table_with_joins(table_with_joins))),
        _ => Relation::Other { alias: None },
    }
}

fn compound<'a>(exprs: impl IntoIterator<Item = &'a sql::Expr>) -> Expression {
    Expression::Compound(exprs.into_iter().map(lower_expr).collect())
}

fn lower_expr(expr: &sql::Expr) -> Expression {
    match expr {
        sql::Expr::Identifier(ident) => {
            if ident.value.starts_with('@') {
                Expression::Literal
            } else {
                Expression::Column(ColumnRef {
                    qualifier: None,
                    name: ident.value.clone(),
                })
            }
        }
        sql::Expr::CompoundIdentifier(idents) => match idents.as_slice() {
            [.., qualifier, name] if !qualifier.value.starts_with('@') => {
                Expression::Column(ColumnRef {
                    qualifier: Some(qualifier.value.clone()),
                    name: name.value.clone(),
                })
            }
            _ => Expression::Literal,
        },
        sql::Expr::BinaryOp { left, right, .. } => compound([left.as_ref(), right.as_ref()]),
        sql::Expr::UnaryOp { expr, .. }
        | sql::Expr::Nested(expr)
        | sql::Expr::IsNull(expr)
        | sql::Expr::IsNotNull(expr)
        | sql::Expr::IsTrue(expr)
        | sql::Expr::IsFalse(expr)
        | sql::Expr::Cast { expr, .. }
        | sql::Expr::Collate { expr, .. } => lower_expr(expr),
        sql::Expr::InList { expr, list, .. } => {
            compound(std::iter::once(expr.as_ref()).chain(list.iter()))
        }
        sql::Expr::InSubquery { expr, subquery, .. } => Expression::Compound(vec![
            lower_expr(expr),
            Expression::Subquery(Box::new(lower_query(subquery))),
        ]),
        sql::Expr::Subquery(query) | sql::Expr::Exists { subquery: query, .. } => {
            Expression::Subquery(Box::new(lower_query(query)))
        }
        sql::Expr::Between {
            expr, low, high, ..
        } => compound([expr.as_ref(), low.as_ref(), high.as_ref()]),
        sql::Expr::Like { expr, pattern, .. } | sql::Expr::ILike { expr, pattern, .. } => {
            compound([expr.as_ref(), pattern.as_ref()])
        }
        sql::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => compound(
            operand
                .as_deref()
                .into_iter()
                .chain(conditions.iter())
                .chain(results.iter())
                .chain(else_result.as_deref()),
        ),
        sql::Expr::Tuple(items) => compound(items.iter()),
        sql::Expr::Function(function) => lower_function(function),
        _ => Expression::Literal,
    }
}

fn lower_function(function: &sql::Function) -> Expression {
    let name = function
        .name
        .0
        .last()
        .map(|ident| ident.value.to_uppercase())
        .unwrap_or_default();
    let skip_date_part = DATE_PART_FUNCTIONS.contains(&name.as_str());

    let mut parts = Vec::new();
    match &function.args {
        sql::FunctionArguments::List(list) => {
            for (i, arg) in list.args.iter().enumerate() {
                if skip_date_part && i == 0 {
                    continue;
                }
                match arg {
                    sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(expr))
                    | sql::FunctionArg::Named {
                        arg: sql::FunctionArgExpr::Expr(expr),
                        ..
                    } => parts.push(lower_expr(expr)),
                    _ => {}
                }
            }
        }
        sql::FunctionArguments::Subquery(query) => {
            parts.push(Expression::Subquery(Box::new(lower_query(query))));
        }
        sql::FunctionArguments::None => {}
    }

    if let Some(sql::WindowType::WindowSpec(spec)) = &function.over {
        parts.extend(spec.partition_by.iter().map(lower_expr));
        parts.extend(spec.order_by.iter().map(|item| lower_expr(&item.expr)));
    }

    Expression::Compound(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::MsSqlDialect;
    use sqlparser::parser::Parser;

    fn lower(sql: &str) -> SqlStatement {
        let statements = Parser::parse_sql(&MsSqlDialect {}, sql).unwrap();
        SqlStatement::lower(&statements[0])
    }

    fn column(qualifier: Option<&str>, name: &str) -> Expression {
        Expression::Column(ColumnRef {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
        })
    }

    #[test]
    fn lower_select_with_join() {
        let SqlStatement::Select(query) =
            lower("SELECT u.Name FROM dbo.Users u JOIN Orders o ON u.Id = o.UserId WHERE o.Total > 5")
        else {
            panic!("expected a SELECT");
        };

        let select = &query.selects[0];
        assert_eq!(select.from.len(), 1);
        assert_eq!(
            select.from[0].relation,
            Relation::Table {
                name: TableName::new(Some("dbo"), "Users"),
                alias: Some("u".to_string()),
            }
        );
        assert_eq!(
            select.from[0].joins[0].on,
            Some(Expression::Compound(vec![
                column(Some("u"), "Id"),
                column(Some("o"), "UserId"),
            ]))
        );
        assert_eq!(query.output_columns(), vec!["Name"]);
    }

    #[test]
    fn lower_cte_and_union() {
        let SqlStatement::Select(query) = lower(
            "WITH recent (Id) AS (SELECT Id FROM Orders) SELECT Id FROM recent UNION SELECT Id FROM Archive",
        ) else {
            panic!("expected a SELECT");
        };

        assert_eq!(query.ctes.len(), 1);
        assert_eq!(query.ctes[0].name, "recent");
        assert_eq!(query.ctes[0].columns, vec!["Id"]);
        assert_eq!(query.selects.len(), 2);
    }

    #[test]
    fn variables_and_date_parts_are_not_columns() {
        let SqlStatement::Select(query) =
            lower("SELECT DATEADD(day, 1, CreatedAt) FROM Orders WHERE Id = @id")
        else {
            panic!("expected a SELECT");
        };

        let select = &query.selects[0];
        assert_eq!(
            select.projection[0],
            Projection::Expr {
                expr: Expression::Compound(vec![Expression::Literal, column(None, "CreatedAt")]),
                alias: None,
            }
        );
        assert_eq!(
            select.selection,
            Some(Expression::Compound(vec![column(None, "Id"), Expression::Literal]))
        );
    }

    #[test]
    fn lower_update_and_delete() {
        let SqlStatement::Update(update) = lower("UPDATE dbo.Users SET Name = 'x', Age = Age + 1")
        else {
            panic!("expected an UPDATE");
        };
        assert_eq!(update.table, Some(TableName::new(Some("dbo"), "Users")));
        assert_eq!(update.assignments, vec!["Name", "Age"]);
        assert!(update.selection.is_none());

        let SqlStatement::Delete(delete) = lower("DELETE FROM Users WHERE Id = 1") else {
            panic!("expected a DELETE");
        };
        assert_eq!(delete.from.len(), 1);
        assert!(delete.selection.is_some());
    }

    #[test]
    fn lower_insert_select() {
        let SqlStatement::Insert(insert) =
            lower("INSERT INTO Archive (Id, Name) SELECT Id, Name FROM Users")
        else {
            panic!("expected an INSERT");
        };
        assert_eq!(insert.table, TableName::new(None, "Archive"));
        assert_eq!(insert.columns, vec!["Id", "Name"]);
        assert_eq!(insert.source.map(|q| q.selects.len()), Some(1));
    }

    #[test]
    fn table_name_keeps_last_two_parts() {
        let parts: Vec<String> = ["Shop", "sales", "Orders"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            TableName::from_parts(&parts),
            Some(TableName::new(Some("sales"), "Orders"))
        );
        assert!(TableName::new(None, "#staging").is_session_object());
    }
}
