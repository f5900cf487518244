//! Schema snapshot supplied by the connection layer
//!
//! A read-only picture of one database: its tables with their columns and its
//! routines. The engine never mutates a snapshot and never caches one across
//! calls.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema assumed for unqualified names
pub const DEFAULT_SCHEMA: &str = "dbo";

/// A column in a table or view
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,

    pub data_type: String,

    #[serde(default)]
    pub is_nullable: bool,

    #[serde(default)]
    pub is_primary_key: bool,

    #[serde(default)]
    pub is_identity: bool,

    /// 1-based position in the table definition
    #[serde(default)]
    pub ordinal_position: u32,
}

impl ColumnInfo {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            is_identity: false,
            ordinal_position: 0,
        }
    }

    /// Mark as primary key (implies NOT NULL)
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }
}

/// A table or view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub schema_name: String,

    pub table_name: String,

    /// BASE TABLE, VIEW, ...
    #[serde(default = "TableInfo::default_table_type")]
    pub table_type: String,

    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    fn default_table_type() -> String {
        "BASE TABLE".to_string()
    }

    /// Create a base table; ordinal positions are assigned in order
    pub fn new(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnInfo>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut col)| {
                if col.ordinal_position == 0 {
                    col.ordinal_position = i as u32 + 1;
                }
                col
            })
            .collect();

        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            table_type: Self::default_table_type(),
            columns,
        }
    }

    /// Find a column by name (case-insensitive)
    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Get column names in ordinal order
    pub fn column_names(&self) -> Vec<&str> {
        let mut columns: Vec<&ColumnInfo> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.ordinal_position);
        columns.into_iter().map(|c| c.name.as_str()).collect()
    }

    /// `schema.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// A routine parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineParameter {
    pub name: String,
    pub data_type: String,
}

/// A stored procedure or function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineInfo {
    pub schema_name: String,

    pub routine_name: String,

    /// PROCEDURE or FUNCTION
    pub routine_type: String,

    #[serde(default)]
    pub parameters: Vec<RoutineParameter>,

    #[serde(default)]
    pub return_type: Option<String>,
}

/// Read-only schema of one database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub database_name: String,

    #[serde(default)]
    pub tables: Vec<TableInfo>,

    #[serde(default)]
    pub routines: Vec<RoutineInfo>,
}

impl SchemaSnapshot {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            tables: Vec::new(),
            routines: Vec::new(),
        }
    }

    /// Add a table (builder style)
    pub fn with_table(mut self, table: TableInfo) -> Self {
        self.tables.push(table);
        self
    }

    /// Add a routine (builder style)
    pub fn with_routine(mut self, routine: RoutineInfo) -> Self {
        self.routines.push(routine);
        self
    }

    /// Load a snapshot from its JSON form
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::ParseError(e.to_string()))
    }

    /// Load a snapshot from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, SchemaError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Find a table by optional schema and name (case-insensitive)
    ///
    /// An unqualified name matches any schema; the default schema wins ties.
    pub fn find_table(&self, schema: Option<&str>, name: &str) -> Option<&TableInfo> {
        match schema {
            Some(schema) => self.tables.iter().find(|t| {
                t.schema_name.eq_ignore_ascii_case(schema) && t.table_name.eq_ignore_ascii_case(name)
            }),
            None => {
                let mut candidates = self
                    .tables
                    .iter()
                    .filter(|t| t.table_name.eq_ignore_ascii_case(name));
                let first = candidates.next()?;
                if first.schema_name.eq_ignore_ascii_case(DEFAULT_SCHEMA) {
                    return Some(first);
                }
                candidates
                    .find(|t| t.schema_name.eq_ignore_ascii_case(DEFAULT_SCHEMA))
                    .or(Some(first))
            }
        }
    }

    /// Tables belonging to one schema
    pub fn tables_in_schema<'a>(&'a self, schema: &'a str) -> impl Iterator<Item = &'a TableInfo> {
        self.tables
            .iter()
            .filter(move |t| t.schema_name.eq_ignore_ascii_case(schema))
    }

    /// Distinct schema names, in first-seen order
    pub fn schema_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let all = self
            .tables
            .iter()
            .map(|t| t.schema_name.as_str())
            .chain(self.routines.iter().map(|r| r.schema_name.as_str()));
        for name in all {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }
        names
    }

    /// All table names (unqualified)
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table_name.as_str()).collect()
    }

    /// Find a routine by optional schema and name (case-insensitive)
    pub fn find_routine(&self, schema: Option<&str>, name: &str) -> Option<&RoutineInfo> {
        self.routines.iter().find(|r| {
            r.routine_name.eq_ignore_ascii_case(name)
                && schema.map_or(true, |s| r.schema_name.eq_ignore_ascii_case(s))
        })
    }
}

/// Snapshot loading errors
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new("Shop")
            .with_table(TableInfo::new(
                "sales",
                "Orders",
                vec![ColumnInfo::new("Id", "int").primary_key()],
            ))
            .with_table(TableInfo::new(
                "dbo",
                "Orders",
                vec![
                    ColumnInfo::new("Id", "int").primary_key(),
                    ColumnInfo::new("UserId", "int"),
                ],
            ))
    }

    #[test]
    fn unqualified_lookup_prefers_default_schema() {
        let snapshot = snapshot();
        let table = snapshot.find_table(None, "orders").unwrap();
        assert_eq!(table.schema_name, "dbo");

        let table = snapshot.find_table(Some("SALES"), "Orders").unwrap();
        assert_eq!(table.schema_name, "sales");

        assert!(snapshot.find_table(Some("hr"), "Orders").is_none());
    }

    #[test]
    fn ordinal_positions_are_assigned() {
        let snapshot = snapshot();
        let table = snapshot.find_table(Some("dbo"), "Orders").unwrap();
        assert_eq!(table.column_names(), vec!["Id", "UserId"]);
        assert_eq!(table.columns[1].ordinal_position, 2);
        assert!(table.find_column("userid").is_some());
    }

    #[test]
    fn schema_names_are_distinct() {
        assert_eq!(snapshot().schema_names(), vec!["sales", "dbo"]);
    }

    #[test]
    fn load_from_camel_case_json() {
        let json = r#"{
            "databaseName": "Shop",
            "tables": [{
                "schemaName": "dbo",
                "tableName": "Users",
                "tableType": "BASE TABLE",
                "columns": [{
                    "name": "Id",
                    "dataType": "int",
                    "isNullable": false,
                    "isPrimaryKey": true,
                    "isIdentity": true,
                    "ordinalPosition": 1
                }]
            }],
            "routines": [{
                "schemaName": "dbo",
                "routineName": "usp_GetUser",
                "routineType": "PROCEDURE",
                "parameters": [{ "name": "@Id", "dataType": "int" }]
            }]
        }"#;

        let snapshot = SchemaSnapshot::from_json_str(json).unwrap();
        assert_eq!(snapshot.database_name, "Shop");
        assert!(snapshot.find_table(None, "users").unwrap().columns[0].is_identity);
        assert_eq!(
            snapshot.find_routine(None, "USP_GETUSER").unwrap().parameters.len(),
            1
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SchemaSnapshot::from_json_str("{").unwrap_err();
        assert!(matches!(err, SchemaError::ParseError(_)));
    }
}
