//! Integration tests for the text-intelligence engine

use pretty_assertions::assert_eq;
use sqlsense_core::{Config, DiagnosticCode, SchemaSnapshot, Severity};
use sqlsense_sql::references::alias_map;
use sqlsense_sql::segmenter::statement_pieces;
use sqlsense_sql::{
    classify, locate, split_batches, split_statements, statement_spans, validate, Classifier,
    CompletionContext, Locator, References, Validator,
};

const SCHEMA_JSON: &str = r#"{
  "databaseName": "Shop",
  "tables": [
    {
      "schemaName": "dbo",
      "tableName": "Users",
      "columns": [
        { "name": "Id", "dataType": "int", "isPrimaryKey": true, "ordinalPosition": 1 },
        { "name": "Name", "dataType": "nvarchar", "ordinalPosition": 2 },
        { "name": "Email", "dataType": "nvarchar", "isNullable": true, "ordinalPosition": 3 }
      ]
    },
    {
      "schemaName": "dbo",
      "tableName": "Orders",
      "columns": [
        { "name": "Id", "dataType": "int", "isPrimaryKey": true, "ordinalPosition": 1 },
        { "name": "UserId", "dataType": "int", "ordinalPosition": 2 },
        { "name": "Total", "dataType": "decimal", "ordinalPosition": 3 }
      ]
    }
  ]
}"#;

fn schema() -> SchemaSnapshot {
    SchemaSnapshot::from_json_str(SCHEMA_JSON).unwrap()
}

fn codes(text: &str) -> Vec<DiagnosticCode> {
    validate(text, Some(&schema()))
        .into_iter()
        .map(|d| d.code)
        .collect()
}

#[test]
fn end_to_end_editor_session() {
    let buffer = "SELECT 1;\nGO\nSELECT 2;";

    let span = locate(buffer, 3, 5).unwrap();
    assert_eq!(span.text, "SELECT 2");
    assert_eq!((span.start_line, span.end_line), (3, 3));

    assert!(matches!(
        classify("SELECT ", None),
        CompletionContext::Column { .. }
    ));
    assert_eq!(
        classify("FROM ", None),
        CompletionContext::Table {
            last_keyword: "FROM".to_string()
        }
    );
}

#[test]
fn locate_is_idempotent() {
    let buffer = "SELECT Id\nFROM Users;\n\nUPDATE Users SET Name = 'x' WHERE Id = 1;";
    for (line, column) in [(1, 3), (2, 6), (3, 1), (4, 10)] {
        assert_eq!(locate(buffer, line, column), locate(buffer, line, column));
    }
}

#[test]
fn cursor_inside_a_statement_is_contained_by_its_span() {
    let buffer = "SELECT Id, Name\n  FROM Users u\n  WHERE u.Id = 1;  SELECT 2\nGO\n\nDELETE FROM Orders WHERE Id = 3";
    let locator = Locator::new();

    for expected in statement_spans(buffer) {
        for line in expected.start_line..=expected.end_line {
            let last_column = buffer.lines().nth(line - 1).unwrap().chars().count() + 1;
            for column in 1..=last_column {
                if !expected.contains(line, column) {
                    continue;
                }
                let span = locator.locate(buffer, line, column).unwrap();
                assert_eq!(span, expected, "cursor {line}:{column}");
                assert!(span.contains(line, column));
            }
        }
    }
}

#[test]
fn locator_falls_back_when_the_batch_does_not_parse() {
    let buffer = "SELECT Id FROM Users WHERE Id = )\n\nSELECT Name\nFROM Users";
    let span = locate(buffer, 1, 4).unwrap();
    assert_eq!(span.text, "SELECT Id FROM Users WHERE Id = )");

    let span = locate(buffer, 4, 2).unwrap();
    assert_eq!(span.text, "SELECT Name\nFROM Users");
    assert_eq!((span.start_line, span.end_line), (3, 4));
}

#[test]
fn semicolons_in_literals_and_comments_do_not_split() {
    assert_eq!(
        split_statements("SELECT 'Hello; World' AS message;"),
        vec!["SELECT 'Hello; World' AS message".to_string()]
    );
    assert_eq!(
        split_statements("SELECT [a;b] FROM t -- trailing; comment\n/* ; */ WHERE 1 = 1"),
        vec!["SELECT [a;b] FROM t -- trailing; comment\n/* ; */ WHERE 1 = 1".to_string()]
    );

    let batches = split_batches("SELECT 'GO'\n/*\nGO\n*/\nSELECT 1\nGO\nSELECT 2");
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].start_line, 7);
}

#[test]
fn statements_rejoin_into_their_batch() {
    let batch = "SELECT 1;\n  INSERT INTO t VALUES ('a;b');\n\nDELETE FROM t";
    let rebuilt: Vec<String> = statement_pieces(batch)
        .into_iter()
        .map(|piece| {
            if piece.terminated {
                format!("{};", piece.text)
            } else {
                piece.text
            }
        })
        .collect();

    let squash = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    assert_eq!(squash(&rebuilt.join(" ")), squash(batch));
}

#[test]
fn alias_map_for_joined_tables() {
    let map = alias_map("SELECT * FROM dbo.Users u JOIN Orders o ON u.Id = o.UserId");

    let mut resolved: Vec<(String, String, String)> = map
        .iter()
        .map(|(alias, binding)| (alias.clone(), binding.schema.clone(), binding.table.clone()))
        .collect();
    resolved.sort();

    assert_eq!(
        resolved,
        vec![
            ("o".to_string(), "dbo".to_string(), "Orders".to_string()),
            ("u".to_string(), "dbo".to_string(), "Users".to_string()),
        ]
    );
}

#[test]
fn cte_survives_an_odd_tail() {
    let refs = References::extract(";WITH cte_name AS (SELECT * FROM t) SELECT * FROM cte_n");
    assert!(refs.ctes().contains_key("cte_name"));
    assert!(refs.alias_map().contains_key("cte_name"));

    let refs = References::extract(";WITH cte_name AS (SELECT * FROM t) SELECT * FROM ");
    assert!(refs.ctes().contains_key("cte_name"));
}

#[test]
fn validation_without_a_schema_checks_syntax_only() {
    assert!(validate("SELECT * FROM x", None).is_empty());

    let diagnostics = validate("SELECT * FROM", None);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, DiagnosticCode::SyntaxError);
    assert_eq!(diagnostics[0].severity, Severity::Error);
}

#[test]
fn missing_table_suggests_the_closest_name() {
    let diagnostics = validate("SELECT * FROM dbo.Usrs", Some(&schema()));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, DiagnosticCode::TableNotFound);
    assert_eq!(diagnostics[0].suggestion.as_deref(), Some("Users"));
    assert!(diagnostics[0].message.contains("Users"));
}

#[test]
fn ambiguous_column_names_both_tables() {
    let diagnostics = validate("SELECT Id FROM Users, Orders", Some(&schema()));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, DiagnosticCode::AmbiguousColumn);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert!(diagnostics[0].message.contains("dbo.Users"));
    assert!(diagnostics[0].message.contains("dbo.Orders"));
}

#[test]
fn update_without_where_is_flagged_at_the_keyword() {
    let diagnostics = validate("UPDATE Users SET Name = 'x'", Some(&schema()));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, DiagnosticCode::UpdateWithoutWhere);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        (diagnostics[0].start_line(), diagnostics[0].start_column()),
        (1, 1)
    );

    assert!(codes("UPDATE Users SET Name = 'x' WHERE Id = 1").is_empty());
}

#[test]
fn diagnostics_point_into_later_batches() {
    let buffer = "SELECT Id FROM Users;\nGO\nSELECT Nmae FROM Users;\nSELECT Total FROM Orders o WHERE o.UserId = 1;";
    let diagnostics = validate(buffer, Some(&schema()));

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, DiagnosticCode::ColumnNotFound);
    assert_eq!(
        (diagnostics[0].start_line(), diagnostics[0].start_column()),
        (3, 8)
    );
    assert_eq!(diagnostics[0].suggestion.as_deref(), Some("Name"));
}

#[test]
fn recursive_ctes_and_repeated_names_are_positioned_exactly() {
    let buffer = "WITH tree AS (\n\
                  \x20   SELECT Id, UserId FROM Orders\n\
                  \x20   UNION ALL\n\
                  \x20   SELECT o.Id, o.UserId FROM Orders o JOIN tree t ON t.Id = o.UserId\n\
                  )\n\
                  SELECT Id FROM tree;\n\
                  GO\n\
                  SELECT u.Id, Id\n\
                  FROM Users u JOIN Orders o ON o.UserId = u.Id\n\
                  WHERE Nope = 1 OR Nope = 2;";
    let diagnostics = validate(buffer, Some(&schema()));

    let ranges: Vec<_> = diagnostics
        .iter()
        .map(|d| (d.code, d.start_line(), d.start_column(), d.end_column()))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (DiagnosticCode::AmbiguousColumn, 8, 14, 16),
            (DiagnosticCode::ColumnNotFound, 10, 7, 11),
            (DiagnosticCode::ColumnNotFound, 10, 19, 23),
        ]
    );
}

#[test]
fn config_drives_every_component() {
    let config = Config::from_toml(
        r#"
batch_separator = "RUN"

[completion]
known_schemas = ["dbo", "sales"]

[validation]
missing_where = false
"#,
    )
    .unwrap();

    let diagnostics = Validator::from_config(&config).validate(
        "DELETE FROM Orders\nRUN\nSELECT Id FROM Users",
        Some(&schema()),
    );
    assert!(diagnostics.is_empty());

    let spans = Locator::from_config(&config).statement_spans("SELECT 1\nRUN\nSELECT 2");
    assert_eq!(spans.len(), 2);

    let classifier = Classifier::from_config(&config);
    assert_eq!(
        classifier.classify("SELECT * FROM sales.", None),
        CompletionContext::Schema {
            schema: "sales".to_string(),
            partial: String::new(),
        }
    );
}
