//! Bracketed identifier rewriting
//!
//! Only the SQL Server dialect understands `[name]`. Before handing text to a
//! more permissive grammar the brackets are rewritten to bare identifiers, or
//! to the dialect's quote character when the name needs escaping.

use crate::text::{mask_text, Mask};
use regex::Regex;
use std::sync::OnceLock;

/// Words that cannot appear bare as identifiers in any supported dialect
const RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CASE", "CHECK",
    "COLUMN", "CONSTRAINT", "CREATE", "CROSS", "CURRENT", "DATABASE", "DATE", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXEC", "EXISTS", "FETCH", "FILTER", "FOR",
    "FOREIGN", "FROM", "FULL", "FUNCTION", "GROUP", "HAVING", "IN", "INDEX", "INNER", "INSERT",
    "INTERVAL", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OF",
    "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRIMARY", "PROCEDURE", "RANGE",
    "REFERENCES", "RIGHT", "ROW", "ROWS", "SCHEMA", "SELECT", "SET", "TABLE", "THEN", "TIME",
    "TIMESTAMP", "TO", "TOP", "UNION", "UNIQUE", "UPDATE", "USER", "USING", "VALUES", "VIEW",
    "WHEN", "WHERE", "WINDOW", "WITH",
];

/// Whether `name` must be quoted to survive as a single identifier
pub fn needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first.is_alphabetic() || first == '_') {
        return true;
    }
    if !chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#' | '@')) {
        return true;
    }
    RESERVED.iter().any(|word| word.eq_ignore_ascii_case(name))
}

/// Render the contents of a bracketed identifier for a non-bracket dialect
fn render(inner: &str, quote: char) -> String {
    let name = inner.replace("]]", "]");
    if needs_quoting(&name) {
        let escaped = name.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    } else {
        name
    }
}

/// Byte offset just past the `]` closing a bracket opened at `open`
fn closing_bracket(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == b']' {
            if bytes.get(i + 1) == Some(&b']') {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Rewrite every bracketed identifier outside literals and comments
pub fn normalize_identifiers(text: &str, quote: char) -> String {
    let masked = mask_text(text, Mask::Literals);
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while let Some(found) = masked[i..].find('[') {
        let open = i + found;
        let Some(close) = closing_bracket(text, open) else {
            break;
        };
        out.push_str(&text[copied..open]);
        out.push_str(&render(&text[open + 1..close - 1], quote));
        copied = close;
        i = close;
    }

    out.push_str(&text[copied..]);
    out
}

fn qualified_pair() -> &'static Regex {
    static PAIR: OnceLock<Regex> = OnceLock::new();
    PAIR.get_or_init(|| {
        Regex::new(r"\[((?:[^\]]|\]\])+)\]\s*\.\s*\[((?:[^\]]|\]\])+)\]")
            .expect("valid regex")
    })
}

/// Rewrite only `[schema].[table]` pairs, leaving other brackets untouched
pub fn normalize_qualified_names(text: &str, quote: char) -> String {
    let masked = mask_text(text, Mask::Literals);
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;

    for caps in qualified_pair().captures_iter(&masked) {
        let (Some(whole), Some(schema), Some(table)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        out.push_str(&text[copied..whole.start()]);
        out.push_str(&render(&text[schema.range()], quote));
        out.push('.');
        out.push_str(&render(&text[table.range()], quote));
        copied = whole.end();
    }

    out.push_str(&text[copied..]);
    out
}

/// Strip one layer of `[]`, `""` or backtick quoting from an identifier
pub fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    let pairs = [('[', ']'), ('"', '"'), ('`', '`')];
    for (open, close) in pairs {
        if ident.len() >= 2 && ident.starts_with(open) && ident.ends_with(close) {
            let inner = &ident[1..ident.len() - 1];
            let doubled = format!("{close}{close}");
            return inner.replace(&doubled, &close.to_string());
        }
    }
    ident.to_string()
}
