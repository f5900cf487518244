//! SQL text intelligence
//!
//! This crate handles:
//! - Splitting buffers into batches and statements
//! - Parsing with a ladder of normalizations and dialects
//! - Resolving table aliases, CTEs and derived tables
//! - Classifying what should be completed at the cursor
//! - Validating table and column references against a schema snapshot
//! - Locating the statement under the cursor

pub mod ast;
pub mod completion;
pub mod locator;
pub mod normalize;
pub mod parser;
pub mod references;
pub mod segmenter;
pub mod suggest;
pub mod text;
pub mod validator;
pub mod visitor;

pub use completion::{classify, Classifier, CompletionContext};
pub use locator::{locate, statement_spans, Locator, StatementSpan};
pub use parser::{ParseError, ParseStrategy, ParsedSql, SqlParser};
pub use references::{AliasBinding, References, SchemaKind, TableRef};
pub use segmenter::{split_batches, split_statements, Batch, Segmenter, StatementPiece};
pub use validator::{validate, Validator};
