//! sqlsense Language Server Protocol implementation
//!
//! This crate puts the text-intelligence engine behind an editor, so that
//! diagnostics, completions and "Run" lenses follow the buffer as it is typed.
//!
//! ## Features
//!
//! - **Diagnostics**: Syntax and schema findings, published after a debounce
//! - **Completion**: Tables, columns, schema objects, routines and keywords
//!   chosen by what the cursor position expects
//! - **Code lenses**: One "Run" lens per statement, carrying the statement text
//!
//! ## Usage
//!
//! The LSP server is started as a binary that communicates via stdin/stdout:
//!
//! ```bash
//! sqlsense-lsp
//! ```
//!
//! `sqlsense.toml` and the schema snapshot it names are read from the
//! workspace root on startup and again whenever a document is saved.

mod backend;
mod convert;

pub use backend::Backend;
pub use convert::RUN_STATEMENT_COMMAND;
