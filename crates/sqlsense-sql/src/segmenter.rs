//! Lexical segmentation into batches and statements
//!
//! A batch ends at a line holding only the batch separator (`GO` by default).
//! Within a batch, statements end at semicolons that are outside string
//! literals, quoted or bracketed identifiers, and comments.

use crate::text::{is_blank_sql, mask_text, Mask};
use sqlsense_core::Config;

/// A region of the buffer between batch separator lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Batch text, untrimmed so line arithmetic stays exact
    pub text: String,

    /// 1-based line of the first batch line in the original buffer
    pub start_line: usize,

    /// Byte offset of the batch in the original buffer
    pub offset: usize,
}

/// One statement inside a batch, with byte offsets relative to the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementPiece {
    /// Statement text, trimmed, without its terminator
    pub text: String,

    /// Byte offset of the first character of `text`
    pub start: usize,

    /// Byte offset just past the last character of `text`
    pub end: usize,

    /// Whether a `;` closed the statement
    pub terminated: bool,
}

/// Splits buffers on a configurable batch separator
#[derive(Debug, Clone)]
pub struct Segmenter {
    separator: String,
}

impl Segmenter {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.batch_separator.clone())
    }

    /// Whether a masked line is a separator line (`GO` or `GO <count>`)
    pub(crate) fn is_separator_line(&self, masked_line: &str) -> bool {
        let trimmed = masked_line.trim();
        let Some(head) = trimmed.get(..self.separator.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(&self.separator) {
            return false;
        }
        let rest = &trimmed[self.separator.len()..];
        rest.is_empty()
            || (rest.starts_with(char::is_whitespace)
                && rest.trim().chars().all(|c| c.is_ascii_digit()))
    }

    /// Split a buffer into non-empty batches
    pub fn split_batches(&self, text: &str) -> Vec<Batch> {
        let masked = mask_text(text, Mask::LiteralsAndIdentifiers);
        let mut batches = Vec::new();
        let mut batch_start: Option<(usize, usize)> = None;
        let mut offset = 0;

        let push = |batches: &mut Vec<Batch>, from: usize, to: usize, line: usize| {
            let body = text[from..to].trim_end_matches(['\n', '\r']);
            if !is_blank_sql(body) {
                batches.push(Batch {
                    text: body.to_string(),
                    start_line: line,
                    offset: from,
                });
            }
        };

        for (idx, masked_line) in masked.split('\n').enumerate() {
            let line_start = offset;
            offset += masked_line.len() + 1;

            if self.is_separator_line(masked_line) {
                if let Some((from, line)) = batch_start.take() {
                    push(&mut batches, from, line_start, line);
                }
            } else if batch_start.is_none() {
                batch_start = Some((line_start, idx + 1));
            }
        }

        if let Some((from, line)) = batch_start {
            push(&mut batches, from, text.len(), line);
        }

        batches
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new("GO")
    }
}

/// Split a buffer on standalone `GO` lines
pub fn split_batches(text: &str) -> Vec<Batch> {
    Segmenter::default().split_batches(text)
}

/// Split one batch into statements with their offsets
pub fn statement_pieces(batch: &str) -> Vec<StatementPiece> {
    let masked = mask_text(batch, Mask::LiteralsAndIdentifiers);
    let mut pieces = Vec::new();
    let mut from = 0;

    let mut push = |from: usize, to: usize, terminated: bool| {
        let raw = &batch[from..to];
        if is_blank_sql(raw) {
            return;
        }
        let lead = raw.len() - raw.trim_start().len();
        let text = raw.trim();
        pieces.push(StatementPiece {
            text: text.to_string(),
            start: from + lead,
            end: from + lead + text.len(),
            terminated,
        });
    };

    for (i, b) in masked.bytes().enumerate() {
        if b == b';' {
            push(from, i, true);
            from = i + 1;
        }
    }
    if from < batch.len() {
        push(from, batch.len(), false);
    }

    pieces
}

/// Split one batch into raw statement strings
pub fn split_statements(batch: &str) -> Vec<String> {
    statement_pieces(batch).into_iter().map(|piece| piece.text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batches_split_on_go_lines() {
        let text = "SELECT 1;\nGO\nSELECT 2;\n  go  \n\nSELECT 3";
        let batches = split_batches(text);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].text, "SELECT 1;");
        assert_eq!(batches[0].start_line, 1);
        assert_eq!(batches[1].text, "SELECT 2;");
        assert_eq!(batches[1].start_line, 3);
        assert_eq!(batches[2].start_line, 5);
        assert_eq!(batches[2].text.trim(), "SELECT 3");
    }

    #[test]
    fn go_with_count_is_a_separator() {
        let batches = split_batches("INSERT INTO t VALUES (1)\nGO 5\nSELECT 1");
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].start_line, 3);
    }

    #[test]
    fn go_inside_a_literal_or_comment_is_not_a_separator() {
        let text = "SELECT '\nGO\n' AS x\n/*\nGO\n*/\nSELECT 2";
        let batches = split_batches(text);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].text, text);
    }

    #[test]
    fn empty_batches_are_skipped() {
        let batches = split_batches("GO\n\nGO\n-- nothing here\nGO\nSELECT 1");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start_line, 6);
    }

    #[test]
    fn custom_separator() {
        let segmenter = Segmenter::new("BATCH");
        let batches = segmenter.split_batches("SELECT 1\nbatch\nSELECT 2\nGO");
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].text, "SELECT 2\nGO");
    }

    #[test]
    fn statements_split_on_terminators() {
        assert_eq!(
            split_statements("SELECT 1; SELECT 2;\nSELECT 3"),
            vec!["SELECT 1", "SELECT 2", "SELECT 3"]
        );
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn quoted_semicolons_do_not_split() {
        assert_eq!(
            split_statements("SELECT 'Hello; World' AS message;"),
            vec!["SELECT 'Hello; World' AS message"]
        );
        assert_eq!(
            split_statements("SELECT [a;b], \"c;d\", 'it''s;' FROM t; -- x;\nSELECT 2"),
            vec!["SELECT [a;b], \"c;d\", 'it''s;' FROM t", "-- x;\nSELECT 2"]
        );
    }

    #[test]
    fn comment_only_pieces_are_dropped() {
        assert_eq!(
            split_statements("SELECT 1; /* trailing; note */ ;; -- end"),
            vec!["SELECT 1"]
        );
    }

    #[test]
    fn piece_offsets_point_into_the_batch() {
        let batch = "  SELECT 1 ;\n\n UPDATE t SET a = 1";
        let pieces = statement_pieces(batch);
        assert_eq!(pieces.len(), 2);
        assert_eq!(&batch[pieces[0].start..pieces[0].end], "SELECT 1");
        assert!(pieces[0].terminated);
        assert_eq!(&batch[pieces[1].start..pieces[1].end], "UPDATE t SET a = 1");
        assert!(!pieces[1].terminated);
    }
}
