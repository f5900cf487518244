//! Statement-at-cursor location
//!
//! The parsed path trusts the semicolon split only when it agrees with the
//! parser on the statement count. When the cursor's batch does not parse, a
//! line scanner isolates the statement from blank lines, separator lines,
//! terminators and statement-leading keywords.

use crate::parser::SqlParser;
use crate::segmenter::{statement_pieces, Batch, Segmenter};
use crate::text::{is_blank_sql, mask_text, LineIndex, Mask};
use sqlsense_core::Config;
use tracing::debug;

/// Keywords that start a new statement at paren depth zero
const LEADING_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "WITH", "CREATE", "ALTER", "DROP",
    "TRUNCATE", "EXEC", "EXECUTE", "DECLARE", "USE", "PRINT",
];

/// One statement with its position in the buffer
///
/// Columns are 1-based; `end_column` is the column just past the last
/// character of `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementSpan {
    /// Statement text, trimmed, without its terminator
    pub text: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,

    /// Index of the statement within its batch
    pub index: usize,
}

impl StatementSpan {
    /// Whether a cursor falls inside the span, end column included
    pub fn contains(&self, line: usize, column: usize) -> bool {
        let after_start = line > self.start_line
            || (line == self.start_line && column >= self.start_column);
        let before_end =
            line < self.end_line || (line == self.end_line && column <= self.end_column);
        after_start && before_end
    }
}

/// A span with the absolute byte range it came from
struct Located {
    start: usize,
    end: usize,
    index: usize,
}

/// Finds the statement a cursor belongs to
#[derive(Debug, Clone, Default)]
pub struct Locator {
    parser: SqlParser,
    segmenter: Segmenter,
}

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            parser: SqlParser::from_config(config),
            segmenter: Segmenter::from_config(config),
        }
    }

    /// Statement under a 1-based cursor
    ///
    /// When the cursor lies inside a statement, the returned span
    /// [`contains`](StatementSpan::contains) it. A cursor outside every
    /// statement still gets one: a blank or separator line between two
    /// statements resolves to the preceding statement. A cursor before the
    /// first statement resolves to the first and a cursor past the end to the
    /// last. In those cases the span does not contain the cursor.
    ///
    /// `None` when no non-blank statement can be isolated.
    pub fn locate(&self, text: &str, line: usize, column: usize) -> Option<StatementSpan> {
        let index = LineIndex::new(text);
        let cursor = index.offset(line, column)?;

        let batches = self.segmenter.split_batches(text);
        let batch = cursor_batch(&batches, &index, line)?;

        match self.batch_spans(batch) {
            Some(spans) => {
                let chosen = spans
                    .iter()
                    .find(|span| span.start <= cursor && cursor <= span.end)
                    .or_else(|| spans.iter().rev().find(|span| span.end < cursor))
                    .or_else(|| spans.first())?;
                Some(to_span(text, &index, chosen))
            }
            None => {
                debug!(line, column, "locator fell back to the line scanner");
                self.scan_lines(text, &index, line, cursor)
            }
        }
    }

    /// Every statement in the buffer, in order
    pub fn statement_spans(&self, text: &str) -> Vec<StatementSpan> {
        let index = LineIndex::new(text);
        self.segmenter
            .split_batches(text)
            .iter()
            .flat_map(|batch| self.batch_spans(batch).unwrap_or_else(|| piece_spans(batch)))
            .map(|located| to_span(text, &index, &located))
            .collect()
    }

    /// Spans of a batch aligned with its parse; `None` when it does not parse
    fn batch_spans(&self, batch: &Batch) -> Option<Vec<Located>> {
        let parsed = self.parser.parse_strict(&batch.text).ok()?;
        let pieces = piece_spans(batch);

        if pieces.len() == parsed.statement_count() {
            return Some(pieces);
        }

        // Bodies with inner semicolons: the whole batch is one statement
        let raw = batch.text.as_str();
        let lead = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim().trim_end_matches(';').trim_end();
        if trimmed.is_empty() {
            return None;
        }
        Some(vec![Located {
            start: batch.offset + lead,
            end: batch.offset + lead + trimmed.len(),
            index: 0,
        }])
    }

    /// Isolate a statement from line structure alone
    fn scan_lines(
        &self,
        text: &str,
        index: &LineIndex<'_>,
        line: usize,
        cursor: usize,
    ) -> Option<StatementSpan> {
        let masked = mask_text(text, Mask::LiteralsAndIdentifiers);
        let masked_line = |l: usize| {
            let start = index.offset(l, 1).unwrap_or(0);
            let len = index.line_text(l).map_or(0, str::len);
            &masked[start..start + len]
        };
        let line_end = |l: usize| {
            index.offset(l, 1).unwrap_or(0) + index.line_text(l).map_or(0, str::len)
        };
        let is_break = |l: usize| {
            let m = masked_line(l);
            m.trim().is_empty() || self.segmenter.is_separator_line(m)
        };

        if is_break(line) {
            return None;
        }

        // Walk back to a blank, separator or terminated line
        let mut start_line = line;
        while start_line > 1 {
            let prev = start_line - 1;
            if is_break(prev) || masked_line(prev).trim_end().ends_with(';') {
                break;
            }
            start_line = prev;
        }
        let mut start = index.offset(start_line, 1)?;
        if let Some(semi) = masked[start..cursor].rfind(';') {
            start += semi + 1;
        }
        for l in start_line + 1..=line {
            let line_start = index.offset(l, 1)?;
            if line_start > start
                && paren_depth(&masked[start..line_start]) == 0
                && starts_statement(masked_line(l))
            {
                start = line_start;
            }
        }

        // Walk forward to a terminator, break line or new statement
        let mut end = line_end(line);
        if let Some(semi) = masked[cursor..end].find(';') {
            end = cursor + semi;
        } else {
            let mut next = line + 1;
            while next <= index.line_count() && !is_break(next) {
                let line_start = index.offset(next, 1)?;
                if paren_depth(&masked[start..line_start]) == 0
                    && starts_statement(masked_line(next))
                {
                    break;
                }
                end = line_end(next);
                if let Some(semi) = masked[line_start..end].find(';') {
                    end = line_start + semi;
                    break;
                }
                next += 1;
            }
        }

        let raw = &text[start..end];
        if is_blank_sql(raw) {
            return None;
        }
        let lead = raw.len() - raw.trim_start().len();
        let located = Located {
            start: start + lead,
            end: start + lead + raw.trim().len(),
            index: 0,
        };
        Some(to_span(text, index, &located))
    }
}

/// Batch holding the cursor line, else the closest batch before it, else the first
fn cursor_batch<'b>(
    batches: &'b [Batch],
    index: &LineIndex<'_>,
    line: usize,
) -> Option<&'b Batch> {
    let containing = batches.iter().find(|batch| {
        let last_line = index.position(batch.offset + batch.text.len()).line;
        batch.start_line <= line && line <= last_line
    });
    containing
        .or_else(|| batches.iter().rev().find(|batch| batch.start_line <= line))
        .or_else(|| batches.first())
}

fn piece_spans(batch: &Batch) -> Vec<Located> {
    statement_pieces(&batch.text)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Located {
            start: batch.offset + piece.start,
            end: batch.offset + piece.end,
            index,
        })
        .collect()
}

fn to_span(text: &str, index: &LineIndex<'_>, located: &Located) -> StatementSpan {
    let start = index.position(located.start);
    let end = index.position(located.end);
    StatementSpan {
        text: text[located.start..located.end].to_string(),
        start_line: start.line,
        start_column: start.column,
        end_line: end.line,
        end_column: end.column,
        index: located.index,
    }
}

/// Open parentheses; stray closers never drive it negative
fn paren_depth(masked: &str) -> usize {
    masked.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth.saturating_sub(1),
        _ => depth,
    })
}

fn starts_statement(masked_line: &str) -> bool {
    let word: String = masked_line
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    LEADING_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(&word))
}

/// Statement under a cursor with the default configuration
pub fn locate(text: &str, line: usize, column: usize) -> Option<StatementSpan> {
    Locator::default().locate(text, line, column)
}

/// Every statement span with the default configuration
pub fn statement_spans(text: &str) -> Vec<StatementSpan> {
    Locator::default().statement_spans(text)
}
