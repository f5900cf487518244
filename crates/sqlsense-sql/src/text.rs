//! Line/column bookkeeping and lexical masking
//!
//! Every position the engine reports is recovered from the original buffer,
//! so offsets computed on masked or rewritten copies must stay byte-aligned
//! with the text the user typed.

use sqlsense_core::Position;

/// Maps byte offsets to 1-based line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of a 1-based line without its terminator
    pub fn line_text(&self, line: usize) -> Option<&'a str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        Some(self.text[start..end].trim_end_matches('\r'))
    }

    /// Position of a byte offset; columns count characters
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self.text[line_start..offset].chars().count() + 1;
        Position::new(line_idx + 1, column)
    }

    /// Byte offset of a 1-based position; columns past the end of the line clamp to it
    pub fn offset(&self, line: usize, column: usize) -> Option<usize> {
        let line_text = self.line_text(line)?;
        let start = self.line_starts[line - 1];
        let within = line_text
            .char_indices()
            .nth(column.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(line_text.len());
        Some(start + within)
    }
}

/// Which lexical regions to blank out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
    /// Comments only
    Comments,
    /// String literals and comments
    Literals,
    /// String literals, comments, quoted and bracketed identifiers
    LiteralsAndIdentifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    LineComment,
    BlockComment(usize),
}

impl LexState {
    fn is_masked(self, mask: Mask) -> bool {
        match self {
            LexState::Code => false,
            LexState::LineComment | LexState::BlockComment(_) => true,
            LexState::SingleQuoted => mask != Mask::Comments,
            LexState::DoubleQuoted | LexState::Bracketed => mask == Mask::LiteralsAndIdentifiers,
        }
    }
}

/// Replace the masked regions with spaces, keeping newlines and byte offsets
///
/// Quotes and brackets are always tracked so a `--` inside a literal never
/// opens a comment, whichever regions end up blanked.
pub fn mask_text(text: &str, mask: Mask) -> String {
    scan(text, mask).0
}

/// True when the end of `text` sits inside a string literal or a comment
pub fn ends_in_literal_or_comment(text: &str) -> bool {
    matches!(
        scan(text, Mask::Comments).1,
        LexState::SingleQuoted | LexState::LineComment | LexState::BlockComment(_)
    )
}

fn scan(text: &str, mask: Mask) -> (String, LexState) {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = LexState::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        // Region the current bytes belong to, and how many bytes they span
        let (region, width, next_state) = match state {
            LexState::Code => match b {
                b'\'' => (LexState::SingleQuoted, 1, LexState::SingleQuoted),
                b'"' => (LexState::DoubleQuoted, 1, LexState::DoubleQuoted),
                b'[' => (LexState::Bracketed, 1, LexState::Bracketed),
                b'-' if next == Some(b'-') => (LexState::LineComment, 2, LexState::LineComment),
                b'/' if next == Some(b'*') => (LexState::BlockComment(1), 2, LexState::BlockComment(1)),
                _ => (LexState::Code, 1, LexState::Code),
            },
            LexState::SingleQuoted | LexState::DoubleQuoted | LexState::Bracketed => {
                let close = match state {
                    LexState::SingleQuoted => b'\'',
                    LexState::DoubleQuoted => b'"',
                    _ => b']',
                };
                if b != close {
                    (state, 1, state)
                } else if next == Some(close) {
                    // Doubled delimiter is an escaped literal character
                    (state, 2, state)
                } else {
                    (state, 1, LexState::Code)
                }
            }
            LexState::LineComment => {
                if b == b'\n' {
                    (LexState::Code, 1, LexState::Code)
                } else {
                    (state, 1, state)
                }
            }
            LexState::BlockComment(depth) => {
                if b == b'*' && next == Some(b'/') {
                    let after = if depth == 1 {
                        LexState::Code
                    } else {
                        LexState::BlockComment(depth - 1)
                    };
                    (state, 2, after)
                } else if b == b'/' && next == Some(b'*') {
                    (state, 2, LexState::BlockComment(depth + 1))
                } else {
                    (state, 1, state)
                }
            }
        };

        let end = (i + width).min(bytes.len());
        if region.is_masked(mask) {
            for byte in &mut out[i..end] {
                if *byte != b'\n' {
                    *byte = b' ';
                }
            }
        }
        state = next_state;
        i = end;
    }

    // Multi-byte characters are either untouched or blanked byte by byte,
    // so the buffer is still valid UTF-8.
    let masked =
        String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    (masked, state)
}

/// True when `text` holds nothing but whitespace and comments
pub fn is_blank_sql(text: &str) -> bool {
    mask_text(text, Mask::Comments).trim().is_empty()
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$')
}

/// Find `needle` in `haystack` case-insensitively at identifier boundaries
///
/// Both inputs are compared with ASCII lowercasing so byte offsets match the
/// original text.
pub fn find_word(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    let hay = haystack.to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();
    let needle_first = needle.chars().next().map(is_ident_char).unwrap_or(false);
    let needle_last = needle.chars().last().map(is_ident_char).unwrap_or(false);

    let mut start = from;
    while let Some(found) = hay.get(start..).and_then(|rest| rest.find(&needle)) {
        let at = start + found;
        let end = at + needle.len();
        let before_ok = !needle_first || !hay[..at].chars().last().map(is_ident_char).unwrap_or(false);
        let after_ok = !needle_last || !hay[end..].chars().next().map(is_ident_char).unwrap_or(false);
        if before_ok && after_ok {
            return Some(at);
        }
        start = at + needle[..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    None
}

/// Locate the literal text of an identifier the user typed
///
/// Tries the bracketed, alias-qualified-bracketed, alias-qualified-bare and
/// bare forms in that order, skipping string literals and comments. Returns
/// the byte offset and byte length of the match.
pub fn locate_identifier(text: &str, qualifier: Option<&str>, name: &str) -> Option<(usize, usize)> {
    locate_identifier_from(text, qualifier, name, 0, |_, _| true)
}

/// [`locate_identifier`] starting at byte `from`, keeping only matches that
/// `accept` allows
///
/// `accept` sees the literal-masked text and the match offset. Without a
/// qualifier, names that are one part of a dotted name are skipped.
pub fn locate_identifier_from<F>(
    text: &str,
    qualifier: Option<&str>,
    name: &str,
    from: usize,
    accept: F,
) -> Option<(usize, usize)>
where
    F: Fn(&str, usize) -> bool,
{
    let masked = mask_text(text, Mask::Literals);
    let bracketed = format!("[{}]", name);
    let mut forms = vec![bracketed.clone()];
    if let Some(qualifier) = qualifier {
        forms.push(format!("{}.{}", qualifier, bracketed));
        forms.push(format!("[{}].{}", qualifier, bracketed));
        forms.push(format!("{}.{}", qualifier, name));
        forms.push(format!("[{}].{}", qualifier, name));
    }
    forms.push(name.to_string());

    forms.iter().find_map(|form| {
        let step = form.chars().next().map_or(1, char::len_utf8);
        let mut start = from;
        while let Some(at) = find_word(&masked, form, start) {
            let dotted = qualifier.is_none() && is_dotted_part(&masked, at, at + form.len());
            if !dotted && accept(&masked, at) {
                return Some((at, form.len()));
            }
            start = at + step;
        }
        None
    })
}

/// Whether `text[start..end]` is joined to a neighbour by a dot
fn is_dotted_part(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].trim_end_matches(['[', '"']).chars().last();
    let after = text[end..].trim_start_matches([']', '"']).chars().next();
    before == Some('.') || after == Some('.')
}
