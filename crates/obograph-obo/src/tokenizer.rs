//! Comment-aware line tokenizer.
//!
//! OBO trailing comments start with `!`, but `!` is also legal inside quoted
//! values (`synonym: "wow!" EXACT []`). A comment marker only counts when it
//! appears outside a double-quoted string.

use std::borrow::Cow;
use std::io::BufRead;

use crate::OboError;

pub const COMMENT_MARKER: char = '!';

/// Strip an unquoted trailing comment and surrounding whitespace.
///
/// Returns an empty slice for blank and comment-only lines. An unterminated
/// quote keeps the scanner "inside" for the rest of the line, which disables
/// comment stripping for that line.
pub fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            COMMENT_MARKER if !in_quotes => return line[..idx].trim(),
            _ => {}
        }
    }

    line.trim()
}

/// A non-empty logical line with its 1-based source line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub line_no: usize,
    pub text: String,
}

/// Iterator over the non-empty logical lines of a reader.
///
/// Lines that are not valid UTF-8 are decoded lossily (U+FFFD for each bad
/// sequence) and logged; one stray byte never costs the rest of the file.
pub struct LogicalLines<R> {
    reader: R,
    line_no: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> LogicalLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: Vec::new(),
        }
    }

    /// Number of physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> Iterator for LogicalLines<R> {
    type Item = Result<RawLine, OboError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let decoded = String::from_utf8_lossy(&self.buf);
                    if let Cow::Owned(_) = decoded {
                        tracing::warn!(line = self.line_no, "invalid UTF-8 replaced");
                    }
                    let text = strip_comment(&decoded);
                    if text.is_empty() {
                        continue;
                    }
                    return Some(Ok(RawLine {
                        line_no: self.line_no,
                        text: text.to_string(),
                    }));
                }
                Err(source) => {
                    return Some(Err(OboError::Io {
                        line: self.line_no + 1,
                        source,
                    }))
                }
            }
        }
    }
}
