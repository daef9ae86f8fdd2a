//! Source position tracking shared by the lexer, parser and descriptor tree.

use std::fmt;
use std::rc::Rc;

/// A single point in a source file: 1-based line/column, 0-based byte offset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub file_name: Rc<str>,
    pub line: u32,
    pub column: u32,
    pub byte_offset: u32,
}

impl Position {
    pub fn start_of(file_name: Rc<str>) -> Self {
        Position {
            file_name,
            line: 1,
            column: 1,
            byte_offset: 0,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::start_of(Rc::from(""))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_name, self.line, self.column)
    }
}

/// A half-open `[start, end)` range in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Span { start, end }
    }

    /// A zero-width span at `pos`, used for synthetic nodes (e.g. map-entry
    /// messages synthesized by the validator) that have no source text.
    pub fn point(pos: Position) -> Self {
        Span {
            end: pos.clone(),
            start: pos,
        }
    }

    pub fn join(&self, other: &Span) -> Span {
        Span {
            start: self.start.clone(),
            end: other.end.clone(),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Tracks `{line, column, byte_offset}` while scanning a byte stream.
///
/// Tabs advance the column by one, matching `spec.md` §4.1: column reporting
/// is a count of source characters, not a rendered terminal width. `\r`,
/// `\n` and `\r\n` all count as a single line break.
pub struct PositionTracker {
    file_name: Rc<str>,
    line: u32,
    column: u32,
    byte_offset: u32,
    pending_cr: bool,
}

impl PositionTracker {
    pub fn new(file_name: Rc<str>) -> Self {
        PositionTracker {
            file_name,
            line: 1,
            column: 1,
            byte_offset: 0,
            pending_cr: false,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            file_name: self.file_name.clone(),
            line: self.line,
            column: self.column,
            byte_offset: self.byte_offset,
        }
    }

    /// Advances the tracker past a single byte already consumed from the
    /// stream. Must be called once per byte, in stream order, including for
    /// bytes that form the tail of a multi-byte UTF-8 sequence (continuation
    /// bytes do not themselves move the column).
    pub fn advance_byte(&mut self, byte: u8) {
        self.byte_offset += 1;
        // UTF-8 continuation bytes (10xxxxxx) are part of the previous
        // column's character; only the leading byte of a sequence counts.
        let is_continuation = byte & 0b1100_0000 == 0b1000_0000;

        match byte {
            b'\n' => {
                if self.pending_cr {
                    // second half of a \r\n pair: already counted as one line break
                    self.pending_cr = false;
                } else {
                    self.line += 1;
                    self.column = 1;
                }
            }
            b'\r' => {
                self.line += 1;
                self.column = 1;
                self.pending_cr = true;
            }
            _ => {
                self.pending_cr = false;
                if !is_continuation {
                    self.column += 1;
                }
            }
        }
    }
}
