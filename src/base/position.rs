/// Position tracking for tokens, statements and diagnostics
///
/// Stores source locations (line/character) for LSP features like
/// go-to-definition, references and diagnostics.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A position in source code (0-indexed, character based)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Position shifted right by `count` characters on the same line
    pub fn offset(self, count: u32) -> Self {
        Self {
            line: self.line,
            character: self.character + count,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.character + 1)
    }
}

/// A range in source code (0-indexed, end exclusive)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Create a range from line/character coordinates
    pub fn from_coords(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self {
            start: Position::new(start_line, start_char),
            end: Position::new(end_line, end_char),
        }
    }

    /// The empty range at the start of a document.
    ///
    /// Used for diagnostics that have no source location, such as
    /// failures while importing default libraries.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Create a single-line range starting at `start` spanning `len` characters
    pub fn at(start: Position, len: u32) -> Self {
        Self {
            start,
            end: start.offset(len),
        }
    }

    /// Check if a position falls within this range (end inclusive, as editors expect for cursors)
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// Check if another range lies completely within this one
    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest range covering both ranges
    pub fn extend(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A range inside a specific source file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub source: Arc<str>,
    pub range: Range,
}

impl Location {
    pub fn new(source: impl Into<Arc<str>>, range: Range) -> Self {
        Self {
            source: source.into(),
            range,
        }
    }
}
