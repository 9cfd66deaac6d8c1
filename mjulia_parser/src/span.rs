//! Byte-offset spans and line/column resolution.

use serde::{Deserialize, Serialize};

/// A half-open byte range into the original source, with resolved
/// line/column positions (1-based, as Julia reports them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A span covering both `self` and `other`.
    /// Keeps the line/column of whichever starts first.
    pub fn merge(self, other: Span) -> Span {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::new(0, 0, 1, 1)
    }
}

/// Maps byte offsets to line/column pairs.
///
/// Line starts are collected once up front so each lookup is a binary
/// search over the start table.
#[derive(Debug, Clone)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Resolve a byte offset to a (line, column) pair, both 1-based.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = offset - self.line_starts[line_idx];
        (line_idx as u32 + 1, col as u32 + 1)
    }

    /// Build a [`Span`] for a byte range.
    pub fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.position(start);
        Span::new(start, end, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_first_line() {
        let map = SourceMap::new("abc\ndef");
        assert_eq!(map.position(0), (1, 1));
        assert_eq!(map.position(2), (1, 3));
    }

    #[test]
    fn test_position_after_newline() {
        let map = SourceMap::new("abc\ndef");
        assert_eq!(map.position(4), (2, 1));
        assert_eq!(map.position(6), (2, 3));
    }

    #[test]
    fn test_merge_keeps_earliest_position() {
        let a = Span::new(4, 8, 2, 1);
        let b = Span::new(0, 3, 1, 1);
        let merged = a.merge(b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 8);
        assert_eq!(merged.line, 1);
    }
}
