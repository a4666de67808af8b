//! Source location tracking and diagnostic snippets

use std::fmt;

/// A span representing a byte range in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the start of the span
    pub start: u32,
    /// Byte offset of the end of the span (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span from start and end byte offsets
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Length of the span in bytes
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns true if the span is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Source location with line and column information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// 1-indexed line number
    pub line: u32,
    /// 1-indexed column number (in characters, not bytes)
    pub column: u32,
}

impl Location {
    /// Create a new location
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column locations
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Build a line index from source code
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a line/column location
    #[must_use]
    pub fn location(&self, source: &str, offset: u32) -> Location {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line] as usize;
        let end = (offset as usize).min(source.len());
        let column = source
            .get(line_start..end)
            .map_or(1, |s| s.chars().count() + 1);
        Location {
            line: (line + 1) as u32,
            column: column as u32,
        }
    }

    /// Byte range of a 0-indexed line, without its newline
    #[must_use]
    pub fn line_range(&self, source: &str, line: usize) -> Option<(usize, usize)> {
        let start = *self.line_starts.get(line)? as usize;
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(source.len(), |&next| next as usize - 1);
        Some((start, end.max(start)))
    }

    /// Get the number of lines
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Most lines a snippet shows above the error line
const MAX_CONTEXT_LINES: u32 = 2;

/// Render the source window between `window_start` and the error offset.
///
/// The output lists every line from the one holding `window_start` (capped to
/// [`MAX_CONTEXT_LINES`] lines of context) down to the error line, followed by
/// a caret under the error column:
///
/// ```text
///  2 | let x = 1;
///  3 | let y = @;
///    |         ^
/// ```
#[must_use]
pub fn render_snippet(source: &str, window_start: usize, error_offset: usize) -> String {
    let index = LineIndex::new(source);
    let error_offset = error_offset.min(source.len());
    let at = index.location(source, error_offset as u32);
    let first = index
        .location(source, window_start.min(error_offset) as u32)
        .line
        .max(at.line.saturating_sub(MAX_CONTEXT_LINES))
        .max(1);

    let gutter = at.line.to_string().len();
    let mut out = String::new();
    for line in first..=at.line {
        let Some((start, end)) = index.line_range(source, (line - 1) as usize) else {
            break;
        };
        let text = source[start..end].trim_end_matches('\r');
        out.push_str(&format!(" {line:>gutter$} | {text}\n"));
    }
    out.push_str(&format!(
        " {:>gutter$} | {}^",
        "",
        " ".repeat(at.column.saturating_sub(1) as usize)
    ));
    out
}
