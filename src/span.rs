use proc_macro2::LineColumn;
use serde::{Deserialize, Serialize};

/// Byte span inside a source file.
///
/// Offsets are byte indices into the pristine buffer; `start` is inclusive,
/// `end` exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

/// Precomputed table of line start offsets for one source buffer.
///
/// `proc_macro2` spans report 1-based lines and 0-based character columns;
/// this index converts them back to byte offsets into the buffer the file
/// was parsed from.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Byte offset of a `proc_macro2` line/column position in `text`.
    ///
    /// The column counts characters, not bytes, so the line segment is walked
    /// char by char.
    pub fn offset(&self, text: &str, pos: LineColumn) -> usize {
        let line_start = self.line_starts[pos.line - 1];
        let line = &text[line_start..];
        let in_line = line
            .char_indices()
            .nth(pos.column)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        line_start + in_line
    }

    /// Byte range covered by a `proc_macro2` span in `text`.
    pub fn span_of(&self, text: &str, span: proc_macro2::Span) -> SourceSpan {
        SourceSpan {
            start: self.offset(text, span.start()),
            end: self.offset(text, span.end()),
        }
    }
}
