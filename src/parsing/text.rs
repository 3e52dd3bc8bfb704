//! Character-based splitting with newline snapping.
//!
//! The character splitter is both a standalone fallback and the
//! subdivision strategy the structural splitter applies to oversized
//! leaves. It works in byte offsets over UTF-8 text and always snaps
//! to char boundaries.

/// A half-open byte range `[start, end)` within a file's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

/// Precomputed newline positions for O(log n) line lookups.
pub struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let newlines = text
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| (b == b'\n').then_some(i))
            .collect();
        Self { newlines }
    }

    /// 1-based line containing the byte at `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        self.newlines.partition_point(|&p| p < offset) as u32 + 1
    }

    /// 1-based inclusive line range for a span, ignoring a trailing
    /// run of newlines so `"a\nb\n"` spans lines 1..=2, not 1..=3.
    pub fn line_range(&self, text: &str, span: TextSpan) -> (u32, u32) {
        let start_line = self.line_of(span.start);
        let bytes = text.as_bytes();
        let mut last = span.end.saturating_sub(1);
        while last > span.start && bytes[last] == b'\n' {
            last -= 1;
        }
        let end_line = self.line_of(last).max(start_line);
        (start_line, end_line)
    }
}

/// Pure text splitter: fixed size budget with overlap, chunk starts
/// snapped to line starts.
#[derive(Debug, Clone, Copy)]
pub struct CharSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl CharSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            // An overlap as large as the budget would stall the scan.
            overlap: overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split the whole text into spans.
    pub fn spans(&self, text: &str) -> Vec<TextSpan> {
        self.spans_in(text, 0, text.len())
    }

    /// Split the byte range `[from, to)` of `text` into spans.
    ///
    /// Used by the structural splitter to subdivide an oversized node
    /// while keeping absolute offsets.
    pub fn spans_in(&self, text: &str, from: usize, to: usize) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        let mut start = from;

        while start < to {
            let mut end = (start + self.chunk_size).min(to);
            while end > start && !text.is_char_boundary(end) {
                end -= 1;
            }
            if end == start {
                // A single char wider than the budget; take it whole.
                end = (start + self.chunk_size).min(to);
                while end < to && !text.is_char_boundary(end) {
                    end += 1;
                }
            }
            spans.push(TextSpan { start, end });
            if end >= to {
                break;
            }

            // Next chunk begins at the line start at or before the
            // overlap point; a line longer than the budget degrades to
            // back-to-back spans.
            let mut candidate = end.saturating_sub(self.overlap);
            while candidate > start && !text.is_char_boundary(candidate) {
                candidate -= 1;
            }
            let snapped = match text[..candidate].rfind('\n') {
                Some(i) => i + 1,
                None => from,
            };
            start = if snapped > start { snapped } else { end };
        }

        spans
    }
}
