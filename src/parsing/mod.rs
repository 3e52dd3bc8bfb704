//! Code splitting: structural where a parser exists, characters
//! everywhere else.
//!
//! The [`Splitter`] is the single entry point used by the indexer.
//! Structural splitting is preferred; when the parser is unavailable
//! or the parse fails, the whole file silently routes through the
//! character splitter and its chunks carry `splitter: fallback`.

mod ast;
mod language;
mod text;

pub use language::Language;
pub use text::{CharSplitter, LineIndex, TextSpan};

use crate::types::Chunk;
use std::collections::BTreeMap;
use tracing::trace;

/// Metadata key recording which strategy produced a chunk.
pub const SPLITTER_KEY: &str = "splitter";
/// Metadata key recording the detected language tag.
pub const LANGUAGE_KEY: &str = "language";

/// Turns a file's text into chunks carrying 1-based line ranges.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new(2500, 300)
    }
}

impl Splitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    /// Split a file into chunks.
    ///
    /// `relative_path` must be forward-slash normalized; line numbers
    /// are 1-based inclusive and every chunk has non-empty content.
    pub fn split(&self, text: &str, relative_path: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let language = Language::from_path(std::path::Path::new(relative_path));
        let structural = language.and_then(|lang| {
            ast::split_tree(
                text,
                lang,
                relative_path,
                self.chunk_size,
                self.chunk_overlap,
            )
        });

        let (spans, splitter_kind) = match structural {
            Some(spans) => (spans, "ast"),
            None => {
                trace!(path = relative_path, "structural split unavailable, using character fallback");
                let splitter = CharSplitter::new(self.chunk_size, self.chunk_overlap);
                (splitter.spans(text), "fallback")
            }
        };

        let index = LineIndex::new(text);
        let mut chunks = Vec::with_capacity(spans.len());
        for span in spans {
            let content = &text[span.start..span.end];
            if content.trim().is_empty() {
                continue;
            }
            let (start_line, end_line) = index.line_range(text, span);
            let mut metadata = BTreeMap::new();
            metadata.insert(SPLITTER_KEY.to_string(), splitter_kind.to_string());
            if let Some(lang) = language {
                metadata.insert(LANGUAGE_KEY.to_string(), lang.tag().to_string());
            }
            chunks.push(Chunk::new(
                relative_path.to_string(),
                start_line,
                end_line,
                content.to_string(),
                metadata,
            ));
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_no_chunks() {
        let splitter = Splitter::default();
        assert!(splitter.split("", "src/lib.rs").is_empty());
    }

    #[test]
    fn test_rust_file_uses_structural_splitter() {
        let splitter = Splitter::new(64, 0);
        let text = "\
fn alpha() {
    let a = 1;
}

fn beta() {
    let b = 2;
}
";
        let chunks = splitter.split(text, "src/lib.rs");
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.metadata.get(SPLITTER_KEY).unwrap(), "ast");
            assert_eq!(chunk.metadata.get(LANGUAGE_KEY).unwrap(), "rust");
            assert!(chunk.start_line >= 1);
            assert!(chunk.start_line <= chunk.end_line);
            assert!(!chunk.content.is_empty());
        }
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let splitter = Splitter::default();
        let chunks = splitter.split("plain text\nmore text\n", "notes.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.get(SPLITTER_KEY).unwrap(), "fallback");
        assert!(chunks[0].metadata.get(LANGUAGE_KEY).is_none());
    }

    #[test]
    fn test_broken_source_falls_back_per_file() {
        let splitter = Splitter::default();
        let chunks = splitter.split("fn broken( {{{{ nope", "bad.rs");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.get(SPLITTER_KEY).unwrap(), "fallback");
        // Language is still known even when the parse failed.
        assert_eq!(chunks[0].metadata.get(LANGUAGE_KEY).unwrap(), "rust");
    }

    #[test]
    fn test_chunks_reproduce_file_by_line_ranges() {
        let splitter = Splitter::new(80, 0);
        let text: String = (1..=30)
            .map(|i| format!("fn f{i}() {{ /* body {i} */ }}\n"))
            .collect();
        let chunks = splitter.split(&text, "src/gen.rs");
        assert!(chunks.len() > 1);

        // De-overlapped by line range, the chunks cover every line.
        let lines: Vec<&str> = text.lines().collect();
        let mut covered = vec![false; lines.len()];
        for chunk in &chunks {
            for line in chunk.start_line..=chunk.end_line {
                covered[(line - 1) as usize] = true;
            }
        }
        assert!(covered.iter().all(|&c| c), "every line must be covered");
    }

    #[test]
    fn test_chunk_extensions_are_normalized() {
        let splitter = Splitter::default();
        let chunks = splitter.split("# Title\n\nbody\n", "README.MD");
        assert_eq!(chunks[0].file_extension, ".md");
    }
}
