//! Structural splitting using tree-sitter syntax trees.
//!
//! Chunks align to declaration boundaries: consecutive small top-level
//! nodes accumulate into one chunk up to the size budget, and nodes
//! wider than the budget are entered recursively so methods inside a
//! large impl or class land in their own chunks. Spans stay contiguous
//! so the chunk sequence covers the whole file.

use super::language::Language;
use super::text::{CharSplitter, TextSpan};
use tree_sitter::{Node, Parser};

/// Tree-sitter grammar for a language, honoring the tsx/jsx dialect
/// split that lives in the file extension rather than the language.
fn grammar(language: Language, relative_path: &str) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => {
            if relative_path.ends_with(".tsx") {
                Some(tree_sitter_typescript::LANGUAGE_TSX.into())
            } else {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
        }
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Markdown => None,
    }
}

/// Split a source file along its syntax tree.
///
/// Returns `None` when no parser exists for the language or the parse
/// produced errors; the caller falls back to the character splitter
/// for the whole file.
pub fn split_tree(
    text: &str,
    language: Language,
    relative_path: &str,
    chunk_size: usize,
    overlap: usize,
) -> Option<Vec<TextSpan>> {
    if language == Language::Markdown {
        return Some(split_markdown(text, chunk_size, overlap));
    }

    let grammar = grammar(language, relative_path)?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    let tree = parser.parse(text, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let splitter = CharSplitter::new(chunk_size, overlap);
    let mut spans = Vec::new();
    collect_spans(root, text, chunk_size, &splitter, &mut spans);

    if spans.is_empty() {
        if text.is_empty() {
            return Some(spans);
        }
        spans.push(TextSpan {
            start: 0,
            end: text.len(),
        });
    }

    // Cover any leading/trailing bytes outside the root node.
    spans[0].start = 0;
    let last = spans.len() - 1;
    spans[last].end = spans[last].end.max(text.len());
    Some(spans)
}

/// Accumulate child spans of `node` into chunks bounded by `budget`.
///
/// Emitted spans cover `[node.start, node.end)` with no gaps; only
/// character-subdivided leaves may overlap their neighbors.
fn collect_spans(
    node: Node<'_>,
    text: &str,
    budget: usize,
    splitter: &CharSplitter,
    out: &mut Vec<TextSpan>,
) {
    let mut start = node.start_byte();
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();

    for child in children {
        let child_len = child.end_byte() - child.start_byte();

        if child_len > budget {
            // Flush whatever accumulated before this oversized node.
            if child.start_byte() > start {
                out.push(TextSpan {
                    start,
                    end: child.start_byte(),
                });
            }
            if child.child_count() > 0 {
                collect_spans(child, text, budget, splitter, out);
            } else {
                // A leaf wider than the budget (string blob, minified
                // line): subdivide by characters.
                out.extend(splitter.spans_in(text, child.start_byte(), child.end_byte()));
            }
            start = child.end_byte();
        } else if child.end_byte() - start > budget && child.start_byte() > start {
            // Adding this node would blow the budget; emit the
            // accumulated chunk and start a new one at the node.
            out.push(TextSpan {
                start,
                end: child.start_byte(),
            });
            start = child.start_byte();
        }
    }

    if node.end_byte() > start {
        out.push(TextSpan {
            start,
            end: node.end_byte(),
        });
    }
}

/// Heading-aligned splitting for Markdown.
///
/// Sections begin at ATX headings; consecutive sections accumulate up
/// to the budget and an oversized section degrades to character spans.
fn split_markdown(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextSpan> {
    let splitter = CharSplitter::new(chunk_size, overlap);
    let mut boundaries = markdown_sections(text);
    boundaries.push(text.len());

    let mut spans = Vec::new();
    let mut acc_start = 0;
    for window in boundaries.windows(2) {
        let (sec_start, sec_end) = (window[0], window[1]);
        let sec_len = sec_end - sec_start;

        if sec_len > chunk_size {
            if sec_start > acc_start {
                spans.push(TextSpan {
                    start: acc_start,
                    end: sec_start,
                });
            }
            spans.extend(splitter.spans_in(text, sec_start, sec_end));
            acc_start = sec_end;
        } else if sec_end - acc_start > chunk_size && sec_start > acc_start {
            spans.push(TextSpan {
                start: acc_start,
                end: sec_start,
            });
            acc_start = sec_start;
        }
    }
    if text.len() > acc_start {
        spans.push(TextSpan {
            start: acc_start,
            end: text.len(),
        });
    }
    spans
}

/// Byte offsets where ATX heading lines begin, always including 0.
fn markdown_sections(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let hashes = line.bytes().take_while(|&b| b == b'#').count();
        if offset > 0
            && (1..=6).contains(&hashes)
            && line.as_bytes().get(hashes).is_some_and(|&b| b == b' ')
        {
            offsets.push(offset);
        }
        offset += line.len();
    }
    offsets
}
