//! Core types shared across the indexing, storage, and search layers.
//!
//! This module provides newtypes following the project's strict type
//! safety guidelines: codebase identifiers, chunk records, vector
//! dimensions, and search results.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Stable identifier for a codebase: the first 8 lowercase hex chars of
/// the MD5 digest of its resolved absolute path.
///
/// Every naming site (store filename, collection name, snapshot
/// filename) derives from this one type, so the identifier can never
/// drift between subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodebaseId([u8; 8]);

impl CodebaseId {
    /// Derive the identifier for a codebase root.
    ///
    /// Relative paths are resolved against the current directory and
    /// lexically normalized (`.` and `..` components removed) before
    /// hashing, so the same directory always maps to the same id.
    pub fn derive(path: &Path) -> Self {
        let resolved = resolve_path(path);
        let digest = md5::compute(resolved.to_string_lossy().as_bytes());
        let hex = format!("{digest:x}");
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hex.as_bytes()[..8]);
        Self(bytes)
    }

    /// Parse an identifier from its 8-hex string form.
    ///
    /// Returns `None` unless the input is exactly 8 lowercase hex chars.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(s.as_bytes());
        Some(Self(bytes))
    }

    /// The identifier as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Constructed exclusively from ASCII hex digits.
        std::str::from_utf8(&self.0).expect("codebase id is ascii hex")
    }
}

impl std::fmt::Display for CodebaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a codebase path to the absolute, lexically-normalized form
/// used for id derivation. Symlinks are intentionally not followed so
/// the id stays stable whether or not the directory exists yet.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}

/// Collection layout for a codebase, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Vector search only.
    Dense,
    /// Vector search plus a full-text index for rank fusion.
    Hybrid,
}

impl IndexMode {
    /// The collection name prefix for this mode.
    #[must_use]
    pub fn collection_prefix(&self) -> &'static str {
        match self {
            IndexMode::Dense => "code_chunks",
            IndexMode::Hybrid => "hybrid_code_chunks",
        }
    }

    /// Full collection name for a codebase.
    #[must_use]
    pub fn collection_name(&self, id: CodebaseId) -> String {
        format!("{}_{}", self.collection_prefix(), id)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMode::Dense => "dense",
            IndexMode::Hybrid => "hybrid",
        }
    }

    /// Parse from the stored string form.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "dense" => Some(IndexMode::Dense),
            "hybrid" => Some(IndexMode::Hybrid),
            _ => None,
        }
    }
}

/// A contiguous span of a source file, produced by a splitter.
///
/// Immutable once produced for a given file content: the id is a pure
/// function of the path, line range, and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id derived from `(relative_path, start_line, end_line, content hash)`.
    pub id: String,
    /// Path relative to the codebase root, forward-slash normalized.
    pub relative_path: String,
    /// 1-based inclusive.
    pub start_line: u32,
    /// 1-based inclusive.
    pub end_line: u32,
    /// Lower-cased extension with leading dot, e.g. `.rs`.
    pub file_extension: String,
    /// The chunk text.
    pub content: String,
    /// Free-form annotations (language tag, splitter kind).
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Build a chunk, deriving its stable id.
    pub fn new(
        relative_path: String,
        start_line: u32,
        end_line: u32,
        content: String,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        debug_assert!(start_line >= 1 && start_line <= end_line);
        let file_extension = extension_of(&relative_path);
        let id = Self::derive_id(&relative_path, start_line, end_line, &content);
        Self {
            id,
            relative_path,
            start_line,
            end_line,
            file_extension,
            content,
            metadata,
        }
    }

    /// Stable chunk id: `path:start-end:sha256(content)[..16]`.
    #[must_use]
    pub fn derive_id(relative_path: &str, start_line: u32, end_line: u32, content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        let hash = format!("{digest:x}");
        format!("{relative_path}:{start_line}-{end_line}:{}", &hash[..16])
    }
}

/// Lower-cased extension with leading dot, or empty for extensionless files.
#[must_use]
pub fn extension_of(relative_path: &str) -> String {
    Path::new(relative_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// A chunk paired with its embedding, ready for the store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    /// Length must equal the collection dimension.
    pub vector: Vec<f32>,
}

/// Type-safe wrapper for vector dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a dimension, rejecting zero.
    pub fn new(dim: usize) -> Option<Self> {
        (dim > 0).then_some(Self(dim))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has this dimension.
    #[must_use]
    pub fn matches(&self, vector: &[f32]) -> bool {
        vector.len() == self.0
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ranked search result returned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub relative_path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Language tag derived from the file extension, e.g. `rust`.
    pub language: String,
    /// Similarity in `[0, 1]`: `1 - cosine_distance`, clamped.
    pub score: f32,
}

/// Terminal status of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Every eligible file was ingested.
    Completed,
    /// The chunk cap was hit; whatever was written remains queryable.
    LimitReached,
    /// A cancellation token tripped at a batch boundary.
    Cancelled,
}

/// Result summary of `index_codebase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutcome {
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub status: IndexStatus,
}

/// File-level change counts returned by `reindex_by_change`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}
