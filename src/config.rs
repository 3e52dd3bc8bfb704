//! Configuration module for the semantic code search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CODE_CONTEXT_` and use
//! double underscores to separate nested levels:
//! - `CODE_CONTEXT_INDEXING__EMBEDDING_BATCH_SIZE=50`
//! - `CODE_CONTEXT_SEARCH__HYBRID=false`
//! - `CODE_CONTEXT_SPLITTER__CHUNK_SIZE=2000`
//!
//! The vectors directory override (`VECTOR_DB_PATH`) is a boundary
//! concern handled by [`crate::init::StorageLayout`], not part of the
//! layered settings.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Indexing configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub splitter: SplitterConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// File scanning configuration
    #[serde(default)]
    pub scanning: ScanningConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of chunk texts sent to the embedder per batch
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Hard cap on chunks written per indexing run
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SplitterConfig {
    /// Chunk size budget in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent character-split chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Provider name: currently "fastembed"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Explicit dimension override. Zero means "ask the provider".
    #[serde(default)]
    pub dimension: usize,

    /// Retry attempts for transient provider failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Create hybrid (vector + full-text) collections
    #[serde(default = "default_true")]
    pub hybrid: bool,

    /// Similarity threshold for search results
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,

    /// Default number of results
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScanningConfig {
    /// Extra ignore patterns merged on top of the built-in defaults
    #[serde(default)]
    pub custom_ignore_patterns: Vec<String>,

    /// Extra file extensions (with or without leading dot) added to
    /// the allowlist
    #[serde(default)]
    pub custom_extensions: Vec<String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_embedding_batch_size() -> usize {
    100
}
fn default_chunk_limit() -> usize {
    450_000
}
fn default_chunk_size() -> usize {
    2500
}
fn default_chunk_overlap() -> usize {
    300
}
fn default_provider() -> String {
    "fastembed".to_string()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_max_retries() -> usize {
    3
}
fn default_true() -> bool {
    true
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_top_k() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            indexing: IndexingConfig::default(),
            splitter: SplitterConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            scanning: ScanningConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: default_embedding_batch_size(),
            chunk_limit: default_chunk_limit(),
        }
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dimension: 0,
            max_retries: default_max_retries(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hybrid: default_true(),
            threshold: default_similarity_threshold(),
            top_k: default_top_k(),
        }
    }
}

impl Settings {
    /// Load settings from the layered sources: defaults, then
    /// `code-context.toml`, then `CODE_CONTEXT_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(PathBuf::from("code-context.toml"))
    }

    /// Load settings with an explicit config file path.
    pub fn load_from(config_path: PathBuf) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("CODE_CONTEXT_").split("__"))
            .extract()
    }

    /// The explicit dimension override, if one was configured.
    #[must_use]
    pub fn dimension_override(&self) -> Option<usize> {
        (self.embedding.dimension > 0).then_some(self.embedding.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.indexing.embedding_batch_size, 100);
        assert_eq!(settings.indexing.chunk_limit, 450_000);
        assert_eq!(settings.splitter.chunk_size, 2500);
        assert_eq!(settings.splitter.chunk_overlap, 300);
        assert!(settings.search.hybrid);
        assert_eq!(settings.search.top_k, 10);
        assert!((settings.search.threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.dimension_override(), None);
    }

    #[test]
    fn test_dimension_override() {
        let mut settings = Settings::default();
        settings.embedding.dimension = 768;
        assert_eq!(settings.dimension_override(), Some(768));
    }

    #[test]
    fn test_settings_serialize() {
        let serialized = serde_json::to_string(&Settings::default()).unwrap();
        assert!(serialized.contains("embedding_batch_size"));
        assert!(serialized.contains("chunk_limit"));
    }
}
