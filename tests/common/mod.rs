//! Shared fixtures for integration tests: a deterministic embedding
//! provider and tree builders.
#![allow(dead_code)]

use code_context::config::Settings;
use code_context::embedding::EmbeddingProvider;
use code_context::error::EmbeddingResult;
use code_context::indexing::ContextIndexer;
use code_context::init::StorageLayout;
use std::path::Path;
use std::sync::Arc;

pub const MOCK_DIMENSION: usize = 128;

/// Deterministic bag-of-words embedder: each token maps to a fixed
/// bucket, so texts sharing tokens land close in vector space and a
/// query containing a token unique to one chunk ranks that chunk
/// first. No model download, no network.
pub struct MockProvider {
    dimension: usize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(MOCK_DIMENSION)
    }
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = stable_hash(&token.to_lowercase()) as usize % self.dimension;
            vector[bucket] += 1.0;
        }
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for MockProvider {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_input_tokens(&self) -> usize {
        8192
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Stable per-process, per-version hash (the std hasher makes no
/// cross-version promise).
fn stable_hash(token: &str) -> u64 {
    token
        .bytes()
        .fold(1469598103934665603u64, |hash, byte| {
            (hash ^ byte as u64).wrapping_mul(1099511628211)
        })
}

pub fn test_settings() -> Settings {
    Settings::default()
}

pub fn indexer(storage_root: &Path, settings: Settings) -> ContextIndexer {
    ContextIndexer::new(
        settings,
        StorageLayout::with_root(storage_root),
        Arc::new(MockProvider::default()),
    )
}

pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
}
