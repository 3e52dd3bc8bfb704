//! Local embedding provider backed by fastembed.
//!
//! Supports a curated set of sentence-transformer models with
//! dimension auto-detection at initialization time.

use super::EmbeddingProvider;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::init::StorageLayout;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

/// Parse a model name string into an EmbeddingModel enum.
///
/// # Supported Models
/// - `AllMiniLML6V2` - Sentence Transformer, 384 dimensions (default)
/// - `BGESmallENV15` - BAAI BGE English small, 384 dimensions
/// - `BGEBaseENV15` - BAAI BGE English base, 768 dimensions
/// - `MultilingualE5Small` - intfloat E5 small, 384 dimensions
/// - `MultilingualE5Base` - intfloat E5 base, 768 dimensions
/// - `JinaEmbeddingsV2BaseCode` - Jina code embeddings, 768 dimensions
pub fn parse_embedding_model(model_name: &str) -> EmbeddingResult<EmbeddingModel> {
    match model_name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "BGELargeENV15" => Ok(EmbeddingModel::BGELargeENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "MultilingualE5Base" => Ok(EmbeddingModel::MultilingualE5Base),
        "MultilingualE5Large" => Ok(EmbeddingModel::MultilingualE5Large),
        "NomicEmbedTextV15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "JinaEmbeddingsV2BaseCode" => Ok(EmbeddingModel::JinaEmbeddingsV2BaseCode),
        _ => Err(EmbeddingError::Permanent {
            provider: "fastembed".to_string(),
            reason: format!(
                "Unknown embedding model: '{model_name}'. Supported models: AllMiniLML6V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small, JinaEmbeddingsV2BaseCode, and more"
            ),
        }),
    }
}

/// Local provider over fastembed.
///
/// The model is wrapped in a Mutex because fastembed's embed call
/// requires `&mut self`; callers share the provider behind `Arc`.
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedProvider {
    /// Create a provider with the default AllMiniLML6V2 model.
    pub fn new(layout: &StorageLayout) -> EmbeddingResult<Self> {
        Self::with_model_name(layout, "AllMiniLML6V2", false)
    }

    /// Create a provider for a named model.
    ///
    /// Downloads the model on first use; `show_progress` controls the
    /// download progress display.
    pub fn with_model_name(
        layout: &StorageLayout,
        model_name: &str,
        show_progress: bool,
    ) -> EmbeddingResult<Self> {
        let model = parse_embedding_model(model_name)?;

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(layout.models_dir())
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| EmbeddingError::Permanent {
            provider: "fastembed".to_string(),
            reason: format!(
                "Failed to initialize embedding model '{model_name}': {e}. Ensure you have internet connection for first-time model download"
            ),
        })?;

        // Auto-detect dimension by generating a test embedding
        let test_embedding =
            text_model
                .embed(vec!["test"], None)
                .map_err(|e| EmbeddingError::Permanent {
                    provider: "fastembed".to_string(),
                    reason: format!("Failed to detect model dimensions: {e}"),
                })?;
        let dimension = test_embedding
            .into_iter()
            .next()
            .map(|v| v.len())
            .unwrap_or(0);
        if dimension == 0 {
            return Err(EmbeddingError::Permanent {
                provider: "fastembed".to_string(),
                reason: "Model produced an empty test embedding".to_string(),
            });
        }

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
            model_name: model_name.to_string(),
        })
    }

    /// The name of the model being used.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::Permanent {
                provider: "fastembed".to_string(),
                reason: "Embedding model lock poisoned by a panic in another thread".to_string(),
            })?
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Permanent {
                provider: "fastembed".to_string(),
                reason: format!("Failed to generate embeddings: {e}"),
            })?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_input_tokens(&self) -> usize {
        // Sentence-transformer family limit; longer inputs are
        // truncated upstream before submission.
        512
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_models() {
        assert!(parse_embedding_model("AllMiniLML6V2").is_ok());
        assert!(parse_embedding_model("JinaEmbeddingsV2BaseCode").is_ok());
    }

    #[test]
    fn test_parse_unknown_model_is_permanent() {
        let err = parse_embedding_model("NotARealModel").unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("NotARealModel"));
    }
}
