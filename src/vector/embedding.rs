//! Embedding generation for graph nodes.
//!
//! Inference is a black box behind [`EmbeddingGenerator`]. The production
//! implementation wraps fastembed; tests plug in deterministic generators.

use super::types::{VectorDimension, VectorError};
use crate::types::Node;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::Mutex;

/// Model names accepted in `semantic.model`.
pub const SUPPORTED_MODELS: &str = "AllMiniLML6V2, AllMiniLML6V2Q, BGESmallENV15, BGEBaseENV15, MultilingualE5Small, ParaphraseMLMiniLML12V2";

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe; refresh workers call them
/// concurrently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate one embedding per input text, in input order.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Dimension of every vector this generator produces.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Identifier persisted in cache metadata.
    ///
    /// Vectors from generators with different ids are never mixed.
    fn model_id(&self) -> &str;
}

/// Resolve a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML6V2Q" => Ok(EmbeddingModel::AllMiniLML6V2Q),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "ParaphraseMLMiniLML12V2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        other => Err(VectorError::UnknownModel(
            other.to_string(),
            SUPPORTED_MODELS,
        )),
    }
}

/// Output dimension of a supported model, without loading it.
pub fn model_dimension(name: &str) -> Option<usize> {
    match name {
        "BGEBaseENV15" => Some(768),
        "AllMiniLML6V2" | "AllMiniLML6V2Q" | "BGESmallENV15" | "MultilingualE5Small"
        | "ParaphraseMLMiniLML12V2" => Some(384),
        _ => None,
    }
}

/// FastEmbed-backed generator.
///
/// The model is loaded once and guarded by a mutex; fastembed sessions are
/// not shareable across threads without it.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_id: String,
}

impl FastEmbedGenerator {
    /// Load `model_name`, downloading it into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error for unknown model names or when the model fails to
    /// initialize.
    pub fn new(
        model_name: &str,
        cache_dir: &Path,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let model_kind = parse_embedding_model(model_name)?;

        let mut model = TextEmbedding::try_new(
            InitOptions::new(model_kind)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        // Embed once so the store dimension always matches what the model emits
        let sample = model
            .embed(vec!["dimension check".to_string()], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Model warm-up failed: {e}")))?;
        let dim = sample.first().map(Vec::len).unwrap_or_default();

        tracing::debug!("[semantic] loaded {model_name} ({dim} dimensions)");

        Ok(Self {
            model: Mutex::new(model),
            dimension: VectorDimension::new(dim)?,
            model_id: model_name.to_string(),
        })
    }

    /// Build from settings.
    pub fn from_settings(settings: &crate::config::SemanticConfig) -> Result<Self, VectorError> {
        Self::new(
            &settings.model,
            &settings.resolved_model_cache_dir(),
            false,
        )
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Render the text embedded for a node.
///
/// Combines kind, qualified id and the docstring/snippet when present, e.g.
/// `function Billing.charge/2 Charges a card`.
#[must_use]
pub fn node_text(node: &Node) -> String {
    let kind = node.kind().as_str();
    match node.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!("{kind} {} {text}", node.id),
        _ => format!("{kind} {}", node.id),
    }
}

/// Mock embedding generator for unit tests.
///
/// Produces normalized vectors whose leading components react to a few
/// keywords, so similarity between related texts is predictable.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::new(8).unwrap(),
        }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let mut embedding = vec![0.1; dim];
            if text.contains("parse") {
                embedding[0] = 0.9;
                embedding[1] = 0.8;
            }
            if text.contains("charge") || text.contains("payment") {
                embedding[2] = 0.85;
                embedding[3] = 0.75;
            }
            if text.contains("error") {
                embedding[4] = 0.8;
                embedding[5] = 0.7;
            }

            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            for val in &mut embedding {
                *val /= magnitude;
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn test_mock_embeddings_are_normalized() {
        let generator = MockEmbeddingGenerator::new();
        let embeddings = generator
            .generate_embeddings(&["parse a config file", "charge a payment"])
            .unwrap();

        assert_eq!(embeddings.len(), 2);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 8);
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((magnitude - 1.0).abs() < 1e-4);
        }
        assert!(cosine_similarity(&embeddings[0], &embeddings[1]) < 0.9);
    }

    #[test]
    fn test_parse_embedding_model() {
        assert!(parse_embedding_model("AllMiniLML6V2").is_ok());
        assert!(matches!(
            parse_embedding_model("gpt-9"),
            Err(VectorError::UnknownModel(_, _))
        ));
        assert_eq!(model_dimension("BGEBaseENV15"), Some(768));
        assert_eq!(model_dimension("gpt-9"), None);
    }

    #[test]
    fn test_node_text() {
        let node = Node::function("Billing", "charge", 2).with_text("  Charges a card ");
        assert_eq!(node_text(&node), "function Billing.charge/2 Charges a card");

        let node = Node::module("Billing").with_text("   ");
        assert_eq!(node_text(&node), "module Billing");
    }
}
