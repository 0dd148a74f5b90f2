//! FastEmbed embedding provider implementation.
//!
//! Runs an ONNX embedding model locally through the fastembed library, so the
//! recommender can work without an embedding API key. Model weights are
//! downloaded into the cache directory on first use.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// FastEmbed embedding provider.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    model_name: String,

    embedding_dimension: usize,
}

/// Map a CLI model name onto a fastembed model and its output dimension.
///
/// Accepts the enum spelling (`BGESmallENV15`) case-insensitively as well as
/// the Hugging Face style names (`bge-small-en-v1.5`).
pub fn parse_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    let parsed = match key.as_str() {
        "allminilml6v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "bgesmallenv15" => (EmbeddingModel::BGESmallENV15, 384),
        "bgebaseenv15" => (EmbeddingModel::BGEBaseENV15, 768),
        "bgelargeenv15" => (EmbeddingModel::BGELargeENV15, 1024),
        "nomicembedtextv1" => (EmbeddingModel::NomicEmbedTextV1, 768),
        "nomicembedtextv15" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "paraphraseminilml12v2" | "paraphrasemlminilml12v2" => {
            (EmbeddingModel::ParaphraseMLMiniLML12V2, 384)
        }
        "paraphrasempnetbasev2" | "paraphrasemlmpnetbasev2" => {
            (EmbeddingModel::ParaphraseMLMpnetBaseV2, 768)
        }
        _ => return None,
    };
    Some(parsed)
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model name (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` for an unknown model name or if
    /// model initialization fails
    pub fn new(model: Option<&str>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let (model_type, embedding_dimension) = match model {
            Some(name) => parse_model(name).ok_or_else(|| {
                EmbeddingError::ConfigError(format!("Unknown FastEmbed model: {}", name))
            })?,
            None => (EmbeddingModel::AllMiniLML6V2, 384),
        };
        let model_name = format!("{:?}", model_type);

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        #[allow(unused_mut)]
        let mut model = self.model.lock().await;
        model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Other(format!("Batch embedding generation failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_names() {
        let (model, dim) = parse_model("BGESmallENV15").unwrap();
        assert_eq!(model, EmbeddingModel::BGESmallENV15);
        assert_eq!(dim, 384);

        let (model, dim) = parse_model("bge-base-en-v1.5").unwrap();
        assert_eq!(model, EmbeddingModel::BGEBaseENV15);
        assert_eq!(dim, 768);

        assert!(parse_model("not-a-model").is_none());
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let result = FastEmbedProvider::new(Some("mystery"), None);
        assert!(matches!(result, Err(EmbeddingError::ConfigError(_))));
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_batch_dimension_and_order() {
        let provider = FastEmbedProvider::new(None, None).unwrap();
        let texts = ["Graph neural networks", "Protein folding", "Graph neural networks"];

        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        assert!(embeddings.iter().all(|e| e.len() == provider.dimension()));
        assert_eq!(embeddings[0], embeddings[2]);
        assert_ne!(embeddings[0], embeddings[1]);
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_embed_rejects_blank_text() {
        let provider = FastEmbedProvider::new(None, None).unwrap();
        assert!(matches!(
            provider.embed("  \n").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
