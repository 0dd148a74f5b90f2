//! Gemini embedding provider implementation.
//!
//! Talks to the Generative Language API `batchEmbedContents` endpoint. Every
//! request is tagged with the `CLASSIFICATION` task type, which is what the
//! preference classifier consumes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "text-embedding-004";
const TASK_TYPE: &str = "CLASSIFICATION";

/// Upper bound on requests per `batchEmbedContents` call.
const MAX_REQUESTS_PER_CALL: usize = 100;

/// Gemini embedding provider.
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_dimension: usize,
}

impl GeminiEmbedding {
    /// Create a new Gemini embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - Gemini API key
    /// * `model` - Model name (defaults to "text-embedding-004" if None)
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the key is empty or the HTTP
    /// client cannot be built
    pub fn new(api_key: String, model: Option<String>) -> EmbeddingResult<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::ConfigError(
                "missing Gemini API key".to_string(),
            ));
        }

        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = model.trim_start_matches("models/").to_string();
        let embedding_dimension = match model.as_str() {
            "text-embedding-004" | "embedding-001" => 768,
            "gemini-embedding-001" => 3072,
            _ => 768,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EmbeddingError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            embedding_dimension,
        })
    }

    /// Point the provider at a different API root (e.g. a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:batchEmbedContents", self.base_url, self.model)
    }

    fn build_request<'a>(&self, texts: &[&'a str]) -> BatchEmbedRequest<'a> {
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type: TASK_TYPE,
                })
                .collect(),
        }
    }

    async fn embed_chunk(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let request = self.build_request(texts);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::ApiError(format!(
                "Gemini embeddings request failed ({}): {}",
                status, body
            )));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("invalid Gemini response: {}", e)))?;

        parsed.into_vectors(texts.len())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        self.embed_chunk(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_REQUESTS_PER_CALL) {
            debug!(chunk_len = chunk.len(), model = %self.model, "Calling Gemini batchEmbedContents");
            embeddings.extend(self.embed_chunk(chunk).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl BatchEmbedResponse {
    fn into_vectors(self, expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
        if self.embeddings.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                received: self.embeddings.len(),
            });
        }
        Ok(self.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiEmbedding {
        GeminiEmbedding::new("test-key".to_string(), None).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let result = GeminiEmbedding::new("  ".to_string(), None);
        assert!(matches!(result, Err(EmbeddingError::ConfigError(_))));
    }

    #[test]
    fn test_default_model_and_dimension() {
        let provider = provider();
        assert_eq!(provider.model_name(), "text-embedding-004");
        assert_eq!(provider.dimension(), 768);
    }

    #[test]
    fn test_model_prefix_is_stripped() {
        let provider =
            GeminiEmbedding::new("k".to_string(), Some("models/text-embedding-004".to_string()))
                .unwrap();
        assert_eq!(provider.model_name(), "text-embedding-004");
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:batchEmbedContents"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let provider = provider();
        let request = provider.build_request(&["first", "second"]);
        let json = serde_json::to_value(&request).unwrap();

        let requests = json["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["model"], "models/text-embedding-004");
        assert_eq!(requests[0]["taskType"], "CLASSIFICATION");
        assert_eq!(requests[1]["content"]["parts"][0]["text"], "second");
    }

    #[test]
    fn test_response_parsing_checks_count() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let parsed: BatchEmbedResponse = serde_json::from_str(body).unwrap();
        let vectors = parsed.into_vectors(2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);

        let parsed: BatchEmbedResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            parsed.into_vectors(3),
            Err(EmbeddingError::CountMismatch { expected: 3, received: 2 })
        ));
    }

    #[tokio::test]
    async fn test_embed_rejects_blank_text() {
        let result = provider().embed("   ").await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_embed_batch_empty_makes_no_request() {
        let result = provider().embed_batch(&[]).await.unwrap();
        assert!(result.is_empty());
    }
}
