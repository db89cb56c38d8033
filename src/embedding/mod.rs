//! Embedding module - text vectorization for semantic search
//!
//! Two providers sit behind the `EmbeddingProvider` trait:
//! - `OpenAiEmbedding`: any OpenAI-compatible `/embeddings` endpoint
//!   (OpenAI itself, or a local LM Studio server)
//! - `HashingEmbedding`: deterministic feature hashing, offline
//!
//! ## Usage
//! ```rust,ignore
//! let embedder = create_embedder(&Config::from_env()?)?;
//! let vector = embedder.embed("ambient noise tomography").await?;
//! ```

mod hashing;

pub use hashing::HashingEmbedding;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ProviderKind};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Embedding provider trait
///
/// Turns text into fixed-length vectors. Every vector a provider returns must
/// have `dimension()` entries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Vector length
    fn dimension(&self) -> usize;

    /// Provider / model name
    fn name(&self) -> &str;
}

/// Collapse runs of whitespace and trim, keeping case.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// OpenAI-compatible Embedding
// ============================================================================

/// Default OpenAI API base
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Texts per `/embeddings` request
const BATCH_SIZE: usize = 50;

/// Per-request HTTP timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible embedding client
///
/// No retries: a failed request fails the whole call and the caller decides
/// what to do.
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// Create a client against `base_url` (no trailing `/embeddings`).
    ///
    /// # Arguments
    /// * `api_key` - Bearer token, `None` for local servers
    /// * `base_url` - e.g. `https://api.openai.com/v1`
    /// * `model` - embedding model name
    pub fn new(api_key: Option<String>, base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            dimension: model_dimension(model),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                anyhow::bail!(
                    "Embedding API error ({}): {}",
                    error.error.kind.unwrap_or_else(|| status.to_string()),
                    error.error.message
                );
            }
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let mut parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        if parsed.data.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                parsed.data.len()
            );
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Request body
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

/// Response body
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Error body
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({}/{} texts)",
                i + 1,
                (i * BATCH_SIZE + batch.len()).min(texts.len()),
                texts.len()
            );
            results.extend(self.request(batch).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Known output sizes; unknown local models are assumed to match 3-small.
fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Build the embedding provider selected in `config`.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "OPENAI_API_KEY not set.\n\
                     Set: export OPENAI_API_KEY=your-api-key\n\
                     or use EMBEDDING_PROVIDER=hashing for offline embeddings"
                )
            })?;
            let base_url = config.openai_base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Arc::new(OpenAiEmbedding::new(
                Some(api_key),
                base_url,
                &config.embedding_model,
            )?)
        }
        ProviderKind::LmStudio => Arc::new(OpenAiEmbedding::new(
            config.openai_api_key.clone(),
            &config.lmstudio_base_url,
            &config.embedding_model,
        )?),
        ProviderKind::Hashing => Arc::new(HashingEmbedding::default()),
    };

    tracing::info!(
        "Using {} embedding (model: {}, dimension: {})",
        config.provider,
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(provider: ProviderKind, api_key: Option<&str>) -> Config {
        Config {
            provider,
            openai_api_key: api_key.map(str::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Hello World"), "Hello World");
        assert_eq!(normalize_text("  Multiple \n\n  Spaces  "), "Multiple Spaces");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_model_dimension() {
        assert_eq!(model_dimension("text-embedding-3-small"), 1536);
        assert_eq!(model_dimension("text-embedding-3-large"), 3072);
        assert_eq!(model_dimension("nomic-embed-text"), 1536);
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let embedder =
            OpenAiEmbedding::new(None, "http://localhost:1234/v1/", DEFAULT_MODEL).unwrap();
        assert_eq!(embedder.endpoint(), "http://localhost:1234/v1/embeddings");
    }

    #[test]
    fn test_create_embedder_openai_requires_key() {
        let result = create_embedder(&config_with(ProviderKind::OpenAi, None));
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string().contains("OPENAI_API_KEY"))
            .unwrap_or(false));
    }

    #[test]
    fn test_create_embedder_variants() {
        let openai = create_embedder(&config_with(ProviderKind::OpenAi, Some("sk-test"))).unwrap();
        assert_eq!(openai.name(), DEFAULT_MODEL);

        let local = create_embedder(&config_with(ProviderKind::LmStudio, None)).unwrap();
        assert_eq!(local.dimension(), 1536);

        let hashing = create_embedder(&config_with(ProviderKind::Hashing, None)).unwrap();
        assert_eq!(hashing.name(), "hashing");
    }

    #[test]
    fn test_response_parsing_orders_by_index() {
        let body = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#;
        let mut parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }
}
