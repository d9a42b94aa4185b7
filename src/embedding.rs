//! Embedding provider implementations.
//!
//! Implements [`EmbeddingProvider`] from `lucentsave-core`:
//! - **[`DisabledProvider`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API, one chunk per request.
//!
//! There is no retry here. A failed call fails the field, the field fails
//! the document, and the backfill command picks the document up later.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use lucentsave::config::EmbeddingConfig;
//! # use lucentsave::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use lucentsave_core::embedding::{EmbeddingClient, EmbeddingProvider};
use lucentsave_core::ProviderError;

use crate::config::EmbeddingConfig;

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns [`ProviderError::Disabled`].
pub struct DisabledProvider {
    dims: usize,
}

impl DisabledProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Disabled)
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {base_url}/embeddings` with the configured model. The HTTP
/// client is built once with the configured timeout and reused.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment or the
    /// HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV)
            .with_context(|| format!("{} environment variable not set", OPENAI_API_KEY_ENV))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(request_error)?;
        let vector = first_embedding(parsed)?;
        if vector.len() != self.dims {
            return Err(ProviderError::Dimension {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

fn request_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Request(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Pick the embedding for input 0. The API may return items out of order.
fn first_embedding(mut response: EmbeddingResponse) -> Result<Vec<f32>, ProviderError> {
    response.data.sort_by_key(|item| item.index);
    let item = response
        .data
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?;
    if item.embedding.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(item.embedding)
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Wrap `provider` in an [`EmbeddingClient`] with the configured chunking.
pub fn create_client(
    config: &EmbeddingConfig,
    provider: Arc<dyn EmbeddingProvider>,
) -> EmbeddingClient {
    EmbeddingClient::new(provider, config.max_input_chars)
        .with_chunk_concurrency(config.chunk_concurrency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorts_by_index() {
        let json = r#"{"data":[
            {"index":1,"embedding":[9.0,9.0]},
            {"index":0,"embedding":[1.0,2.0]}
        ]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(first_embedding(parsed).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_empty_data() {
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(matches!(
            first_embedding(parsed),
            Err(ProviderError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.dims(), 1536);
        assert!(matches!(
            provider.embed("hello").await,
            Err(ProviderError::Disabled)
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            base_url: "http://localhost:9999/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAIProvider::with_api_key(&config, "k".to_string()).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:9999/v1/embeddings");
    }
}
